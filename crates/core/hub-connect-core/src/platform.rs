use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a platform tag does not name a supported platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

/// Third-party platforms a user can connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Instagram,
    Youtube,
    Twitter,
    Shopify,
    GoogleCalendar,
    Calendly,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Instagram,
        Platform::Youtube,
        Platform::Twitter,
        Platform::Shopify,
        Platform::GoogleCalendar,
        Platform::Calendly,
    ];

    /// The wire tag used in routes, redirects and storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::Twitter => "twitter",
            Platform::Shopify => "shopify",
            Platform::GoogleCalendar => "google_calendar",
            Platform::Calendly => "calendly",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Instagram => "Instagram",
            Platform::Youtube => "YouTube",
            Platform::Twitter => "X / Twitter",
            Platform::Shopify => "Shopify",
            Platform::GoogleCalendar => "Google Calendar",
            Platform::Calendly => "Calendly",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Platform::ALL
            .into_iter()
            .find(|platform| platform.as_str() == s)
            .ok_or_else(|| UnknownPlatform(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_tags_round_trip() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>().unwrap(), platform);
        }
    }

    #[test]
    fn test_unknown_platform() {
        let err = "myspace".parse::<Platform>().unwrap_err();
        assert_eq!(err, UnknownPlatform("myspace".to_string()));
        assert_eq!(err.to_string(), "Unknown platform: myspace");
    }

    #[test]
    fn test_serde_uses_wire_tag() {
        let json = serde_json::to_string(&Platform::GoogleCalendar).unwrap();
        assert_eq!(json, "\"google_calendar\"");
    }
}
