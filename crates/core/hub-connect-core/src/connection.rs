use crate::Platform;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of the token material held by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    Active,
    Expired,
    Revoked,
    Error,
}

/// One user's link to one platform.
///
/// Keyed by `(user_id, platform)`. A repeated connect for the same pair
/// replaces the record wholesale; a token refresh updates it in place.
/// Token fields are stored as-is; encrypting them at rest is the store's job.
#[derive(Clone, Serialize, Deserialize)]
pub struct Connection {
    pub id: Uuid,
    pub user_id: String,
    pub platform: Platform,
    pub platform_user_id: Option<String>,
    pub platform_username: Option<String>,
    pub platform_email: Option<String>,
    pub display_name: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub token_status: TokenStatus,
    pub scopes: Vec<String>,
    pub metadata: serde_json::Value,
    pub connected_at: DateTime<Utc>,
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Connection {
    /// Whether the access token's expiry time has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Status as observed at `now`: an active token past its expiry reads as expired.
    pub fn effective_status(&self, now: DateTime<Utc>) -> TokenStatus {
        match self.token_status {
            TokenStatus::Active if self.is_expired_at(now) => TokenStatus::Expired,
            status => status,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("platform_user_id", &self.platform_user_id)
            .field("platform_username", &self.platform_username)
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_expires_at", &self.token_expires_at)
            .field("token_status", &self.token_status)
            .field("scopes", &self.scopes)
            .field("connected_at", &self.connected_at)
            .field("last_refresh_at", &self.last_refresh_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    pub(crate) fn sample_connection(user_id: &str, platform: Platform, token: &str) -> Connection {
        let now = Utc::now();
        Connection {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            platform,
            platform_user_id: Some("remote-1".to_string()),
            platform_username: Some("creator".to_string()),
            platform_email: None,
            display_name: None,
            access_token: token.to_string(),
            refresh_token: Some("refresh".to_string()),
            token_expires_at: Some(now + Duration::hours(1)),
            token_status: TokenStatus::Active,
            scopes: vec!["read".to_string()],
            metadata: serde_json::json!({}),
            connected_at: now,
            last_refresh_at: Some(now),
            updated_at: now,
        }
    }

    #[test]
    fn test_effective_status_detects_expiry() {
        let mut connection = sample_connection("user-1", Platform::Youtube, "token");
        let now = Utc::now();
        assert_eq!(connection.effective_status(now), TokenStatus::Active);

        connection.token_expires_at = Some(now - Duration::minutes(5));
        assert_eq!(connection.effective_status(now), TokenStatus::Expired);

        // Revoked stays revoked regardless of expiry
        connection.token_status = TokenStatus::Revoked;
        assert_eq!(connection.effective_status(now), TokenStatus::Revoked);
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let mut connection = sample_connection("user-1", Platform::Shopify, "token");
        connection.token_expires_at = None;
        assert!(!connection.is_expired_at(Utc::now() + Duration::days(3650)));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let connection = sample_connection("user-1", Platform::Twitter, "super-secret-token");
        let debug = format!("{:?}", connection);
        assert!(!debug.contains("super-secret-token"));
        assert!(debug.contains("[REDACTED]"));
    }
}
