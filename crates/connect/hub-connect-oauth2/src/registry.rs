//! Static platform table and adapter construction.

use crate::client::OAuth2Client;
use crate::config::{ConnectConfig, OAuthConfig, ScopeDelimiter};
use crate::error::{ConnectError, ConnectResult};
use crate::providers::{
    CalendlyProvider, GoogleProvider, InstagramProvider, Provider, ShopifyProvider,
    TwitterProvider,
};
use hub_connect_core::Platform;
use std::collections::BTreeMap;

const SHOP_PLACEHOLDER: &str = "{shop}";

/// Static OAuth settings for one platform.
#[derive(Debug, Clone, Copy)]
pub struct PlatformSpec {
    pub scopes: &'static [&'static str],
    pub scope_delimiter: ScopeDelimiter,
    pub use_pkce: bool,
    pub additional_params: &'static [(&'static str, &'static str)],
    /// Refresh is keyed by the current access token instead of a refresh token
    pub refresh_with_access_token: bool,
}

const GOOGLE_EXTRAS: &[(&str, &str)] = &[("access_type", "offline"), ("prompt", "consent")];

pub fn platform_spec(platform: Platform) -> PlatformSpec {
    match platform {
        Platform::Instagram => PlatformSpec {
            scopes: &[
                "instagram_business_basic",
                "instagram_business_content_publish",
                "instagram_business_manage_comments",
                "instagram_business_manage_messages",
            ],
            scope_delimiter: ScopeDelimiter::Comma,
            use_pkce: false,
            additional_params: &[],
            refresh_with_access_token: true,
        },
        Platform::Youtube => PlatformSpec {
            scopes: &[
                "https://www.googleapis.com/auth/userinfo.profile",
                "https://www.googleapis.com/auth/userinfo.email",
                "openid",
            ],
            scope_delimiter: ScopeDelimiter::Space,
            use_pkce: false,
            additional_params: GOOGLE_EXTRAS,
            refresh_with_access_token: false,
        },
        Platform::GoogleCalendar => PlatformSpec {
            scopes: &[
                "https://www.googleapis.com/auth/calendar.readonly",
                "https://www.googleapis.com/auth/calendar.events.readonly",
            ],
            scope_delimiter: ScopeDelimiter::Space,
            use_pkce: false,
            additional_params: GOOGLE_EXTRAS,
            refresh_with_access_token: false,
        },
        Platform::Twitter => PlatformSpec {
            scopes: &["tweet.read", "users.read", "follows.read"],
            scope_delimiter: ScopeDelimiter::Space,
            use_pkce: true,
            additional_params: &[],
            refresh_with_access_token: false,
        },
        Platform::Shopify => PlatformSpec {
            scopes: &[
                "read_products",
                "read_orders",
                "read_customers",
                "read_inventory",
            ],
            scope_delimiter: ScopeDelimiter::Comma,
            use_pkce: false,
            additional_params: &[],
            refresh_with_access_token: false,
        },
        Platform::Calendly => PlatformSpec {
            scopes: &[],
            scope_delimiter: ScopeDelimiter::Space,
            use_pkce: false,
            additional_params: &[],
            refresh_with_access_token: false,
        },
    }
}

/// Remote endpoints a provider adapter talks to.
///
/// Shopify entries contain a `{shop}` placeholder that is filled in per tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorization_url: String,
    pub token_url: String,
    /// Base URL for profile and content requests
    pub api_base: String,
    pub revoke_url: Option<String>,
}

impl ProviderEndpoints {
    pub fn new(
        authorization_url: impl Into<String>,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            authorization_url: authorization_url.into(),
            token_url: token_url.into(),
            api_base: api_base.into(),
            revoke_url: None,
        }
    }

    pub fn with_revoke_url(mut self, url: impl Into<String>) -> Self {
        self.revoke_url = Some(url.into());
        self
    }

    /// Point every endpoint at one base URL, keeping the production paths.
    pub fn rooted_at(platform: Platform, base: &str) -> Self {
        let base = base.trim_end_matches('/');
        let endpoints = Self::new(
            format!("{}/authorize", base),
            format!("{}/token", base),
            base,
        );
        match platform {
            Platform::Twitter | Platform::Calendly => {
                endpoints.with_revoke_url(format!("{}/revoke", base))
            }
            _ => endpoints,
        }
    }

    pub fn defaults(platform: Platform) -> Self {
        match platform {
            Platform::Instagram => Self::new(
                "https://api.instagram.com/oauth/authorize",
                "https://api.instagram.com/oauth/access_token",
                "https://graph.instagram.com",
            ),
            Platform::Youtube | Platform::GoogleCalendar => Self::new(
                "https://accounts.google.com/o/oauth2/v2/auth",
                "https://oauth2.googleapis.com/token",
                "https://www.googleapis.com",
            ),
            Platform::Twitter => Self::new(
                "https://twitter.com/i/oauth2/authorize",
                "https://api.twitter.com/2/oauth2/token",
                "https://api.twitter.com/2",
            )
            .with_revoke_url("https://api.twitter.com/2/oauth2/revoke"),
            Platform::Shopify => Self::new(
                "https://{shop}.myshopify.com/admin/oauth/authorize",
                "https://{shop}.myshopify.com/admin/oauth/access_token",
                "https://{shop}.myshopify.com/admin/api/2024-01",
            ),
            Platform::Calendly => Self::new(
                "https://auth.calendly.com/oauth/authorize",
                "https://auth.calendly.com/oauth/token",
                "https://api.calendly.com",
            )
            .with_revoke_url("https://auth.calendly.com/oauth/revoke"),
        }
    }

    fn for_shop(self, shop: &str) -> Self {
        let fill = |url: String| url.replace(SHOP_PLACEHOLDER, shop);
        Self {
            authorization_url: fill(self.authorization_url),
            token_url: fill(self.token_url),
            api_base: fill(self.api_base),
            revoke_url: self.revoke_url.map(fill),
        }
    }
}

/// Normalize a shop domain to its bare subdomain.
///
/// Accepts `name` or `name.myshopify.com`; anything outside `[a-z0-9-]` is rejected.
pub fn normalize_shop(shop: &str) -> ConnectResult<String> {
    let trimmed = shop.trim().to_ascii_lowercase();
    let name = trimmed
        .strip_suffix(".myshopify.com")
        .unwrap_or(trimmed.as_str())
        .to_string();

    let valid = !name.is_empty()
        && !name.starts_with('-')
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(ConnectError::InvalidParameter {
            name: "shop".to_string(),
            reason: format!("'{}' is not a valid shop domain", shop),
        });
    }
    Ok(name)
}

/// Build the per-request OAuth configuration for a platform.
pub fn oauth_config(
    platform: Platform,
    config: &ConnectConfig,
    endpoints: &ProviderEndpoints,
) -> ConnectResult<OAuthConfig> {
    let credentials = config.credentials_for(platform)?;
    let spec = platform_spec(platform);

    Ok(OAuthConfig {
        client_id: credentials.client_id,
        client_secret: credentials.client_secret,
        redirect_uri: config.redirect_uri(platform),
        authorization_url: endpoints.authorization_url.clone(),
        token_url: endpoints.token_url.clone(),
        scopes: spec.scopes.iter().map(|s| s.to_string()).collect(),
        scope_delimiter: spec.scope_delimiter,
        use_pkce: spec.use_pkce,
        additional_params: spec
            .additional_params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
    })
}

/// Resolve the adapter for `platform`.
///
/// Shopify requires `shop`; its absence is reported before credentials are
/// looked up or anything is constructed.
pub fn resolve_provider(
    platform: Platform,
    shop: Option<&str>,
    config: &ConnectConfig,
    client: &OAuth2Client,
) -> ConnectResult<Provider> {
    let endpoints = config.endpoints(platform);

    let provider = match platform {
        Platform::Shopify => {
            let shop = shop
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| ConnectError::MissingParameter("shop".to_string()))?;
            let shop = normalize_shop(shop)?;
            let endpoints = endpoints.for_shop(&shop);
            let oauth = oauth_config(platform, config, &endpoints)?;
            Provider::Shopify(ShopifyProvider::new(shop, oauth, endpoints, client.clone()))
        }
        Platform::Instagram => {
            let oauth = oauth_config(platform, config, &endpoints)?;
            Provider::Instagram(InstagramProvider::new(oauth, endpoints, client.clone()))
        }
        Platform::Youtube | Platform::GoogleCalendar => {
            let oauth = oauth_config(platform, config, &endpoints)?;
            Provider::Google(GoogleProvider::new(
                platform,
                oauth,
                endpoints,
                client.clone(),
            ))
        }
        Platform::Twitter => {
            let oauth = oauth_config(platform, config, &endpoints)?;
            Provider::Twitter(TwitterProvider::new(oauth, endpoints, client.clone()))
        }
        Platform::Calendly => {
            let oauth = oauth_config(platform, config, &endpoints)?;
            Provider::Calendly(CalendlyProvider::new(oauth, endpoints, client.clone()))
        }
    };

    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> OAuth2Client {
        OAuth2Client::new(5).unwrap()
    }

    fn configured() -> ConnectConfig {
        Platform::ALL
            .iter()
            .fold(ConnectConfig::new(), |config, platform| {
                config.with_credentials(*platform, "id", "secret")
            })
    }

    #[test]
    fn test_normalize_shop() {
        assert_eq!(normalize_shop("my-store").unwrap(), "my-store");
        assert_eq!(normalize_shop("My-Store.myshopify.com").unwrap(), "my-store");
        assert!(normalize_shop("evil.com/path").is_err());
        assert!(normalize_shop("shop?x=1").is_err());
        assert!(normalize_shop("").is_err());
    }

    #[test]
    fn test_shopify_without_shop_rejected_before_credentials() {
        // No credentials configured: the missing shop still wins
        let result = resolve_provider(Platform::Shopify, None, &ConnectConfig::new(), &client());
        assert!(matches!(result, Err(ConnectError::MissingParameter(ref p)) if p == "shop"));
        assert_eq!(result.err().map(|e| e.status_code()), Some(400));
    }

    #[test]
    fn test_shopify_endpoints_are_templated() {
        let provider =
            resolve_provider(Platform::Shopify, Some("acme"), &configured(), &client()).unwrap();
        let config = provider.as_provider().config();
        assert_eq!(
            config.authorization_url,
            "https://acme.myshopify.com/admin/oauth/authorize"
        );
        assert_eq!(
            config.token_url,
            "https://acme.myshopify.com/admin/oauth/access_token"
        );
    }

    #[test]
    fn test_missing_credentials_name_variable() {
        let config = ConnectConfig::new().with_credentials(Platform::Twitter, "id", "secret");
        let err = resolve_provider(Platform::Calendly, None, &config, &client()).unwrap_err();
        assert!(matches!(err, ConnectError::Configuration(_)));
        assert!(err.to_string().contains("CALENDLY_CLIENT_ID"));
        assert!(err.to_string().contains("CALENDLY_CLIENT_SECRET"));
    }

    #[test]
    fn test_every_platform_resolves() {
        let config = configured();
        for platform in Platform::ALL {
            let provider =
                resolve_provider(platform, Some("acme"), &config, &client()).unwrap();
            assert_eq!(provider.as_provider().platform(), platform);
        }
    }

    #[test]
    fn test_google_extras_and_pkce_flags() {
        let config = configured();
        let youtube = resolve_provider(Platform::Youtube, None, &config, &client()).unwrap();
        let oauth = youtube.as_provider().config();
        assert_eq!(
            oauth.additional_params.get("access_type").map(String::as_str),
            Some("offline")
        );
        assert_eq!(
            oauth.additional_params.get("prompt").map(String::as_str),
            Some("consent")
        );
        assert!(!oauth.use_pkce);

        let twitter = resolve_provider(Platform::Twitter, None, &config, &client()).unwrap();
        assert!(twitter.as_provider().config().use_pkce);
    }
}
