//! OAuth2 configuration types.

use crate::error::{ConnectError, ConnectResult};
use crate::registry::ProviderEndpoints;
use hub_connect_core::Platform;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{BTreeMap, HashMap};
use url::Url;

/// How a provider joins its scope list on the authorization URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeDelimiter {
    Space,
    Comma,
}

impl ScopeDelimiter {
    pub fn join(&self, scopes: &[String]) -> String {
        match self {
            ScopeDelimiter::Space => scopes.join(" "),
            ScopeDelimiter::Comma => scopes.join(","),
        }
    }
}

/// Per-connection-attempt provider configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
    pub authorization_url: String,
    pub token_url: String,
    pub scopes: Vec<String>,
    pub scope_delimiter: ScopeDelimiter,
    /// Whether to use PKCE
    pub use_pkce: bool,
    /// Provider-specific extras merged into the authorization request
    pub additional_params: BTreeMap<String, String>,
}

/// Client id/secret pair for one platform.
#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

/// Environment variable names holding a platform's client id and secret.
///
/// YouTube and Google Calendar share the `GOOGLE` prefix; Shopify names its
/// pair `SHOPIFY_API_KEY`/`SHOPIFY_API_SECRET`.
pub fn credential_env_keys(platform: Platform) -> (String, String) {
    match platform {
        Platform::Shopify => (
            "SHOPIFY_API_KEY".to_string(),
            "SHOPIFY_API_SECRET".to_string(),
        ),
        _ => {
            let prefix = match platform {
                Platform::Youtube | Platform::GoogleCalendar => "GOOGLE",
                Platform::Instagram => "INSTAGRAM",
                Platform::Twitter => "TWITTER",
                Platform::Calendly => "CALENDLY",
                Platform::Shopify => "SHOPIFY",
            };
            (
                format!("{}_CLIENT_ID", prefix),
                format!("{}_CLIENT_SECRET", prefix),
            )
        }
    }
}

/// Connection manager configuration, populated once at startup.
#[derive(Debug, Clone)]
pub struct ConnectConfig {
    /// Dashboard origin the callback redirects back to
    pub frontend_url: String,
    /// Overrides the computed redirect-URI base for every platform
    pub backend_url: Option<String>,
    /// Port used for plain-HTTP redirect URIs
    pub http_port: u16,
    /// Port used for redirect URIs of platforms that require HTTPS
    pub https_port: u16,
    pub state_ttl_seconds: u64,
    pub http_timeout_seconds: u64,
    credentials: HashMap<String, SecretString>,
    endpoint_overrides: HashMap<Platform, ProviderEndpoints>,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            backend_url: None,
            http_port: 3001,
            https_port: 3443,
            state_ttl_seconds: 600, // 10 minutes
            http_timeout_seconds: 30,
            credentials: HashMap::new(),
            endpoint_overrides: HashMap::new(),
        }
    }
}

impl ConnectConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture every platform's credential variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        for platform in Platform::ALL {
            let (id_key, secret_key) = credential_env_keys(platform);
            for key in [id_key, secret_key] {
                if let Some(value) = lookup(&key).filter(|v| !v.trim().is_empty()) {
                    config.credentials.insert(key, SecretString::new(value));
                }
            }
        }
        config
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn with_frontend_url(mut self, url: impl Into<String>) -> Self {
        self.frontend_url = url.into();
        self
    }

    pub fn with_backend_url(mut self, url: impl Into<String>) -> Self {
        self.backend_url = Some(url.into());
        self
    }

    pub fn with_ports(mut self, http_port: u16, https_port: u16) -> Self {
        self.http_port = http_port;
        self.https_port = https_port;
        self
    }

    pub fn with_state_ttl(mut self, seconds: u64) -> Self {
        self.state_ttl_seconds = seconds;
        self
    }

    pub fn with_http_timeout(mut self, seconds: u64) -> Self {
        self.http_timeout_seconds = seconds;
        self
    }

    /// Set a platform's credentials directly, under its conventional names.
    pub fn with_credentials(
        mut self,
        platform: Platform,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        let (id_key, secret_key) = credential_env_keys(platform);
        self.credentials
            .insert(id_key, SecretString::new(client_id.into()));
        self.credentials
            .insert(secret_key, SecretString::new(client_secret.into()));
        self
    }

    /// Point a platform at non-default endpoints.
    pub fn with_endpoints(mut self, platform: Platform, endpoints: ProviderEndpoints) -> Self {
        self.endpoint_overrides.insert(platform, endpoints);
        self
    }

    pub fn endpoints(&self, platform: Platform) -> ProviderEndpoints {
        self.endpoint_overrides
            .get(&platform)
            .cloned()
            .unwrap_or_else(|| ProviderEndpoints::defaults(platform))
    }

    /// Credentials for `platform`, or a configuration error naming every missing variable.
    pub fn credentials_for(&self, platform: Platform) -> ConnectResult<ClientCredentials> {
        let (id_key, secret_key) = credential_env_keys(platform);
        match (self.credentials.get(&id_key), self.credentials.get(&secret_key)) {
            (Some(id), Some(secret)) => Ok(ClientCredentials {
                client_id: id.expose_secret().clone(),
                client_secret: secret.clone(),
            }),
            (id, secret) => {
                let missing: Vec<&str> = [
                    (id.is_none(), id_key.as_str()),
                    (secret.is_none(), secret_key.as_str()),
                ]
                .into_iter()
                .filter_map(|(absent, key)| absent.then_some(key))
                .collect();
                Err(ConnectError::Configuration(format!(
                    "missing environment variable(s) for {}: {}",
                    platform,
                    missing.join(", ")
                )))
            }
        }
    }

    pub fn has_credentials(&self, platform: Platform) -> bool {
        self.credentials_for(platform).is_ok()
    }

    /// Callback URI registered with the platform.
    ///
    /// Instagram only accepts HTTPS redirect URIs, so without a backend
    /// override it is pointed at the HTTPS listener.
    pub fn redirect_uri(&self, platform: Platform) -> String {
        let base = match &self.backend_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None if platform == Platform::Instagram => {
                format!("https://localhost:{}", self.https_port)
            }
            None => format!("http://localhost:{}", self.http_port),
        };
        format!("{}/oauth/{}/callback", base, platform)
    }

    /// Dashboard URL reporting a successful connection.
    pub fn connected_redirect(&self, platform: Platform) -> ConnectResult<String> {
        self.dashboard_url("connected", platform.as_str())
    }

    /// Dashboard URL reporting a failed connection with an opaque tag.
    pub fn error_redirect(&self, tag: &str) -> ConnectResult<String> {
        self.dashboard_url("error", tag)
    }

    fn dashboard_url(&self, key: &str, value: &str) -> ConnectResult<String> {
        let mut url = Url::parse(&self.frontend_url)?;
        url.path_segments_mut()
            .map_err(|_| {
                ConnectError::Configuration(format!(
                    "frontend URL '{}' cannot carry a path",
                    self.frontend_url
                ))
            })?
            .pop_if_empty()
            .push("dashboard");
        url.query_pairs_mut().append_pair(key, value);
        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_env_keys() {
        assert_eq!(
            credential_env_keys(Platform::Youtube),
            ("GOOGLE_CLIENT_ID".to_string(), "GOOGLE_CLIENT_SECRET".to_string())
        );
        assert_eq!(
            credential_env_keys(Platform::GoogleCalendar),
            credential_env_keys(Platform::Youtube)
        );
        assert_eq!(
            credential_env_keys(Platform::Shopify),
            ("SHOPIFY_API_KEY".to_string(), "SHOPIFY_API_SECRET".to_string())
        );
        assert_eq!(credential_env_keys(Platform::Twitter).0, "TWITTER_CLIENT_ID");
    }

    #[test]
    fn test_missing_client_id_is_named() {
        let env: HashMap<&str, &str> = [("INSTAGRAM_CLIENT_SECRET", "s")].into_iter().collect();
        let config = ConnectConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        let err = config.credentials_for(Platform::Instagram).unwrap_err();
        let message = err.to_string();
        assert!(matches!(err, ConnectError::Configuration(_)));
        assert!(message.contains("INSTAGRAM_CLIENT_ID"));
        assert!(!message.contains("INSTAGRAM_CLIENT_SECRET"));
    }

    #[test]
    fn test_shared_google_credentials() {
        let env: HashMap<&str, &str> = [
            ("GOOGLE_CLIENT_ID", "gid"),
            ("GOOGLE_CLIENT_SECRET", "gsecret"),
        ]
        .into_iter()
        .collect();
        let config = ConnectConfig::from_lookup(|key| env.get(key).map(|v| v.to_string()));

        assert!(config.has_credentials(Platform::Youtube));
        assert!(config.has_credentials(Platform::GoogleCalendar));
        assert!(!config.has_credentials(Platform::Calendly));
        let creds = config.credentials_for(Platform::GoogleCalendar).unwrap();
        assert_eq!(creds.client_id, "gid");
        assert_eq!(creds.client_secret.expose_secret(), "gsecret");
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = ConnectConfig::new().with_credentials(Platform::Twitter, "id", "hunter2");
        let creds = config.credentials_for(Platform::Twitter).unwrap();
        assert!(!format!("{:?}", creds).contains("hunter2"));
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_redirect_uri_scheme_per_platform() {
        let config = ConnectConfig::new().with_ports(3001, 3443);
        assert_eq!(
            config.redirect_uri(Platform::Instagram),
            "https://localhost:3443/oauth/instagram/callback"
        );
        assert_eq!(
            config.redirect_uri(Platform::GoogleCalendar),
            "http://localhost:3001/oauth/google_calendar/callback"
        );

        let config = config.with_backend_url("https://api.example.com/");
        assert_eq!(
            config.redirect_uri(Platform::Instagram),
            "https://api.example.com/oauth/instagram/callback"
        );
    }

    #[test]
    fn test_dashboard_redirects() {
        let config = ConnectConfig::new().with_frontend_url("https://app.example.com");
        assert_eq!(
            config.connected_redirect(Platform::Youtube).unwrap(),
            "https://app.example.com/dashboard?connected=youtube"
        );
        assert_eq!(
            config.error_redirect("access_denied").unwrap(),
            "https://app.example.com/dashboard?error=access_denied"
        );
    }

    #[test]
    fn test_dashboard_redirects_keep_frontend_path() {
        for frontend in ["https://example.com/app", "https://example.com/app/"] {
            let config = ConnectConfig::new().with_frontend_url(frontend);
            assert_eq!(
                config.connected_redirect(Platform::Youtube).unwrap(),
                "https://example.com/app/dashboard?connected=youtube"
            );
            assert_eq!(
                config.error_redirect("oauth_failed").unwrap(),
                "https://example.com/app/dashboard?error=oauth_failed"
            );
        }

        let config = ConnectConfig::new().with_frontend_url("mailto:ops@example.com");
        assert!(matches!(
            config.connected_redirect(Platform::Youtube),
            Err(ConnectError::Configuration(_))
        ));
    }
}
