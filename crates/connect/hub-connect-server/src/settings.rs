//! Server configuration.
//!
//! Sources, lowest precedence first:
//! - defaults
//! - a TOML file (`connect.toml`, or the path in `HUB_CONFIG_FILE`)
//! - `HUB__`-prefixed environment variables, e.g. `HUB__SERVER__PORT`
//! - the plain variables `HOST`, `PORT`, `HTTPS_PORT`, `FRONTEND_URL`,
//!   `BACKEND_URL` and `RUST_LOG`
//!
//! Platform client credentials are not part of these settings; they are read
//! by [`ConnectConfig::from_env`].

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use hub_connect_oauth2::{ConnectConfig, MAX_STATE_TTL_SECONDS};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main configuration struct for the connection server
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub oauth: OAuthSettings,
    pub logging: LoggingSettings,
}

/// Server network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Host to bind to (default: 127.0.0.1)
    pub host: IpAddr,

    /// Port to bind to (default: 3001)
    pub port: u16,

    /// Port the TLS front end listens on. Only used to build the default
    /// redirect URI for platforms that demand https callbacks.
    pub https_port: u16,
}

/// OAuth flow configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthSettings {
    /// Dashboard the callback redirects back to
    pub frontend_url: String,

    /// Public base URL of this server, when it differs from localhost
    pub backend_url: Option<String>,

    /// Lifetime of a pending authorization
    pub state_ttl_seconds: u64,

    /// Timeout applied to every provider call
    pub http_timeout_seconds: u64,

    /// How often expired pending authorizations are swept
    pub state_cleanup_interval_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive, e.g. `info` or `info,hub_connect_oauth2=debug`
    pub level: String,

    /// Log format (full, pretty, compact)
    pub format: String,

    /// Whether to include the target module
    pub target: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 3001,
            https_port: 3443,
        }
    }
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            frontend_url: "http://localhost:3000".to_string(),
            backend_url: None,
            state_ttl_seconds: 600,
            http_timeout_seconds: 30,
            state_cleanup_interval_seconds: 60,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
            target: false,
        }
    }
}

const LOG_FORMATS: [&str; 3] = ["full", "pretty", "compact"];

impl Settings {
    /// Load configuration from the process environment and optional config file
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("HUB_CONFIG_FILE").unwrap_or_else(|_| "connect.toml".to_string());
        Self::load_from(Path::new(&config_path), |key| std::env::var(key).ok())
    }

    /// Load from `config_path` (if it exists) and the `HUB__` environment,
    /// then apply the plain overrides found through `lookup`.
    pub fn load_from<F>(config_path: &Path, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = ConfigBuilder::builder();

        if config_path.exists() {
            info!("Loading configuration from {}", config_path.display());
            builder = builder.add_source(File::from(config_path));
        } else {
            debug!(
                "No config file found at {}, using defaults",
                config_path.display()
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("HUB")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;
        let mut settings: Settings = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        settings.apply_overrides(lookup)?;
        settings.validate()?;

        Ok(settings)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            info!("Using HOST environment variable");
            self.server.host = host.parse().context("Invalid HOST value")?;
        }

        if let Some(port) = lookup("PORT") {
            info!("Using PORT environment variable");
            self.server.port = port.parse().context("Invalid PORT value")?;
        }

        if let Some(port) = lookup("HTTPS_PORT") {
            info!("Using HTTPS_PORT environment variable");
            self.server.https_port = port.parse().context("Invalid HTTPS_PORT value")?;
        }

        if let Some(url) = lookup("FRONTEND_URL") {
            info!("Using FRONTEND_URL environment variable");
            self.oauth.frontend_url = url;
        }

        if let Some(url) = lookup("BACKEND_URL") {
            info!("Using BACKEND_URL environment variable");
            self.oauth.backend_url = Some(url);
        }

        if let Some(level) = lookup("RUST_LOG") {
            info!("Using RUST_LOG environment variable");
            self.logging.level = level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port cannot be 0");
        }
        if self.server.https_port == 0 {
            anyhow::bail!("HTTPS port cannot be 0");
        }

        url::Url::parse(&self.oauth.frontend_url)
            .with_context(|| format!("Invalid frontend URL '{}'", self.oauth.frontend_url))?;
        if let Some(backend_url) = &self.oauth.backend_url {
            url::Url::parse(backend_url)
                .with_context(|| format!("Invalid backend URL '{}'", backend_url))?;
        }

        if self.oauth.state_ttl_seconds == 0 {
            anyhow::bail!("State TTL must be positive");
        }
        if self.oauth.state_ttl_seconds > MAX_STATE_TTL_SECONDS {
            anyhow::bail!(
                "State TTL must be at most {} seconds",
                MAX_STATE_TTL_SECONDS
            );
        }
        if self.oauth.http_timeout_seconds == 0 {
            anyhow::bail!("HTTP timeout must be positive");
        }
        if self.oauth.state_cleanup_interval_seconds == 0 {
            anyhow::bail!("State cleanup interval must be positive");
        }

        EnvFilter::try_new(&self.logging.level)
            .with_context(|| format!("Invalid log level '{}'", self.logging.level))?;

        let format = self.logging.format.to_lowercase();
        if !LOG_FORMATS.contains(&format.as_str()) {
            anyhow::bail!(
                "Invalid log format '{}'. Must be one of: {:?}",
                self.logging.format,
                LOG_FORMATS
            );
        }

        Ok(())
    }

    /// Apply the server-level settings on top of a credential-bearing config.
    pub fn connect_config(&self, base: ConnectConfig) -> ConnectConfig {
        let config = base
            .with_frontend_url(&self.oauth.frontend_url)
            .with_ports(self.server.port, self.server.https_port)
            .with_state_ttl(self.oauth.state_ttl_seconds)
            .with_http_timeout(self.oauth.http_timeout_seconds);

        match &self.oauth.backend_url {
            Some(url) => config.with_backend_url(url),
            None => config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_connect_oauth2::Platform;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("missing.toml"), lookup(&[])).unwrap();

        assert_eq!(settings.server.port, 3001);
        assert_eq!(settings.server.https_port, 3443);
        assert_eq!(settings.oauth.frontend_url, "http://localhost:3000");
        assert_eq!(settings.oauth.state_ttl_seconds, 600);
        assert!(settings.oauth.backend_url.is_none());
    }

    #[test]
    fn test_file_then_plain_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("connect.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 4001

[oauth]
frontend_url = "https://app.example.com"
state_ttl_seconds = 120
"#,
        )
        .unwrap();

        let settings = Settings::load_from(
            &path,
            lookup(&[
                ("PORT", "5001"),
                ("BACKEND_URL", "https://api.example.com"),
                ("RUST_LOG", "info,hub_connect_oauth2=debug"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.server.port, 5001);
        assert_eq!(settings.oauth.frontend_url, "https://app.example.com");
        assert_eq!(settings.oauth.state_ttl_seconds, 120);
        assert_eq!(
            settings.oauth.backend_url.as_deref(),
            Some("https://api.example.com")
        );
        assert_eq!(settings.logging.level, "info,hub_connect_oauth2=debug");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.toml");

        assert!(Settings::load_from(&path, lookup(&[("PORT", "0")])).is_err());
        assert!(Settings::load_from(&path, lookup(&[("PORT", "http")])).is_err());
        assert!(Settings::load_from(&path, lookup(&[("FRONTEND_URL", "not a url")])).is_err());

        let mut settings = Settings::default();
        settings.logging.format = "xml".to_string();
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.oauth.state_ttl_seconds = MAX_STATE_TTL_SECONDS;
        assert!(settings.validate().is_ok());
        settings.oauth.state_ttl_seconds = u64::MAX;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_connect_config_carries_urls() {
        let mut settings = Settings::default();
        settings.server.port = 4001;
        settings.oauth.frontend_url = "https://app.example.com".to_string();

        let config = settings.connect_config(ConnectConfig::new());
        assert_eq!(
            config.redirect_uri(Platform::Youtube),
            "http://localhost:4001/oauth/youtube/callback"
        );
        assert_eq!(
            config.connected_redirect(Platform::Youtube).unwrap(),
            "https://app.example.com/dashboard?connected=youtube"
        );

        settings.oauth.backend_url = Some("https://api.example.com".to_string());
        let config = settings.connect_config(ConnectConfig::new());
        assert_eq!(
            config.redirect_uri(Platform::Instagram),
            "https://api.example.com/oauth/instagram/callback"
        );
    }
}
