//! Provider capability contract and the per-platform adapters.

mod calendly;
mod google;
mod instagram;
mod shopify;
mod twitter;

pub use calendly::CalendlyProvider;
pub use google::GoogleProvider;
pub use instagram::InstagramProvider;
pub use shopify::{ShopifyProvider, verify_webhook_signature};
pub use twitter::TwitterProvider;

use crate::client::{OAuth2Client, build_authorization_url};
use crate::config::OAuthConfig;
use crate::error::{ConnectError, ConnectResult};
use crate::types::{AuthorizationParams, PlatformProfile, TokenSet, TokenTypeHint};
use async_trait::async_trait;
use hub_connect_core::Platform;

/// Capabilities every platform adapter offers.
///
/// The default methods implement vanilla OAuth2; adapters override the
/// steps where their platform deviates.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    fn platform(&self) -> Platform;

    fn config(&self) -> &OAuthConfig;

    fn client(&self) -> &OAuth2Client;

    /// Content-type tags accepted by [`OAuthProvider::fetch_user_content`].
    fn content_types(&self) -> &'static [&'static str];

    fn authorization_url(&self, params: &AuthorizationParams) -> ConnectResult<String> {
        build_authorization_url(self.config(), params)
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> ConnectResult<TokenSet> {
        self.client()
            .exchange_code(self.config(), code, code_verifier)
            .await
    }

    /// `token` is the refresh token, or the access token for platforms that
    /// refresh by re-presenting it.
    async fn refresh_access_token(&self, token: &str) -> ConnectResult<TokenSet> {
        self.client().refresh_token(self.config(), token).await
    }

    async fn user_profile(&self, access_token: &str) -> ConnectResult<PlatformProfile>;

    async fn fetch_user_content(
        &self,
        access_token: &str,
        content_type: &str,
    ) -> ConnectResult<serde_json::Value>;

    fn supports_revocation(&self) -> bool {
        false
    }

    async fn revoke_token(&self, _token: &str, _hint: TokenTypeHint) -> ConnectResult<()> {
        Err(ConnectError::NotImplemented(format!(
            "token revocation for {}",
            self.platform()
        )))
    }
}

/// Closed set of adapters, selected by [`crate::registry::resolve_provider`].
pub enum Provider {
    Instagram(InstagramProvider),
    Google(GoogleProvider),
    Twitter(TwitterProvider),
    Shopify(ShopifyProvider),
    Calendly(CalendlyProvider),
}

impl Provider {
    pub fn as_provider(&self) -> &dyn OAuthProvider {
        match self {
            Provider::Instagram(p) => p,
            Provider::Google(p) => p,
            Provider::Twitter(p) => p,
            Provider::Shopify(p) => p,
            Provider::Calendly(p) => p,
        }
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Provider")
            .field(&self.as_provider().platform())
            .finish()
    }
}

pub(crate) fn unsupported(platform: Platform, content_type: &str) -> ConnectError {
    ConnectError::UnsupportedContentType {
        platform,
        content_type: content_type.to_string(),
    }
}

/// `value[key]` when it is an array, else an empty array.
pub(crate) fn array_field(value: &serde_json::Value, key: &str) -> serde_json::Value {
    match value.get(key) {
        Some(items @ serde_json::Value::Array(_)) => items.clone(),
        _ => serde_json::Value::Array(Vec::new()),
    }
}

pub(crate) fn missing_field(what: &str) -> impl FnOnce() -> ConnectError + '_ {
    move || ConnectError::ProfileFetch(format!("response did not include {}", what))
}
