//! Connection lifecycle error types.

use hub_connect_core::{Platform, StoreError, UnknownPlatform};
use thiserror::Error;

pub type ConnectResult<T> = Result<T, ConnectError>;

#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Missing required parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Profile fetch failed: {0}")]
    ProfileFetch(String),

    #[error("Content fetch failed: {0}")]
    ContentFetch(String),

    #[error("Unsupported content type for {platform}: {content_type}")]
    UnsupportedContentType {
        platform: Platform,
        content_type: String,
    },

    #[error("Token revocation failed: {0}")]
    Revocation(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("No {platform} connection found for user {user_id}")]
    ConnectionNotFound { user_id: String, platform: Platform },

    #[error("No refresh token stored for the {platform} connection of user {user_id}")]
    NoRefreshToken { user_id: String, platform: Platform },

    #[error("Invalid or expired state parameter")]
    InvalidState,

    #[error("PKCE code verifier missing for {0}")]
    MissingCodeVerifier(Platform),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),
}

impl From<UnknownPlatform> for ConnectError {
    fn from(err: UnknownPlatform) -> Self {
        ConnectError::UnknownPlatform(err.0)
    }
}

impl ConnectError {
    /// HTTP status class for JSON-returning routes.
    pub fn status_code(&self) -> u16 {
        match self {
            ConnectError::UnknownPlatform(_)
            | ConnectError::MissingParameter(_)
            | ConnectError::InvalidParameter { .. }
            | ConnectError::UnsupportedContentType { .. }
            | ConnectError::NoRefreshToken { .. }
            | ConnectError::InvalidState
            | ConnectError::MissingCodeVerifier(_) => 400,
            ConnectError::ConnectionNotFound { .. } => 404,
            ConnectError::NotImplemented(_) => 501,
            ConnectError::TokenExchange(_)
            | ConnectError::TokenRefresh(_)
            | ConnectError::ProfileFetch(_)
            | ConnectError::ContentFetch(_)
            | ConnectError::Revocation(_) => 502,
            ConnectError::Configuration(_) | ConnectError::Store(_) | ConnectError::Url(_) => 500,
        }
    }

    /// Opaque tag placed on the dashboard redirect when a callback fails.
    ///
    /// Never contains error text from upstream or from internal failures.
    pub fn redirect_tag(&self) -> &'static str {
        match self {
            ConnectError::Store(_) => "database_error",
            ConnectError::InvalidState => "invalid_state",
            _ => "oauth_failed",
        }
    }
}

/// Pull a human-readable description out of a provider error body.
///
/// Providers disagree on the shape: standard OAuth uses `error_description`,
/// Instagram `error_message` or `error.message`, Twitter `detail`, Calendly
/// `message`, Shopify `errors`.
pub(crate) fn upstream_description(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;

    let as_text = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Null | serde_json::Value::String(_) => None,
        other => Some(other.to_string()),
    };

    if let Some(text) = value.get("error_description").and_then(as_text) {
        return Some(text);
    }
    if let Some(text) = value.get("error_message").and_then(as_text) {
        return Some(text);
    }
    match value.get("error") {
        Some(serde_json::Value::Object(error)) => {
            if let Some(text) = error.get("message").and_then(as_text) {
                return Some(text);
            }
        }
        Some(error) => {
            if let Some(text) = as_text(error) {
                return Some(text);
            }
        }
        None => {}
    }
    ["detail", "message", "errors"]
        .iter()
        .find_map(|key| value.get(*key).and_then(as_text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_description_shapes() {
        assert_eq!(
            upstream_description(r#"{"error":"invalid_grant","error_description":"Bad code"}"#),
            Some("Bad code".to_string())
        );
        assert_eq!(
            upstream_description(r#"{"error_type":"OAuthException","error_message":"Expired"}"#),
            Some("Expired".to_string())
        );
        assert_eq!(
            upstream_description(r#"{"error":{"message":"Invalid OAuth access token"}}"#),
            Some("Invalid OAuth access token".to_string())
        );
        assert_eq!(
            upstream_description(r#"{"title":"Unauthorized","detail":"Unauthorized"}"#),
            Some("Unauthorized".to_string())
        );
        assert_eq!(
            upstream_description(r#"{"errors":"[API] Invalid API key"}"#),
            Some("[API] Invalid API key".to_string())
        );
        assert_eq!(upstream_description("<html>gateway</html>"), None);
    }

    #[test]
    fn test_status_classes() {
        assert_eq!(ConnectError::Configuration("x".into()).status_code(), 500);
        assert_eq!(ConnectError::MissingParameter("shop".into()).status_code(), 400);
        assert_eq!(
            ConnectError::ConnectionNotFound {
                user_id: "u".into(),
                platform: Platform::Twitter
            }
            .status_code(),
            404
        );
        assert_eq!(ConnectError::TokenRefresh("x".into()).status_code(), 502);
    }

    #[test]
    fn test_redirect_tags_are_opaque() {
        let err = ConnectError::TokenExchange("secret upstream detail".into());
        assert_eq!(err.redirect_tag(), "oauth_failed");
        let err = ConnectError::Store(StoreError::Backend("disk on fire".into()));
        assert_eq!(err.redirect_tag(), "database_error");
    }
}
