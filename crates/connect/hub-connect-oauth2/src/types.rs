//! OAuth2 protocol types.

use serde::{Deserialize, Deserializer, Serialize};

/// Per-authorize-call parameters placed on the authorization URL.
#[derive(Debug, Clone, Default)]
pub struct AuthorizationParams {
    pub state: String,
    pub code_verifier: Option<String>,
    pub code_challenge: Option<String>,
    pub nonce: Option<String>,
}

/// Query parameters delivered to the callback endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    pub shop: Option<String>,
}

/// Where to send the browser to start an authorization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRedirect {
    pub url: String,
    pub state: String,
}

/// Which kind of token is being revoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TokenTypeHint {
    #[default]
    AccessToken,
    RefreshToken,
}

impl TokenTypeHint {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenTypeHint::AccessToken => "access_token",
            TokenTypeHint::RefreshToken => "refresh_token",
        }
    }
}

/// Raw token endpoint payload as providers return it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub expires_in: Option<u64>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

/// Normalized result of a token exchange or refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub token_type: String,
    pub scope: Option<String>,
    pub id_token: Option<String>,
}

impl TokenSet {
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_in: None,
            token_type: "Bearer".to_string(),
            scope: None,
            id_token: None,
        }
    }

    /// Normalize a raw payload. `None` when no usable access token is present.
    pub fn from_response(raw: TokenResponse) -> Option<Self> {
        let access_token = raw.access_token.filter(|token| !token.is_empty())?;
        Some(Self {
            access_token,
            refresh_token: raw.refresh_token.filter(|token| !token.is_empty()),
            expires_in: raw.expires_in,
            token_type: raw
                .token_type
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "Bearer".to_string()),
            scope: raw.scope,
            id_token: raw.id_token,
        })
    }
}

impl std::fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSet")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("expires_in", &self.expires_in)
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// Normalized identity fetched right after a token exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlatformProfile {
    pub id: String,
    pub username: Option<String>,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Provider-specific fields, kept opaque
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Some providers send `expires_in` as a string.
fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64(),
        Some(serde_json::Value::String(s)) => s.parse().ok(),
        _ => None,
    })
}

/// Stringify an identifier that may arrive as a JSON number or string.
pub(crate) fn id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn str_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_set_from_standard_payload() {
        let raw: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "a",
            "refresh_token": "b",
            "expires_in": 3600
        }))
        .unwrap();

        let tokens = TokenSet::from_response(raw).unwrap();
        assert_eq!(tokens.access_token, "a");
        assert_eq!(tokens.refresh_token.as_deref(), Some("b"));
        assert_eq!(tokens.expires_in, Some(3600));
        assert_eq!(tokens.token_type, "Bearer");
        assert_eq!(tokens.scope, None);
    }

    #[test]
    fn test_token_set_accepts_string_expiry() {
        let raw: TokenResponse = serde_json::from_value(serde_json::json!({
            "access_token": "a",
            "expires_in": "7200",
            "token_type": "bearer"
        }))
        .unwrap();

        let tokens = TokenSet::from_response(raw).unwrap();
        assert_eq!(tokens.expires_in, Some(7200));
        assert_eq!(tokens.token_type, "bearer");
    }

    #[test]
    fn test_token_set_rejects_empty_access_token() {
        let raw: TokenResponse =
            serde_json::from_value(serde_json::json!({"access_token": ""})).unwrap();
        assert!(TokenSet::from_response(raw).is_none());
        assert!(TokenSet::from_response(TokenResponse::default()).is_none());
    }

    #[test]
    fn test_id_string_handles_numbers() {
        assert_eq!(
            id_string(&serde_json::json!(548380009)),
            Some("548380009".to_string())
        );
        assert_eq!(id_string(&serde_json::json!("abc")), Some("abc".to_string()));
        assert_eq!(id_string(&serde_json::Value::Null), None);
    }
}
