//! Shared OAuth2 HTTP client with PKCE support.

use crate::config::OAuthConfig;
use crate::error::{ConnectError, ConnectResult, upstream_description};
use crate::types::{AuthorizationParams, TokenResponse, TokenSet};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use rand::rngs::OsRng;
use reqwest::{Client, RequestBuilder};
use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Maps an upstream failure description onto the step's error variant.
pub(crate) type FailWith = fn(String) -> ConnectError;

/// PKCE code challenge and verifier
#[derive(Clone)]
pub struct PkceChallenge {
    pub code_verifier: String,
    pub code_challenge: String,
    pub code_challenge_method: String,
}

impl Default for PkceChallenge {
    fn default() -> Self {
        Self::new()
    }
}

impl PkceChallenge {
    /// Generate a new PKCE challenge
    pub fn new() -> Self {
        Self::from_verifier(Self::generate_code_verifier())
    }

    pub fn from_verifier(code_verifier: String) -> Self {
        let code_challenge = Self::challenge_for(&code_verifier);
        Self {
            code_verifier,
            code_challenge,
            code_challenge_method: "S256".to_string(),
        }
    }

    /// S256 challenge: unpadded base64url of the verifier's SHA-256 digest.
    pub fn challenge_for(verifier: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    // 64 bytes encode to 86 characters, inside the 43..=128 window
    fn generate_code_verifier() -> String {
        let mut bytes = [0u8; 64];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl std::fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("code_verifier", &"[REDACTED]")
            .field("code_challenge", &self.code_challenge)
            .field("code_challenge_method", &self.code_challenge_method)
            .finish()
    }
}

/// Opaque anti-forgery state token.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Build a provider's authorize URL from its config and per-call parameters.
pub fn build_authorization_url(
    config: &OAuthConfig,
    params: &AuthorizationParams,
) -> ConnectResult<String> {
    let mut url = Url::parse(&config.authorization_url)?;

    let challenge = if config.use_pkce {
        Some(params.code_challenge.as_deref().ok_or_else(|| {
            ConnectError::MissingParameter("code_challenge".to_string())
        })?)
    } else {
        None
    };

    {
        let mut query = url.query_pairs_mut();
        query.append_pair("client_id", &config.client_id);
        query.append_pair("redirect_uri", &config.redirect_uri);
        query.append_pair("response_type", "code");
        if !config.scopes.is_empty() {
            query.append_pair("scope", &config.scope_delimiter.join(&config.scopes));
        }
        query.append_pair("state", &params.state);

        if let Some(challenge) = challenge {
            query.append_pair("code_challenge", challenge);
            query.append_pair("code_challenge_method", "S256");
        }
        if let Some(nonce) = &params.nonce {
            query.append_pair("nonce", nonce);
        }

        for (key, value) in &config.additional_params {
            query.append_pair(key, value);
        }
    }

    Ok(url.to_string())
}

/// HTTP client shared by every provider adapter.
#[derive(Clone)]
pub struct OAuth2Client {
    http_client: Client,
}

impl OAuth2Client {
    pub fn new(http_timeout_seconds: u64) -> ConnectResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(http_timeout_seconds))
            .build()
            .map_err(|e| {
                ConnectError::Configuration(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(Self { http_client })
    }

    pub fn http(&self) -> &Client {
        &self.http_client
    }

    /// Standard `authorization_code` grant, form-encoded.
    pub async fn exchange_code(
        &self,
        config: &OAuthConfig,
        code: &str,
        code_verifier: Option<&str>,
    ) -> ConnectResult<TokenSet> {
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret().as_str()),
            ("redirect_uri", config.redirect_uri.as_str()),
        ];
        if config.use_pkce {
            let verifier = code_verifier.ok_or_else(|| {
                ConnectError::TokenExchange("PKCE code verifier not supplied".to_string())
            })?;
            form.push(("code_verifier", verifier));
        }

        let request = self.http_client.post(&config.token_url).form(&form);
        let value = send_json(request, ConnectError::TokenExchange).await?;
        debug!("Exchanged authorization code at {}", config.token_url);
        parse_token_set(value, ConnectError::TokenExchange)
    }

    /// Standard `refresh_token` grant, form-encoded.
    pub async fn refresh_token(
        &self,
        config: &OAuthConfig,
        refresh_token: &str,
    ) -> ConnectResult<TokenSet> {
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.expose_secret().as_str()),
        ];

        let request = self.http_client.post(&config.token_url).form(&form);
        let value = send_json(request, ConnectError::TokenRefresh).await?;
        parse_token_set(value, ConnectError::TokenRefresh)
    }
}

/// Send a request and decode a JSON body, folding every failure into `fail`.
pub(crate) async fn send_json(
    request: RequestBuilder,
    fail: FailWith,
) -> ConnectResult<serde_json::Value> {
    let body = send_checked(request, fail).await?;
    serde_json::from_str(&body).map_err(|e| fail(format!("invalid JSON response: {}", e)))
}

/// Send a request whose success body is irrelevant.
pub(crate) async fn send_empty(request: RequestBuilder, fail: FailWith) -> ConnectResult<()> {
    send_checked(request, fail).await.map(|_| ())
}

async fn send_checked(request: RequestBuilder, fail: FailWith) -> ConnectResult<String> {
    let response = request.send().await.map_err(|e| fail(transport_message(e)))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| fail(transport_message(e)))?;

    if !status.is_success() {
        let description =
            upstream_description(&body).unwrap_or_else(|| format!("upstream returned {}", status));
        warn!(status = status.as_u16(), "Provider request failed: {}", description);
        return Err(fail(description));
    }

    Ok(body)
}

/// Normalize a token payload, failing when no access token is present.
pub(crate) fn parse_token_set(value: serde_json::Value, fail: FailWith) -> ConnectResult<TokenSet> {
    let raw: TokenResponse = serde_json::from_value(value)
        .map_err(|e| fail(format!("malformed token response: {}", e)))?;
    TokenSet::from_response(raw)
        .ok_or_else(|| fail("token response did not contain an access token".to_string()))
}

// URLs can carry tokens in their query string, so they are stripped.
fn transport_message(err: reqwest::Error) -> String {
    if err.is_timeout() {
        "request to provider timed out".to_string()
    } else {
        err.without_url().to_string()
    }
}
