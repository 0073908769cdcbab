//! Connection orchestrator: authorize, callback, refresh, disconnect.

use crate::client::{OAuth2Client, PkceChallenge};
use crate::config::ConnectConfig;
use crate::error::{ConnectError, ConnectResult};
use crate::registry::{normalize_shop, platform_spec, resolve_provider};
use crate::state::{AuthorizationStateStore, InMemoryAuthorizationStore, PendingAuthorization};
use crate::types::{
    AuthorizationParams, AuthorizationRedirect, CallbackParams, PlatformProfile, TokenSet,
    TokenTypeHint,
};
use chrono::{DateTime, Duration, Utc};
use hub_connect_core::{
    Connection, ConnectionStore, InMemoryConnectionStore, Platform, TokenStatus,
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Stages of a single connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptPhase {
    Unstarted,
    Authorizing,
    AwaitingCallback,
    Exchanging,
    FetchingProfile,
    Persisting,
    Complete,
    Errored,
}

/// Drives the OAuth connection lifecycle against the configured stores.
#[derive(Clone)]
pub struct ConnectionService {
    config: Arc<ConnectConfig>,
    client: OAuth2Client,
    connections: Arc<dyn ConnectionStore>,
    pending: Arc<dyn AuthorizationStateStore>,
}

impl ConnectionService {
    pub fn new(
        config: ConnectConfig,
        connections: Arc<dyn ConnectionStore>,
        pending: Arc<dyn AuthorizationStateStore>,
    ) -> ConnectResult<Self> {
        let client = OAuth2Client::new(config.http_timeout_seconds)?;
        Ok(Self {
            config: Arc::new(config),
            client,
            connections,
            pending,
        })
    }

    /// Service backed by in-memory connection and state stores.
    pub fn in_memory(config: ConnectConfig) -> ConnectResult<Self> {
        Self::new(
            config,
            Arc::new(InMemoryConnectionStore::new()),
            Arc::new(InMemoryAuthorizationStore::new()),
        )
    }

    pub fn config(&self) -> &ConnectConfig {
        &self.config
    }

    pub fn connections(&self) -> &Arc<dyn ConnectionStore> {
        &self.connections
    }

    /// Start an authorization: record a pending attempt and return the
    /// provider URL to send the browser to.
    #[instrument(skip(self, shop))]
    pub async fn authorize(
        &self,
        platform: Platform,
        user_id: &str,
        shop: Option<&str>,
    ) -> ConnectResult<AuthorizationRedirect> {
        if user_id.trim().is_empty() {
            return Err(ConnectError::MissingParameter("user_id".to_string()));
        }

        let provider = resolve_provider(platform, shop, &self.config, &self.client)?;
        let provider = provider.as_provider();
        debug!(phase = ?AttemptPhase::Authorizing, "Resolved provider");

        let pkce = provider.config().use_pkce.then(PkceChallenge::new);
        let shop = match (platform, shop) {
            (Platform::Shopify, Some(shop)) => Some(normalize_shop(shop)?),
            _ => None,
        };
        let pending = PendingAuthorization::new(
            user_id.to_string(),
            platform,
            shop,
            pkce.as_ref().map(|p| p.code_verifier.clone()),
            self.config.state_ttl_seconds,
        );

        let params = AuthorizationParams {
            state: pending.state.clone(),
            code_verifier: pkce.as_ref().map(|p| p.code_verifier.clone()),
            code_challenge: pkce.as_ref().map(|p| p.code_challenge.clone()),
            nonce: None,
        };
        let url = provider.authorization_url(&params)?;

        let state = pending.state.clone();
        self.pending.store(pending).await?;

        info!(phase = ?AttemptPhase::AwaitingCallback, "Authorization started");
        Ok(AuthorizationRedirect { url, state })
    }

    /// Complete an authorization and return the dashboard URL to redirect to.
    ///
    /// Every failure becomes an opaque error tag on the redirect; the only
    /// error returned is a malformed frontend URL.
    #[instrument(skip(self, params))]
    pub async fn handle_callback(
        &self,
        platform: Platform,
        params: CallbackParams,
    ) -> ConnectResult<String> {
        if let Some(provider_error) = params.error.as_deref() {
            warn!(
                error = provider_error,
                description = params.error_description.as_deref().unwrap_or_default(),
                "Provider returned an authorization error"
            );
            return self.config.error_redirect(redirect_error_code(provider_error));
        }

        let (Some(code), Some(state)) = (
            params.code.as_deref().filter(|c| !c.is_empty()),
            params.state.as_deref().filter(|s| !s.is_empty()),
        ) else {
            warn!("Callback without code or state");
            return self.config.error_redirect("missing_code_or_state");
        };

        let mut phase = AttemptPhase::AwaitingCallback;
        match self
            .complete_callback(platform, code, state, params.shop.as_deref(), &mut phase)
            .await
        {
            Ok(connection) => {
                info!(
                    phase = ?AttemptPhase::Complete,
                    user_id = %connection.user_id,
                    "Connection established"
                );
                self.config.connected_redirect(platform)
            }
            Err(err) => {
                error!(
                    phase = ?phase,
                    next = ?AttemptPhase::Errored,
                    "Connection attempt failed: {}",
                    err
                );
                self.config.error_redirect(err.redirect_tag())
            }
        }
    }

    async fn complete_callback(
        &self,
        platform: Platform,
        code: &str,
        state: &str,
        callback_shop: Option<&str>,
        phase: &mut AttemptPhase,
    ) -> ConnectResult<Connection> {
        let pending = self.pending.take(state).await?;
        if pending.platform != platform {
            warn!(expected = %pending.platform, "Callback state belongs to another platform");
            return Err(ConnectError::InvalidState);
        }
        if let (Some(expected), Some(shop)) = (pending.shop.as_deref(), callback_shop) {
            if normalize_shop(shop)? != expected {
                return Err(ConnectError::InvalidState);
            }
        }

        let provider = resolve_provider(
            platform,
            pending.shop.as_deref(),
            &self.config,
            &self.client,
        )?;
        let provider = provider.as_provider();

        let verifier = if provider.config().use_pkce {
            Some(
                pending
                    .code_verifier
                    .as_deref()
                    .ok_or(ConnectError::MissingCodeVerifier(platform))?,
            )
        } else {
            None
        };

        *phase = AttemptPhase::Exchanging;
        let tokens = provider.exchange_code(code, verifier).await?;

        *phase = AttemptPhase::FetchingProfile;
        let profile = provider.user_profile(&tokens.access_token).await?;

        *phase = AttemptPhase::Persisting;
        let connection = build_connection(
            &pending.user_id,
            platform,
            &profile,
            &tokens,
            provider.config().scopes.clone(),
            Utc::now(),
        )?;
        Ok(self.connections.upsert(connection).await?)
    }

    /// Refresh a stored connection's access token in place.
    #[instrument(skip(self))]
    pub async fn refresh(&self, platform: Platform, user_id: &str) -> ConnectResult<Connection> {
        let existing = self.stored(platform, user_id).await?;

        let token = if platform_spec(platform).refresh_with_access_token {
            Some(existing.access_token.clone())
        } else {
            existing.refresh_token.clone()
        };
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Err(ConnectError::NoRefreshToken {
                user_id: user_id.to_string(),
                platform,
            });
        };

        let provider = resolve_provider(
            platform,
            stored_shop(&existing),
            &self.config,
            &self.client,
        )?;

        match provider.as_provider().refresh_access_token(&token).await {
            Ok(tokens) => {
                let now = Utc::now();
                let mut updated = existing;
                updated.access_token = tokens.access_token;
                if tokens.refresh_token.is_some() {
                    updated.refresh_token = tokens.refresh_token;
                }
                updated.token_expires_at = expires_at(now, tokens.expires_in);
                updated.token_status = TokenStatus::Active;
                updated.last_refresh_at = Some(now);
                updated.updated_at = now;

                let stored = self.connections.upsert(updated).await?;
                info!("Access token refreshed");
                Ok(stored)
            }
            Err(err) => {
                warn!("Token refresh failed: {}", err);
                let mut failed = existing;
                failed.token_status = TokenStatus::Error;
                failed.updated_at = Utc::now();
                if let Err(store_err) = self.connections.upsert(failed).await {
                    error!("Could not record refresh failure: {}", store_err);
                }
                Err(match err {
                    ConnectError::TokenRefresh(_) => err,
                    other => ConnectError::TokenRefresh(other.to_string()),
                })
            }
        }
    }

    /// Remove a connection, revoking its token first where the platform allows.
    ///
    /// Removing an absent connection succeeds.
    #[instrument(skip(self))]
    pub async fn disconnect(&self, platform: Platform, user_id: &str) -> ConnectResult<()> {
        if let Some(existing) = self.connections.select_one(user_id, platform).await? {
            self.revoke_best_effort(&existing).await;
        }

        self.connections.delete(user_id, platform).await?;
        info!("Connection removed");
        Ok(())
    }

    async fn revoke_best_effort(&self, connection: &Connection) {
        let provider = match resolve_provider(
            connection.platform,
            stored_shop(connection),
            &self.config,
            &self.client,
        ) {
            Ok(provider) => provider,
            Err(err) => {
                debug!("Skipping revocation: {}", err);
                return;
            }
        };
        let provider = provider.as_provider();
        if !provider.supports_revocation() {
            return;
        }

        if let Err(err) = provider
            .revoke_token(&connection.access_token, TokenTypeHint::AccessToken)
            .await
        {
            warn!("Token revocation failed, removing connection anyway: {}", err);
        }
    }

    /// All of a user's connections, with expiry applied to their status.
    #[instrument(skip(self))]
    pub async fn list_connections(&self, user_id: &str) -> ConnectResult<Vec<Connection>> {
        let now = Utc::now();
        let mut connections = self.connections.select_by_user(user_id).await?;
        for connection in &mut connections {
            connection.token_status = connection.effective_status(now);
        }
        Ok(connections)
    }

    /// Read typed content from the platform with the stored access token.
    #[instrument(skip(self))]
    pub async fn fetch_content(
        &self,
        platform: Platform,
        user_id: &str,
        content_type: &str,
    ) -> ConnectResult<serde_json::Value> {
        let connection = self.stored(platform, user_id).await?;
        let provider = resolve_provider(
            platform,
            stored_shop(&connection),
            &self.config,
            &self.client,
        )?;
        provider
            .as_provider()
            .fetch_user_content(&connection.access_token, content_type)
            .await
    }

    async fn stored(&self, platform: Platform, user_id: &str) -> ConnectResult<Connection> {
        self.connections
            .select_one(user_id, platform)
            .await?
            .ok_or_else(|| ConnectError::ConnectionNotFound {
                user_id: user_id.to_string(),
                platform,
            })
    }
}

fn build_connection(
    user_id: &str,
    platform: Platform,
    profile: &PlatformProfile,
    tokens: &TokenSet,
    scopes: Vec<String>,
    now: DateTime<Utc>,
) -> ConnectResult<Connection> {
    Ok(Connection {
        id: Uuid::new_v4(),
        user_id: user_id.to_string(),
        platform,
        platform_user_id: Some(profile.id.clone()),
        platform_username: profile.username.clone(),
        platform_email: profile.email.clone(),
        display_name: profile.display_name.clone(),
        access_token: tokens.access_token.clone(),
        refresh_token: tokens.refresh_token.clone(),
        token_expires_at: expires_at(now, tokens.expires_in),
        token_status: TokenStatus::Active,
        scopes,
        metadata: serde_json::to_value(profile).map_err(hub_connect_core::StoreError::from)?,
        connected_at: now,
        last_refresh_at: Some(now),
        updated_at: now,
    })
}

fn expires_at(now: DateTime<Utc>, expires_in: Option<u64>) -> Option<DateTime<Utc>> {
    expires_in
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(Duration::try_seconds)
        .map(|ttl| now + ttl)
}

fn stored_shop(connection: &Connection) -> Option<&str> {
    connection
        .metadata
        .pointer("/metadata/shop")
        .and_then(|v| v.as_str())
}

/// Provider error codes are short identifiers; anything else is replaced.
fn redirect_error_code(code: &str) -> &str {
    let well_formed = !code.is_empty()
        && code.len() <= 64
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.');
    if well_formed { code } else { "oauth_failed" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_error_code_passes_identifiers_only() {
        assert_eq!(redirect_error_code("access_denied"), "access_denied");
        assert_eq!(
            redirect_error_code("<script>alert(1)</script>"),
            "oauth_failed"
        );
        assert_eq!(redirect_error_code(""), "oauth_failed");
    }

    #[test]
    fn test_expires_at() {
        let now = Utc::now();
        assert_eq!(expires_at(now, Some(3600)), Some(now + Duration::hours(1)));
        assert_eq!(expires_at(now, None), None);
    }

    #[test]
    fn test_build_connection_from_profile() {
        let now = Utc::now();
        let mut profile = PlatformProfile {
            id: "42".to_string(),
            username: Some("creator".to_string()),
            ..Default::default()
        };
        profile
            .metadata
            .insert("shop".to_string(), serde_json::json!("acme"));
        let tokens = TokenSet {
            refresh_token: Some("r".to_string()),
            expires_in: Some(60),
            ..TokenSet::bearer("a")
        };

        let connection = build_connection(
            "user-1",
            Platform::Shopify,
            &profile,
            &tokens,
            vec!["read_products".to_string()],
            now,
        )
        .unwrap();

        assert_eq!(connection.platform_user_id.as_deref(), Some("42"));
        assert_eq!(connection.token_status, TokenStatus::Active);
        assert_eq!(connection.token_expires_at, Some(now + Duration::seconds(60)));
        assert_eq!(connection.metadata["username"], "creator");
        assert_eq!(stored_shop(&connection), Some("acme"));
    }
}
