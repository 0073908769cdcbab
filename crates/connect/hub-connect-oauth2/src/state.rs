//! Pending authorizations awaiting their callback.

use crate::client::generate_state;
use crate::error::{ConnectError, ConnectResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use hub_connect_core::Platform;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Upper bound on how long a pending authorization may live.
pub const MAX_STATE_TTL_SECONDS: u64 = 24 * 60 * 60;

/// Server-side record behind an opaque `state` value.
#[derive(Clone, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub user_id: String,
    pub platform: Platform,
    pub shop: Option<String>,
    pub code_verifier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PendingAuthorization {
    /// `ttl_seconds` is capped at [`MAX_STATE_TTL_SECONDS`].
    pub fn new(
        user_id: String,
        platform: Platform,
        shop: Option<String>,
        code_verifier: Option<String>,
        ttl_seconds: u64,
    ) -> Self {
        let created_at = Utc::now();
        let ttl = ttl_seconds.min(MAX_STATE_TTL_SECONDS);
        let expires_at = created_at + Duration::seconds(ttl as i64);

        Self {
            state: generate_state(),
            user_id,
            platform,
            shop,
            code_verifier,
            created_at,
            expires_at,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}

impl std::fmt::Debug for PendingAuthorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAuthorization")
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("shop", &self.shop)
            .field("has_code_verifier", &self.code_verifier.is_some())
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Expiring store mapping `state` to its [`PendingAuthorization`].
#[async_trait]
pub trait AuthorizationStateStore: Send + Sync {
    async fn store(&self, pending: PendingAuthorization) -> ConnectResult<()>;

    /// Remove and return the record. Unknown or expired state is `InvalidState`.
    async fn take(&self, state: &str) -> ConnectResult<PendingAuthorization>;

    async fn cleanup_expired(&self) -> ConnectResult<usize>;
}

/// In-memory implementation of AuthorizationStateStore
pub struct InMemoryAuthorizationStore {
    pending: Arc<RwLock<HashMap<String, PendingAuthorization>>>,
}

impl InMemoryAuthorizationStore {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.pending.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pending.read().await.is_empty()
    }
}

impl Default for InMemoryAuthorizationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuthorizationStateStore for InMemoryAuthorizationStore {
    async fn store(&self, pending: PendingAuthorization) -> ConnectResult<()> {
        let mut states = self.pending.write().await;
        states.insert(pending.state.clone(), pending);
        Ok(())
    }

    async fn take(&self, state: &str) -> ConnectResult<PendingAuthorization> {
        let mut states = self.pending.write().await;

        let pending = states.remove(state).ok_or(ConnectError::InvalidState)?;
        if pending.is_expired() {
            return Err(ConnectError::InvalidState);
        }

        Ok(pending)
    }

    async fn cleanup_expired(&self) -> ConnectResult<usize> {
        let mut states = self.pending.write().await;
        let before = states.len();
        let now = Utc::now();
        states.retain(|_, pending| pending.expires_at >= now);
        Ok(before - states.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_is_single_use() {
        let store = InMemoryAuthorizationStore::new();
        let pending = PendingAuthorization::new(
            "user-1".to_string(),
            Platform::Twitter,
            None,
            Some("verifier123".to_string()),
            600,
        );
        let state = pending.state.clone();
        assert_ne!(state, "user-1");

        store.store(pending).await.unwrap();

        let taken = store.take(&state).await.unwrap();
        assert_eq!(taken.user_id, "user-1");
        assert_eq!(taken.code_verifier.as_deref(), Some("verifier123"));

        let again = store.take(&state).await;
        assert!(matches!(again, Err(ConnectError::InvalidState)));
    }

    #[tokio::test]
    async fn test_expired_state_rejected_and_cleaned() {
        let store = InMemoryAuthorizationStore::new();
        let mut pending =
            PendingAuthorization::new("user-1".to_string(), Platform::Youtube, None, None, 600);
        pending.expires_at = Utc::now() - Duration::minutes(1);
        let state = pending.state.clone();

        store.store(pending.clone()).await.unwrap();
        assert!(matches!(
            store.take(&state).await,
            Err(ConnectError::InvalidState)
        ));

        store.store(pending).await.unwrap();
        assert_eq!(store.cleanup_expired().await.unwrap(), 1);
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_oversized_ttl_is_capped() {
        for ttl in [10_000_000_000_000_000, u64::MAX] {
            let pending =
                PendingAuthorization::new("user-1".to_string(), Platform::Youtube, None, None, ttl);
            assert!(!pending.is_expired());
            assert_eq!(
                pending.expires_at - pending.created_at,
                Duration::seconds(MAX_STATE_TTL_SECONDS as i64)
            );
        }
    }

    #[test]
    fn test_debug_hides_verifier() {
        let pending = PendingAuthorization::new(
            "user-1".to_string(),
            Platform::Twitter,
            None,
            Some("very-secret-verifier".to_string()),
            600,
        );
        assert!(!format!("{:?}", pending).contains("very-secret-verifier"));
    }
}
