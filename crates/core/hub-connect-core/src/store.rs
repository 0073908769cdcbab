//! Connection persistence contract.

use crate::{Connection, Platform};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Keyed store for [`Connection`] records.
///
/// Rows are keyed on `(user_id, platform)`. `upsert` must be atomic per key
/// (last writer wins) and `delete` of an absent row is not an error.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Insert or wholesale-replace the row for the connection's key.
    async fn upsert(&self, connection: Connection) -> StoreResult<Connection>;

    /// All connections belonging to a user.
    async fn select_by_user(&self, user_id: &str) -> StoreResult<Vec<Connection>>;

    /// The connection for one `(user_id, platform)` pair, if any.
    async fn select_one(&self, user_id: &str, platform: Platform)
    -> StoreResult<Option<Connection>>;

    async fn delete(&self, user_id: &str, platform: Platform) -> StoreResult<()>;
}

/// In-memory implementation of [`ConnectionStore`]
pub struct InMemoryConnectionStore {
    connections: Arc<RwLock<HashMap<(String, Platform), Connection>>>,
}

impl InMemoryConnectionStore {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}

impl Default for InMemoryConnectionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn upsert(&self, connection: Connection) -> StoreResult<Connection> {
        let mut connections = self.connections.write().await;
        connections.insert(
            (connection.user_id.clone(), connection.platform),
            connection.clone(),
        );
        Ok(connection)
    }

    async fn select_by_user(&self, user_id: &str) -> StoreResult<Vec<Connection>> {
        let connections = self.connections.read().await;
        let mut found: Vec<Connection> = connections
            .values()
            .filter(|connection| connection.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|connection| connection.platform);
        Ok(found)
    }

    async fn select_one(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> StoreResult<Option<Connection>> {
        let connections = self.connections.read().await;
        Ok(connections.get(&(user_id.to_string(), platform)).cloned())
    }

    async fn delete(&self, user_id: &str, platform: Platform) -> StoreResult<()> {
        let mut connections = self.connections.write().await;
        connections.remove(&(user_id.to_string(), platform));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::sample_connection;

    #[tokio::test]
    async fn test_upsert_replaces_row() {
        let store = InMemoryConnectionStore::new();

        store
            .upsert(sample_connection("user-1", Platform::Youtube, "old-token"))
            .await
            .unwrap();
        let mut replacement = sample_connection("user-1", Platform::Youtube, "new-token");
        replacement.refresh_token = None;
        store.upsert(replacement).await.unwrap();

        assert_eq!(store.len().await, 1);
        let stored = store
            .select_one("user-1", Platform::Youtube)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, "new-token");
        assert_eq!(stored.refresh_token, None);
    }

    #[tokio::test]
    async fn test_select_by_user_filters_and_orders() {
        let store = InMemoryConnectionStore::new();
        store
            .upsert(sample_connection("user-1", Platform::Calendly, "a"))
            .await
            .unwrap();
        store
            .upsert(sample_connection("user-1", Platform::Instagram, "b"))
            .await
            .unwrap();
        store
            .upsert(sample_connection("user-2", Platform::Instagram, "c"))
            .await
            .unwrap();

        let found = store.select_by_user("user-1").await.unwrap();
        let platforms: Vec<_> = found.iter().map(|c| c.platform).collect();
        assert_eq!(platforms, vec![Platform::Instagram, Platform::Calendly]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = InMemoryConnectionStore::new();
        store
            .upsert(sample_connection("user-1", Platform::Twitter, "a"))
            .await
            .unwrap();

        store.delete("user-1", Platform::Twitter).await.unwrap();
        store.delete("user-1", Platform::Twitter).await.unwrap();

        assert!(store.is_empty().await);
        assert!(
            store
                .select_one("user-1", Platform::Twitter)
                .await
                .unwrap()
                .is_none()
        );
    }
}
