//! Resource id → symmetric key.

use sqlx::Row;

use cv_chain::ResourceId;
use cv_crypto::SymmetricKey;

use crate::db::{blob, Store};
use crate::error::StoreError;

pub struct ResourceKeyStore {
    store: Store,
}

impl ResourceKeyStore {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    /// Duplicates are ignored: the first key recorded for a resource wins.
    pub async fn put(
        &self,
        resource_id: &ResourceId,
        key: &SymmetricKey,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO resource_keys (resource_id, symmetric_key) VALUES (?, ?)",
        )
        .bind(resource_id.as_ref().to_vec())
        .bind(key.as_bytes().to_vec())
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn find(&self, resource_id: &ResourceId) -> Result<Option<SymmetricKey>, StoreError> {
        let row = sqlx::query("SELECT symmetric_key FROM resource_keys WHERE resource_id = ?")
            .bind(resource_id.as_ref().to_vec())
            .fetch_optional(self.store.pool())
            .await?;
        row.map(|r| blob::<SymmetricKey>(&r.get::<Vec<u8>, _>("symmetric_key")))
            .transpose()
    }

    pub async fn get(&self, resource_id: &ResourceId) -> Result<SymmetricKey, StoreError> {
        self.find(resource_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("resource key {resource_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_write_wins() {
        let store = Store::open_in_memory().await.unwrap();
        let keys = store.resource_keys();
        let id = ResourceId::from([1u8; 16]);
        let first = SymmetricKey::from([2u8; 32]);
        let second = SymmetricKey::from([3u8; 32]);

        keys.put(&id, &first).await.unwrap();
        keys.put(&id, &second).await.unwrap();
        assert_eq!(keys.get(&id).await.unwrap(), first);
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = Store::open_in_memory().await.unwrap();
        let err = store
            .resource_keys()
            .get(&ResourceId::from([9u8; 16]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }
}
