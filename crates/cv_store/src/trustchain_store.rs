//! Verified chain entries and the resource-id index.

use sqlx::Row;

use cv_chain::actions::Action;
use cv_chain::{Nature, ResourceId, ServerEntry, TrustchainId};
use cv_crypto::{Hash, PublicSignatureKey, Signature};

use crate::db::{blob, Store};
use crate::error::StoreError;

pub struct TrustchainStore {
    store: Store,
}

impl TrustchainStore {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    /// Record a verified entry. Key publishes are also indexed by resource
    /// id so decrypts can find them without rescanning.
    pub async fn add_entry(&self, entry: &ServerEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO trustchain \
             (hash, idx, nature, author, payload, signature) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.hash.as_ref().to_vec())
        .bind(entry.index as i64)
        .bind(i64::from(entry.nature.code()))
        .bind(entry.author.as_ref().to_vec())
        .bind(entry.payload.clone())
        .bind(entry.signature.as_ref().to_vec())
        .execute(self.store.pool())
        .await?;

        if let Action::KeyPublish(kp) = &entry.action {
            sqlx::query(
                "INSERT OR IGNORE INTO trustchain_indexes (resource_id, hash) VALUES (?, ?)",
            )
            .bind(kp.resource_id().as_ref().to_vec())
            .bind(entry.hash.as_ref().to_vec())
            .execute(self.store.pool())
            .await?;
        }
        Ok(())
    }

    pub async fn find_by_hash(
        &self,
        trustchain_id: &TrustchainId,
        hash: &Hash,
    ) -> Result<Option<ServerEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT hash, idx, nature, author, payload, signature \
             FROM trustchain WHERE hash = ?",
        )
        .bind(hash.as_ref().to_vec())
        .fetch_optional(self.store.pool())
        .await?;
        row.as_ref()
            .map(|r| entry_from_row(trustchain_id, r))
            .transpose()
    }

    /// The first key publish recorded for a resource, if any.
    pub async fn find_key_publish_for_resource(
        &self,
        trustchain_id: &TrustchainId,
        resource_id: &ResourceId,
    ) -> Result<Option<ServerEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT t.hash, t.idx, t.nature, t.author, t.payload, t.signature \
             FROM trustchain_indexes i JOIN trustchain t ON t.hash = i.hash \
             WHERE i.resource_id = ? ORDER BY t.idx LIMIT 1",
        )
        .bind(resource_id.as_ref().to_vec())
        .fetch_optional(self.store.pool())
        .await?;
        row.as_ref()
            .map(|r| entry_from_row(trustchain_id, r))
            .transpose()
    }

    pub async fn last_index(&self) -> Result<u64, StoreError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(idx) FROM trustchain")
            .fetch_one(self.store.pool())
            .await?;
        Ok(max.unwrap_or(0) as u64)
    }

    pub async fn contains(&self, hash: &Hash) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trustchain WHERE hash = ?")
            .bind(hash.as_ref().to_vec())
            .fetch_one(self.store.pool())
            .await?;
        Ok(count > 0)
    }

    pub async fn set_trustchain_public_signature_key(
        &self,
        key: &PublicSignatureKey,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO trustchain_info (id, public_signature_key) VALUES (0, ?)",
        )
        .bind(key.as_ref().to_vec())
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn trustchain_public_signature_key(
        &self,
    ) -> Result<Option<PublicSignatureKey>, StoreError> {
        let row =
            sqlx::query("SELECT public_signature_key FROM trustchain_info WHERE id = 0")
                .fetch_optional(self.store.pool())
                .await?;
        Ok(match row {
            Some(row) => row
                .get::<Option<Vec<u8>>, _>("public_signature_key")
                .map(|bytes| blob::<PublicSignatureKey>(&bytes))
                .transpose()?,
            None => None,
        })
    }
}

fn entry_from_row(
    trustchain_id: &TrustchainId,
    row: &sqlx::sqlite::SqliteRow,
) -> Result<ServerEntry, StoreError> {
    let nature = Nature::try_from(row.get::<i64, _>("nature") as u64)?;
    let payload: Vec<u8> = row.get("payload");
    let action = Action::deserialize_payload(nature, &payload)?;
    Ok(ServerEntry {
        index: row.get::<i64, _>("idx") as u64,
        trustchain_id: *trustchain_id,
        nature,
        author: blob::<Hash>(&row.get::<Vec<u8>, _>("author"))?,
        action,
        payload,
        hash: blob::<Hash>(&row.get::<Vec<u8>, _>("hash"))?,
        signature: blob::<Signature>(&row.get::<Vec<u8>, _>("signature"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_chain::actions::{KeyPublish, KeyPublishToUser, TrustchainCreation};
    use cv_chain::Block;
    use cv_crypto::sign::make_signature_key_pair;
    use cv_crypto::{PublicEncryptionKey, SealedSymmetricKey};

    fn entry_of(action: Action, index: u64) -> ServerEntry {
        let kp = make_signature_key_pair();
        let trustchain_id = TrustchainId::from([1u8; 32]);
        let block = Block::sign(trustchain_id, Hash::from([2u8; 32]), &action, &kp.private_key);
        ServerEntry::from_wire(&block.to_wire(index)).unwrap()
    }

    #[tokio::test]
    async fn add_find_and_last_index() {
        let store = Store::open_in_memory().await.unwrap();
        let chain = store.trustchain();
        let tc_id = TrustchainId::from([1u8; 32]);

        let entry = entry_of(
            Action::TrustchainCreation(TrustchainCreation {
                public_signature_key: PublicSignatureKey::from([1u8; 32]),
            }),
            4,
        );
        chain.add_entry(&entry).await.unwrap();

        assert!(chain.contains(&entry.hash).await.unwrap());
        assert_eq!(
            chain.find_by_hash(&tc_id, &entry.hash).await.unwrap(),
            Some(entry.clone())
        );
        assert_eq!(chain.last_index().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn key_publish_is_indexed_by_resource() {
        let store = Store::open_in_memory().await.unwrap();
        let chain = store.trustchain();
        let tc_id = TrustchainId::from([1u8; 32]);

        let resource_id = ResourceId::from([7u8; 16]);
        let entry = entry_of(
            Action::KeyPublish(KeyPublish::ToUser(KeyPublishToUser {
                recipient_public_encryption_key: PublicEncryptionKey::from([2u8; 32]),
                resource_id,
                sealed_symmetric_key: SealedSymmetricKey::from([3u8; 80]),
            })),
            9,
        );
        chain.add_entry(&entry).await.unwrap();

        let found = chain
            .find_key_publish_for_resource(&tc_id, &resource_id)
            .await
            .unwrap();
        assert_eq!(found, Some(entry));
        assert!(chain
            .find_key_publish_for_resource(&tc_id, &ResourceId::from([8u8; 16]))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn trustchain_key_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let chain = store.trustchain();
        assert!(chain.trustchain_public_signature_key().await.unwrap().is_none());
        let key = PublicSignatureKey::from([5u8; 32]);
        chain.set_trustchain_public_signature_key(&key).await.unwrap();
        assert_eq!(
            chain.trustchain_public_signature_key().await.unwrap(),
            Some(key)
        );
    }
}
