//! Groups, internal (we hold the private keys) or external (observed only).
//!
//! Upsert rule: an internal record overwrites anything; an external record
//! never overwrites an internal one (losing private keys is not an option).

use sqlx::Row;

use cv_chain::GroupId;
use cv_crypto::{
    EncryptionKeyPair, Hash, PublicEncryptionKey, PublicSignatureKey,
    SealedPrivateSignatureKey, SignatureKeyPair, TwoTimesSealedPrivateEncryptionKey,
};

use crate::db::{blob, Store};
use crate::error::StoreError;
use crate::models::{ExternalGroup, Group, GroupProvisionalKey, InternalGroup};

pub struct GroupStore {
    store: Store,
}

impl GroupStore {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn put(&self, group: &Group) -> Result<(), StoreError> {
        match group {
            Group::Internal(g) => self.put_internal(g).await,
            Group::External(g) => self.put_external(g).await,
        }
    }

    pub async fn put_internal(&self, group: &InternalGroup) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO \"groups\" \
             (group_id, public_signature_key, private_signature_key, \
              public_encryption_key, private_encryption_key, \
              sealed_private_signature_key, last_block_hash, last_block_index) \
             VALUES (?, ?, ?, ?, ?, NULL, ?, ?)",
        )
        .bind(group.id.as_ref().to_vec())
        .bind(group.signature_key_pair.public_key.as_ref().to_vec())
        .bind(group.signature_key_pair.private_key.as_bytes().to_vec())
        .bind(group.encryption_key_pair.public_key.as_ref().to_vec())
        .bind(group.encryption_key_pair.private_key.as_bytes().to_vec())
        .bind(group.last_block_hash.as_ref().to_vec())
        .bind(group.last_block_index as i64)
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn put_external(&self, group: &ExternalGroup) -> Result<(), StoreError> {
        // Refuse to downgrade an internal record.
        sqlx::query(
            "INSERT OR REPLACE INTO \"groups\" \
             (group_id, public_signature_key, private_signature_key, \
              public_encryption_key, private_encryption_key, \
              sealed_private_signature_key, last_block_hash, last_block_index) \
             SELECT ?, ?, NULL, ?, NULL, ?, ?, ? \
             WHERE NOT EXISTS (SELECT 1 FROM \"groups\" \
                               WHERE group_id = ? AND private_encryption_key IS NOT NULL)",
        )
        .bind(group.id.as_ref().to_vec())
        .bind(group.public_signature_key.as_ref().to_vec())
        .bind(group.public_encryption_key.as_ref().to_vec())
        .bind(group.sealed_private_signature_key.as_ref().to_vec())
        .bind(group.last_block_hash.as_ref().to_vec())
        .bind(group.last_block_index as i64)
        .bind(group.id.as_ref().to_vec())
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn update_last_block(
        &self,
        group_id: &GroupId,
        hash: &Hash,
        index: u64,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE \"groups\" SET last_block_hash = ?, last_block_index = ? WHERE group_id = ?",
        )
        .bind(hash.as_ref().to_vec())
        .bind(index as i64)
        .bind(group_id.as_ref().to_vec())
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn find_by_id(&self, group_id: &GroupId) -> Result<Option<Group>, StoreError> {
        let row = sqlx::query(&select_sql("group_id = ?"))
            .bind(group_id.as_ref().to_vec())
            .fetch_optional(self.store.pool())
            .await?;
        row.as_ref().map(group_from_row).transpose()
    }

    pub async fn find_by_public_encryption_key(
        &self,
        key: &PublicEncryptionKey,
    ) -> Result<Option<Group>, StoreError> {
        let row = sqlx::query(&select_sql("public_encryption_key = ?"))
            .bind(key.as_ref().to_vec())
            .fetch_optional(self.store.pool())
            .await?;
        row.as_ref().map(group_from_row).transpose()
    }

    // ── Provisional member stash ─────────────────────────────────────────────

    /// Keep provisional member entries around so the group can be promoted
    /// when the matching claim arrives.
    pub async fn put_provisional_keys(
        &self,
        group_id: &GroupId,
        keys: &[GroupProvisionalKey],
    ) -> Result<(), StoreError> {
        for key in keys {
            sqlx::query(
                "INSERT OR REPLACE INTO groups_provisional_encryption_keys \
                 (group_id, app_public_signature_key, provider_public_signature_key, \
                  two_times_sealed_private_encryption_key) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(group_id.as_ref().to_vec())
            .bind(key.app_public_signature_key.as_ref().to_vec())
            .bind(key.provider_public_signature_key.as_ref().to_vec())
            .bind(key.two_times_sealed_private_encryption_key.as_ref().to_vec())
            .execute(self.store.pool())
            .await?;
        }
        Ok(())
    }

    /// All stashed group keys claimable by one provisional identity.
    pub async fn find_provisional_keys(
        &self,
        app_key: &PublicSignatureKey,
        provider_key: &PublicSignatureKey,
    ) -> Result<Vec<(GroupId, TwoTimesSealedPrivateEncryptionKey)>, StoreError> {
        let rows = sqlx::query(
            "SELECT group_id, two_times_sealed_private_encryption_key \
             FROM groups_provisional_encryption_keys \
             WHERE app_public_signature_key = ? AND provider_public_signature_key = ?",
        )
        .bind(app_key.as_ref().to_vec())
        .bind(provider_key.as_ref().to_vec())
        .fetch_all(self.store.pool())
        .await?;
        rows.iter()
            .map(|row| {
                Ok((
                    blob::<GroupId>(&row.get::<Vec<u8>, _>("group_id"))?,
                    blob(&row.get::<Vec<u8>, _>("two_times_sealed_private_encryption_key"))?,
                ))
            })
            .collect()
    }

    pub async fn delete_provisional_keys(
        &self,
        app_key: &PublicSignatureKey,
        provider_key: &PublicSignatureKey,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "DELETE FROM groups_provisional_encryption_keys \
             WHERE app_public_signature_key = ? AND provider_public_signature_key = ?",
        )
        .bind(app_key.as_ref().to_vec())
        .bind(provider_key.as_ref().to_vec())
        .execute(self.store.pool())
        .await?;
        Ok(())
    }
}

fn select_sql(filter: &str) -> String {
    format!(
        "SELECT group_id, public_signature_key, private_signature_key, \
                public_encryption_key, private_encryption_key, \
                sealed_private_signature_key, last_block_hash, last_block_index \
         FROM \"groups\" WHERE {filter}"
    )
}

fn group_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Group, StoreError> {
    let id = blob::<GroupId>(&row.get::<Vec<u8>, _>("group_id"))?;
    let public_signature_key =
        blob::<PublicSignatureKey>(&row.get::<Vec<u8>, _>("public_signature_key"))?;
    let public_encryption_key =
        blob::<PublicEncryptionKey>(&row.get::<Vec<u8>, _>("public_encryption_key"))?;
    let last_block_hash = blob::<Hash>(&row.get::<Vec<u8>, _>("last_block_hash"))?;
    let last_block_index = row.get::<i64, _>("last_block_index") as u64;

    match row.get::<Option<Vec<u8>>, _>("private_encryption_key") {
        Some(private_encryption_key) => {
            let private_signature_key = row
                .get::<Option<Vec<u8>>, _>("private_signature_key")
                .ok_or_else(|| {
                    StoreError::Corrupt("internal group without private signature key".into())
                })?;
            Ok(Group::Internal(InternalGroup {
                id,
                signature_key_pair: SignatureKeyPair {
                    public_key: public_signature_key,
                    private_key: blob(&private_signature_key)?,
                },
                encryption_key_pair: EncryptionKeyPair {
                    public_key: public_encryption_key,
                    private_key: blob(&private_encryption_key)?,
                },
                last_block_hash,
                last_block_index,
            }))
        }
        None => {
            let sealed = row
                .get::<Option<Vec<u8>>, _>("sealed_private_signature_key")
                .ok_or_else(|| {
                    StoreError::Corrupt("external group without sealed signature key".into())
                })?;
            Ok(Group::External(ExternalGroup {
                id,
                public_signature_key,
                sealed_private_signature_key: blob::<SealedPrivateSignatureKey>(&sealed)?,
                public_encryption_key,
                last_block_hash,
                last_block_index,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_crypto::sealed::make_encryption_key_pair;
    use cv_crypto::sign::make_signature_key_pair;

    fn internal(id: u8) -> InternalGroup {
        InternalGroup {
            id: GroupId::from([id; 32]),
            signature_key_pair: make_signature_key_pair(),
            encryption_key_pair: make_encryption_key_pair(),
            last_block_hash: Hash::from([id; 32]),
            last_block_index: 5,
        }
    }

    fn external(id: u8) -> ExternalGroup {
        ExternalGroup {
            id: GroupId::from([id; 32]),
            public_signature_key: PublicSignatureKey::from([id; 32]),
            sealed_private_signature_key: SealedPrivateSignatureKey::from([id; 112]),
            public_encryption_key: PublicEncryptionKey::from([id; 32]),
            last_block_hash: Hash::from([id; 32]),
            last_block_index: 3,
        }
    }

    #[tokio::test]
    async fn internal_overwrites_external() {
        let store = Store::open_in_memory().await.unwrap();
        let groups = store.groups();

        let ext = external(1);
        groups.put_external(&ext).await.unwrap();
        assert!(matches!(
            groups.find_by_id(&ext.id).await.unwrap(),
            Some(Group::External(_))
        ));

        let mut int = internal(1);
        int.id = ext.id;
        groups.put_internal(&int).await.unwrap();
        assert!(matches!(
            groups.find_by_id(&ext.id).await.unwrap(),
            Some(Group::Internal(_))
        ));
    }

    #[tokio::test]
    async fn external_does_not_overwrite_internal() {
        let store = Store::open_in_memory().await.unwrap();
        let groups = store.groups();

        let int = internal(2);
        groups.put_internal(&int).await.unwrap();

        let mut ext = external(2);
        ext.id = int.id;
        groups.put_external(&ext).await.unwrap();

        match groups.find_by_id(&int.id).await.unwrap() {
            Some(Group::Internal(found)) => assert_eq!(found, int),
            other => panic!("expected internal group, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn last_block_update_and_lookup_by_encryption_key() {
        let store = Store::open_in_memory().await.unwrap();
        let groups = store.groups();

        let int = internal(3);
        groups.put_internal(&int).await.unwrap();
        let new_hash = Hash::from([0x42; 32]);
        groups.update_last_block(&int.id, &new_hash, 99).await.unwrap();

        let found = groups
            .find_by_public_encryption_key(&int.encryption_key_pair.public_key)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*found.last_block_hash(), new_hash);
        assert_eq!(found.last_block_index(), 99);
    }

    #[tokio::test]
    async fn provisional_stash_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let groups = store.groups();

        let gid = GroupId::from([7u8; 32]);
        let key = GroupProvisionalKey {
            app_public_signature_key: PublicSignatureKey::from([1u8; 32]),
            provider_public_signature_key: PublicSignatureKey::from([2u8; 32]),
            two_times_sealed_private_encryption_key:
                TwoTimesSealedPrivateEncryptionKey::from([3u8; 128]),
        };
        groups.put_provisional_keys(&gid, &[key.clone()]).await.unwrap();

        let found = groups
            .find_provisional_keys(
                &key.app_public_signature_key,
                &key.provider_public_signature_key,
            )
            .await
            .unwrap();
        assert_eq!(
            found,
            vec![(gid, key.two_times_sealed_private_encryption_key)]
        );

        groups
            .delete_provisional_keys(
                &key.app_public_signature_key,
                &key.provider_public_signature_key,
            )
            .await
            .unwrap();
        assert!(groups
            .find_provisional_keys(
                &key.app_public_signature_key,
                &key.provider_public_signature_key,
            )
            .await
            .unwrap()
            .is_empty());
    }
}
