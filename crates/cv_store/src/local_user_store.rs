//! This device's own key material and the user-key history.

use sqlx::Row;

use cv_chain::DeviceId;
use cv_crypto::{
    EncryptionKeyPair, PrivateEncryptionKey, PrivateSignatureKey, PublicEncryptionKey,
    PublicSignatureKey, SignatureKeyPair,
};

use crate::db::{blob, Store};
use crate::error::StoreError;

pub struct LocalUserStore {
    store: Store,
}

impl LocalUserStore {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn set_device_keys(
        &self,
        signature_key_pair: &SignatureKeyPair,
        encryption_key_pair: &EncryptionKeyPair,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO device_keys \
             (id, private_signature_key, public_signature_key, \
              private_encryption_key, public_encryption_key, device_id) \
             VALUES (0, ?, ?, ?, ?, \
                     (SELECT device_id FROM device_keys WHERE id = 0))",
        )
        .bind(signature_key_pair.private_key.as_bytes().to_vec())
        .bind(signature_key_pair.public_key.as_ref().to_vec())
        .bind(encryption_key_pair.private_key.as_bytes().to_vec())
        .bind(encryption_key_pair.public_key.as_ref().to_vec())
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn device_keys(
        &self,
    ) -> Result<Option<(SignatureKeyPair, EncryptionKeyPair)>, StoreError> {
        let row = sqlx::query(
            "SELECT private_signature_key, public_signature_key, \
                    private_encryption_key, public_encryption_key \
             FROM device_keys WHERE id = 0",
        )
        .fetch_optional(self.store.pool())
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let signature = SignatureKeyPair {
            private_key: blob::<PrivateSignatureKey>(&row.get::<Vec<u8>, _>(
                "private_signature_key",
            ))?,
            public_key: blob::<PublicSignatureKey>(&row.get::<Vec<u8>, _>(
                "public_signature_key",
            ))?,
        };
        let encryption = EncryptionKeyPair {
            private_key: blob::<PrivateEncryptionKey>(&row.get::<Vec<u8>, _>(
                "private_encryption_key",
            ))?,
            public_key: blob::<PublicEncryptionKey>(&row.get::<Vec<u8>, _>(
                "public_encryption_key",
            ))?,
        };
        Ok(Some((signature, encryption)))
    }

    pub async fn set_device_id(&self, device_id: &DeviceId) -> Result<(), StoreError> {
        sqlx::query("UPDATE device_keys SET device_id = ? WHERE id = 0")
            .bind(device_id.as_ref().to_vec())
            .execute(self.store.pool())
            .await?;
        Ok(())
    }

    pub async fn device_id(&self) -> Result<Option<DeviceId>, StoreError> {
        let row = sqlx::query("SELECT device_id FROM device_keys WHERE id = 0")
            .fetch_optional(self.store.pool())
            .await?;
        Ok(match row {
            Some(row) => row
                .get::<Option<Vec<u8>>, _>("device_id")
                .map(|bytes| blob::<DeviceId>(&bytes))
                .transpose()?,
            None => None,
        })
    }

    /// Record a user keypair. Keys arrive oldest-first (rotation order), so
    /// insertion order doubles as history order.
    pub async fn put_user_key_pair(
        &self,
        key_pair: &EncryptionKeyPair,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR IGNORE INTO user_keys \
             (public_encryption_key, private_encryption_key) VALUES (?, ?)",
        )
        .bind(key_pair.public_key.as_ref().to_vec())
        .bind(key_pair.private_key.as_bytes().to_vec())
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn find_user_key_pair(
        &self,
        public_key: &PublicEncryptionKey,
    ) -> Result<Option<EncryptionKeyPair>, StoreError> {
        let row = sqlx::query(
            "SELECT public_encryption_key, private_encryption_key \
             FROM user_keys WHERE public_encryption_key = ?",
        )
        .bind(public_key.as_ref().to_vec())
        .fetch_optional(self.store.pool())
        .await?;
        row.map(|r| key_pair_from_row(&r)).transpose()
    }

    pub async fn last_user_key_pair(&self) -> Result<Option<EncryptionKeyPair>, StoreError> {
        let row = sqlx::query(
            "SELECT public_encryption_key, private_encryption_key \
             FROM user_keys ORDER BY seq DESC LIMIT 1",
        )
        .fetch_optional(self.store.pool())
        .await?;
        row.map(|r| key_pair_from_row(&r)).transpose()
    }
}

fn key_pair_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<EncryptionKeyPair, StoreError> {
    Ok(EncryptionKeyPair {
        public_key: blob(&row.get::<Vec<u8>, _>("public_encryption_key"))?,
        private_key: blob(&row.get::<Vec<u8>, _>("private_encryption_key"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_crypto::sealed::make_encryption_key_pair;
    use cv_crypto::sign::make_signature_key_pair;

    #[tokio::test]
    async fn device_keys_and_id() {
        let store = Store::open_in_memory().await.unwrap();
        let local = store.local_user();
        assert!(local.device_keys().await.unwrap().is_none());

        let sig = make_signature_key_pair();
        let enc = make_encryption_key_pair();
        local.set_device_keys(&sig, &enc).await.unwrap();
        let (sig2, enc2) = local.device_keys().await.unwrap().unwrap();
        assert_eq!(sig2, sig);
        assert_eq!(enc2, enc);

        assert!(local.device_id().await.unwrap().is_none());
        let id = DeviceId::from([4u8; 32]);
        local.set_device_id(&id).await.unwrap();
        assert_eq!(local.device_id().await.unwrap(), Some(id));

        // re-setting keys must not clear the device id
        local.set_device_keys(&sig, &enc).await.unwrap();
        assert_eq!(local.device_id().await.unwrap(), Some(id));
    }

    #[tokio::test]
    async fn user_key_history_keeps_order() {
        let store = Store::open_in_memory().await.unwrap();
        let local = store.local_user();

        let first = make_encryption_key_pair();
        let second = make_encryption_key_pair();
        local.put_user_key_pair(&first).await.unwrap();
        local.put_user_key_pair(&second).await.unwrap();

        assert_eq!(local.last_user_key_pair().await.unwrap(), Some(second.clone()));
        assert_eq!(
            local.find_user_key_pair(&first.public_key).await.unwrap(),
            Some(first)
        );
        assert!(local
            .find_user_key_pair(&make_encryption_key_pair().public_key)
            .await
            .unwrap()
            .is_none());
    }
}
