//! Users and devices observed on the chain.

use sqlx::Row;

use cv_chain::{DeviceId, UserId};
use cv_crypto::PublicEncryptionKey;

use crate::db::{blob, Store};
use crate::error::StoreError;
use crate::models::{Device, User};

pub struct ContactStore {
    store: Store,
}

impl ContactStore {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    /// Insert the user row if it does not exist yet.
    pub async fn ensure_user(&self, user_id: &UserId) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO contacts (user_id, last_user_key) VALUES (?, NULL)")
            .bind(user_id.as_ref().to_vec())
            .execute(self.store.pool())
            .await?;
        Ok(())
    }

    pub async fn put_user_device(&self, device: &Device) -> Result<(), StoreError> {
        self.ensure_user(&device.user_id).await?;
        sqlx::query(
            "INSERT OR REPLACE INTO devices \
             (id, user_id, public_signature_key, public_encryption_key, \
              created_at_index, revoked_at_index, is_ghost) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(device.id.as_ref().to_vec())
        .bind(device.user_id.as_ref().to_vec())
        .bind(device.public_signature_key.as_ref().to_vec())
        .bind(device.public_encryption_key.as_ref().to_vec())
        .bind(device.created_at_index as i64)
        .bind(device.revoked_at_index.map(|i| i as i64))
        .bind(device.is_ghost)
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn put_user_key(
        &self,
        user_id: &UserId,
        user_key: &PublicEncryptionKey,
    ) -> Result<(), StoreError> {
        self.ensure_user(user_id).await?;
        sqlx::query("UPDATE contacts SET last_user_key = ? WHERE user_id = ?")
            .bind(user_key.as_ref().to_vec())
            .bind(user_id.as_ref().to_vec())
            .execute(self.store.pool())
            .await?;
        Ok(())
    }

    pub async fn revoke_device(&self, device_id: &DeviceId, index: u64) -> Result<(), StoreError> {
        sqlx::query("UPDATE devices SET revoked_at_index = ? WHERE id = ?")
            .bind(index as i64)
            .bind(device_id.as_ref().to_vec())
            .execute(self.store.pool())
            .await?;
        Ok(())
    }

    pub async fn find_user(&self, user_id: &UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT user_id, last_user_key FROM contacts WHERE user_id = ?")
            .bind(user_id.as_ref().to_vec())
            .fetch_optional(self.store.pool())
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let user_key = row
            .get::<Option<Vec<u8>>, _>("last_user_key")
            .map(|bytes| blob::<PublicEncryptionKey>(&bytes))
            .transpose()?;

        let devices = self.find_user_devices(user_id).await?;
        Ok(Some(User {
            id: *user_id,
            user_key,
            devices,
        }))
    }

    pub async fn find_user_devices(&self, user_id: &UserId) -> Result<Vec<Device>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, user_id, public_signature_key, public_encryption_key, \
                    created_at_index, revoked_at_index, is_ghost \
             FROM devices WHERE user_id = ? ORDER BY created_at_index",
        )
        .bind(user_id.as_ref().to_vec())
        .fetch_all(self.store.pool())
        .await?;
        rows.iter().map(device_from_row).collect()
    }

    pub async fn find_device(&self, device_id: &DeviceId) -> Result<Option<Device>, StoreError> {
        let row = sqlx::query(
            "SELECT id, user_id, public_signature_key, public_encryption_key, \
                    created_at_index, revoked_at_index, is_ghost \
             FROM devices WHERE id = ?",
        )
        .bind(device_id.as_ref().to_vec())
        .fetch_optional(self.store.pool())
        .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    pub async fn find_user_id_by_device(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<UserId>, StoreError> {
        let row = sqlx::query("SELECT user_id FROM devices WHERE id = ?")
            .bind(device_id.as_ref().to_vec())
            .fetch_optional(self.store.pool())
            .await?;
        row.map(|r| blob::<UserId>(&r.get::<Vec<u8>, _>("user_id")))
            .transpose()
    }

    pub async fn user_exists(&self, user_id: &UserId) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM contacts WHERE user_id = ?")
            .bind(user_id.as_ref().to_vec())
            .fetch_one(self.store.pool())
            .await?;
        Ok(count > 0)
    }
}

fn device_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Device, StoreError> {
    Ok(Device {
        id: blob::<DeviceId>(&row.get::<Vec<u8>, _>("id"))?,
        user_id: blob::<UserId>(&row.get::<Vec<u8>, _>("user_id"))?,
        public_signature_key: blob(&row.get::<Vec<u8>, _>("public_signature_key"))?,
        public_encryption_key: blob(&row.get::<Vec<u8>, _>("public_encryption_key"))?,
        created_at_index: row.get::<i64, _>("created_at_index") as u64,
        revoked_at_index: row.get::<Option<i64>, _>("revoked_at_index").map(|i| i as u64),
        is_ghost: row.get::<bool, _>("is_ghost"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_crypto::PublicSignatureKey;

    fn device(id: u8, user: u8, revoked: Option<u64>) -> Device {
        Device {
            id: DeviceId::from([id; 32]),
            user_id: UserId::from([user; 32]),
            public_signature_key: PublicSignatureKey::from([id; 32]),
            public_encryption_key: PublicEncryptionKey::from([id; 32]),
            created_at_index: 1,
            revoked_at_index: revoked,
            is_ghost: false,
        }
    }

    #[tokio::test]
    async fn user_and_devices_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        let contacts = store.contacts();

        let d1 = device(1, 7, None);
        let d2 = device(2, 7, Some(12));
        contacts.put_user_device(&d1).await.unwrap();
        contacts.put_user_device(&d2).await.unwrap();
        contacts
            .put_user_key(&d1.user_id, &PublicEncryptionKey::from([9u8; 32]))
            .await
            .unwrap();

        let user = contacts.find_user(&d1.user_id).await.unwrap().unwrap();
        assert_eq!(user.devices, vec![d1.clone(), d2.clone()]);
        assert_eq!(user.user_key, Some(PublicEncryptionKey::from([9u8; 32])));

        assert_eq!(
            contacts.find_user_id_by_device(&d2.id).await.unwrap(),
            Some(d1.user_id)
        );
        assert_eq!(contacts.find_device(&d1.id).await.unwrap(), Some(d1));
    }

    #[tokio::test]
    async fn revocation_is_recorded() {
        let store = Store::open_in_memory().await.unwrap();
        let contacts = store.contacts();
        let d = device(3, 8, None);
        contacts.put_user_device(&d).await.unwrap();
        contacts.revoke_device(&d.id, 33).await.unwrap();
        let found = contacts.find_device(&d.id).await.unwrap().unwrap();
        assert_eq!(found.revoked_at_index, Some(33));
        assert!(found.is_revoked_at(33));
        assert!(!found.is_revoked_at(32));
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let store = Store::open_in_memory().await.unwrap();
        assert!(store
            .contacts()
            .find_user(&UserId::from([0xaa; 32]))
            .await
            .unwrap()
            .is_none());
    }
}
