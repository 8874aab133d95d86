//! Claimed provisional identity key material.

use sqlx::Row;

use cv_crypto::{EncryptionKeyPair, PublicSignatureKey};

use crate::db::{blob, Store};
use crate::error::StoreError;
use crate::models::ProvisionalUserKeys;

pub struct ProvisionalUserKeyStore {
    store: Store,
}

impl ProvisionalUserKeyStore {
    pub(crate) fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn put(
        &self,
        app_key: &PublicSignatureKey,
        provider_key: &PublicSignatureKey,
        keys: &ProvisionalUserKeys,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT OR REPLACE INTO provisional_user_keys \
             (app_public_signature_key, provider_public_signature_key, \
              app_public_encryption_key, app_private_encryption_key, \
              provider_public_encryption_key, provider_private_encryption_key) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(app_key.as_ref().to_vec())
        .bind(provider_key.as_ref().to_vec())
        .bind(keys.app_keys.public_key.as_ref().to_vec())
        .bind(keys.app_keys.private_key.as_bytes().to_vec())
        .bind(keys.provider_keys.public_key.as_ref().to_vec())
        .bind(keys.provider_keys.private_key.as_bytes().to_vec())
        .execute(self.store.pool())
        .await?;
        Ok(())
    }

    pub async fn find(
        &self,
        app_key: &PublicSignatureKey,
        provider_key: &PublicSignatureKey,
    ) -> Result<Option<ProvisionalUserKeys>, StoreError> {
        let row = sqlx::query(
            "SELECT app_public_encryption_key, app_private_encryption_key, \
                    provider_public_encryption_key, provider_private_encryption_key \
             FROM provisional_user_keys \
             WHERE app_public_signature_key = ? AND provider_public_signature_key = ?",
        )
        .bind(app_key.as_ref().to_vec())
        .bind(provider_key.as_ref().to_vec())
        .fetch_optional(self.store.pool())
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(ProvisionalUserKeys {
            app_keys: EncryptionKeyPair {
                public_key: blob(&row.get::<Vec<u8>, _>("app_public_encryption_key"))?,
                private_key: blob(&row.get::<Vec<u8>, _>("app_private_encryption_key"))?,
            },
            provider_keys: EncryptionKeyPair {
                public_key: blob(&row.get::<Vec<u8>, _>("provider_public_encryption_key"))?,
                private_key: blob(&row.get::<Vec<u8>, _>("provider_private_encryption_key"))?,
            },
        }))
    }

    /// All claimed identities (used to match provisional group members).
    pub async fn list(
        &self,
    ) -> Result<Vec<(PublicSignatureKey, PublicSignatureKey, ProvisionalUserKeys)>, StoreError>
    {
        let rows = sqlx::query(
            "SELECT app_public_signature_key, provider_public_signature_key, \
                    app_public_encryption_key, app_private_encryption_key, \
                    provider_public_encryption_key, provider_private_encryption_key \
             FROM provisional_user_keys",
        )
        .fetch_all(self.store.pool())
        .await?;
        rows.iter()
            .map(|row| {
                Ok((
                    blob::<PublicSignatureKey>(&row.get::<Vec<u8>, _>(
                        "app_public_signature_key",
                    ))?,
                    blob::<PublicSignatureKey>(&row.get::<Vec<u8>, _>(
                        "provider_public_signature_key",
                    ))?,
                    ProvisionalUserKeys {
                        app_keys: EncryptionKeyPair {
                            public_key: blob(
                                &row.get::<Vec<u8>, _>("app_public_encryption_key"),
                            )?,
                            private_key: blob(
                                &row.get::<Vec<u8>, _>("app_private_encryption_key"),
                            )?,
                        },
                        provider_keys: EncryptionKeyPair {
                            public_key: blob(
                                &row.get::<Vec<u8>, _>("provider_public_encryption_key"),
                            )?,
                            private_key: blob(
                                &row.get::<Vec<u8>, _>("provider_private_encryption_key"),
                            )?,
                        },
                    },
                ))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_crypto::sealed::make_encryption_key_pair;

    #[tokio::test]
    async fn put_find_list() {
        let store = Store::open_in_memory().await.unwrap();
        let provisional = store.provisional_user_keys();

        let app_sig = PublicSignatureKey::from([1u8; 32]);
        let provider_sig = PublicSignatureKey::from([2u8; 32]);
        let keys = ProvisionalUserKeys {
            app_keys: make_encryption_key_pair(),
            provider_keys: make_encryption_key_pair(),
        };

        assert!(provisional.find(&app_sig, &provider_sig).await.unwrap().is_none());
        provisional.put(&app_sig, &provider_sig, &keys).await.unwrap();
        assert_eq!(
            provisional.find(&app_sig, &provider_sig).await.unwrap(),
            Some(keys.clone())
        );
        assert_eq!(
            provisional.list().await.unwrap(),
            vec![(app_sig, provider_sig, keys)]
        );
    }
}
