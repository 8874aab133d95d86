//! The local user: this device's keys, our device id once known, and the
//! user-key history.

use std::cell::RefCell;

use cv_chain::actions::Action;
use cv_chain::{Block, DeviceId, TrustchainId, UserId};
use cv_crypto::{
    sealed::make_encryption_key_pair, sign::make_signature_key_pair, EncryptionKeyPair, Hash,
    PrivateSignatureKey, PublicEncryptionKey, SignatureKeyPair, SymmetricKey,
};
use cv_store::Store;

use crate::error::Error;

#[derive(Debug, Clone)]
pub struct DeviceKeys {
    pub signature_key_pair: SignatureKeyPair,
    pub encryption_key_pair: EncryptionKeyPair,
    pub device_id: Option<DeviceId>,
}

/// Signs blocks authored by this device.
pub struct BlockSigner {
    pub trustchain_id: TrustchainId,
    pub device_id: DeviceId,
    private_signature_key: PrivateSignatureKey,
}

impl BlockSigner {
    pub fn new(
        trustchain_id: TrustchainId,
        device_id: DeviceId,
        private_signature_key: PrivateSignatureKey,
    ) -> Self {
        Self {
            trustchain_id,
            device_id,
            private_signature_key,
        }
    }

    pub fn make_block(&self, action: &Action) -> Block {
        Block::sign(
            self.trustchain_id,
            Hash::from(self.device_id),
            action,
            &self.private_signature_key,
        )
    }
}

pub struct LocalUser {
    trustchain_id: TrustchainId,
    user_id: UserId,
    user_secret: SymmetricKey,
    store: Store,
    device: RefCell<Option<DeviceKeys>>,
}

impl LocalUser {
    pub fn new(
        trustchain_id: TrustchainId,
        user_id: UserId,
        user_secret: SymmetricKey,
        store: Store,
    ) -> Self {
        Self {
            trustchain_id,
            user_id,
            user_secret,
            store,
            device: RefCell::new(None),
        }
    }

    pub fn trustchain_id(&self) -> &TrustchainId {
        &self.trustchain_id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn user_secret(&self) -> &SymmetricKey {
        &self.user_secret
    }

    /// Load device keys from the store, generating and persisting fresh ones
    /// on a brand-new device.
    pub async fn init_device_keys(&self) -> Result<(), Error> {
        let local = self.store.local_user();
        let keys = match local.device_keys().await? {
            Some((signature_key_pair, encryption_key_pair)) => DeviceKeys {
                signature_key_pair,
                encryption_key_pair,
                device_id: local.device_id().await?,
            },
            None => {
                let signature_key_pair = make_signature_key_pair();
                let encryption_key_pair = make_encryption_key_pair();
                local
                    .set_device_keys(&signature_key_pair, &encryption_key_pair)
                    .await?;
                DeviceKeys {
                    signature_key_pair,
                    encryption_key_pair,
                    device_id: None,
                }
            }
        };
        *self.device.borrow_mut() = Some(keys);
        Ok(())
    }

    /// Adopt externally-created device keys (identity verification installs
    /// keys delegated by the ghost device).
    pub async fn set_device_keys(
        &self,
        signature_key_pair: SignatureKeyPair,
        encryption_key_pair: EncryptionKeyPair,
    ) -> Result<(), Error> {
        self.store
            .local_user()
            .set_device_keys(&signature_key_pair, &encryption_key_pair)
            .await?;
        *self.device.borrow_mut() = Some(DeviceKeys {
            signature_key_pair,
            encryption_key_pair,
            device_id: None,
        });
        Ok(())
    }

    fn with_device<R>(&self, f: impl FnOnce(&DeviceKeys) -> R) -> Result<R, Error> {
        let device = self.device.borrow();
        device
            .as_ref()
            .map(f)
            .ok_or_else(|| Error::PreconditionFailed("device keys are not initialized".into()))
    }

    pub fn signature_key_pair(&self) -> Result<SignatureKeyPair, Error> {
        self.with_device(|d| d.signature_key_pair.clone())
    }

    pub fn encryption_key_pair(&self) -> Result<EncryptionKeyPair, Error> {
        self.with_device(|d| d.encryption_key_pair.clone())
    }

    pub fn device_id(&self) -> Result<Option<DeviceId>, Error> {
        self.with_device(|d| d.device_id)
    }

    pub async fn set_device_id(&self, device_id: DeviceId) -> Result<(), Error> {
        self.store.local_user().set_device_id(&device_id).await?;
        if let Some(device) = self.device.borrow_mut().as_mut() {
            device.device_id = Some(device_id);
        }
        Ok(())
    }

    pub fn block_signer(&self) -> Result<BlockSigner, Error> {
        self.with_device(|d| {
            d.device_id.map(|device_id| {
                BlockSigner::new(
                    self.trustchain_id,
                    device_id,
                    d.signature_key_pair.private_key.clone(),
                )
            })
        })?
        .ok_or_else(|| Error::PreconditionFailed("device id is not known yet".into()))
    }

    // ── User keys ────────────────────────────────────────────────────────────

    pub async fn put_user_key_pair(&self, key_pair: &EncryptionKeyPair) -> Result<(), Error> {
        Ok(self.store.local_user().put_user_key_pair(key_pair).await?)
    }

    pub async fn find_user_key_pair(
        &self,
        public_key: &PublicEncryptionKey,
    ) -> Result<Option<EncryptionKeyPair>, Error> {
        Ok(self
            .store
            .local_user()
            .find_user_key_pair(public_key)
            .await?)
    }

    pub async fn current_user_key_pair(&self) -> Result<EncryptionKeyPair, Error> {
        self.store
            .local_user()
            .last_user_key_pair()
            .await?
            .ok_or_else(|| Error::PreconditionFailed("no user key available yet".into()))
    }
}
