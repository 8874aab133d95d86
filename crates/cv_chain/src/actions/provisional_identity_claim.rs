//! Claim of a provisional identity by a registered user.
//!
//! Proves control of both identity halves: the app half and the provider
//! half each sign `author_device_id ‖ app_pub_sig ‖ provider_pub_sig`. The
//! two private encryption keys travel sealed to the claiming user's current
//! user key so every device of that user can recover past publishes.

use cv_crypto::{
    PublicEncryptionKey, PublicSignatureKey, SealedPrivateEncryptionKeyPair, Signature,
};

use crate::error::ChainError;
use crate::ids::{DeviceId, UserId};
use crate::ser::{Reader, WireDeserialize, WireSerialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalIdentityClaim {
    pub user_id: UserId,
    pub app_public_signature_key: PublicSignatureKey,
    pub provider_public_signature_key: PublicSignatureKey,
    pub author_signature_by_app_key: Signature,
    pub author_signature_by_provider_key: Signature,
    /// The claiming user's current public user key.
    pub recipient_user_public_key: PublicEncryptionKey,
    /// `app_private_encryption_key ‖ provider_private_encryption_key`,
    /// sealed to `recipient_user_public_key`.
    pub sealed_private_encryption_keys: SealedPrivateEncryptionKeyPair,
}

impl ProvisionalIdentityClaim {
    /// Bytes covered by both inner signatures.
    pub fn signature_data(&self, author_device_id: &DeviceId) -> Vec<u8> {
        let mut data =
            Vec::with_capacity(DeviceId::SIZE + PublicSignatureKey::SIZE * 2);
        data.extend_from_slice(author_device_id.as_ref());
        data.extend_from_slice(self.app_public_signature_key.as_ref());
        data.extend_from_slice(self.provider_public_signature_key.as_ref());
        data
    }
}

impl WireSerialize for ProvisionalIdentityClaim {
    fn serialized_size(&self) -> usize {
        UserId::SIZE
            + PublicSignatureKey::SIZE * 2
            + Signature::SIZE * 2
            + PublicEncryptionKey::SIZE
            + SealedPrivateEncryptionKeyPair::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.user_id.write(out);
        self.app_public_signature_key.write(out);
        self.provider_public_signature_key.write(out);
        self.author_signature_by_app_key.write(out);
        self.author_signature_by_provider_key.write(out);
        self.recipient_user_public_key.write(out);
        self.sealed_private_encryption_keys.write(out);
    }
}

impl WireDeserialize for ProvisionalIdentityClaim {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            user_id: UserId::read(reader)?,
            app_public_signature_key: PublicSignatureKey::read(reader)?,
            provider_public_signature_key: PublicSignatureKey::read(reader)?,
            author_signature_by_app_key: Signature::read(reader)?,
            author_signature_by_provider_key: Signature::read(reader)?,
            recipient_user_public_key: PublicEncryptionKey::read(reader)?,
            sealed_private_encryption_keys: SealedPrivateEncryptionKeyPair::read(reader)?,
        })
    }
}
