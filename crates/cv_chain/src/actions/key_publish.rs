//! Key publishes: a resource's symmetric key sealed to one recipient.
//!
//! `ToDevice` is a legacy format kept for reading old chains; new publishes
//! target a user key, a group key or a provisional identity.

use cv_crypto::{
    PublicEncryptionKey, PublicSignatureKey, SealedSymmetricKey, TwoTimesSealedSymmetricKey,
};

use crate::error::ChainError;
use crate::ids::{DeviceId, ResourceId};
use crate::nature::Nature;
use crate::ser::{Reader, WireDeserialize, WireSerialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPublishToDevice {
    pub recipient: DeviceId,
    pub resource_id: ResourceId,
    pub sealed_symmetric_key: SealedSymmetricKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPublishToUser {
    pub recipient_public_encryption_key: PublicEncryptionKey,
    pub resource_id: ResourceId,
    pub sealed_symmetric_key: SealedSymmetricKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPublishToUserGroup {
    pub recipient_public_encryption_key: PublicEncryptionKey,
    pub resource_id: ResourceId,
    pub sealed_symmetric_key: SealedSymmetricKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPublishToProvisionalUser {
    pub app_public_signature_key: PublicSignatureKey,
    pub provider_public_signature_key: PublicSignatureKey,
    pub resource_id: ResourceId,
    /// Sealed to the provider encryption key, then to the app encryption key.
    pub two_times_sealed_symmetric_key: TwoTimesSealedSymmetricKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPublish {
    ToDevice(KeyPublishToDevice),
    ToUser(KeyPublishToUser),
    ToUserGroup(KeyPublishToUserGroup),
    ToProvisionalUser(KeyPublishToProvisionalUser),
}

impl KeyPublish {
    pub fn nature(&self) -> Nature {
        match self {
            KeyPublish::ToDevice(_) => Nature::KeyPublishToDevice,
            KeyPublish::ToUser(_) => Nature::KeyPublishToUser,
            KeyPublish::ToUserGroup(_) => Nature::KeyPublishToUserGroup,
            KeyPublish::ToProvisionalUser(_) => Nature::KeyPublishToProvisionalUser,
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        match self {
            KeyPublish::ToDevice(kp) => &kp.resource_id,
            KeyPublish::ToUser(kp) => &kp.resource_id,
            KeyPublish::ToUserGroup(kp) => &kp.resource_id,
            KeyPublish::ToProvisionalUser(kp) => &kp.resource_id,
        }
    }
}

impl WireSerialize for KeyPublishToDevice {
    fn serialized_size(&self) -> usize {
        DeviceId::SIZE + ResourceId::SIZE + SealedSymmetricKey::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.recipient.write(out);
        self.resource_id.write(out);
        self.sealed_symmetric_key.write(out);
    }
}

impl WireDeserialize for KeyPublishToDevice {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            recipient: DeviceId::read(reader)?,
            resource_id: ResourceId::read(reader)?,
            sealed_symmetric_key: SealedSymmetricKey::read(reader)?,
        })
    }
}

impl WireSerialize for KeyPublishToUser {
    fn serialized_size(&self) -> usize {
        PublicEncryptionKey::SIZE + ResourceId::SIZE + SealedSymmetricKey::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.recipient_public_encryption_key.write(out);
        self.resource_id.write(out);
        self.sealed_symmetric_key.write(out);
    }
}

impl WireDeserialize for KeyPublishToUser {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            recipient_public_encryption_key: PublicEncryptionKey::read(reader)?,
            resource_id: ResourceId::read(reader)?,
            sealed_symmetric_key: SealedSymmetricKey::read(reader)?,
        })
    }
}

impl WireSerialize for KeyPublishToUserGroup {
    fn serialized_size(&self) -> usize {
        PublicEncryptionKey::SIZE + ResourceId::SIZE + SealedSymmetricKey::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.recipient_public_encryption_key.write(out);
        self.resource_id.write(out);
        self.sealed_symmetric_key.write(out);
    }
}

impl WireDeserialize for KeyPublishToUserGroup {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            recipient_public_encryption_key: PublicEncryptionKey::read(reader)?,
            resource_id: ResourceId::read(reader)?,
            sealed_symmetric_key: SealedSymmetricKey::read(reader)?,
        })
    }
}

impl WireSerialize for KeyPublishToProvisionalUser {
    fn serialized_size(&self) -> usize {
        PublicSignatureKey::SIZE * 2 + ResourceId::SIZE + TwoTimesSealedSymmetricKey::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.app_public_signature_key.write(out);
        self.provider_public_signature_key.write(out);
        self.resource_id.write(out);
        self.two_times_sealed_symmetric_key.write(out);
    }
}

impl WireDeserialize for KeyPublishToProvisionalUser {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            app_public_signature_key: PublicSignatureKey::read(reader)?,
            provider_public_signature_key: PublicSignatureKey::read(reader)?,
            resource_id: ResourceId::read(reader)?,
            two_times_sealed_symmetric_key: TwoTimesSealedSymmetricKey::read(reader)?,
        })
    }
}
