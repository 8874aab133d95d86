//! Device creation.
//!
//! v1 registers a device for a user without a user key (legacy users).
//! v3 additionally carries the user's *current* public encryption key and
//! the user private key sealed to the new device, plus the ghost-device bit.
//!
//! The delegation signature is made by the author (trustchain for a first
//! device, an existing device otherwise) over
//! `ephemeral_public_signature_key ‖ user_id ‖ device public_signature_key`,
//! and the block itself is signed by the ephemeral key.

use cv_crypto::{
    PublicEncryptionKey, PublicSignatureKey, SealedPrivateEncryptionKey, Signature,
};

use crate::error::ChainError;
use crate::ids::UserId;
use crate::nature::Nature;
use crate::ser::{Reader, WireDeserialize, WireSerialize};

/// The user encryption key material carried by a v3 creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserKeyPair {
    pub public_encryption_key: PublicEncryptionKey,
    /// The user private encryption key, sealed to the new device's
    /// encryption key.
    pub sealed_private_encryption_key: SealedPrivateEncryptionKey,
}

impl WireSerialize for UserKeyPair {
    fn serialized_size(&self) -> usize {
        PublicEncryptionKey::SIZE + SealedPrivateEncryptionKey::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.public_encryption_key.write(out);
        self.sealed_private_encryption_key.write(out);
    }
}

impl WireDeserialize for UserKeyPair {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            public_encryption_key: PublicEncryptionKey::read(reader)?,
            sealed_private_encryption_key: SealedPrivateEncryptionKey::read(reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCreation1 {
    pub ephemeral_public_signature_key: PublicSignatureKey,
    pub user_id: UserId,
    pub delegation_signature: Signature,
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCreation3 {
    pub ephemeral_public_signature_key: PublicSignatureKey,
    pub user_id: UserId,
    pub delegation_signature: Signature,
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub user_key_pair: UserKeyPair,
    pub is_ghost_device: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCreation {
    V1(DeviceCreation1),
    V3(DeviceCreation3),
}

impl DeviceCreation {
    pub fn nature(&self) -> Nature {
        match self {
            DeviceCreation::V1(_) => Nature::DeviceCreation1,
            DeviceCreation::V3(_) => Nature::DeviceCreation3,
        }
    }

    pub fn ephemeral_public_signature_key(&self) -> &PublicSignatureKey {
        match self {
            DeviceCreation::V1(d) => &d.ephemeral_public_signature_key,
            DeviceCreation::V3(d) => &d.ephemeral_public_signature_key,
        }
    }

    pub fn user_id(&self) -> &UserId {
        match self {
            DeviceCreation::V1(d) => &d.user_id,
            DeviceCreation::V3(d) => &d.user_id,
        }
    }

    pub fn delegation_signature(&self) -> &Signature {
        match self {
            DeviceCreation::V1(d) => &d.delegation_signature,
            DeviceCreation::V3(d) => &d.delegation_signature,
        }
    }

    pub fn public_signature_key(&self) -> &PublicSignatureKey {
        match self {
            DeviceCreation::V1(d) => &d.public_signature_key,
            DeviceCreation::V3(d) => &d.public_signature_key,
        }
    }

    pub fn public_encryption_key(&self) -> &PublicEncryptionKey {
        match self {
            DeviceCreation::V1(d) => &d.public_encryption_key,
            DeviceCreation::V3(d) => &d.public_encryption_key,
        }
    }

    pub fn user_key_pair(&self) -> Option<&UserKeyPair> {
        match self {
            DeviceCreation::V1(_) => None,
            DeviceCreation::V3(d) => Some(&d.user_key_pair),
        }
    }

    pub fn is_ghost_device(&self) -> bool {
        match self {
            DeviceCreation::V1(_) => false,
            DeviceCreation::V3(d) => d.is_ghost_device,
        }
    }

    /// The bytes covered by the delegation signature.
    pub fn delegation_signature_data(&self) -> Vec<u8> {
        delegation_signature_data(
            self.ephemeral_public_signature_key(),
            self.user_id(),
            self.public_signature_key(),
        )
    }
}

/// `ephemeral_public_signature_key ‖ user_id ‖ device_public_signature_key`.
pub fn delegation_signature_data(
    ephemeral_public_signature_key: &PublicSignatureKey,
    user_id: &UserId,
    device_public_signature_key: &PublicSignatureKey,
) -> Vec<u8> {
    let mut data =
        Vec::with_capacity(PublicSignatureKey::SIZE * 2 + UserId::SIZE);
    data.extend_from_slice(ephemeral_public_signature_key.as_ref());
    data.extend_from_slice(user_id.as_ref());
    data.extend_from_slice(device_public_signature_key.as_ref());
    data
}

impl WireSerialize for DeviceCreation1 {
    fn serialized_size(&self) -> usize {
        PublicSignatureKey::SIZE
            + UserId::SIZE
            + Signature::SIZE
            + PublicSignatureKey::SIZE
            + PublicEncryptionKey::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.ephemeral_public_signature_key.write(out);
        self.user_id.write(out);
        self.delegation_signature.write(out);
        self.public_signature_key.write(out);
        self.public_encryption_key.write(out);
    }
}

impl WireDeserialize for DeviceCreation1 {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            ephemeral_public_signature_key: PublicSignatureKey::read(reader)?,
            user_id: UserId::read(reader)?,
            delegation_signature: Signature::read(reader)?,
            public_signature_key: PublicSignatureKey::read(reader)?,
            public_encryption_key: PublicEncryptionKey::read(reader)?,
        })
    }
}

impl WireSerialize for DeviceCreation3 {
    fn serialized_size(&self) -> usize {
        PublicSignatureKey::SIZE
            + UserId::SIZE
            + Signature::SIZE
            + PublicSignatureKey::SIZE
            + PublicEncryptionKey::SIZE
            + self.user_key_pair.serialized_size()
            + 1
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.ephemeral_public_signature_key.write(out);
        self.user_id.write(out);
        self.delegation_signature.write(out);
        self.public_signature_key.write(out);
        self.public_encryption_key.write(out);
        self.user_key_pair.write(out);
        self.is_ghost_device.write(out);
    }
}

impl WireDeserialize for DeviceCreation3 {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            ephemeral_public_signature_key: PublicSignatureKey::read(reader)?,
            user_id: UserId::read(reader)?,
            delegation_signature: Signature::read(reader)?,
            public_signature_key: PublicSignatureKey::read(reader)?,
            public_encryption_key: PublicEncryptionKey::read(reader)?,
            user_key_pair: UserKeyPair::read(reader)?,
            is_ghost_device: bool::read(reader)?,
        })
    }
}
