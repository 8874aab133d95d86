//! Device revocation.
//!
//! v1 is only valid for users without a user key. v2 rotates the user key:
//! it names the previous public key, seals the *previous* private key to the
//! new one (so the rotated chain stays decryptable), and seals the new
//! private key to every other non-revoked device of the user.

use cv_crypto::{PublicEncryptionKey, SealedPrivateEncryptionKey};

use crate::error::ChainError;
use crate::ids::DeviceId;
use crate::nature::Nature;
use crate::ser::{Reader, WireDeserialize, WireSerialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRevocation1 {
    pub device_id: DeviceId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRevocation2 {
    pub device_id: DeviceId,
    /// The user key after rotation.
    pub public_encryption_key: PublicEncryptionKey,
    /// The user key being retired; must match the user's current key.
    pub previous_public_encryption_key: PublicEncryptionKey,
    /// Previous user private key sealed to the new user key.
    pub sealed_key_for_previous_user_key: SealedPrivateEncryptionKey,
    /// New user private key sealed to each remaining device.
    pub sealed_user_keys_for_devices: Vec<(DeviceId, SealedPrivateEncryptionKey)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceRevocation {
    V1(DeviceRevocation1),
    V2(DeviceRevocation2),
}

impl DeviceRevocation {
    pub fn nature(&self) -> Nature {
        match self {
            DeviceRevocation::V1(_) => Nature::DeviceRevocation1,
            DeviceRevocation::V2(_) => Nature::DeviceRevocation2,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        match self {
            DeviceRevocation::V1(r) => &r.device_id,
            DeviceRevocation::V2(r) => &r.device_id,
        }
    }
}

impl WireSerialize for DeviceRevocation1 {
    fn serialized_size(&self) -> usize {
        DeviceId::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.device_id.write(out);
    }
}

impl WireDeserialize for DeviceRevocation1 {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            device_id: DeviceId::read(reader)?,
        })
    }
}

impl WireSerialize for DeviceRevocation2 {
    fn serialized_size(&self) -> usize {
        DeviceId::SIZE
            + PublicEncryptionKey::SIZE * 2
            + SealedPrivateEncryptionKey::SIZE
            + self.sealed_user_keys_for_devices.serialized_size()
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.device_id.write(out);
        self.public_encryption_key.write(out);
        self.previous_public_encryption_key.write(out);
        self.sealed_key_for_previous_user_key.write(out);
        self.sealed_user_keys_for_devices.write(out);
    }
}

impl WireDeserialize for DeviceRevocation2 {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            device_id: DeviceId::read(reader)?,
            public_encryption_key: PublicEncryptionKey::read(reader)?,
            previous_public_encryption_key: PublicEncryptionKey::read(reader)?,
            sealed_key_for_previous_user_key: SealedPrivateEncryptionKey::read(reader)?,
            sealed_user_keys_for_devices: Vec::read(reader)?,
        })
    }
}
