//! Records the stores hand out.

use cv_chain::{DeviceId, GroupId, UserId};
use cv_crypto::{
    EncryptionKeyPair, Hash, PublicEncryptionKey, PublicSignatureKey,
    SealedPrivateSignatureKey, SignatureKeyPair, TwoTimesSealedPrivateEncryptionKey,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub id: DeviceId,
    pub user_id: UserId,
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub created_at_index: u64,
    pub revoked_at_index: Option<u64>,
    pub is_ghost: bool,
}

impl Device {
    /// A device is revoked *at* an index once that index is reached.
    pub fn is_revoked_at(&self, index: u64) -> bool {
        matches!(self.revoked_at_index, Some(at) if at <= index)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    /// The user's current public user key; `None` for legacy v1-only users.
    pub user_key: Option<PublicEncryptionKey>,
    pub devices: Vec<Device>,
}

impl User {
    pub fn find_device(&self, device_id: &DeviceId) -> Option<&Device> {
        self.devices.iter().find(|d| d.id == *device_id)
    }
}

/// A group we belong to: both private keys are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalGroup {
    pub id: GroupId,
    pub signature_key_pair: SignatureKeyPair,
    pub encryption_key_pair: EncryptionKeyPair,
    pub last_block_hash: Hash,
    pub last_block_index: u64,
}

/// A group we only observe: public keys plus the sealed private signature
/// key we cannot open (yet).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalGroup {
    pub id: GroupId,
    pub public_signature_key: PublicSignatureKey,
    pub sealed_private_signature_key: SealedPrivateSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub last_block_hash: Hash,
    pub last_block_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Group {
    Internal(InternalGroup),
    External(ExternalGroup),
}

impl Group {
    pub fn id(&self) -> &GroupId {
        match self {
            Group::Internal(g) => &g.id,
            Group::External(g) => &g.id,
        }
    }

    pub fn public_signature_key(&self) -> &PublicSignatureKey {
        match self {
            Group::Internal(g) => &g.signature_key_pair.public_key,
            Group::External(g) => &g.public_signature_key,
        }
    }

    pub fn public_encryption_key(&self) -> &PublicEncryptionKey {
        match self {
            Group::Internal(g) => &g.encryption_key_pair.public_key,
            Group::External(g) => &g.public_encryption_key,
        }
    }

    pub fn last_block_hash(&self) -> &Hash {
        match self {
            Group::Internal(g) => &g.last_block_hash,
            Group::External(g) => &g.last_block_hash,
        }
    }

    pub fn last_block_index(&self) -> u64 {
        match self {
            Group::Internal(g) => g.last_block_index,
            Group::External(g) => g.last_block_index,
        }
    }
}

/// Both halves of a claimed provisional identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalUserKeys {
    pub app_keys: EncryptionKeyPair,
    pub provider_keys: EncryptionKeyPair,
}

/// A group private key sealed to a not-yet-claimed provisional identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupProvisionalKey {
    pub app_public_signature_key: PublicSignatureKey,
    pub provider_public_signature_key: PublicSignatureKey,
    pub two_times_sealed_private_encryption_key: TwoTimesSealedPrivateEncryptionKey,
}
