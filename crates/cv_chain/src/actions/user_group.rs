//! Group creation and membership additions.
//!
//! A group owns a signature keypair (its public half is the group id) and an
//! encryption keypair. The private encryption key travels sealed to each
//! member's user key; the private signature key travels sealed to the group
//! encryption key, so any member can unseal it and sign the next membership
//! change. Both actions carry a *self-signature* made with the group
//! signature key over the payload bytes up to the signature field.
//!
//! v2 member entries name the member's user id next to its key, which lets a
//! reader find its own entry without trial decryption; v1 entries are keyed
//! by user public encryption key only. Provisional members appear in v2 with
//! the group private key sealed twice (provider envelope inside app
//! envelope), claimable once both identity halves fuse.

use cv_crypto::{
    PublicEncryptionKey, PublicSignatureKey, SealedPrivateEncryptionKey,
    SealedPrivateSignatureKey, Signature, TwoTimesSealedPrivateEncryptionKey,
};

use crate::error::ChainError;
use crate::ids::{GroupId, UserId};
use crate::nature::Nature;
use crate::ser::{Reader, WireDeserialize, WireSerialize};
use cv_crypto::Hash;

/// v2 member entry: `(user_id, user_pub_enc, sealed_group_priv_enc)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupMember2 {
    pub user_id: UserId,
    pub public_encryption_key: PublicEncryptionKey,
    pub sealed_private_encryption_key: SealedPrivateEncryptionKey,
}

/// v2 provisional member entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupProvisionalMember2 {
    pub app_public_signature_key: PublicSignatureKey,
    pub provider_public_signature_key: PublicSignatureKey,
    pub two_times_sealed_private_encryption_key: TwoTimesSealedPrivateEncryptionKey,
}

impl WireSerialize for GroupMember2 {
    fn serialized_size(&self) -> usize {
        UserId::SIZE + PublicEncryptionKey::SIZE + SealedPrivateEncryptionKey::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.user_id.write(out);
        self.public_encryption_key.write(out);
        self.sealed_private_encryption_key.write(out);
    }
}

impl WireDeserialize for GroupMember2 {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            user_id: UserId::read(reader)?,
            public_encryption_key: PublicEncryptionKey::read(reader)?,
            sealed_private_encryption_key: SealedPrivateEncryptionKey::read(reader)?,
        })
    }
}

impl WireSerialize for GroupProvisionalMember2 {
    fn serialized_size(&self) -> usize {
        PublicSignatureKey::SIZE * 2 + TwoTimesSealedPrivateEncryptionKey::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.app_public_signature_key.write(out);
        self.provider_public_signature_key.write(out);
        self.two_times_sealed_private_encryption_key.write(out);
    }
}

impl WireDeserialize for GroupProvisionalMember2 {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            app_public_signature_key: PublicSignatureKey::read(reader)?,
            provider_public_signature_key: PublicSignatureKey::read(reader)?,
            two_times_sealed_private_encryption_key:
                TwoTimesSealedPrivateEncryptionKey::read(reader)?,
        })
    }
}

// ── UserGroupCreation ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupCreation1 {
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub sealed_private_signature_key: SealedPrivateSignatureKey,
    pub sealed_private_encryption_keys_for_users:
        Vec<(PublicEncryptionKey, SealedPrivateEncryptionKey)>,
    pub self_signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupCreation2 {
    pub public_signature_key: PublicSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub sealed_private_signature_key: SealedPrivateSignatureKey,
    pub members: Vec<GroupMember2>,
    pub provisional_members: Vec<GroupProvisionalMember2>,
    pub self_signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserGroupCreation {
    V1(UserGroupCreation1),
    V2(UserGroupCreation2),
}

impl UserGroupCreation {
    pub fn nature(&self) -> Nature {
        match self {
            UserGroupCreation::V1(_) => Nature::UserGroupCreation1,
            UserGroupCreation::V2(_) => Nature::UserGroupCreation2,
        }
    }

    pub fn group_id(&self) -> GroupId {
        GroupId::from(*self.public_signature_key())
    }

    pub fn public_signature_key(&self) -> &PublicSignatureKey {
        match self {
            UserGroupCreation::V1(g) => &g.public_signature_key,
            UserGroupCreation::V2(g) => &g.public_signature_key,
        }
    }

    pub fn public_encryption_key(&self) -> &PublicEncryptionKey {
        match self {
            UserGroupCreation::V1(g) => &g.public_encryption_key,
            UserGroupCreation::V2(g) => &g.public_encryption_key,
        }
    }

    pub fn sealed_private_signature_key(&self) -> &SealedPrivateSignatureKey {
        match self {
            UserGroupCreation::V1(g) => &g.sealed_private_signature_key,
            UserGroupCreation::V2(g) => &g.sealed_private_signature_key,
        }
    }

    pub fn self_signature(&self) -> &Signature {
        match self {
            UserGroupCreation::V1(g) => &g.self_signature,
            UserGroupCreation::V2(g) => &g.self_signature,
        }
    }

    /// The payload bytes covered by the self-signature: everything up to the
    /// signature field.
    pub fn signature_data(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.serialized_size() - Signature::SIZE);
        match self {
            UserGroupCreation::V1(g) => {
                g.public_signature_key.write(&mut buf);
                g.public_encryption_key.write(&mut buf);
                g.sealed_private_signature_key.write(&mut buf);
                g.sealed_private_encryption_keys_for_users.write(&mut buf);
            }
            UserGroupCreation::V2(g) => {
                g.public_signature_key.write(&mut buf);
                g.public_encryption_key.write(&mut buf);
                g.sealed_private_signature_key.write(&mut buf);
                g.members.write(&mut buf);
                g.provisional_members.write(&mut buf);
            }
        }
        buf
    }

    fn serialized_size(&self) -> usize {
        match self {
            UserGroupCreation::V1(g) => g.serialized_size(),
            UserGroupCreation::V2(g) => g.serialized_size(),
        }
    }
}

impl WireSerialize for UserGroupCreation1 {
    fn serialized_size(&self) -> usize {
        PublicSignatureKey::SIZE
            + PublicEncryptionKey::SIZE
            + SealedPrivateSignatureKey::SIZE
            + self.sealed_private_encryption_keys_for_users.serialized_size()
            + Signature::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.public_signature_key.write(out);
        self.public_encryption_key.write(out);
        self.sealed_private_signature_key.write(out);
        self.sealed_private_encryption_keys_for_users.write(out);
        self.self_signature.write(out);
    }
}

impl WireDeserialize for UserGroupCreation1 {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            public_signature_key: PublicSignatureKey::read(reader)?,
            public_encryption_key: PublicEncryptionKey::read(reader)?,
            sealed_private_signature_key: SealedPrivateSignatureKey::read(reader)?,
            sealed_private_encryption_keys_for_users: Vec::read(reader)?,
            self_signature: Signature::read(reader)?,
        })
    }
}

impl WireSerialize for UserGroupCreation2 {
    fn serialized_size(&self) -> usize {
        PublicSignatureKey::SIZE
            + PublicEncryptionKey::SIZE
            + SealedPrivateSignatureKey::SIZE
            + self.members.serialized_size()
            + self.provisional_members.serialized_size()
            + Signature::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.public_signature_key.write(out);
        self.public_encryption_key.write(out);
        self.sealed_private_signature_key.write(out);
        self.members.write(out);
        self.provisional_members.write(out);
        self.self_signature.write(out);
    }
}

impl WireDeserialize for UserGroupCreation2 {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            public_signature_key: PublicSignatureKey::read(reader)?,
            public_encryption_key: PublicEncryptionKey::read(reader)?,
            sealed_private_signature_key: SealedPrivateSignatureKey::read(reader)?,
            members: Vec::read(reader)?,
            provisional_members: Vec::read(reader)?,
            self_signature: Signature::read(reader)?,
        })
    }
}

// ── UserGroupAddition ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupAddition1 {
    pub group_id: GroupId,
    pub previous_group_block_hash: Hash,
    pub sealed_private_encryption_keys_for_users:
        Vec<(PublicEncryptionKey, SealedPrivateEncryptionKey)>,
    pub self_signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserGroupAddition2 {
    pub group_id: GroupId,
    pub previous_group_block_hash: Hash,
    pub members: Vec<GroupMember2>,
    pub provisional_members: Vec<GroupProvisionalMember2>,
    pub self_signature: Signature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserGroupAddition {
    V1(UserGroupAddition1),
    V2(UserGroupAddition2),
}

impl UserGroupAddition {
    pub fn nature(&self) -> Nature {
        match self {
            UserGroupAddition::V1(_) => Nature::UserGroupAddition1,
            UserGroupAddition::V2(_) => Nature::UserGroupAddition2,
        }
    }

    pub fn group_id(&self) -> &GroupId {
        match self {
            UserGroupAddition::V1(g) => &g.group_id,
            UserGroupAddition::V2(g) => &g.group_id,
        }
    }

    pub fn previous_group_block_hash(&self) -> &Hash {
        match self {
            UserGroupAddition::V1(g) => &g.previous_group_block_hash,
            UserGroupAddition::V2(g) => &g.previous_group_block_hash,
        }
    }

    pub fn self_signature(&self) -> &Signature {
        match self {
            UserGroupAddition::V1(g) => &g.self_signature,
            UserGroupAddition::V2(g) => &g.self_signature,
        }
    }

    /// The payload bytes covered by the self-signature.
    pub fn signature_data(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        match self {
            UserGroupAddition::V1(g) => {
                g.group_id.write(&mut buf);
                g.previous_group_block_hash.write(&mut buf);
                g.sealed_private_encryption_keys_for_users.write(&mut buf);
            }
            UserGroupAddition::V2(g) => {
                g.group_id.write(&mut buf);
                g.previous_group_block_hash.write(&mut buf);
                g.members.write(&mut buf);
                g.provisional_members.write(&mut buf);
            }
        }
        buf
    }
}

impl WireSerialize for UserGroupAddition1 {
    fn serialized_size(&self) -> usize {
        GroupId::SIZE
            + Hash::SIZE
            + self.sealed_private_encryption_keys_for_users.serialized_size()
            + Signature::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.group_id.write(out);
        self.previous_group_block_hash.write(out);
        self.sealed_private_encryption_keys_for_users.write(out);
        self.self_signature.write(out);
    }
}

impl WireDeserialize for UserGroupAddition1 {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            group_id: GroupId::read(reader)?,
            previous_group_block_hash: Hash::read(reader)?,
            sealed_private_encryption_keys_for_users: Vec::read(reader)?,
            self_signature: Signature::read(reader)?,
        })
    }
}

impl WireSerialize for UserGroupAddition2 {
    fn serialized_size(&self) -> usize {
        GroupId::SIZE
            + Hash::SIZE
            + self.members.serialized_size()
            + self.provisional_members.serialized_size()
            + Signature::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.group_id.write(out);
        self.previous_group_block_hash.write(out);
        self.members.write(out);
        self.provisional_members.write(out);
        self.self_signature.write(out);
    }
}

impl WireDeserialize for UserGroupAddition2 {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            group_id: GroupId::read(reader)?,
            previous_group_block_hash: Hash::read(reader)?,
            members: Vec::read(reader)?,
            provisional_members: Vec::read(reader)?,
            self_signature: Signature::read(reader)?,
        })
    }
}
