//! Block envelope, hashing and wire layout.
//!
//! A block's hash covers `varint(nature) ‖ author ‖ payload`. The block
//! signature is made over that hash by the author (the ephemeral key for
//! device creations, the device key otherwise); the root block carries a
//! zero author and a zero signature, and its hash is the trustchain id.
//!
//! Wire layout:
//! `varint(version=1) ‖ varint(nature) ‖ varint(index or 0) ‖
//!  trustchain_id(32) ‖ varint(payload_len) ‖ payload ‖ author(32) ‖
//!  signature(64)`
//! The index is server-assigned; clients push with 0 and the server echoes
//! the real value on reads.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use cv_crypto::{
    hash::generic_hash_parts, sign, Hash, PrivateSignatureKey, Signature,
};

use crate::actions::Action;
use crate::error::ChainError;
use crate::ids::TrustchainId;
use crate::nature::Nature;
use crate::ser::{varint_size, write_varint, Reader};

const BLOCK_WIRE_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub trustchain_id: TrustchainId,
    pub nature: Nature,
    pub author: Hash,
    pub payload: Vec<u8>,
    pub signature: Signature,
}

impl Block {
    /// `generic_hash(varint(nature) ‖ author ‖ payload)`.
    pub fn hash(&self) -> Hash {
        compute_hash(self.nature, &self.author, &self.payload)
    }

    /// Serialize an action, hash it, and sign the hash.
    pub fn sign(
        trustchain_id: TrustchainId,
        author: Hash,
        action: &Action,
        key: &PrivateSignatureKey,
    ) -> Block {
        let payload = action.serialize_payload();
        let nature = action.nature();
        let hash = compute_hash(nature, &author, &payload);
        let signature = sign::sign(hash.as_ref(), key);
        Block {
            trustchain_id,
            nature,
            author,
            payload,
            signature,
        }
    }

    /// Wire bytes with the given index (0 when pushing).
    pub fn to_wire(&self, index: u64) -> Vec<u8> {
        let payload_len = self.payload.len() as u64;
        let size = varint_size(BLOCK_WIRE_VERSION)
            + varint_size(u64::from(self.nature.code()))
            + varint_size(index)
            + TrustchainId::SIZE
            + varint_size(payload_len)
            + self.payload.len()
            + Hash::SIZE
            + Signature::SIZE;
        let mut out = Vec::with_capacity(size);
        write_varint(&mut out, BLOCK_WIRE_VERSION);
        write_varint(&mut out, u64::from(self.nature.code()));
        write_varint(&mut out, index);
        out.extend_from_slice(self.trustchain_id.as_ref());
        write_varint(&mut out, payload_len);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(self.author.as_ref());
        out.extend_from_slice(self.signature.as_ref());
        debug_assert_eq!(out.len(), size);
        out
    }

    pub fn to_base64(&self, index: u64) -> String {
        STANDARD.encode(self.to_wire(index))
    }
}

fn compute_hash(nature: Nature, author: &Hash, payload: &[u8]) -> Hash {
    let mut nature_bytes = Vec::with_capacity(varint_size(u64::from(nature.code())));
    write_varint(&mut nature_bytes, u64::from(nature.code()));
    generic_hash_parts(&[&nature_bytes, author.as_ref(), payload])
}

/// The root block of a chain. Its hash becomes the trustchain id, which the
/// block also carries.
pub fn make_trustchain_root(
    public_signature_key: cv_crypto::PublicSignatureKey,
) -> (TrustchainId, Block) {
    let action = Action::TrustchainCreation(crate::actions::TrustchainCreation {
        public_signature_key,
    });
    let payload = action.serialize_payload();
    let author = Hash::default();
    let hash = compute_hash(Nature::TrustchainCreation, &author, &payload);
    let trustchain_id = TrustchainId::from(hash);
    let block = Block {
        trustchain_id,
        nature: Nature::TrustchainCreation,
        author,
        payload,
        signature: Signature::default(),
    };
    (trustchain_id, block)
}

/// A block as returned by the server: parsed, indexed, and hashed locally.
/// The hash is always recomputed from the received bytes, never trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEntry {
    pub index: u64,
    pub trustchain_id: TrustchainId,
    pub nature: Nature,
    pub author: Hash,
    pub action: Action,
    pub payload: Vec<u8>,
    pub hash: Hash,
    pub signature: Signature,
}

impl ServerEntry {
    pub fn from_wire(data: &[u8]) -> Result<Self, ChainError> {
        let mut reader = Reader::new(data);
        let version = reader.read_varint()?;
        if version != BLOCK_WIRE_VERSION {
            return Err(ChainError::UnsupportedBlockVersion(version));
        }
        let nature = Nature::try_from(reader.read_varint()?)?;
        let index = reader.read_varint()?;
        let trustchain_id = TrustchainId::try_from(reader.read_exact(TrustchainId::SIZE)?)?;
        let payload_len = reader.read_varint()? as usize;
        let payload = reader.read_exact(payload_len)?.to_vec();
        let author = Hash::try_from(reader.read_exact(Hash::SIZE)?)?;
        let signature = Signature::try_from(reader.read_exact(Signature::SIZE)?)?;
        reader.expect_eof()?;

        let action = Action::deserialize_payload(nature, &payload)?;
        let hash = compute_hash(nature, &author, &payload);
        Ok(Self {
            index,
            trustchain_id,
            nature,
            author,
            action,
            payload,
            hash,
            signature,
        })
    }

    pub fn from_base64(data: &str) -> Result<Self, ChainError> {
        let bytes = STANDARD
            .decode(data)
            .map_err(cv_crypto::CryptoError::Base64Decode)?;
        Self::from_wire(&bytes)
    }

    pub fn to_block(&self) -> Block {
        Block {
            trustchain_id: self.trustchain_id,
            nature: self.nature,
            author: self.author,
            payload: self.payload.clone(),
            signature: self.signature,
        }
    }
}

/// A verified, indexed entry; what the appliers and stores consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedEntry {
    pub index: u64,
    pub nature: Nature,
    pub author: Hash,
    pub action: Action,
    pub hash: Hash,
}

impl VerifiedEntry {
    pub fn of(entry: &ServerEntry) -> Self {
        Self {
            index: entry.index,
            nature: entry.nature,
            author: entry.author,
            action: entry.action.clone(),
            hash: entry.hash,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::TrustchainCreation;
    use cv_crypto::sign::make_signature_key_pair;
    use cv_crypto::PublicSignatureKey;

    fn sample_block() -> (Block, cv_crypto::SignatureKeyPair) {
        let kp = make_signature_key_pair();
        let action = Action::TrustchainCreation(TrustchainCreation {
            public_signature_key: PublicSignatureKey::from([1u8; 32]),
        });
        let block = Block::sign(
            TrustchainId::from([2u8; 32]),
            Hash::from([3u8; 32]),
            &action,
            &kp.private_key,
        );
        (block, kp)
    }

    #[test]
    fn signature_covers_hash() {
        let (block, kp) = sample_block();
        assert!(cv_crypto::sign::verify(
            block.hash().as_ref(),
            &block.signature,
            &kp.public_key
        ));
    }

    #[test]
    fn wire_round_trip() {
        let (block, _) = sample_block();
        let wire = block.to_wire(42);
        let entry = ServerEntry::from_wire(&wire).unwrap();
        assert_eq!(entry.index, 42);
        assert_eq!(entry.nature, Nature::TrustchainCreation);
        assert_eq!(entry.trustchain_id, block.trustchain_id);
        assert_eq!(entry.author, block.author);
        assert_eq!(entry.signature, block.signature);
        assert_eq!(entry.hash, block.hash());
        assert_eq!(entry.to_block(), block);
    }

    #[test]
    fn base64_round_trip() {
        let (block, _) = sample_block();
        let entry = ServerEntry::from_base64(&block.to_base64(7)).unwrap();
        assert_eq!(entry.index, 7);
    }

    #[test]
    fn truncated_wire_fails() {
        let (block, _) = sample_block();
        let wire = block.to_wire(1);
        assert!(ServerEntry::from_wire(&wire[..wire.len() - 1]).is_err());
    }

    #[test]
    fn root_block_hash_is_the_trustchain_id() {
        let kp = make_signature_key_pair();
        let (id, root) = make_trustchain_root(kp.public_key);
        assert_eq!(Hash::from(id), root.hash());
        assert!(root.author.is_zero());
        assert!(root.signature.is_zero());
    }

    #[test]
    fn hash_binds_nature_author_and_payload() {
        let (block, _) = sample_block();
        let mut other = block.clone();
        other.author = Hash::from([9u8; 32]);
        assert_ne!(block.hash(), other.hash());
        let mut tampered = block.clone();
        tampered.payload[0] ^= 1;
        assert_ne!(block.hash(), tampered.hash());
    }
}
