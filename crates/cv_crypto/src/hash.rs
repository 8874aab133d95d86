//! Blake2b-256 generic hash.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::types::Hash;

type Blake2b256 = Blake2b<U32>;

/// Unkeyed 32-byte Blake2b digest.
pub fn generic_hash(data: &[u8]) -> Hash {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    let digest: [u8; 32] = hasher.finalize().into();
    Hash::from(digest)
}

/// Hash several segments as one message, without concatenating them first.
pub fn generic_hash_parts(parts: &[&[u8]]) -> Hash {
    let mut hasher = Blake2b256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest: [u8; 32] = hasher.finalize().into();
    Hash::from(digest)
}
