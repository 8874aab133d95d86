//! OS randomness helpers.

use rand::rngs::OsRng;
use rand::RngCore;

use crate::types::{AeadIv, SymmetricKey};

/// Fill `out` with OS randomness.
pub fn random_fill(out: &mut [u8]) {
    OsRng.fill_bytes(out);
}

/// Fresh 32-byte symmetric key.
pub fn make_symmetric_key() -> SymmetricKey {
    let mut bytes = [0u8; SymmetricKey::SIZE];
    OsRng.fill_bytes(&mut bytes);
    SymmetricKey::from(bytes)
}

/// Fresh 24-byte AEAD nonce.
pub fn make_aead_iv() -> AeadIv {
    let mut bytes = [0u8; AeadIv::SIZE];
    OsRng.fill_bytes(&mut bytes);
    AeadIv::from(bytes)
}
