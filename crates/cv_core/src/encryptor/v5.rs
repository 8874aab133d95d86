//! Format v5: `5 ‖ resource_id(16) ‖ iv(24) ‖ ciphertext ‖ mac(16)`.
//!
//! The caller supplies both the key and the resource id, which lets one key
//! serve many buffers (encryption sessions). The resource id is bound into
//! the AEAD as associated data, so a ciphertext cannot be re-labelled.

use cv_chain::ResourceId;
use cv_crypto::{aead, rand, AeadIv, Mac, SymmetricKey};

use crate::encryptor::{read_version, truncated, EncryptionMetadata};
use crate::error::Error;

pub const VERSION: u64 = 5;
const VERSION_SIZE: usize = 1;
const OVERHEAD: usize = ResourceId::SIZE + AeadIv::SIZE + Mac::SIZE;

pub fn encrypted_size(clear_size: usize) -> usize {
    VERSION_SIZE + ResourceId::SIZE + AeadIv::SIZE + aead::encrypted_size(clear_size)
}

fn check_format(encrypted: &[u8]) -> Result<&[u8], Error> {
    let (version, rest) = read_version(encrypted)?;
    debug_assert_eq!(version, VERSION);
    if rest.len() < OVERHEAD {
        return Err(truncated());
    }
    Ok(rest)
}

pub fn decrypted_size(encrypted: &[u8]) -> Result<usize, Error> {
    let rest = check_format(encrypted)?;
    Ok(aead::decrypted_size(rest.len() - ResourceId::SIZE - AeadIv::SIZE))
}

pub fn encrypt(
    clear: &[u8],
    resource_id: &ResourceId,
    key: &SymmetricKey,
) -> Result<(Vec<u8>, EncryptionMetadata), Error> {
    let iv = rand::make_aead_iv();
    let ciphertext = aead::aead_encrypt(key, &iv, clear, resource_id.as_ref())?;

    let mut out = Vec::with_capacity(encrypted_size(clear.len()));
    out.push(VERSION as u8);
    out.extend_from_slice(resource_id.as_ref());
    out.extend_from_slice(iv.as_ref());
    out.extend_from_slice(&ciphertext);

    Ok((
        out,
        EncryptionMetadata {
            resource_id: *resource_id,
            key: key.clone(),
        },
    ))
}

pub fn decrypt(key: &SymmetricKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
    let rest = check_format(encrypted)?;
    let (resource_id_bytes, rest) = rest.split_at(ResourceId::SIZE);
    let (iv_bytes, ciphertext) = rest.split_at(AeadIv::SIZE);
    let iv = AeadIv::try_from(iv_bytes)?;
    aead::aead_decrypt(key, &iv, ciphertext, resource_id_bytes)
        .map_err(|_| Error::DecryptionFailed("authentication tag mismatch".into()))
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, Error> {
    let rest = check_format(encrypted)?;
    Ok(ResourceId::try_from(&rest[..ResourceId::SIZE])?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [
        0x76, 0x0d, 0x8e, 0x80, 0x5c, 0xbc, 0xa8, 0xb6, 0xda, 0xea, 0xcf, 0x66, 0x46, 0xca,
        0xd7, 0xeb, 0x4f, 0x3a, 0xbc, 0x69, 0xac, 0x9b, 0xce, 0x77, 0x35, 0x8e, 0xa8, 0x31,
        0xd7, 0x2f, 0x14, 0xdd,
    ];
    const TEST_VECTOR: [u8; 76] = [
        0x05, 0xc1, 0x74, 0x53, 0x1e, 0xdd, 0x77, 0x77, 0x87, 0x2c, 0x02, 0x6e, 0xf2, 0x36,
        0xdf, 0x28, 0x7e, 0x70, 0xea, 0xb6, 0xe7, 0x72, 0x7d, 0xdd, 0x42, 0x5d, 0xa1, 0xab,
        0xb3, 0x6e, 0xd1, 0x8b, 0xea, 0xd7, 0xf5, 0xad, 0x23, 0xc0, 0xbd, 0x8c, 0x1f, 0x68,
        0xc7, 0x9e, 0xf2, 0xe9, 0xd8, 0x9e, 0xf9, 0x7e, 0x93, 0xc4, 0x29, 0x0d, 0x96, 0x40,
        0x2d, 0xbc, 0xf8, 0x0b, 0xb8, 0x4f, 0xfc, 0x48, 0x9b, 0x83, 0xd1, 0x05, 0x51, 0x40,
        0xfc, 0xc2, 0x7f, 0x6e, 0xd9, 0x16,
    ];

    #[test]
    fn sizes_are_symmetrical() {
        assert_eq!(encrypted_size(0), 1 + 16 + 24 + 16);
        assert_eq!(encrypted_size(1), 1 + 16 + 24 + 1 + 16);
        let mut buffer = vec![0u8; encrypted_size(42)];
        buffer[0] = VERSION as u8;
        assert_eq!(decrypted_size(&buffer).unwrap(), 42);
    }

    #[test]
    fn round_trip_with_session_key() {
        let key = SymmetricKey::from([7u8; 32]);
        let resource_id = ResourceId::from([8u8; 16]);
        let (encrypted, metadata) = encrypt(b"session payload", &resource_id, &key).unwrap();
        assert_eq!(metadata.resource_id, resource_id);
        assert_eq!(decrypt(&key, &encrypted).unwrap(), b"session payload");
        assert_eq!(extract_resource_id(&encrypted).unwrap(), resource_id);
    }

    #[test]
    fn decrypts_test_vector() {
        let key = SymmetricKey::from(KEY);
        assert_eq!(decrypted_size(&TEST_VECTOR).unwrap(), 19);
        assert_eq!(decrypt(&key, &TEST_VECTOR).unwrap(), b"this is very secret");
    }

    #[test]
    fn relabelled_resource_id_fails_decryption() {
        let key = SymmetricKey::from(KEY);
        let mut relabelled = TEST_VECTOR;
        relabelled[1] ^= 1;
        assert!(matches!(
            decrypt(&key, &relabelled),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn non_deterministic() {
        let key = SymmetricKey::from(KEY);
        let resource_id = ResourceId::from([1u8; 16]);
        let (a, _) = encrypt(b"same", &resource_id, &key).unwrap();
        let (b, _) = encrypt(b"same", &resource_id, &key).unwrap();
        assert_ne!(a, b);
    }
}
