//! Format v2: `2 ‖ iv(24) ‖ ciphertext ‖ mac(16)`. Deprecated for writing,
//! still decryptable.

use cv_chain::ResourceId;
use cv_crypto::{aead, rand, AeadIv, Mac, SymmetricKey};

use crate::encryptor::{read_version, truncated, EncryptionMetadata};
use crate::error::Error;

pub const VERSION: u64 = 2;
const VERSION_SIZE: usize = 1;
const OVERHEAD: usize = AeadIv::SIZE + Mac::SIZE;

pub fn encrypted_size(clear_size: usize) -> usize {
    VERSION_SIZE + AeadIv::SIZE + aead::encrypted_size(clear_size)
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
    Ok(aead::decrypted_size(rest.len() - AeadIv::SIZE))
}

pub fn encrypt(clear: &[u8]) -> Result<(Vec<u8>, EncryptionMetadata), Error> {
    let key = rand::make_symmetric_key();
    let iv = rand::make_aead_iv();
    let ciphertext = aead::aead_encrypt(&key, &iv, clear, &[])?;

    let mut out = Vec::with_capacity(encrypted_size(clear.len()));
    out.push(VERSION as u8);
    out.extend_from_slice(iv.as_ref());
    out.extend_from_slice(&ciphertext);

    let resource_id = ResourceId::from(aead::extract_mac(&ciphertext)?);
    Ok((out, EncryptionMetadata { resource_id, key }))
}

pub fn decrypt(key: &SymmetricKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
    let rest = check_format(encrypted)?;
    let (iv_bytes, ciphertext) = rest.split_at(AeadIv::SIZE);
    let iv = AeadIv::try_from(iv_bytes)?;
    aead::aead_decrypt(key, &iv, ciphertext, &[])
        .map_err(|_| Error::DecryptionFailed("authentication tag mismatch".into()))
}

pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, Error> {
    let rest = check_format(encrypted)?;
    Ok(ResourceId::from(
        aead::extract_mac(rest).map_err(|_| truncated())?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Byte-exact vector: XChaCha20-Poly1305 with the IV carried in the
    // header and no associated data.
    const KEY: [u8; 32] = [
        0x76, 0x0d, 0x8e, 0x80, 0x5c, 0xbc, 0xa8, 0xb6, 0xda, 0xea, 0xcf, 0x66, 0x46, 0xca,
        0xd7, 0xeb, 0x4f, 0x3a, 0xbc, 0x69, 0xac, 0x9b, 0xce, 0x77, 0x35, 0x8e, 0xa8, 0x31,
        0xd7, 0x2f, 0x14, 0xdd,
    ];
    const TEST_VECTOR: [u8; 60] = [
        0x02, 0x32, 0x93, 0xa3, 0xf8, 0x6c, 0xa8, 0x82, 0x25, 0xbc, 0x17, 0x7e, 0xb5, 0x65,
        0x9b, 0xee, 0x0d, 0xfd, 0xcf, 0xc6, 0x5c, 0x6d, 0xb4, 0x72, 0xe0, 0x5b, 0x33, 0x27,
        0x4c, 0x83, 0x84, 0xd1, 0xad, 0xda, 0x5f, 0x86, 0x02, 0x46, 0x42, 0x91, 0x71, 0x30,
        0x65, 0x2e, 0x72, 0x47, 0xe6, 0x48, 0x20, 0xa1, 0x86, 0x91, 0x7f, 0x9c, 0xb5, 0x5e,
        0x91, 0xb3, 0x65, 0x2d,
    ];

    #[test]
    fn sizes_are_symmetrical() {
        let mut buffer = vec![0u8; encrypted_size(0)];
        buffer[0] = VERSION as u8;
        assert_eq!(decrypted_size(&buffer).unwrap(), 0);
        let mut buffer = vec![0u8; encrypted_size(42)];
        buffer[0] = VERSION as u8;
        assert_eq!(decrypted_size(&buffer).unwrap(), 42);
        assert_eq!(encrypted_size(0), 1 + 24 + 16);
        assert_eq!(encrypted_size(1), 1 + 24 + 1 + 16);
    }

    #[test]
    fn round_trip() {
        let (encrypted, metadata) = encrypt(b"this is the data to encrypt").unwrap();
        assert_eq!(encrypted.len(), encrypted_size(27));
        let clear = decrypt(&metadata.key, &encrypted).unwrap();
        assert_eq!(clear, b"this is the data to encrypt");
    }

    #[test]
    fn round_trip_empty() {
        let (encrypted, metadata) = encrypt(b"").unwrap();
        assert_eq!(decrypt(&metadata.key, &encrypted).unwrap(), b"");
    }

    #[test]
    fn non_deterministic() {
        let (a, _) = encrypt(b"same input").unwrap();
        let (b, _) = encrypt(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn decrypts_test_vector() {
        let key = SymmetricKey::from(KEY);
        assert_eq!(decrypted_size(&TEST_VECTOR).unwrap(), 19);
        let clear = decrypt(&key, &TEST_VECTOR).unwrap();
        assert_eq!(clear, b"this is very secret");
    }

    #[test]
    fn corrupted_vector_fails_decryption() {
        let key = SymmetricKey::from(KEY);
        let mut corrupted = TEST_VECTOR;
        corrupted[2] ^= 1;
        assert!(matches!(
            decrypt(&key, &corrupted),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn resource_id_matches_encrypt_metadata() {
        let (encrypted, metadata) = encrypt(b"payload").unwrap();
        assert_eq!(extract_resource_id(&encrypted).unwrap(), metadata.resource_id);
    }
}
