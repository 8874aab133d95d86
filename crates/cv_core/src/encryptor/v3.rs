//! Format v3: `3 ‖ ciphertext ‖ mac(16)`. The key is fresh per call, so the
//! IV can be all zeros and the buffer carries no header beyond the version.

use cv_chain::ResourceId;
use cv_crypto::{aead, rand, AeadIv, Mac, SymmetricKey};

use crate::encryptor::{read_version, truncated, EncryptionMetadata};
use crate::error::Error;

pub const VERSION: u64 = 3;
const VERSION_SIZE: usize = 1;

pub fn encrypted_size(clear_size: usize) -> usize {
    VERSION_SIZE + aead::encrypted_size(clear_size)
}

fn check_format(encrypted: &[u8]) -> Result<&[u8], Error> {
    let (version, rest) = read_version(encrypted)?;
    debug_assert_eq!(version, VERSION);
    if rest.len() < Mac::SIZE {
        return Err(truncated());
    }
    Ok(rest)
}

pub fn decrypted_size(encrypted: &[u8]) -> Result<usize, Error> {
    let rest = check_format(encrypted)?;
    Ok(aead::decrypted_size(rest.len()))
}

pub fn encrypt(clear: &[u8]) -> Result<(Vec<u8>, EncryptionMetadata), Error> {
    let key = rand::make_symmetric_key();
    let iv = AeadIv::default();
    let ciphertext = aead::aead_encrypt(&key, &iv, clear, &[])?;

    let mut out = Vec::with_capacity(encrypted_size(clear.len()));
    out.push(VERSION as u8);
    out.extend_from_slice(&ciphertext);

    let resource_id = ResourceId::from(aead::extract_mac(&ciphertext)?);
    Ok((out, EncryptionMetadata { resource_id, key }))
}

pub fn decrypt(key: &SymmetricKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
    let ciphertext = check_format(encrypted)?;
    aead::aead_decrypt(key, &AeadIv::default(), ciphertext, &[])
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

    const KEY: [u8; 32] = [
        0x76, 0x0d, 0x8e, 0x80, 0x5c, 0xbc, 0xa8, 0xb6, 0xda, 0xea, 0xcf, 0x66, 0x46, 0xca,
        0xd7, 0xeb, 0x4f, 0x3a, 0xbc, 0x69, 0xac, 0x9b, 0xce, 0x77, 0x35, 0x8e, 0xa8, 0x31,
        0xd7, 0x2f, 0x14, 0xdd,
    ];
    const TEST_VECTOR: [u8; 36] = [
        0x03, 0x37, 0xb5, 0x3d, 0x55, 0x34, 0xb5, 0xc1, 0x3f, 0xe3, 0x72, 0x81, 0x47, 0xf0,
        0xca, 0xda, 0x29, 0x99, 0x6e, 0x04, 0xa8, 0x41, 0x81, 0xa0, 0xe0, 0x5e, 0x8e, 0x3a,
        0x08, 0xd3, 0x78, 0xfa, 0x05, 0x9f, 0x17, 0xfa,
    ];

    #[test]
    fn sizes_are_symmetrical() {
        assert_eq!(encrypted_size(0), 1 + 16);
        assert_eq!(encrypted_size(1), 1 + 1 + 16);
        let mut buffer = vec![0u8; encrypted_size(42)];
        buffer[0] = VERSION as u8;
        assert_eq!(decrypted_size(&buffer).unwrap(), 42);
    }

    #[test]
    fn round_trip() {
        let (encrypted, metadata) = encrypt(b"this is the data to encrypt").unwrap();
        assert_eq!(
            decrypt(&metadata.key, &encrypted).unwrap(),
            b"this is the data to encrypt"
        );
    }

    #[test]
    fn decrypts_test_vector() {
        let key = SymmetricKey::from(KEY);
        assert_eq!(decrypt(&key, &TEST_VECTOR).unwrap(), b"this is very secret");
    }

    #[test]
    fn corrupted_buffer_fails_decryption() {
        let key = SymmetricKey::from(KEY);
        let mut corrupted = TEST_VECTOR;
        corrupted[10] ^= 1;
        assert!(matches!(
            decrypt(&key, &corrupted),
            Err(Error::DecryptionFailed(_))
        ));
    }

    #[test]
    fn non_deterministic() {
        let (a, _) = encrypt(b"same input").unwrap();
        let (b, _) = encrypt(b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn resource_id_is_trailing_mac() {
        let (encrypted, metadata) = encrypt(b"payload").unwrap();
        assert_eq!(extract_resource_id(&encrypted).unwrap(), metadata.resource_id);
        assert_eq!(
            metadata.resource_id.as_ref(),
            &encrypted[encrypted.len() - 16..]
        );
    }
}
