//! Encryption formats.
//!
//! Every format starts with a varint version byte:
//! - v2: `2 ‖ iv(24) ‖ ciphertext ‖ mac(16)` — fresh key per call, random IV
//! - v3: `3 ‖ ciphertext ‖ mac(16)` — fresh key per call, zero IV
//! - v4: chunked streaming, see `stream`
//! - v5: `5 ‖ resource_id(16) ‖ iv(24) ‖ ciphertext ‖ mac(16)` — caller
//!   supplies the key and resource id (encryption sessions), the resource id
//!   is bound as associated data
//!
//! The resource id of v2/v3 buffers is the trailing MAC; v4/v5 carry it in
//! the header. Buffers encrypt with v3 by default; v2 is decrypt-only.

pub mod stream;
pub mod v2;
pub mod v3;
pub mod v5;

use cv_chain::ResourceId;
use cv_crypto::SymmetricKey;

use crate::error::Error;
use stream::SliceSource;

#[derive(Debug, Clone)]
pub struct EncryptionMetadata {
    pub resource_id: ResourceId,
    pub key: SymmetricKey,
}

/// Read the version varint off the front of an encrypted buffer.
pub(crate) fn read_version(encrypted: &[u8]) -> Result<(u64, &[u8]), Error> {
    let mut reader = cv_chain::ser::Reader::new(encrypted);
    let version = reader
        .read_varint()
        .map_err(|_| Error::InvalidArgument("truncated encrypted buffer".into()))?;
    let consumed = encrypted.len() - reader.remaining();
    Ok((version, &encrypted[consumed..]))
}

/// Encrypt a buffer with the current default format (v3).
pub fn encrypt(clear: &[u8]) -> Result<(Vec<u8>, EncryptionMetadata), Error> {
    v3::encrypt(clear)
}

/// Decrypt any supported format with an already-resolved key.
pub async fn decrypt(key: &SymmetricKey, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
    let (version, _) = read_version(encrypted)?;
    match version {
        2 => v2::decrypt(key, encrypted),
        3 => v3::decrypt(key, encrypted),
        5 => v5::decrypt(key, encrypted),
        4 => stream::decrypt_buffer(key.clone(), SliceSource::new(encrypted)).await,
        other => Err(Error::InvalidArgument(format!(
            "unsupported encryption format version {other}"
        ))),
    }
}

/// Read the resource id without decrypting anything.
pub fn extract_resource_id(encrypted: &[u8]) -> Result<ResourceId, Error> {
    let (version, _) = read_version(encrypted)?;
    match version {
        2 => v2::extract_resource_id(encrypted),
        3 => v3::extract_resource_id(encrypted),
        4 => stream::extract_resource_id(encrypted),
        5 => v5::extract_resource_id(encrypted),
        other => Err(Error::InvalidArgument(format!(
            "unsupported encryption format version {other}"
        ))),
    }
}

/// Clear size of an encrypted buffer; `invalid_argument` on truncation.
pub fn decrypted_size(encrypted: &[u8]) -> Result<usize, Error> {
    let (version, _) = read_version(encrypted)?;
    match version {
        2 => v2::decrypted_size(encrypted),
        3 => v3::decrypted_size(encrypted),
        4 => stream::decrypted_size(encrypted),
        5 => v5::decrypted_size(encrypted),
        other => Err(Error::InvalidArgument(format!(
            "unsupported encryption format version {other}"
        ))),
    }
}

pub(crate) fn truncated() -> Error {
    Error::InvalidArgument("truncated encrypted buffer".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_format_round_trip() {
        let (encrypted, metadata) = encrypt(b"this is the data to encrypt").unwrap();
        assert_eq!(encrypted[0], 3);
        let clear = decrypt(&metadata.key, &encrypted).await.unwrap();
        assert_eq!(clear, b"this is the data to encrypt");
        assert_eq!(extract_resource_id(&encrypted).unwrap(), metadata.resource_id);
    }

    #[test]
    fn one_byte_buffer_fails_invalid_argument() {
        for version in [2u8, 3, 5] {
            assert!(matches!(
                decrypted_size(&[version]),
                Err(Error::InvalidArgument(_))
            ));
        }
    }

    #[test]
    fn empty_buffer_fails_invalid_argument() {
        assert!(matches!(
            extract_resource_id(&[]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn unknown_version_fails_invalid_argument() {
        assert!(matches!(
            decrypted_size(&[42u8, 0, 0]),
            Err(Error::InvalidArgument(_))
        ));
    }
}
