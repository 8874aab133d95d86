//! Authenticated encryption with associated data.
//!
//! XChaCha20-Poly1305 with an explicit 24-byte IV supplied by the caller
//! (the encryption formats derive or embed their own IVs).
//!
//! Ciphertext layout: `[ ciphertext | tag (16 bytes) ]` — the trailing tag
//! is what the encryption formats use as the resource id.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::error::CryptoError;
use crate::types::{AeadIv, Mac, SymmetricKey};

/// Ciphertext size for `clear_size` bytes of plaintext.
pub const fn encrypted_size(clear_size: usize) -> usize {
    clear_size + Mac::SIZE
}

/// Plaintext size for `encrypted_size` bytes of ciphertext+tag.
pub const fn decrypted_size(encrypted_size: usize) -> usize {
    encrypted_size - Mac::SIZE
}

/// Encrypt `plaintext`; returns `ciphertext ‖ tag`.
pub fn aead_encrypt(
    key: &SymmetricKey,
    iv: &AeadIv,
    plaintext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = XNonce::from_slice(iv.as_bytes());
    cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: associated_data,
            },
        )
        .map_err(|_| CryptoError::AeadEncrypt)
}

/// Decrypt `ciphertext ‖ tag`; fails on tag mismatch.
pub fn aead_decrypt(
    key: &SymmetricKey,
    iv: &AeadIv,
    encrypted: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if encrypted.len() < Mac::SIZE {
        return Err(CryptoError::AeadDecrypt);
    }
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AeadDecrypt)?;
    let nonce = XNonce::from_slice(iv.as_bytes());
    cipher
        .decrypt(
            nonce,
            Payload {
                msg: encrypted,
                aad: associated_data,
            },
        )
        .map_err(|_| CryptoError::AeadDecrypt)
}

/// The trailing 16-byte tag of `ciphertext ‖ tag`.
pub fn extract_mac(encrypted: &[u8]) -> Result<Mac, CryptoError> {
    if encrypted.len() < Mac::SIZE {
        return Err(CryptoError::AeadDecrypt);
    }
    Mac::try_from(&encrypted[encrypted.len() - Mac::SIZE..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rand::{make_aead_iv, make_symmetric_key};

    #[test]
    fn encrypt_decrypt_round_trip() {
        let key = make_symmetric_key();
        let iv = make_aead_iv();
        let encrypted = aead_encrypt(&key, &iv, b"attack at dawn", b"ad").unwrap();
        assert_eq!(encrypted.len(), encrypted_size(14));
        let clear = aead_decrypt(&key, &iv, &encrypted, b"ad").unwrap();
        assert_eq!(clear, b"attack at dawn");
    }

    #[test]
    fn tamper_fails() {
        let key = make_symmetric_key();
        let iv = make_aead_iv();
        let mut encrypted = aead_encrypt(&key, &iv, b"payload", &[]).unwrap();
        encrypted[0] ^= 1;
        assert!(aead_decrypt(&key, &iv, &encrypted, &[]).is_err());
    }

    #[test]
    fn associated_data_is_bound() {
        let key = make_symmetric_key();
        let iv = make_aead_iv();
        let encrypted = aead_encrypt(&key, &iv, b"payload", b"context-a").unwrap();
        assert!(aead_decrypt(&key, &iv, &encrypted, b"context-b").is_err());
    }

    #[test]
    fn mac_is_the_tail() {
        let key = make_symmetric_key();
        let iv = make_aead_iv();
        let encrypted = aead_encrypt(&key, &iv, b"xyz", &[]).unwrap();
        let mac = extract_mac(&encrypted).unwrap();
        assert_eq!(mac.as_ref(), &encrypted[encrypted.len() - 16..]);
    }
}
