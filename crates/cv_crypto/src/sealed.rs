//! Sealed boxes: anonymous-sender, authenticated public-key encryption.
//!
//! libsodium-compatible construction (X25519 + XSalsa20-Poly1305 with an
//! ephemeral sender key). Output is `plaintext.len() + SEAL_OVERHEAD` bytes;
//! only the holder of the recipient private key can open it, and the sender
//! stays anonymous.

use crypto_box::{PublicKey, SecretKey};
use rand::rngs::OsRng;

use crate::error::CryptoError;
use crate::types::{EncryptionKeyPair, PrivateEncryptionKey, PublicEncryptionKey};

/// Generate a fresh X25519 keypair.
pub fn make_encryption_key_pair() -> EncryptionKeyPair {
    let secret = SecretKey::generate(&mut OsRng);
    let public = PublicEncryptionKey::from(*secret.public_key().as_bytes());
    EncryptionKeyPair {
        public_key: public,
        private_key: PrivateEncryptionKey::from(secret.to_bytes()),
    }
}

/// Derive the public half from a private key.
pub fn make_encryption_key_pair_from_private(
    private_key: &PrivateEncryptionKey,
) -> EncryptionKeyPair {
    let secret = SecretKey::from(*private_key.as_bytes());
    EncryptionKeyPair {
        public_key: PublicEncryptionKey::from(*secret.public_key().as_bytes()),
        private_key: private_key.clone(),
    }
}

/// Seal `plaintext` to `recipient`.
pub fn seal_encrypt(
    plaintext: &[u8],
    recipient: &PublicEncryptionKey,
) -> Result<Vec<u8>, CryptoError> {
    let public = PublicKey::from(*recipient.as_bytes());
    public
        .seal(&mut OsRng, plaintext)
        .map_err(|_| CryptoError::SealEncrypt)
}

/// Open a sealed box with the recipient keypair.
pub fn seal_decrypt(
    sealed: &[u8],
    key_pair: &EncryptionKeyPair,
) -> Result<Vec<u8>, CryptoError> {
    let secret = SecretKey::from(*key_pair.private_key.as_bytes());
    secret.unseal(sealed).map_err(|_| CryptoError::SealDecrypt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SEAL_OVERHEAD;

    #[test]
    fn seal_round_trip() {
        let kp = make_encryption_key_pair();
        let sealed = seal_encrypt(b"sealed payload", &kp.public_key).unwrap();
        assert_eq!(sealed.len(), b"sealed payload".len() + SEAL_OVERHEAD);
        let opened = seal_decrypt(&sealed, &kp).unwrap();
        assert_eq!(opened, b"sealed payload");
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let kp = make_encryption_key_pair();
        let other = make_encryption_key_pair();
        let sealed = seal_encrypt(b"secret", &kp.public_key).unwrap();
        assert!(seal_decrypt(&sealed, &other).is_err());
    }

    #[test]
    fn public_half_is_derivable() {
        let kp = make_encryption_key_pair();
        let rebuilt = make_encryption_key_pair_from_private(&kp.private_key);
        assert_eq!(rebuilt.public_key, kp.public_key);
    }
}
