use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key size for {name}: expected {expected} bytes, got {got}")]
    InvalidKeySize {
        name: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("AEAD encryption failed")]
    AeadEncrypt,

    #[error("AEAD decryption failed (authentication tag mismatch)")]
    AeadDecrypt,

    #[error("sealed box encryption failed")]
    SealEncrypt,

    #[error("sealed box decryption failed")]
    SealDecrypt,

    #[error("signature verification failed")]
    SignatureVerification,

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("base64 decode error: {0}")]
    Base64Decode(#[from] base64::DecodeError),
}
