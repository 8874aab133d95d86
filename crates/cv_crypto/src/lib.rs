//! cv_crypto — Covault cryptographic primitives
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - All public APIs take and return fixed-size newtypes to prevent
//!   accidental misuse; constructing one from a wrong-sized buffer fails
//!   with `CryptoError::InvalidKeySize`.
//!
//! # Module layout
//! - `types`  — fixed-size key/hash/signature/sealed-blob newtypes
//! - `sign`   — Ed25519 signature keypairs, sign/verify
//! - `sealed` — sealed boxes (anonymous-sender public-key encryption)
//! - `aead`   — XChaCha20-Poly1305 encrypt/decrypt helpers
//! - `hash`   — Blake2b-256 generic hash
//! - `rand`   — OS randomness helpers
//! - `error`  — unified error type

pub mod aead;
pub mod error;
pub mod hash;
pub mod rand;
pub mod sealed;
pub mod sign;
pub mod types;

pub use error::CryptoError;
pub use types::{
    AeadIv, EncryptionKeyPair, Hash, Mac, PrivateEncryptionKey, PrivateSignatureKey,
    PublicEncryptionKey, PublicSignatureKey, SealedPrivateEncryptionKey,
    SealedPrivateEncryptionKeyPair, SealedPrivateSignatureKey, SealedSymmetricKey, Signature,
    SignatureKeyPair, SymmetricKey, TwoTimesSealedPrivateEncryptionKey,
    TwoTimesSealedSymmetricKey,
};
