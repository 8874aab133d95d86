//! Public error surface.
//!
//! The kinds are finite and stable; every operation reports its failure
//! through this enum, never out-of-band. Name-resolution failures carry the
//! clear identifiers the caller supplied, not the obfuscated on-chain ones.

use thiserror::Error;

/// Why a chain entry failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationCode {
    InvalidHash,
    InvalidSignature,
    InvalidDelegationSignature,
    InvalidAuthor,
    InvalidUserId,
    InvalidUserKey,
    InvalidUserKeys,
    InvalidEncryptionKey,
    InvalidTargetDevice,
    InvalidGroup,
    UserAlreadyExists,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid key size: {0}")]
    InvalidKeySize(String),

    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    #[error("verification failed ({code:?}): {message}")]
    VerificationFailed {
        code: VerificationCode,
        message: String,
    },

    #[error("operation not allowed in the current session state: {0}")]
    PreconditionFailed(String),

    #[error("unknown users: {}", .0.join(", "))]
    UserNotFound(Vec<String>),

    #[error("unknown recipients: users [{}], groups [{}]", .user_ids.join(", "), .group_ids.join(", "))]
    RecipientNotFound {
        user_ids: Vec<String>,
        group_ids: Vec<String>,
    },

    #[error("could not find key for resource {0}")]
    ResourceKeyNotFound(String),

    #[error("unknown groups: {}", .0.join(", "))]
    GroupNotFound(Vec<String>),

    #[error("invalid group size: {0}")]
    InvalidGroupSize(String),

    #[error("the server rejected the verification payload: {0}")]
    InvalidVerification(String),

    #[error("internal error: {0}")]
    InternalError(String),

    #[error("network error: {0}")]
    NetworkError(String),
}

impl Error {
    pub fn verification(code: VerificationCode, message: impl Into<String>) -> Self {
        Error::VerificationFailed {
            code,
            message: message.into(),
        }
    }

    pub fn is_verification_failure(&self) -> bool {
        matches!(self, Error::VerificationFailed { .. })
    }
}

impl From<cv_crypto::CryptoError> for Error {
    fn from(err: cv_crypto::CryptoError) -> Self {
        use cv_crypto::CryptoError;
        match err {
            CryptoError::InvalidKeySize { .. } => Error::InvalidKeySize(err.to_string()),
            CryptoError::AeadDecrypt | CryptoError::SealDecrypt => {
                Error::DecryptionFailed(err.to_string())
            }
            other => Error::InternalError(other.to_string()),
        }
    }
}

impl From<cv_chain::ChainError> for Error {
    fn from(err: cv_chain::ChainError) -> Self {
        Error::InvalidArgument(err.to_string())
    }
}

impl From<cv_store::StoreError> for Error {
    fn from(err: cv_store::StoreError) -> Self {
        Error::InternalError(err.to_string())
    }
}
