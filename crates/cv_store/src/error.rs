use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<cv_crypto::CryptoError> for StoreError {
    fn from(err: cv_crypto::CryptoError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

impl From<cv_chain::ChainError> for StoreError {
    fn from(err: cv_chain::ChainError) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}
