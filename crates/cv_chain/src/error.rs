use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("truncated buffer")]
    Truncated,

    #[error("some input left after deserialization")]
    TrailingBytes,

    #[error("varint does not fit in 64 bits")]
    VarintOverflow,

    #[error("unknown block nature {0}")]
    UnknownNature(u64),

    #[error("unsupported block wire version {0}")]
    UnsupportedBlockVersion(u64),

    #[error("invalid boolean byte {0}")]
    InvalidBool(u8),

    #[error(transparent)]
    Crypto(#[from] cv_crypto::CryptoError),
}
