//! The root action. Author and signature of its block are all zeros; the
//! block hash *is* the trustchain id.

use cv_crypto::PublicSignatureKey;

use crate::error::ChainError;
use crate::ser::{Reader, WireDeserialize, WireSerialize};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustchainCreation {
    pub public_signature_key: PublicSignatureKey,
}

impl WireSerialize for TrustchainCreation {
    fn serialized_size(&self) -> usize {
        PublicSignatureKey::SIZE
    }
    fn write(&self, out: &mut Vec<u8>) {
        self.public_signature_key.write(out);
    }
}

impl WireDeserialize for TrustchainCreation {
    fn read(reader: &mut Reader<'_>) -> Result<Self, ChainError> {
        Ok(Self {
            public_signature_key: PublicSignatureKey::read(reader)?,
        })
    }
}
