use cv_chain::{ServerEntry, TrustchainId};

use crate::error::{Error, VerificationCode};
use crate::verif::ensure;

pub(super) fn verify(entry: &ServerEntry, trustchain_id: &TrustchainId) -> Result<(), Error> {
    ensure(
        entry.hash.as_ref() == trustchain_id.as_ref(),
        VerificationCode::InvalidHash,
        "root block hash must be the trustchain id",
    )?;
    ensure(
        entry.author.is_zero(),
        VerificationCode::InvalidAuthor,
        "root block author must be zero-filled",
    )?;
    ensure(
        entry.signature.is_zero(),
        VerificationCode::InvalidSignature,
        "root block signature must be zero-filled",
    )
}
