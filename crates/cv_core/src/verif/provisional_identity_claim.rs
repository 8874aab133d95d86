use cv_chain::actions::ProvisionalIdentityClaim;
use cv_chain::{DeviceId, ServerEntry};
use cv_crypto::sign;
use cv_store::models::{Device, User};

use crate::error::{Error, VerificationCode};
use crate::verif::ensure;

pub(super) fn verify(
    entry: &ServerEntry,
    claim: &ProvisionalIdentityClaim,
    author: &Device,
    user: &User,
) -> Result<(), Error> {
    verify_provisional_identity_claim(entry, claim, author)?;
    ensure(
        claim.user_id == user.id,
        VerificationCode::InvalidUserId,
        "claim user id must match the author device's user",
    )?;
    ensure(
        Some(claim.recipient_user_public_key) == user.user_key,
        VerificationCode::InvalidUserKey,
        "claim must target the user's current user key",
    )
}

/// The signature checks alone; also used by the best-effort claim pass,
/// which has the author device but not necessarily a fully-applied user.
pub fn verify_provisional_identity_claim(
    entry: &ServerEntry,
    claim: &ProvisionalIdentityClaim,
    author: &Device,
) -> Result<(), Error> {
    ensure(
        !author.is_revoked_at(entry.index),
        VerificationCode::InvalidAuthor,
        "author device of a claim must not be revoked",
    )?;
    ensure(
        sign::verify(
            entry.hash.as_ref(),
            &entry.signature,
            &author.public_signature_key,
        ),
        VerificationCode::InvalidSignature,
        "claim block must be signed by its author device",
    )?;
    let signed_data = claim.signature_data(&DeviceId::from(entry.author));
    ensure(
        sign::verify(
            &signed_data,
            &claim.author_signature_by_app_key,
            &claim.app_public_signature_key,
        ),
        VerificationCode::InvalidSignature,
        "claim must be signed by the app signature key",
    )?;
    ensure(
        sign::verify(
            &signed_data,
            &claim.author_signature_by_provider_key,
            &claim.provider_public_signature_key,
        ),
        VerificationCode::InvalidSignature,
        "claim must be signed by the provider signature key",
    )
}
