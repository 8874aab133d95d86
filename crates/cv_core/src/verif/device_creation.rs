use cv_chain::actions::{delegation_signature_data, DeviceCreation};
use cv_chain::ServerEntry;
use cv_crypto::{sign, PublicSignatureKey};
use cv_store::models::{Device, User};

use crate::error::{Error, VerificationCode};
use crate::identity;
use crate::verif::ensure;

/// First device of a user: authored by the trustchain itself. The
/// delegation in the identity covers `ephemeral_key ‖ user_id` (the device
/// key did not exist when the identity was issued; it is bound by the block
/// signature the ephemeral key makes).
pub(super) fn verify_first_device(
    entry: &ServerEntry,
    creation: &DeviceCreation,
    trustchain_key: &PublicSignatureKey,
    user_already_known: bool,
) -> Result<(), Error> {
    ensure(
        !user_already_known,
        VerificationCode::UserAlreadyExists,
        "a trustchain-authored device creation must introduce a new user",
    )?;
    ensure(
        sign::verify(
            entry.hash.as_ref(),
            &entry.signature,
            creation.ephemeral_public_signature_key(),
        ),
        VerificationCode::InvalidSignature,
        "device creation block must be signed by the ephemeral private signature key",
    )?;
    ensure(
        sign::verify(
            &identity::delegation_data(
                creation.ephemeral_public_signature_key(),
                creation.user_id(),
            ),
            creation.delegation_signature(),
            trustchain_key,
        ),
        VerificationCode::InvalidDelegationSignature,
        "first-device delegation must be signed by the trustchain private key",
    )
}

/// Device added by an existing device of the same user. The delegation is
/// made by the author device over `ephemeral_key ‖ user_id ‖ device_key`.
pub(super) fn verify_added_device(
    entry: &ServerEntry,
    creation: &DeviceCreation,
    author: &Device,
    user: &User,
) -> Result<(), Error> {
    ensure(
        !author.is_revoked_at(entry.index),
        VerificationCode::InvalidAuthor,
        "author device must not be revoked",
    )?;
    ensure(
        sign::verify(
            entry.hash.as_ref(),
            &entry.signature,
            creation.ephemeral_public_signature_key(),
        ),
        VerificationCode::InvalidSignature,
        "device creation block must be signed by the ephemeral private signature key",
    )?;
    ensure(
        sign::verify(
            &delegation_signature_data(
                creation.ephemeral_public_signature_key(),
                creation.user_id(),
                creation.public_signature_key(),
            ),
            creation.delegation_signature(),
            &author.public_signature_key,
        ),
        VerificationCode::InvalidDelegationSignature,
        "delegation signature must be signed by the author's private signature key",
    )?;
    ensure(
        creation.user_id() == &user.id,
        VerificationCode::InvalidUserId,
        "device creation user id must match its parent device's user",
    )?;
    match creation {
        DeviceCreation::V1(_) => ensure(
            user.user_key.is_none(),
            VerificationCode::InvalidUserKey,
            "a device creation v1 is only valid for a user without a user key",
        ),
        DeviceCreation::V3(v3) => ensure(
            Some(v3.user_key_pair.public_encryption_key) == user.user_key,
            VerificationCode::InvalidUserKey,
            "device creation v3 must carry the user's current user key",
        ),
    }
}
