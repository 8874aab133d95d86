use cv_chain::ServerEntry;
use cv_crypto::sign;
use cv_store::models::{Device, Group, User};

use crate::error::{Error, VerificationCode};
use crate::verif::ensure;

fn verify_author_and_signature(entry: &ServerEntry, author: &Device) -> Result<(), Error> {
    ensure(
        !author.is_revoked_at(entry.index),
        VerificationCode::InvalidAuthor,
        "author device of a key publish must not be revoked",
    )?;
    ensure(
        sign::verify(
            entry.hash.as_ref(),
            &entry.signature,
            &author.public_signature_key,
        ),
        VerificationCode::InvalidSignature,
        "key publish block must be signed by its author device",
    )
}

/// Legacy path: only valid while the recipient user has no user key.
pub(super) fn verify_to_device(
    entry: &ServerEntry,
    author: &Device,
    recipient_user: &User,
) -> Result<(), Error> {
    verify_author_and_signature(entry, author)?;
    ensure(
        recipient_user.user_key.is_none(),
        VerificationCode::InvalidUserKey,
        "cannot publish a key to a device of a user that has a user key",
    )
}

pub(super) fn verify_to_user(entry: &ServerEntry, author: &Device) -> Result<(), Error> {
    verify_author_and_signature(entry, author)
}

pub(super) fn verify_to_user_group(
    entry: &ServerEntry,
    author: &Device,
    _recipient_group: &Group,
) -> Result<(), Error> {
    // The group's existence was established by the caller's lookup.
    verify_author_and_signature(entry, author)
}
