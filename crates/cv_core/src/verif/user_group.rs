use cv_chain::actions::{UserGroupAddition, UserGroupCreation};
use cv_chain::ServerEntry;
use cv_crypto::sign;
use cv_store::models::{Device, Group};

use crate::error::{Error, VerificationCode};
use crate::verif::{ensure, group_signature_key};

pub(super) fn verify_creation(
    entry: &ServerEntry,
    creation: &UserGroupCreation,
    author: &Device,
) -> Result<(), Error> {
    ensure(
        !author.is_revoked_at(entry.index),
        VerificationCode::InvalidAuthor,
        "a revoked device must not author a group creation",
    )?;
    ensure(
        sign::verify(
            entry.hash.as_ref(),
            &entry.signature,
            &author.public_signature_key,
        ),
        VerificationCode::InvalidSignature,
        "group creation block must be signed by its author device",
    )?;
    ensure(
        sign::verify(
            &creation.signature_data(),
            creation.self_signature(),
            creation.public_signature_key(),
        ),
        VerificationCode::InvalidSignature,
        "group creation must be self-signed with the group signature key",
    )
}

pub(super) fn verify_addition(
    entry: &ServerEntry,
    addition: &UserGroupAddition,
    author: &Device,
    group: &Group,
) -> Result<(), Error> {
    ensure(
        !author.is_revoked_at(entry.index),
        VerificationCode::InvalidAuthor,
        "a revoked device must not author a group addition",
    )?;
    ensure(
        sign::verify(
            entry.hash.as_ref(),
            &entry.signature,
            &author.public_signature_key,
        ),
        VerificationCode::InvalidSignature,
        "group addition block must be signed by its author device",
    )?;
    ensure(
        addition.previous_group_block_hash() == group.last_block_hash(),
        VerificationCode::InvalidGroup,
        "group addition previous block hash does not match the group's last block",
    )?;
    ensure(
        sign::verify(
            &addition.signature_data(),
            addition.self_signature(),
            &group_signature_key(group),
        ),
        VerificationCode::InvalidSignature,
        "group addition must be self-signed with the group signature key",
    )
}
