use std::collections::HashSet;

use cv_chain::actions::{DeviceRevocation, DeviceRevocation2};
use cv_chain::ServerEntry;
use cv_crypto::sign;
use cv_store::models::{Device, User};

use crate::error::{Error, VerificationCode};
use crate::verif::ensure;

pub(super) fn verify(
    entry: &ServerEntry,
    revocation: &DeviceRevocation,
    author: &Device,
    target: &Device,
    user: &User,
) -> Result<(), Error> {
    ensure(
        !author.is_revoked_at(entry.index),
        VerificationCode::InvalidAuthor,
        "author device of a revocation must not be revoked",
    )?;
    ensure(
        target.revoked_at_index.is_none(),
        VerificationCode::InvalidTargetDevice,
        "the target of a revocation must not already be revoked",
    )?;
    ensure(
        sign::verify(
            entry.hash.as_ref(),
            &entry.signature,
            &author.public_signature_key,
        ),
        VerificationCode::InvalidSignature,
        "device revocation block must be signed by its author",
    )?;
    match revocation {
        DeviceRevocation::V1(_) => ensure(
            user.user_key.is_none(),
            VerificationCode::InvalidUserKey,
            "a revocation v1 cannot be used on a user with a user key",
        ),
        DeviceRevocation::V2(v2) => verify_v2(v2, target, user),
    }
}

fn verify_v2(revocation: &DeviceRevocation2, target: &Device, user: &User) -> Result<(), Error> {
    match &user.user_key {
        None => {
            ensure(
                revocation.previous_public_encryption_key.is_zero(),
                VerificationCode::InvalidEncryptionKey,
                "a revocation v2 for a user without a user key must carry a zero \
                 previous public encryption key",
            )?;
            ensure(
                revocation.sealed_key_for_previous_user_key.is_zero(),
                VerificationCode::InvalidUserKey,
                "a revocation v2 for a user without a user key must carry a zero \
                 sealed previous key",
            )?;
        }
        Some(user_key) => {
            ensure(
                revocation.previous_public_encryption_key == *user_key,
                VerificationCode::InvalidEncryptionKey,
                "revocation v2 previous public encryption key must be the user's \
                 current user key",
            )?;
        }
    }

    let remaining = user
        .devices
        .iter()
        .filter(|d| d.revoked_at_index.is_none())
        .count();
    ensure(
        revocation.sealed_user_keys_for_devices.len() == remaining - 1,
        VerificationCode::InvalidUserKeys,
        "a revocation v2 must seal the new user key to exactly each remaining device",
    )?;

    let mut seen = HashSet::new();
    for (device_id, _) in &revocation.sealed_user_keys_for_devices {
        ensure(
            *device_id != target.id,
            VerificationCode::InvalidUserKeys,
            "a revocation v2 must not seal the new user key to the revoked device",
        )?;
        ensure(
            user.find_device(device_id).is_some(),
            VerificationCode::InvalidUserKeys,
            "a revocation v2 must not seal the new user key to another user's device",
        )?;
        ensure(
            seen.insert(*device_id),
            VerificationCode::InvalidUserKeys,
            "a revocation v2 must not carry duplicate device entries",
        )?;
    }
    Ok(())
}
