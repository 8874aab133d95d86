//! Users and devices: chain appliers, the user accessor, and device-block
//! construction.

use std::rc::Rc;

use cv_chain::actions::{
    delegation_signature_data, Action, DeviceCreation, DeviceCreation3, DeviceRevocation,
    DeviceRevocation2, UserKeyPair,
};
use cv_chain::{Block, DeviceId, TrustchainId, UserId, VerifiedEntry};
use cv_crypto::{
    sealed, sign, EncryptionKeyPair, Hash, PublicEncryptionKey, SealedPrivateEncryptionKey,
    SignatureKeyPair,
};
use cv_store::models::{Device, User};
use cv_store::Store;

use crate::error::Error;
use crate::events::{EventSink, SessionEvent};
use crate::identity::SecretPermanentIdentity;
use crate::local_user::LocalUser;
use crate::puller::Puller;

// ── Appliers ─────────────────────────────────────────────────────────────────

pub(crate) async fn apply_device_creation(
    store: &Store,
    local: &LocalUser,
    entry: &VerifiedEntry,
    creation: &DeviceCreation,
    events: &EventSink,
) -> Result<(), Error> {
    let device_id = DeviceId::from(entry.hash);
    let contacts = store.contacts();

    // Detect our own creation block before anything else so the user-key
    // below can be unsealed with our device key.
    let our_keys = local.signature_key_pair()?;
    if *creation.public_signature_key() == our_keys.public_key
        && local.device_id()?.is_none()
    {
        local.set_device_id(device_id).await?;
        events.push(SessionEvent::ThisDeviceRegistered(device_id));
    }

    if let Some(user_key_pair) = creation.user_key_pair() {
        contacts
            .put_user_key(creation.user_id(), &user_key_pair.public_encryption_key)
            .await?;
        if Some(device_id) == local.device_id()? {
            let private_key = sealed::seal_decrypt(
                user_key_pair.sealed_private_encryption_key.as_ref(),
                &local.encryption_key_pair()?,
            )?;
            local
                .put_user_key_pair(&EncryptionKeyPair {
                    public_key: user_key_pair.public_encryption_key,
                    private_key: private_key.as_slice().try_into()?,
                })
                .await?;
        }
    }

    contacts
        .put_user_device(&Device {
            id: device_id,
            user_id: *creation.user_id(),
            public_signature_key: *creation.public_signature_key(),
            public_encryption_key: *creation.public_encryption_key(),
            created_at_index: entry.index,
            revoked_at_index: None,
            is_ghost: creation.is_ghost_device(),
        })
        .await?;

    if creation.user_id() == local.user_id() && !creation.is_ghost_device() {
        events.push(SessionEvent::DeviceCreated(device_id));
    }
    Ok(())
}

pub(crate) async fn apply_device_revocation(
    store: &Store,
    local: &LocalUser,
    entry: &VerifiedEntry,
    revocation: &DeviceRevocation,
    events: &EventSink,
) -> Result<(), Error> {
    let contacts = store.contacts();
    let target = *revocation.device_id();
    let target_user_id = contacts
        .find_user_id_by_device(&target)
        .await?
        .ok_or_else(|| Error::InternalError("revocation target vanished".into()))?;
    contacts.revoke_device(&target, entry.index).await?;

    if Some(target) == local.device_id()? {
        events.mark_device_revoked();
        events.push(SessionEvent::DeviceRevoked(target));
        return Ok(());
    }

    if let DeviceRevocation::V2(v2) = revocation {
        contacts
            .put_user_key(&target_user_id, &v2.public_encryption_key)
            .await?;
        if target_user_id == *local.user_id() {
            recover_rotated_user_key(local, v2).await?;
            events.push(SessionEvent::DeviceRevoked(target));
        }
    }
    Ok(())
}

/// One of our other devices was revoked: unseal the rotated user private
/// key addressed to this device, and the retired key it seals in turn.
/// History order matters: the previous key goes in first so the rotated key
/// stays the latest.
async fn recover_rotated_user_key(
    local: &LocalUser,
    revocation: &DeviceRevocation2,
) -> Result<(), Error> {
    let Some(our_device_id) = local.device_id()? else {
        // Our own creation block is later in the chain and carries the
        // then-current user key; nothing to recover yet.
        return Ok(());
    };
    let Some((_, sealed_key)) = revocation
        .sealed_user_keys_for_devices
        .iter()
        .find(|(device_id, _)| *device_id == our_device_id)
    else {
        return Err(Error::InternalError(
            "user key rotation carries no entry for this device".into(),
        ));
    };
    let private_key = sealed::seal_decrypt(sealed_key.as_ref(), &local.encryption_key_pair()?)?;
    let new_key_pair = EncryptionKeyPair {
        public_key: revocation.public_encryption_key,
        private_key: private_key.as_slice().try_into()?,
    };

    if !revocation.previous_public_encryption_key.is_zero() {
        let previous_private = sealed::seal_decrypt(
            revocation.sealed_key_for_previous_user_key.as_ref(),
            &new_key_pair,
        )?;
        local
            .put_user_key_pair(&EncryptionKeyPair {
                public_key: revocation.previous_public_encryption_key,
                private_key: previous_private.as_slice().try_into()?,
            })
            .await?;
    }
    local.put_user_key_pair(&new_key_pair).await?;
    Ok(())
}

// ── User accessor ────────────────────────────────────────────────────────────

pub struct UserPullResult {
    pub found: Vec<User>,
    pub missing: Vec<UserId>,
}

/// Reads users out of the contact store, pulling them from the server when
/// they are not known locally yet.
pub struct UserAccessor {
    store: Store,
    puller: Rc<Puller>,
}

impl UserAccessor {
    pub fn new(store: Store, puller: Rc<Puller>) -> Self {
        Self { store, puller }
    }

    pub async fn pull(&self, user_ids: &[UserId]) -> Result<UserPullResult, Error> {
        let contacts = self.store.contacts();
        let mut unknown = Vec::new();
        for user_id in user_ids {
            if !contacts.user_exists(user_id).await? {
                unknown.push(*user_id);
            }
        }
        if !unknown.is_empty() {
            self.puller.catch_up(&unknown, &[]).await?;
        }

        let mut found = Vec::new();
        let mut missing = Vec::new();
        for user_id in user_ids {
            match contacts.find_user(user_id).await? {
                Some(user) => found.push(user),
                None => missing.push(*user_id),
            }
        }
        Ok(UserPullResult { found, missing })
    }
}

// ── Device block construction ────────────────────────────────────────────────

/// The first device of a user, authored by the trustchain itself using the
/// delegation embedded in the permanent identity.
pub(crate) fn make_first_device_block(
    identity: &SecretPermanentIdentity,
    device_signature: &SignatureKeyPair,
    device_encryption: &EncryptionKeyPair,
    user_key: &EncryptionKeyPair,
    is_ghost_device: bool,
) -> Result<Block, Error> {
    let sealed_user_key = sealed::seal_encrypt(
        user_key.private_key.as_bytes(),
        &device_encryption.public_key,
    )?;
    let action = Action::DeviceCreation(DeviceCreation::V3(DeviceCreation3 {
        ephemeral_public_signature_key: identity.ephemeral_public_signature_key,
        user_id: identity.user_id()?,
        delegation_signature: identity.delegation_signature,
        public_signature_key: device_signature.public_key,
        public_encryption_key: device_encryption.public_key,
        user_key_pair: UserKeyPair {
            public_encryption_key: user_key.public_key,
            sealed_private_encryption_key: SealedPrivateEncryptionKey::try_from(
                sealed_user_key.as_slice(),
            )?,
        },
        is_ghost_device,
    }));
    Ok(Block::sign(
        identity.trustchain_id,
        Hash::from(identity.trustchain_id),
        &action,
        &identity.ephemeral_private_signature_key,
    ))
}

/// A device added by an existing device of the same user (the author signs
/// the delegation; a fresh ephemeral key signs the block).
pub(crate) fn make_added_device_block(
    trustchain_id: TrustchainId,
    user_id: UserId,
    author_device_id: DeviceId,
    author_signature: &SignatureKeyPair,
    author_user_key: &EncryptionKeyPair,
    device_signature: &SignatureKeyPair,
    device_encryption: &EncryptionKeyPair,
    is_ghost_device: bool,
) -> Result<Block, Error> {
    let ephemeral = sign::make_signature_key_pair();
    let delegation_signature = sign::sign(
        &delegation_signature_data(&ephemeral.public_key, &user_id, &device_signature.public_key),
        &author_signature.private_key,
    );
    let sealed_user_key = sealed::seal_encrypt(
        author_user_key.private_key.as_bytes(),
        &device_encryption.public_key,
    )?;
    let action = Action::DeviceCreation(DeviceCreation::V3(DeviceCreation3 {
        ephemeral_public_signature_key: ephemeral.public_key,
        user_id,
        delegation_signature,
        public_signature_key: device_signature.public_key,
        public_encryption_key: device_encryption.public_key,
        user_key_pair: UserKeyPair {
            public_encryption_key: author_user_key.public_key,
            sealed_private_encryption_key: SealedPrivateEncryptionKey::try_from(
                sealed_user_key.as_slice(),
            )?,
        },
        is_ghost_device,
    }));
    Ok(Block::sign(
        trustchain_id,
        Hash::from(author_device_id),
        &action,
        &ephemeral.private_key,
    ))
}

/// Rotate the user key away from `target`, sealing the new private key to
/// every remaining device.
pub(crate) async fn make_revocation_block(
    store: &Store,
    local: &LocalUser,
    target: DeviceId,
) -> Result<(Block, EncryptionKeyPair), Error> {
    let signer = local.block_signer()?;
    let user = store
        .contacts()
        .find_user(local.user_id())
        .await?
        .ok_or_else(|| Error::InternalError("own user not in contact store".into()))?;
    let previous_key = local.current_user_key_pair().await?;

    let new_user_key = sealed::make_encryption_key_pair();
    let sealed_previous = sealed::seal_encrypt(
        previous_key.private_key.as_bytes(),
        &new_user_key.public_key,
    )?;

    let mut sealed_for_devices = Vec::new();
    for device in user
        .devices
        .iter()
        .filter(|d| d.revoked_at_index.is_none() && d.id != target)
    {
        let sealed = sealed::seal_encrypt(
            new_user_key.private_key.as_bytes(),
            &device.public_encryption_key,
        )?;
        sealed_for_devices.push((
            device.id,
            SealedPrivateEncryptionKey::try_from(sealed.as_slice())?,
        ));
    }

    let action = Action::DeviceRevocation(DeviceRevocation::V2(DeviceRevocation2 {
        device_id: target,
        public_encryption_key: new_user_key.public_key,
        previous_public_encryption_key: previous_key.public_key,
        sealed_key_for_previous_user_key: SealedPrivateEncryptionKey::try_from(
            sealed_previous.as_slice(),
        )?,
        sealed_user_keys_for_devices: sealed_for_devices,
    }));
    Ok((signer.make_block(&action), new_user_key))
}

/// The user's recipient key is its current user key.
pub(crate) fn user_recipient_key(user: &User) -> Result<PublicEncryptionKey, Error> {
    user.user_key.ok_or_else(|| {
        Error::InternalError(format!("user {} has no user key", user.id))
    })
}
