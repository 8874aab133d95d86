//! Groups: creation and membership blocks, the chain applier, and the
//! accessor that pulls unknown groups from the server.

use std::rc::Rc;

use cv_chain::actions::{
    Action, GroupMember2, GroupProvisionalMember2, UserGroupAddition, UserGroupAddition2,
    UserGroupCreation, UserGroupCreation2,
};
use cv_chain::{Block, GroupId, VerifiedEntry};
use cv_crypto::{
    sealed, sign, EncryptionKeyPair, PrivateEncryptionKey, PrivateSignatureKey,
    SealedPrivateSignatureKey, Signature, SignatureKeyPair,
};
use cv_store::models::{ExternalGroup, Group, GroupProvisionalKey, InternalGroup, User};
use cv_store::Store;

use crate::error::Error;
use crate::events::{EventSink, SessionEvent};
use crate::local_user::{BlockSigner, LocalUser};
use crate::provisional::PublicProvisionalUser;
use crate::puller::Puller;
use crate::users::user_recipient_key;

pub const MAX_GROUP_SIZE: usize = 1000;

// ── Block construction ───────────────────────────────────────────────────────

fn seal_group_key_for_member(
    group_private_key: &PrivateEncryptionKey,
    member: &User,
) -> Result<GroupMember2, Error> {
    let member_key = user_recipient_key(member)?;
    let sealed = sealed::seal_encrypt(group_private_key.as_bytes(), &member_key)?;
    Ok(GroupMember2 {
        user_id: member.id,
        public_encryption_key: member_key,
        sealed_private_encryption_key: sealed.as_slice().try_into()?,
    })
}

/// Provider envelope inside, app envelope outside: the claimer peels the app
/// half first, the provider half second.
fn seal_group_key_for_provisional(
    group_private_key: &PrivateEncryptionKey,
    member: &PublicProvisionalUser,
) -> Result<GroupProvisionalMember2, Error> {
    let inner = sealed::seal_encrypt(
        group_private_key.as_bytes(),
        &member.provider_encryption_public_key,
    )?;
    let outer = sealed::seal_encrypt(&inner, &member.app_encryption_public_key)?;
    Ok(GroupProvisionalMember2 {
        app_public_signature_key: member.app_signature_public_key,
        provider_public_signature_key: member.provider_signature_public_key,
        two_times_sealed_private_encryption_key: outer.as_slice().try_into()?,
    })
}

pub(crate) fn generate_create_group_block(
    signer: &BlockSigner,
    group_signature: &SignatureKeyPair,
    group_encryption: &EncryptionKeyPair,
    members: &[User],
    provisional_members: &[PublicProvisionalUser],
) -> Result<Block, Error> {
    let sealed_private_signature_key = sealed::seal_encrypt(
        group_signature.private_key.as_bytes(),
        &group_encryption.public_key,
    )?;

    let mut creation = UserGroupCreation2 {
        public_signature_key: group_signature.public_key,
        public_encryption_key: group_encryption.public_key,
        sealed_private_signature_key: SealedPrivateSignatureKey::try_from(
            sealed_private_signature_key.as_slice(),
        )?,
        members: members
            .iter()
            .map(|m| seal_group_key_for_member(&group_encryption.private_key, m))
            .collect::<Result<_, _>>()?,
        provisional_members: provisional_members
            .iter()
            .map(|m| seal_group_key_for_provisional(&group_encryption.private_key, m))
            .collect::<Result<_, _>>()?,
        self_signature: Signature::default(),
    };
    let wrapped = UserGroupCreation::V2(creation.clone());
    creation.self_signature =
        sign::sign(&wrapped.signature_data(), &group_signature.private_key);

    Ok(signer.make_block(&Action::UserGroupCreation(UserGroupCreation::V2(creation))))
}

pub(crate) fn generate_add_members_block(
    signer: &BlockSigner,
    group: &InternalGroup,
    members: &[User],
    provisional_members: &[PublicProvisionalUser],
) -> Result<Block, Error> {
    let mut addition = UserGroupAddition2 {
        group_id: group.id,
        previous_group_block_hash: group.last_block_hash,
        members: members
            .iter()
            .map(|m| seal_group_key_for_member(&group.encryption_key_pair.private_key, m))
            .collect::<Result<_, _>>()?,
        provisional_members: provisional_members
            .iter()
            .map(|m| {
                seal_group_key_for_provisional(&group.encryption_key_pair.private_key, m)
            })
            .collect::<Result<_, _>>()?,
        self_signature: Signature::default(),
    };
    let wrapped = UserGroupAddition::V2(addition.clone());
    addition.self_signature = sign::sign(
        &wrapped.signature_data(),
        &group.signature_key_pair.private_key,
    );

    Ok(signer.make_block(&Action::UserGroupAddition(UserGroupAddition::V2(addition))))
}

// ── Applier ──────────────────────────────────────────────────────────────────

async fn decrypt_my_member_key(
    local: &LocalUser,
    members_v1: &[(cv_crypto::PublicEncryptionKey, cv_crypto::SealedPrivateEncryptionKey)],
    members: &[GroupMember2],
) -> Result<Option<PrivateEncryptionKey>, Error> {
    for (public_key, sealed_key) in members_v1 {
        if let Some(user_keys) = local.find_user_key_pair(public_key).await? {
            let clear = sealed::seal_decrypt(sealed_key.as_ref(), &user_keys)?;
            return Ok(Some(clear.as_slice().try_into()?));
        }
    }
    for member in members {
        if member.user_id != *local.user_id() {
            continue;
        }
        let user_keys = local
            .find_user_key_pair(&member.public_encryption_key)
            .await?
            .ok_or_else(|| {
                Error::InternalError(
                    "group entry names this user but not a known user key".into(),
                )
            })?;
        let clear =
            sealed::seal_decrypt(member.sealed_private_encryption_key.as_ref(), &user_keys)?;
        return Ok(Some(clear.as_slice().try_into()?));
    }
    Ok(None)
}

async fn decrypt_my_provisional_key(
    store: &Store,
    members: &[GroupProvisionalMember2],
) -> Result<Option<PrivateEncryptionKey>, Error> {
    let provisional = store.provisional_user_keys();
    for member in members {
        let Some(keys) = provisional
            .find(
                &member.app_public_signature_key,
                &member.provider_public_signature_key,
            )
            .await?
        else {
            continue;
        };
        let inner = sealed::seal_decrypt(
            member.two_times_sealed_private_encryption_key.as_ref(),
            &keys.app_keys,
        )?;
        let clear = sealed::seal_decrypt(&inner, &keys.provider_keys)?;
        return Ok(Some(clear.as_slice().try_into()?));
    }
    Ok(None)
}

fn unseal_group_signature_key(
    sealed_private_signature_key: &SealedPrivateSignatureKey,
    public_encryption_key: cv_crypto::PublicEncryptionKey,
    group_private_key: PrivateEncryptionKey,
) -> Result<(SignatureKeyPair, EncryptionKeyPair), Error> {
    let encryption_key_pair = EncryptionKeyPair {
        public_key: public_encryption_key,
        private_key: group_private_key,
    };
    let private_signature: PrivateSignatureKey = sealed::seal_decrypt(
        sealed_private_signature_key.as_ref(),
        &encryption_key_pair,
    )?
    .as_slice()
    .try_into()?;
    let signature_key_pair = cv_crypto::sign::make_signature_key_pair_from_private(
        &private_signature,
    );
    Ok((signature_key_pair, encryption_key_pair))
}

fn provisional_stash(members: &[GroupProvisionalMember2]) -> Vec<GroupProvisionalKey> {
    members
        .iter()
        .map(|m| GroupProvisionalKey {
            app_public_signature_key: m.app_public_signature_key,
            provider_public_signature_key: m.provider_public_signature_key,
            two_times_sealed_private_encryption_key: m
                .two_times_sealed_private_encryption_key,
        })
        .collect()
}

pub(crate) async fn apply_user_group_entry(
    store: &Store,
    local: &LocalUser,
    entry: &VerifiedEntry,
    events: &EventSink,
) -> Result<(), Error> {
    match &entry.action {
        Action::UserGroupCreation(creation) => {
            apply_group_creation(store, local, entry, creation).await?;
            events.push(SessionEvent::GroupActionReceived(creation.group_id()));
        }
        Action::UserGroupAddition(addition) => {
            apply_group_addition(store, local, entry, addition).await?;
            events.push(SessionEvent::GroupActionReceived(*addition.group_id()));
        }
        _ => unreachable!("dispatched on nature"),
    }
    Ok(())
}

async fn apply_group_creation(
    store: &Store,
    local: &LocalUser,
    entry: &VerifiedEntry,
    creation: &UserGroupCreation,
) -> Result<(), Error> {
    let (members_v1, members, provisional_members): (&[_], &[_], &[_]) = match creation {
        UserGroupCreation::V1(v1) => {
            (v1.sealed_private_encryption_keys_for_users.as_slice(), &[], &[])
        }
        UserGroupCreation::V2(v2) => {
            (&[], v2.members.as_slice(), v2.provisional_members.as_slice())
        }
    };

    let mut group_private_key = decrypt_my_member_key(local, members_v1, members).await?;
    if group_private_key.is_none() {
        group_private_key = decrypt_my_provisional_key(store, provisional_members).await?;
    }

    let groups = store.groups();
    match group_private_key {
        Some(private_key) => {
            let (signature_key_pair, encryption_key_pair) = unseal_group_signature_key(
                creation.sealed_private_signature_key(),
                *creation.public_encryption_key(),
                private_key,
            )?;
            groups
                .put_internal(&InternalGroup {
                    id: creation.group_id(),
                    signature_key_pair,
                    encryption_key_pair,
                    last_block_hash: entry.hash,
                    last_block_index: entry.index,
                })
                .await?;
        }
        None => {
            groups
                .put_external(&ExternalGroup {
                    id: creation.group_id(),
                    public_signature_key: *creation.public_signature_key(),
                    sealed_private_signature_key: *creation.sealed_private_signature_key(),
                    public_encryption_key: *creation.public_encryption_key(),
                    last_block_hash: entry.hash,
                    last_block_index: entry.index,
                })
                .await?;
            groups
                .put_provisional_keys(
                    &creation.group_id(),
                    &provisional_stash(provisional_members),
                )
                .await?;
        }
    }
    Ok(())
}

async fn apply_group_addition(
    store: &Store,
    local: &LocalUser,
    entry: &VerifiedEntry,
    addition: &UserGroupAddition,
) -> Result<(), Error> {
    let groups = store.groups();
    let group_id = *addition.group_id();
    let previous = groups
        .find_by_id(&group_id)
        .await?
        .ok_or_else(|| Error::InternalError(format!("unknown group {group_id}")))?;
    groups
        .update_last_block(&group_id, &entry.hash, entry.index)
        .await?;

    let (members_v1, members, provisional_members): (&[_], &[_], &[_]) = match addition {
        UserGroupAddition::V1(v1) => {
            (v1.sealed_private_encryption_keys_for_users.as_slice(), &[], &[])
        }
        UserGroupAddition::V2(v2) => {
            (&[], v2.members.as_slice(), v2.provisional_members.as_slice())
        }
    };

    // Already a member: the keys cannot change, nothing more to learn.
    let Group::External(external) = previous else {
        return Ok(());
    };

    let mut group_private_key = decrypt_my_member_key(local, members_v1, members).await?;
    if group_private_key.is_none() {
        group_private_key = decrypt_my_provisional_key(store, provisional_members).await?;
    }

    match group_private_key {
        None => {
            // Still not a member; keep the provisional entries for a later
            // claim.
            groups
                .put_provisional_keys(&group_id, &provisional_stash(provisional_members))
                .await?;
        }
        Some(private_key) => {
            promote_to_internal(store, &external, private_key, entry.hash, entry.index)
                .await?;
        }
    }
    Ok(())
}

/// An external group we can now decrypt becomes internal.
pub(crate) async fn promote_to_internal(
    store: &Store,
    group: &ExternalGroup,
    group_private_key: PrivateEncryptionKey,
    last_block_hash: cv_crypto::Hash,
    last_block_index: u64,
) -> Result<(), Error> {
    let (signature_key_pair, encryption_key_pair) = unseal_group_signature_key(
        &group.sealed_private_signature_key,
        group.public_encryption_key,
        group_private_key,
    )?;
    store
        .groups()
        .put_internal(&InternalGroup {
            id: group.id,
            signature_key_pair,
            encryption_key_pair,
            last_block_hash,
            last_block_index,
        })
        .await?;
    Ok(())
}

// ── Accessor ─────────────────────────────────────────────────────────────────

pub struct GroupPullResult {
    pub found: Vec<Group>,
    pub missing: Vec<GroupId>,
}

pub struct GroupAccessor {
    store: Store,
    puller: Rc<Puller>,
}

impl GroupAccessor {
    pub fn new(store: Store, puller: Rc<Puller>) -> Self {
        Self { store, puller }
    }

    pub async fn pull(&self, group_ids: &[GroupId]) -> Result<GroupPullResult, Error> {
        let groups = self.store.groups();
        let mut unknown = Vec::new();
        for group_id in group_ids {
            if groups.find_by_id(group_id).await?.is_none() {
                unknown.push(*group_id);
            }
        }
        if !unknown.is_empty() {
            self.puller.catch_up(&[], &unknown).await?;
        }

        let mut found = Vec::new();
        let mut missing = Vec::new();
        for group_id in group_ids {
            match groups.find_by_id(group_id).await? {
                Some(group) => found.push(group),
                None => missing.push(*group_id),
            }
        }
        Ok(GroupPullResult { found, missing })
    }

    /// An up-to-date internal view of a group we administer.
    pub async fn find_internal(&self, group_id: &GroupId) -> Result<Option<InternalGroup>, Error> {
        match self.pull(std::slice::from_ref(group_id)).await?.found.pop() {
            Some(Group::Internal(group)) => Ok(Some(group)),
            _ => Ok(None),
        }
    }
}
