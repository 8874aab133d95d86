//! The session: user-visible operations over one device's identity.
//!
//! States: `Stopped → Started → IdentityRegistrationNeeded |
//! IdentityVerificationNeeded | Ready`. Transitions happen only on explicit
//! calls; data-path operations outside `Ready` fail `precondition_failed`,
//! and `stop` is idempotent.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use cv_chain::actions::Action;
use cv_chain::{DeviceId, GroupId, ResourceId, ServerEntry, UserId};
use cv_crypto::{
    aead, rand, sealed, sign, EncryptionKeyPair, Hash, PrivateEncryptionKey,
    PrivateSignatureKey, SymmetricKey,
};
use cv_store::models::User;
use cv_store::Store;

use crate::encryptor::{
    self,
    stream::{DecryptionStream, DecryptionStreamInit, EncryptionStream, InputSource},
    v5,
};
use crate::error::Error;
use crate::events::{EventSink, SessionEvent};
use crate::groups::{self, GroupAccessor, MAX_GROUP_SIZE};
use crate::identity::{
    parse_permanent_identity, parse_provisional_identity, parse_public_identity, PublicIdentity,
    SecretPermanentIdentity,
};
use crate::local_user::LocalUser;
use crate::provisional::{self, PublicProvisionalUser};
use crate::puller::Puller;
use crate::share;
use crate::transport::{Requester, Transport};
use crate::users::{self, UserAccessor};

const DEFAULT_DECRYPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Stopped,
    IdentityRegistrationNeeded,
    IdentityVerificationNeeded,
    Ready,
}

/// The ghost device material, serialized as the verification key.
#[derive(Serialize, Deserialize)]
struct GhostDevice {
    device_id: DeviceId,
    private_signature_key: PrivateSignatureKey,
    private_encryption_key: PrivateEncryptionKey,
}

struct SessionInner {
    identity: SecretPermanentIdentity,
    local: Rc<LocalUser>,
    puller: Rc<Puller>,
    events: Rc<EventSink>,
    key_signal: Rc<Notify>,
}

impl SessionInner {
    fn user_accessor(&self, store: &Store) -> UserAccessor {
        UserAccessor::new(store.clone(), self.puller.clone())
    }

    fn group_accessor(&self, store: &Store) -> GroupAccessor {
        GroupAccessor::new(store.clone(), self.puller.clone())
    }
}

pub struct Session {
    store: Store,
    requester: Rc<Requester>,
    state: Cell<Status>,
    inner: RefCell<Option<Rc<SessionInner>>>,
    decrypt_timeout: Cell<Duration>,
}

impl Session {
    pub fn new(store: Store, transport: Rc<dyn Transport>) -> Self {
        Self {
            store,
            requester: Rc::new(Requester::new(transport)),
            state: Cell::new(Status::Stopped),
            inner: RefCell::new(None),
            decrypt_timeout: Cell::new(DEFAULT_DECRYPT_TIMEOUT),
        }
    }

    pub fn status(&self) -> Status {
        self.state.get()
    }

    /// How long a decrypt waits for a missing resource key before giving up.
    pub fn set_decrypt_timeout(&self, timeout: Duration) {
        self.decrypt_timeout.set(timeout);
    }

    /// This device's id (base64), once its creation block has been applied.
    pub fn device_id(&self) -> Result<Option<String>, Error> {
        let inner = self.current_inner()?;
        Ok(inner.local.device_id()?.map(|id| id.to_base64()))
    }

    /// Events applied since the last poll, in chain order.
    pub fn poll_events(&self) -> Vec<SessionEvent> {
        self.inner
            .borrow()
            .as_ref()
            .map(|inner| inner.events.drain())
            .unwrap_or_default()
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    pub async fn start(&self, identity: &str) -> Result<Status, Error> {
        if self.state.get() != Status::Stopped {
            return Err(Error::PreconditionFailed(
                "start requires a stopped session".into(),
            ));
        }
        let identity = parse_permanent_identity(identity)?;
        let user_id = identity.user_id()?;
        let local = Rc::new(LocalUser::new(
            identity.trustchain_id,
            user_id,
            identity.user_secret.clone(),
            self.store.clone(),
        ));
        local.init_device_keys().await?;

        let events = Rc::new(EventSink::default());
        let key_signal = Rc::new(Notify::new());
        let puller = Rc::new(Puller::new(
            identity.trustchain_id,
            self.store.clone(),
            self.requester.clone(),
            local.clone(),
            events.clone(),
            key_signal.clone(),
        ));
        puller.reset();
        let inner = Rc::new(SessionInner {
            identity,
            local,
            puller,
            events,
            key_signal,
        });
        *self.inner.borrow_mut() = Some(inner.clone());

        let device_keys = inner.local.signature_key_pair()?;
        let status = self
            .requester
            .get_user_status(
                inner.local.trustchain_id(),
                &user_id,
                &device_keys.public_key,
            )
            .await?;
        let state = if !status.user_exists {
            Status::IdentityRegistrationNeeded
        } else if !status.device_exists {
            Status::IdentityVerificationNeeded
        } else {
            self.authenticate(&inner).await?;
            inner.puller.catch_up(&[], &[]).await?;
            Status::Ready
        };
        self.state.set(state);
        Ok(state)
    }

    /// First registration of this identity: creates the ghost device (the
    /// recovery anchor, carried on chain with the ghost bit set), this
    /// device, and the verification key that unlocks future devices.
    /// Returns the verification key.
    pub async fn register_identity(&self) -> Result<String, Error> {
        if self.state.get() != Status::IdentityRegistrationNeeded {
            return Err(Error::PreconditionFailed(
                "identity registration is not needed".into(),
            ));
        }
        let inner = self.current_inner()?;
        let identity = &inner.identity;
        let user_id = identity.user_id()?;

        let ghost_signature = sign::make_signature_key_pair();
        let ghost_encryption = sealed::make_encryption_key_pair();
        let user_key = sealed::make_encryption_key_pair();

        let user_creation = users::make_first_device_block(
            identity,
            &ghost_signature,
            &ghost_encryption,
            &user_key,
            true,
        )?;
        let ghost_device_id = DeviceId::from(user_creation.hash());

        let first_device = users::make_added_device_block(
            identity.trustchain_id,
            user_id,
            ghost_device_id,
            &ghost_signature,
            &user_key,
            &inner.local.signature_key_pair()?,
            &inner.local.encryption_key_pair()?,
            false,
        )?;

        let verification_key = encode_verification_key(&GhostDevice {
            device_id: ghost_device_id,
            private_signature_key: ghost_signature.private_key.clone(),
            private_encryption_key: ghost_encryption.private_key.clone(),
        });
        let encrypted_key =
            encrypt_verification_key(identity.user_secret.clone(), &verification_key)?;

        self.requester
            .create_user(
                &identity.trustchain_id,
                &user_id,
                user_creation.to_base64(0),
                first_device.to_base64(0),
                encrypted_key,
            )
            .await?;

        self.authenticate(&inner).await?;
        inner.puller.catch_up(&[], &[]).await?;
        self.state.set(Status::Ready);
        Ok(verification_key)
    }

    /// Register this device for an already-registered identity, using the
    /// verification key held by the server (encrypted with the user secret).
    pub async fn verify_identity(&self) -> Result<(), Error> {
        if self.state.get() != Status::IdentityVerificationNeeded {
            return Err(Error::PreconditionFailed(
                "identity verification is not needed".into(),
            ));
        }
        let inner = self.current_inner()?;
        let identity = &inner.identity;
        let user_id = identity.user_id()?;

        let encrypted_key = self.requester.get_verification_key(&user_id).await?;
        let ghost = decrypt_verification_key(&identity.user_secret, &encrypted_key)?;
        let ghost_signature =
            sign::make_signature_key_pair_from_private(&ghost.private_signature_key);
        let ghost_encryption =
            sealed::make_encryption_key_pair_from_private(&ghost.private_encryption_key);

        let user_key = recover_user_key_as_ghost(
            &self.requester,
            &user_id,
            &ghost,
            &ghost_encryption,
        )
        .await?;

        let block = users::make_added_device_block(
            identity.trustchain_id,
            user_id,
            ghost.device_id,
            &ghost_signature,
            &user_key,
            &inner.local.signature_key_pair()?,
            &inner.local.encryption_key_pair()?,
            false,
        )?;
        self.requester.push_block(block.to_base64(0)).await?;

        self.authenticate(&inner).await?;
        inner.puller.catch_up(&[], &[]).await?;
        self.state.set(Status::Ready);
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(inner) = self.inner.borrow_mut().take() {
            inner.puller.cancel();
        }
        self.state.set(Status::Stopped);
    }

    /// The server signalled new blocks; re-arm catch-up.
    pub async fn handle_block_available(&self) -> Result<(), Error> {
        let inner = self.ready_inner()?;
        inner.puller.catch_up(&[], &[]).await
    }

    // ── Data path ────────────────────────────────────────────────────────────

    /// Encrypt and share with the given recipients (and ourselves).
    pub async fn encrypt(
        &self,
        clear: &[u8],
        share_with_users: &[String],
        share_with_groups: &[String],
    ) -> Result<Vec<u8>, Error> {
        let inner = self.ready_inner()?;
        let (encrypted, metadata) = encryptor::encrypt(clear)?;
        self.store
            .resource_keys()
            .put(&metadata.resource_id, &metadata.key)
            .await?;
        self.share_resources(
            &inner,
            &[(metadata.resource_id, metadata.key)],
            share_with_users,
            share_with_groups,
            true,
        )
        .await?;
        Ok(encrypted)
    }

    pub async fn decrypt(&self, encrypted: &[u8]) -> Result<Vec<u8>, Error> {
        let inner = self.ready_inner()?;
        let resource_id = encryptor::extract_resource_id(encrypted)?;
        let key = self.resource_key(&inner, &resource_id).await?;
        encryptor::decrypt(&key, encrypted).await
    }

    /// Share existing resources with more recipients.
    pub async fn share(
        &self,
        resource_ids: &[String],
        share_with_users: &[String],
        share_with_groups: &[String],
    ) -> Result<(), Error> {
        let inner = self.ready_inner()?;
        let mut resources = Vec::new();
        for encoded in resource_ids {
            let resource_id = ResourceId::from_base64(encoded)
                .map_err(|e| Error::InvalidArgument(format!("bad resource id: {e}")))?;
            let key = self
                .store
                .resource_keys()
                .find(&resource_id)
                .await?
                .ok_or_else(|| Error::ResourceKeyNotFound(encoded.clone()))?;
            resources.push((resource_id, key));
        }
        self.share_resources(&inner, &resources, share_with_users, share_with_groups, false)
            .await
    }

    pub async fn create_group(&self, member_identities: &[String]) -> Result<String, Error> {
        let inner = self.ready_inner()?;
        let identities = parse_recipients(member_identities)?;
        if identities.is_empty() || identities.len() > MAX_GROUP_SIZE {
            return Err(Error::InvalidGroupSize(format!(
                "a group must have between 1 and {MAX_GROUP_SIZE} members, got {}",
                identities.len()
            )));
        }
        let (members, provisional_members) = self.resolve_members(&inner, &identities).await?;

        let group_signature = sign::make_signature_key_pair();
        let group_encryption = sealed::make_encryption_key_pair();
        let block = groups::generate_create_group_block(
            &inner.local.block_signer()?,
            &group_signature,
            &group_encryption,
            &members,
            &provisional_members,
        )?;
        self.requester.push_block(block.to_base64(0)).await?;
        // The next group operation needs the fresh last-block hash.
        inner.puller.catch_up(&[], &[]).await?;
        Ok(GroupId::from(group_signature.public_key).to_base64())
    }

    pub async fn update_group_members(
        &self,
        group_id: &str,
        members_to_add: &[String],
    ) -> Result<(), Error> {
        let inner = self.ready_inner()?;
        let gid = GroupId::from_base64(group_id)
            .map_err(|e| Error::InvalidArgument(format!("bad group id: {e}")))?;
        let identities = parse_recipients(members_to_add)?;
        if identities.is_empty() || identities.len() > MAX_GROUP_SIZE {
            return Err(Error::InvalidGroupSize(format!(
                "must add between 1 and {MAX_GROUP_SIZE} members, got {}",
                identities.len()
            )));
        }
        let (members, provisional_members) = self.resolve_members(&inner, &identities).await?;

        let group = inner
            .group_accessor(&self.store)
            .find_internal(&gid)
            .await?
            .ok_or_else(|| Error::GroupNotFound(vec![group_id.to_owned()]))?;
        let block = groups::generate_add_members_block(
            &inner.local.block_signer()?,
            &group,
            &members,
            &provisional_members,
        )?;
        self.requester.push_block(block.to_base64(0)).await?;
        inner.puller.catch_up(&[], &[]).await?;
        Ok(())
    }

    /// Revoke one of this user's devices, rotating the user key away from it.
    pub async fn revoke_device(&self, device_id: &str) -> Result<(), Error> {
        let inner = self.ready_inner()?;
        let target = DeviceId::from_base64(device_id)
            .map_err(|e| Error::InvalidArgument(format!("bad device id: {e}")))?;
        let (block, _new_user_key) =
            users::make_revocation_block(&self.store, &inner.local, target).await?;
        self.requester.push_block(block.to_base64(0)).await?;
        inner.puller.catch_up(&[], &[]).await?;
        Ok(())
    }

    /// Claim a provisional identity for this user: everything that was
    /// shared with it becomes decryptable from all our devices.
    pub async fn attach_provisional_identity(&self, identity: &str) -> Result<(), Error> {
        let inner = self.ready_inner()?;
        let provisional = parse_provisional_identity(identity)?;
        let provider_keys = self
            .requester
            .get_provisional_identity_keys(&provisional.value)
            .await?;
        let user_key = inner.local.current_user_key_pair().await?;
        let block = provisional::make_claim_block(
            &inner.local.block_signer()?,
            &provisional,
            &provider_keys,
            &user_key,
            *inner.local.user_id(),
        )?;
        self.requester.push_block(block.to_base64(0)).await?;
        inner.puller.catch_up(&[], &[]).await?;
        Ok(())
    }

    /// One key, many buffers: an encryption session reuses a single
    /// resource across calls (format v5).
    pub async fn make_encryption_session(
        &self,
        share_with_users: &[String],
        share_with_groups: &[String],
    ) -> Result<EncryptionSession, Error> {
        let inner = self.ready_inner()?;
        let mut resource_id = [0u8; ResourceId::SIZE];
        rand::random_fill(&mut resource_id);
        let resource_id = ResourceId::from(resource_id);
        let key = rand::make_symmetric_key();
        self.store.resource_keys().put(&resource_id, &key).await?;
        self.share_resources(
            &inner,
            &[(resource_id, key.clone())],
            share_with_users,
            share_with_groups,
            true,
        )
        .await?;
        Ok(EncryptionSession { resource_id, key })
    }

    /// Chunked streaming encryption (format v4); the stream's resource is
    /// shared before any byte is produced.
    pub async fn make_encryption_stream<S: InputSource>(
        &self,
        source: S,
        share_with_users: &[String],
        share_with_groups: &[String],
    ) -> Result<EncryptionStream<S>, Error> {
        let inner = self.ready_inner()?;
        let stream = EncryptionStream::new(source);
        self.store
            .resource_keys()
            .put(&stream.resource_id(), &stream.symmetric_key())
            .await?;
        self.share_resources(
            &inner,
            &[(stream.resource_id(), stream.symmetric_key())],
            share_with_users,
            share_with_groups,
            true,
        )
        .await?;
        Ok(stream)
    }

    pub async fn make_decryption_stream<S: InputSource>(
        &self,
        source: S,
    ) -> Result<DecryptionStream<S>, Error> {
        let inner = self.ready_inner()?;
        let init = DecryptionStreamInit::read_header(source).await?;
        let key = self.resource_key(&inner, &init.resource_id()).await?;
        init.into_stream(key).await
    }

    // ── Internals ────────────────────────────────────────────────────────────

    fn current_inner(&self) -> Result<Rc<SessionInner>, Error> {
        self.inner
            .borrow()
            .clone()
            .ok_or_else(|| Error::PreconditionFailed("session is not started".into()))
    }

    fn ready_inner(&self) -> Result<Rc<SessionInner>, Error> {
        if self.state.get() != Status::Ready {
            return Err(Error::PreconditionFailed(
                "this operation requires a ready session".into(),
            ));
        }
        let inner = self.current_inner()?;
        if inner.events.device_is_revoked() {
            return Err(Error::PreconditionFailed(
                "this device was revoked".into(),
            ));
        }
        Ok(inner)
    }

    async fn authenticate(&self, inner: &SessionInner) -> Result<(), Error> {
        let keys = inner.local.signature_key_pair()?;
        self.requester
            .authenticate(
                inner.local.trustchain_id(),
                inner.local.user_id(),
                &keys.public_key,
                &keys.private_key,
            )
            .await
    }

    async fn share_resources(
        &self,
        inner: &SessionInner,
        resources: &[(ResourceId, SymmetricKey)],
        share_with_users: &[String],
        share_with_groups: &[String],
        include_self: bool,
    ) -> Result<(), Error> {
        let mut identities = parse_recipients(share_with_users)?;
        let own_user_id = *inner.local.user_id();
        if include_self {
            identities.push(PublicIdentity::Permanent {
                trustchain_id: *inner.local.trustchain_id(),
                user_id: own_user_id,
                value: own_user_id.to_base64(),
            });
        } else {
            // Explicit shares never need to re-share with ourselves.
            identities.retain(|identity| {
                !matches!(identity, PublicIdentity::Permanent { user_id, .. }
                    if *user_id == own_user_id)
            });
        }

        let mut group_ids = Vec::new();
        for encoded in share_with_groups {
            group_ids.push(
                GroupId::from_base64(encoded)
                    .map_err(|e| Error::InvalidArgument(format!("bad group id: {e}")))?,
            );
        }
        group_ids.sort_unstable();
        group_ids.dedup();

        if identities.is_empty() && group_ids.is_empty() {
            return Ok(());
        }

        let recipients = share::generate_recipient_list(
            &inner.user_accessor(&self.store),
            &inner.group_accessor(&self.store),
            &self.requester,
            &identities,
            &group_ids,
        )
        .await?;
        share::share(
            &inner.local.block_signer()?,
            &self.requester,
            resources,
            &recipients,
        )
        .await
    }

    /// Resolve group-member identities into users and provisional users;
    /// unknown permanent members fail `user_not_found` with clear values.
    async fn resolve_members(
        &self,
        inner: &SessionInner,
        identities: &[PublicIdentity],
    ) -> Result<(Vec<User>, Vec<PublicProvisionalUser>), Error> {
        let mut user_ids = Vec::new();
        let mut clear_values = std::collections::HashMap::new();
        let mut provisional = Vec::new();
        for identity in identities {
            match identity {
                PublicIdentity::Permanent { user_id, value, .. } => {
                    user_ids.push(*user_id);
                    clear_values.insert(*user_id, value.clone());
                }
                PublicIdentity::Provisional {
                    email,
                    app_public_signature_key,
                    app_public_encryption_key,
                    ..
                } => provisional.push((
                    email.clone(),
                    *app_public_signature_key,
                    *app_public_encryption_key,
                )),
            }
        }

        let pulled = inner.user_accessor(&self.store).pull(&user_ids).await?;
        if !pulled.missing.is_empty() {
            return Err(Error::UserNotFound(
                pulled
                    .missing
                    .iter()
                    .map(|id| clear_values.get(id).cloned().unwrap_or_else(|| id.to_base64()))
                    .collect(),
            ));
        }

        let mut provisional_users = Vec::new();
        if !provisional.is_empty() {
            let emails: Vec<&str> =
                provisional.iter().map(|(email, _, _)| email.as_str()).collect();
            let provider_keys = self
                .requester
                .get_public_provisional_identities(&emails)
                .await?;
            for ((email, app_signature, app_encryption), provider) in
                provisional.into_iter().zip(provider_keys)
            {
                let provider = provider.ok_or(Error::UserNotFound(vec![email]))?;
                provisional_users.push(PublicProvisionalUser {
                    app_signature_public_key: app_signature,
                    provider_signature_public_key: provider.signature_public_key,
                    app_encryption_public_key: app_encryption,
                    provider_encryption_public_key: provider.encryption_public_key,
                });
            }
        }
        Ok((pulled.found, provisional_users))
    }

    /// Race the key lookup against the configured deadline. The deadline
    /// only interrupts the idle wait, never an in-flight verification, so a
    /// timed-out decrypt leaves the stores consistent.
    async fn resource_key(
        &self,
        inner: &Rc<SessionInner>,
        resource_id: &ResourceId,
    ) -> Result<SymmetricKey, Error> {
        let deadline = tokio::time::Instant::now() + self.decrypt_timeout.get();
        loop {
            if let Some(key) = self.try_resource_key(inner, resource_id).await? {
                return Ok(key);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Err(Error::ResourceKeyNotFound(resource_id.to_base64()));
            }
            let _ = tokio::time::timeout_at(deadline, inner.key_signal.notified()).await;
            if tokio::time::Instant::now() >= deadline {
                return match self.store.resource_keys().find(resource_id).await? {
                    Some(key) => Ok(key),
                    None => Err(Error::ResourceKeyNotFound(resource_id.to_base64())),
                };
            }
        }
    }

    /// Local store, then the chain index, then the server: first a plain
    /// catch-up (key publishes verify against their author's entries), then
    /// a targeted key-publish fetch.
    async fn try_resource_key(
        &self,
        inner: &Rc<SessionInner>,
        resource_id: &ResourceId,
    ) -> Result<Option<SymmetricKey>, Error> {
        if let Some(key) = self.store.resource_keys().find(resource_id).await? {
            return Ok(Some(key));
        }
        let chain = self.store.trustchain();
        let trustchain_id = *inner.local.trustchain_id();
        let mut entry = chain
            .find_key_publish_for_resource(&trustchain_id, resource_id)
            .await?;
        if entry.is_none() {
            inner.puller.catch_up(&[], &[]).await?;
            entry = chain
                .find_key_publish_for_resource(&trustchain_id, resource_id)
                .await?;
        }
        if entry.is_none() {
            let blocks = self.requester.get_key_publishes(&[*resource_id]).await?;
            for block in &blocks {
                let parsed = ServerEntry::from_base64(block)?;
                inner.puller.verify_and_apply(parsed).await?;
            }
            entry = chain
                .find_key_publish_for_resource(&trustchain_id, resource_id)
                .await?;
        }
        if let Some(entry) = entry {
            if let Action::KeyPublish(key_publish) = &entry.action {
                if crate::receive_key::apply_key_publish(&self.store, &inner.local, key_publish)
                    .await?
                {
                    return Ok(self.store.resource_keys().find(resource_id).await?);
                }
            }
        }
        Ok(None)
    }
}

/// Encrypts many buffers under one resource (format v5).
pub struct EncryptionSession {
    resource_id: ResourceId,
    key: SymmetricKey,
}

impl EncryptionSession {
    pub fn resource_id(&self) -> String {
        self.resource_id.to_base64()
    }

    pub fn encrypt(&self, clear: &[u8]) -> Result<Vec<u8>, Error> {
        let (encrypted, _) = v5::encrypt(clear, &self.resource_id, &self.key)?;
        Ok(encrypted)
    }
}

fn parse_recipients(identities: &[String]) -> Result<Vec<PublicIdentity>, Error> {
    let mut seen = HashSet::new();
    let mut parsed = Vec::new();
    for encoded in identities {
        let identity = parse_public_identity(encoded)?;
        if seen.insert(identity.clear_value().to_owned()) {
            parsed.push(identity);
        }
    }
    Ok(parsed)
}

fn encode_verification_key(ghost: &GhostDevice) -> String {
    STANDARD.encode(serde_json::to_vec(ghost).expect("ghost device serialization cannot fail"))
}

/// `iv(24) ‖ aead(user_secret, iv, verification_key)`, base64-encoded.
fn encrypt_verification_key(
    user_secret: SymmetricKey,
    verification_key: &str,
) -> Result<String, Error> {
    let iv = rand::make_aead_iv();
    let ciphertext = aead::aead_encrypt(&user_secret, &iv, verification_key.as_bytes(), &[])?;
    let mut out = Vec::with_capacity(iv.as_ref().len() + ciphertext.len());
    out.extend_from_slice(iv.as_ref());
    out.extend_from_slice(&ciphertext);
    Ok(STANDARD.encode(out))
}

fn decrypt_verification_key(
    user_secret: &SymmetricKey,
    encrypted: &str,
) -> Result<GhostDevice, Error> {
    let bytes = STANDARD
        .decode(encrypted)
        .map_err(|e| Error::InvalidVerification(format!("bad verification key: {e}")))?;
    if bytes.len() < cv_crypto::AeadIv::SIZE {
        return Err(Error::InvalidVerification("truncated verification key".into()));
    }
    let (iv_bytes, ciphertext) = bytes.split_at(cv_crypto::AeadIv::SIZE);
    let iv = cv_crypto::AeadIv::try_from(iv_bytes)?;
    let clear = aead::aead_decrypt(user_secret, &iv, ciphertext, &[])
        .map_err(|_| Error::InvalidVerification("cannot decrypt verification key".into()))?;
    let json = STANDARD
        .decode(&clear)
        .map_err(|e| Error::InvalidVerification(format!("bad verification key: {e}")))?;
    serde_json::from_slice(&json)
        .map_err(|e| Error::InvalidVerification(format!("bad verification key: {e}")))
}

/// Replay the user's chain as the ghost device to recover the *current*
/// user key: the ghost's creation seals the initial key, and every later
/// rotation seals the new key to each remaining device, the ghost included.
async fn recover_user_key_as_ghost(
    requester: &Requester,
    user_id: &UserId,
    ghost: &GhostDevice,
    ghost_encryption: &EncryptionKeyPair,
) -> Result<EncryptionKeyPair, Error> {
    let blocks = requester.get_users_by_ids(std::slice::from_ref(user_id)).await?;
    let mut current: Option<EncryptionKeyPair> = None;
    for block in &blocks {
        let entry = ServerEntry::from_base64(block)?;
        match &entry.action {
            Action::DeviceCreation(creation)
                if entry.hash == Hash::from(ghost.device_id) =>
            {
                if let Some(user_key_pair) = creation.user_key_pair() {
                    let private = sealed::seal_decrypt(
                        user_key_pair.sealed_private_encryption_key.as_ref(),
                        ghost_encryption,
                    )?;
                    current = Some(EncryptionKeyPair {
                        public_key: user_key_pair.public_encryption_key,
                        private_key: private.as_slice().try_into()?,
                    });
                }
            }
            Action::DeviceRevocation(cv_chain::actions::DeviceRevocation::V2(rotation)) => {
                if let Some((_, sealed_key)) = rotation
                    .sealed_user_keys_for_devices
                    .iter()
                    .find(|(device_id, _)| *device_id == ghost.device_id)
                {
                    let private =
                        sealed::seal_decrypt(sealed_key.as_ref(), ghost_encryption)?;
                    current = Some(EncryptionKeyPair {
                        public_key: rotation.public_encryption_key,
                        private_key: private.as_slice().try_into()?,
                    });
                }
            }
            _ => {}
        }
    }
    current.ok_or_else(|| {
        Error::InvalidVerification("cannot recover the user key from the chain".into())
    })
}
