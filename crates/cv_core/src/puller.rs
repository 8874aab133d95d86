//! The catch-up job: pull entries newer than the local last index, verify
//! them in server order, index them, and apply their side-effects.
//!
//! Concurrent catch-ups coalesce: callers queued behind an in-flight pull
//! observe its completion instead of re-pulling. `cancel` takes effect at
//! the next suspension point between entries, never mid-verification.

use std::cell::Cell;
use std::rc::Rc;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use cv_chain::actions::Action;
use cv_chain::{GroupId, Nature, ServerEntry, TrustchainId, UserId, VerifiedEntry};
use cv_store::Store;

use crate::error::Error;
use crate::events::{EventSink, SessionEvent};
use crate::local_user::LocalUser;
use crate::receive_key;
use crate::transport::Requester;
use crate::verif::Verifier;
use crate::{groups, provisional, users};

pub struct Puller {
    trustchain_id: TrustchainId,
    store: Store,
    requester: Rc<Requester>,
    local: Rc<LocalUser>,
    verifier: Verifier,
    events: Rc<EventSink>,
    key_signal: Rc<Notify>,
    pull_lock: Mutex<()>,
    generation: Cell<u64>,
    cancelled: Cell<bool>,
}

impl Puller {
    pub fn new(
        trustchain_id: TrustchainId,
        store: Store,
        requester: Rc<Requester>,
        local: Rc<LocalUser>,
        events: Rc<EventSink>,
        key_signal: Rc<Notify>,
    ) -> Self {
        let verifier = Verifier::new(trustchain_id, store.clone());
        Self {
            trustchain_id,
            store,
            requester,
            local,
            verifier,
            events,
            key_signal,
            pull_lock: Mutex::new(()),
            generation: Cell::new(0),
            cancelled: Cell::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    pub fn reset(&self) {
        self.cancelled.set(false);
    }

    /// Pull, verify and apply everything new. Plain catch-ups that were
    /// queued behind a completed pull return without pulling again;
    /// catch-ups with explicit sub-queries always hit the server.
    pub async fn catch_up(
        &self,
        extra_users: &[UserId],
        extra_groups: &[GroupId],
    ) -> Result<(), Error> {
        let observed_generation = self.generation.get();
        let _guard = self.pull_lock.lock().await;
        if extra_users.is_empty()
            && extra_groups.is_empty()
            && self.generation.get() != observed_generation
        {
            debug!("catch-up coalesced with a just-finished pull");
            return Ok(());
        }
        self.pull(extra_users, extra_groups).await?;
        self.generation.set(self.generation.get().wrapping_add(1));
        Ok(())
    }

    async fn pull(&self, extra_users: &[UserId], extra_groups: &[GroupId]) -> Result<(), Error> {
        let last_index = self.store.trustchain().last_index().await?;
        let blocks = self
            .requester
            .get_blocks(last_index, extra_users, extra_groups)
            .await?;
        debug!(count = blocks.len(), last_index, "processing pulled blocks");
        for block in &blocks {
            if self.cancelled.get() {
                return Err(Error::NetworkError("catch-up canceled".into()));
            }
            let entry = ServerEntry::from_base64(block)?;
            self.verify_and_apply(entry).await?;
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    /// Verify one entry and apply it. Already-known entries are skipped, so
    /// overlapping sub-queries stay idempotent. Invalid claim blocks are
    /// logged and skipped; any other verification failure aborts.
    pub(crate) async fn verify_and_apply(&self, entry: ServerEntry) -> Result<(), Error> {
        if entry.trustchain_id != self.trustchain_id {
            return Err(Error::verification(
                crate::error::VerificationCode::InvalidAuthor,
                "entry belongs to another trustchain",
            ));
        }
        if self.store.trustchain().contains(&entry.hash).await? {
            return Ok(());
        }
        match self.verifier.verify(&entry).await {
            Ok(verified) => {
                self.store.trustchain().add_entry(&entry).await?;
                self.apply(&verified).await
            }
            Err(err)
                if entry.nature == Nature::ProvisionalIdentityClaim
                    && err.is_verification_failure() =>
            {
                warn!(hash = %entry.hash, error = %err, "skipping invalid claim block");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    async fn apply(&self, entry: &VerifiedEntry) -> Result<(), Error> {
        match &entry.action {
            Action::TrustchainCreation(creation) => {
                self.store
                    .trustchain()
                    .set_trustchain_public_signature_key(&creation.public_signature_key)
                    .await?;
            }
            Action::DeviceCreation(creation) => {
                users::apply_device_creation(
                    &self.store,
                    &self.local,
                    entry,
                    creation,
                    &self.events,
                )
                .await?;
            }
            Action::DeviceRevocation(revocation) => {
                users::apply_device_revocation(
                    &self.store,
                    &self.local,
                    entry,
                    revocation,
                    &self.events,
                )
                .await?;
            }
            Action::KeyPublish(key_publish) => {
                // Legacy device publishes are decrypted eagerly; the modern
                // forms are resolved lazily on decrypt.
                if let cv_chain::actions::KeyPublish::ToDevice(_) = key_publish {
                    receive_key::apply_key_publish(&self.store, &self.local, key_publish)
                        .await?;
                }
                self.events
                    .push(SessionEvent::KeyPublishReceived(*key_publish.resource_id()));
                self.key_signal.notify_waiters();
            }
            Action::UserGroupCreation(_) | Action::UserGroupAddition(_) => {
                groups::apply_user_group_entry(&self.store, &self.local, entry, &self.events)
                    .await?;
            }
            Action::ProvisionalIdentityClaim(claim) => {
                provisional::apply_claim(&self.store, &self.local, entry, claim, &self.events)
                    .await?;
                // A claim may unlock stashed group keys and with them
                // pending key publishes.
                self.key_signal.notify_waiters();
            }
        }
        Ok(())
    }
}
