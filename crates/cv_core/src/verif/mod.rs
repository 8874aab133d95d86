//! Chain entry verification.
//!
//! Every entry pulled from the server goes through `Verifier::verify` before
//! anything is applied to the local stores. Checks are semantic and depend
//! on previously verified entries (users, devices, groups already applied).

mod device_creation;
mod device_revocation;
mod key_publish;
mod provisional_identity_claim;
mod trustchain_creation;
mod user_group;

pub use provisional_identity_claim::verify_provisional_identity_claim;

use cv_chain::actions::Action;
use cv_chain::{DeviceId, ServerEntry, TrustchainId, VerifiedEntry};
use cv_store::models::{Device, Group, User};
use cv_store::Store;

use crate::error::{Error, VerificationCode};

pub(crate) fn ensure(
    condition: bool,
    code: VerificationCode,
    message: &str,
) -> Result<(), Error> {
    if condition {
        Ok(())
    } else {
        Err(Error::verification(code, message))
    }
}

pub struct Verifier {
    trustchain_id: TrustchainId,
    store: Store,
}

impl Verifier {
    pub fn new(trustchain_id: TrustchainId, store: Store) -> Self {
        Self {
            trustchain_id,
            store,
        }
    }

    pub async fn verify(&self, entry: &ServerEntry) -> Result<VerifiedEntry, Error> {
        match &entry.action {
            Action::TrustchainCreation(_) => {
                trustchain_creation::verify(entry, &self.trustchain_id)?;
            }
            Action::DeviceCreation(_) => self.verify_device_creation(entry).await?,
            Action::KeyPublish(_) => self.verify_key_publish(entry).await?,
            Action::DeviceRevocation(_) => self.verify_device_revocation(entry).await?,
            Action::UserGroupCreation(_) => self.verify_user_group_creation(entry).await?,
            Action::UserGroupAddition(_) => self.verify_user_group_addition(entry).await?,
            Action::ProvisionalIdentityClaim(_) => {
                self.verify_provisional_identity_claim(entry).await?
            }
        }
        Ok(VerifiedEntry::of(entry))
    }

    async fn verify_device_creation(&self, entry: &ServerEntry) -> Result<(), Error> {
        let Action::DeviceCreation(creation) = &entry.action else {
            unreachable!("dispatched on nature");
        };
        if entry.author.as_ref() == self.trustchain_id.as_ref() {
            let trustchain_key = self
                .store
                .trustchain()
                .trustchain_public_signature_key()
                .await?
                .ok_or_else(|| {
                    Error::verification(
                        VerificationCode::InvalidAuthor,
                        "root block has not been verified yet",
                    )
                })?;
            let known_user = self
                .store
                .contacts()
                .user_exists(creation.user_id())
                .await?;
            device_creation::verify_first_device(entry, creation, &trustchain_key, known_user)
        } else {
            let (user, author) = self.author_and_user(entry).await?;
            device_creation::verify_added_device(entry, creation, &author, &user)
        }
    }

    async fn verify_key_publish(&self, entry: &ServerEntry) -> Result<(), Error> {
        let Action::KeyPublish(kp) = &entry.action else {
            unreachable!("dispatched on nature");
        };
        let (_, author) = self.author_and_user(entry).await?;
        match kp {
            cv_chain::actions::KeyPublish::ToDevice(to_device) => {
                let recipient_user = self.user_of_device(&to_device.recipient).await?;
                key_publish::verify_to_device(entry, &author, &recipient_user)
            }
            cv_chain::actions::KeyPublish::ToUser(_)
            | cv_chain::actions::KeyPublish::ToProvisionalUser(_) => {
                key_publish::verify_to_user(entry, &author)
            }
            cv_chain::actions::KeyPublish::ToUserGroup(to_group) => {
                let group = self
                    .store
                    .groups()
                    .find_by_public_encryption_key(&to_group.recipient_public_encryption_key)
                    .await?;
                let group = group.ok_or_else(|| {
                    Error::verification(VerificationCode::InvalidGroup, "group not found")
                })?;
                key_publish::verify_to_user_group(entry, &author, &group)
            }
        }
    }

    async fn verify_device_revocation(&self, entry: &ServerEntry) -> Result<(), Error> {
        let Action::DeviceRevocation(revocation) = &entry.action else {
            unreachable!("dispatched on nature");
        };
        let (user, author) = self.author_and_user(entry).await?;
        let target = user.find_device(revocation.device_id()).ok_or_else(|| {
            Error::verification(
                VerificationCode::InvalidAuthor,
                "a device can only be revoked by another device of its user",
            )
        })?;
        device_revocation::verify(entry, revocation, &author, target, &user)
    }

    async fn verify_user_group_creation(&self, entry: &ServerEntry) -> Result<(), Error> {
        let Action::UserGroupCreation(creation) = &entry.action else {
            unreachable!("dispatched on nature");
        };
        let (_, author) = self.author_and_user(entry).await?;
        let existing = self
            .store
            .groups()
            .find_by_public_encryption_key(creation.public_encryption_key())
            .await?;
        ensure(
            existing.is_none(),
            VerificationCode::InvalidGroup,
            "a group with this public encryption key already exists",
        )?;
        user_group::verify_creation(entry, creation, &author)
    }

    async fn verify_user_group_addition(&self, entry: &ServerEntry) -> Result<(), Error> {
        let Action::UserGroupAddition(addition) = &entry.action else {
            unreachable!("dispatched on nature");
        };
        let (_, author) = self.author_and_user(entry).await?;
        let group = self
            .store
            .groups()
            .find_by_id(addition.group_id())
            .await?
            .ok_or_else(|| {
                Error::verification(VerificationCode::InvalidGroup, "group not found")
            })?;
        user_group::verify_addition(entry, addition, &author, &group)
    }

    async fn verify_provisional_identity_claim(&self, entry: &ServerEntry) -> Result<(), Error> {
        let Action::ProvisionalIdentityClaim(claim) = &entry.action else {
            unreachable!("dispatched on nature");
        };
        let (user, author) = self.author_and_user(entry).await?;
        provisional_identity_claim::verify(entry, claim, &author, &user)
    }

    // ── Lookups ──────────────────────────────────────────────────────────────

    async fn author_and_user(&self, entry: &ServerEntry) -> Result<(User, Device), Error> {
        let author_id = DeviceId::try_from(entry.author.as_ref())
            .map_err(|e| Error::InternalError(e.to_string()))?;
        let user = self.user_of_device(&author_id).await?;
        let author = user
            .find_device(&author_id)
            .cloned()
            .ok_or_else(|| Error::InternalError("device missing from its own user".into()))?;
        Ok((user, author))
    }

    async fn user_of_device(&self, device_id: &DeviceId) -> Result<User, Error> {
        let contacts = self.store.contacts();
        let user_id = contacts
            .find_user_id_by_device(device_id)
            .await?
            .ok_or_else(|| {
                Error::verification(VerificationCode::InvalidAuthor, "device not found")
            })?;
        contacts.find_user(&user_id).await?.ok_or_else(|| {
            Error::verification(VerificationCode::InvalidAuthor, "user not found")
        })
    }
}

/// Group state the verifier needs regardless of internal/external.
pub(crate) fn group_signature_key(group: &Group) -> cv_crypto::PublicSignatureKey {
    *group.public_signature_key()
}
