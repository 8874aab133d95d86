//! Key distribution: resolve recipients, seal resource keys to them, and
//! push the resulting key-publish blocks.

use std::collections::HashMap;

use cv_chain::actions::{
    Action, KeyPublish, KeyPublishToProvisionalUser, KeyPublishToUser, KeyPublishToUserGroup,
};
use cv_chain::{Block, GroupId, ResourceId, UserId};
use cv_crypto::{sealed, PublicEncryptionKey, SymmetricKey};

use crate::error::Error;
use crate::groups::GroupAccessor;
use crate::identity::PublicIdentity;
use crate::local_user::BlockSigner;
use crate::provisional::PublicProvisionalUser;
use crate::transport::Requester;
use crate::users::{user_recipient_key, UserAccessor};

/// Resolved recipient keys, one entry per key-publish block to build.
#[derive(Debug, Default)]
pub struct KeyRecipients {
    pub user_keys: Vec<PublicEncryptionKey>,
    pub group_keys: Vec<PublicEncryptionKey>,
    pub provisional_users: Vec<PublicProvisionalUser>,
}

/// Resolve public identities and group ids into recipient keys.
///
/// Unknown users or groups fail with `recipient_not_found` carrying the
/// clear values the caller supplied (never the obfuscated ids).
pub(crate) async fn generate_recipient_list(
    user_accessor: &UserAccessor,
    group_accessor: &GroupAccessor,
    requester: &Requester,
    identities: &[PublicIdentity],
    group_ids: &[GroupId],
) -> Result<KeyRecipients, Error> {
    let mut clear_values: HashMap<UserId, String> = HashMap::new();
    let mut user_ids = Vec::new();
    let mut provisional = Vec::new();
    for identity in identities {
        match identity {
            PublicIdentity::Permanent { user_id, value, .. } => {
                clear_values.insert(*user_id, value.clone());
                user_ids.push(*user_id);
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

    let mut missing_users: Vec<String> = Vec::new();
    let mut missing_groups: Vec<String> = Vec::new();
    let mut recipients = KeyRecipients::default();

    let users = user_accessor.pull(&user_ids).await?;
    for user_id in &users.missing {
        missing_users.push(
            clear_values
                .get(user_id)
                .cloned()
                .unwrap_or_else(|| user_id.to_base64()),
        );
    }
    for user in &users.found {
        recipients.user_keys.push(user_recipient_key(user)?);
    }

    if !provisional.is_empty() {
        let emails: Vec<&str> = provisional.iter().map(|(email, _, _)| email.as_str()).collect();
        let provider_keys = requester.get_public_provisional_identities(&emails).await?;
        if provider_keys.len() != provisional.len() {
            return Err(Error::InternalError(
                "provisional identity lookup returned a mismatched count".into(),
            ));
        }
        for ((email, app_signature, app_encryption), provider) in
            provisional.into_iter().zip(provider_keys)
        {
            match provider {
                Some(provider) => recipients.provisional_users.push(PublicProvisionalUser {
                    app_signature_public_key: app_signature,
                    provider_signature_public_key: provider.signature_public_key,
                    app_encryption_public_key: app_encryption,
                    provider_encryption_public_key: provider.encryption_public_key,
                }),
                None => missing_users.push(email),
            }
        }
    }

    let groups = group_accessor.pull(group_ids).await?;
    for group_id in &groups.missing {
        missing_groups.push(group_id.to_base64());
    }
    for group in &groups.found {
        recipients.group_keys.push(*group.public_encryption_key());
    }

    if !missing_users.is_empty() || !missing_groups.is_empty() {
        return Err(Error::RecipientNotFound {
            user_ids: missing_users,
            group_ids: missing_groups,
        });
    }
    Ok(recipients)
}

/// One key-publish block per (resource, recipient) pair. Publishes target
/// user keys, group keys and provisional identities; the legacy to-device
/// form is read-only.
pub(crate) fn generate_share_blocks(
    signer: &BlockSigner,
    resource_keys: &[(ResourceId, SymmetricKey)],
    recipients: &KeyRecipients,
) -> Result<Vec<Block>, Error> {
    let mut blocks = Vec::new();
    for (resource_id, key) in resource_keys {
        for recipient in &recipients.user_keys {
            let sealed_key = sealed::seal_encrypt(key.as_bytes(), recipient)?;
            blocks.push(signer.make_block(&Action::KeyPublish(KeyPublish::ToUser(
                KeyPublishToUser {
                    recipient_public_encryption_key: *recipient,
                    resource_id: *resource_id,
                    sealed_symmetric_key: sealed_key.as_slice().try_into()?,
                },
            ))));
        }
        for recipient in &recipients.group_keys {
            let sealed_key = sealed::seal_encrypt(key.as_bytes(), recipient)?;
            blocks.push(signer.make_block(&Action::KeyPublish(KeyPublish::ToUserGroup(
                KeyPublishToUserGroup {
                    recipient_public_encryption_key: *recipient,
                    resource_id: *resource_id,
                    sealed_symmetric_key: sealed_key.as_slice().try_into()?,
                },
            ))));
        }
        for recipient in &recipients.provisional_users {
            let inner =
                sealed::seal_encrypt(key.as_bytes(), &recipient.provider_encryption_public_key)?;
            let outer = sealed::seal_encrypt(&inner, &recipient.app_encryption_public_key)?;
            blocks.push(signer.make_block(&Action::KeyPublish(
                KeyPublish::ToProvisionalUser(KeyPublishToProvisionalUser {
                    app_public_signature_key: recipient.app_signature_public_key,
                    provider_public_signature_key: recipient.provider_signature_public_key,
                    resource_id: *resource_id,
                    two_times_sealed_symmetric_key: outer.as_slice().try_into()?,
                }),
            )));
        }
    }
    Ok(blocks)
}

/// Share already-known resource keys with the resolved recipients.
pub(crate) async fn share(
    signer: &BlockSigner,
    requester: &Requester,
    resource_keys: &[(ResourceId, SymmetricKey)],
    recipients: &KeyRecipients,
) -> Result<(), Error> {
    let blocks = generate_share_blocks(signer, resource_keys, recipients)?;
    let wire: Vec<String> = blocks.iter().map(|b| b.to_base64(0)).collect();
    requester.push_keys(wire).await
}
