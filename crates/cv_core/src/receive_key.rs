//! Turning a key publish back into a resource key.

use cv_chain::actions::KeyPublish;
use cv_crypto::{sealed, SymmetricKey};
use cv_store::models::Group;
use cv_store::Store;

use crate::error::Error;
use crate::local_user::LocalUser;

/// Try to decrypt a key publish with whatever key material we hold, storing
/// the resource key on success. Returns whether a key was stored; a publish
/// addressed to someone else is not an error.
pub(crate) async fn apply_key_publish(
    store: &Store,
    local: &LocalUser,
    key_publish: &KeyPublish,
) -> Result<bool, Error> {
    let clear_key: Option<Vec<u8>> = match key_publish {
        KeyPublish::ToDevice(kp) => {
            if Some(kp.recipient) == local.device_id()? {
                Some(sealed::seal_decrypt(
                    kp.sealed_symmetric_key.as_ref(),
                    &local.encryption_key_pair()?,
                )?)
            } else {
                None
            }
        }
        KeyPublish::ToUser(kp) => {
            match local
                .find_user_key_pair(&kp.recipient_public_encryption_key)
                .await?
            {
                Some(user_keys) => Some(sealed::seal_decrypt(
                    kp.sealed_symmetric_key.as_ref(),
                    &user_keys,
                )?),
                None => None,
            }
        }
        KeyPublish::ToUserGroup(kp) => {
            match store
                .groups()
                .find_by_public_encryption_key(&kp.recipient_public_encryption_key)
                .await?
            {
                Some(Group::Internal(group)) => Some(sealed::seal_decrypt(
                    kp.sealed_symmetric_key.as_ref(),
                    &group.encryption_key_pair,
                )?),
                _ => None,
            }
        }
        KeyPublish::ToProvisionalUser(kp) => {
            match store
                .provisional_user_keys()
                .find(
                    &kp.app_public_signature_key,
                    &kp.provider_public_signature_key,
                )
                .await?
            {
                Some(keys) => {
                    let inner = sealed::seal_decrypt(
                        kp.two_times_sealed_symmetric_key.as_ref(),
                        &keys.app_keys,
                    )?;
                    Some(sealed::seal_decrypt(&inner, &keys.provider_keys)?)
                }
                None => None,
            }
        }
    };

    match clear_key {
        Some(bytes) => {
            let key: SymmetricKey = bytes.as_slice().try_into()?;
            store
                .resource_keys()
                .put(key_publish.resource_id(), &key)
                .await?;
            Ok(true)
        }
        None => Ok(false),
    }
}
