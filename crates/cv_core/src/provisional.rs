//! Provisional identities: claim construction and the claim applier.
//!
//! Claims are verified best-effort by the puller: a bad claim block is
//! logged and skipped rather than aborting the catch-up.

use cv_chain::actions::{Action, ProvisionalIdentityClaim};
use cv_chain::{Block, VerifiedEntry};
use cv_crypto::{
    sealed, sign, EncryptionKeyPair, PrivateEncryptionKey, PublicEncryptionKey,
    PublicSignatureKey, SealedPrivateEncryptionKeyPair,
};
use cv_store::models::{Group, ProvisionalUserKeys};
use cv_store::Store;

use crate::error::Error;
use crate::events::{EventSink, SessionEvent};
use crate::groups::promote_to_internal;
use crate::identity::SecretProvisionalIdentity;
use crate::local_user::{BlockSigner, LocalUser};
use crate::transport::ProviderKeys;

/// A fully-resolved provisional recipient: the app half from the public
/// identity, the provider half from the server lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicProvisionalUser {
    pub app_signature_public_key: PublicSignatureKey,
    pub provider_signature_public_key: PublicSignatureKey,
    pub app_encryption_public_key: PublicEncryptionKey,
    pub provider_encryption_public_key: PublicEncryptionKey,
}

/// Build the claim block binding both identity halves to our user.
pub(crate) fn make_claim_block(
    signer: &BlockSigner,
    identity: &SecretProvisionalIdentity,
    provider_keys: &ProviderKeys,
    user_key_pair: &EncryptionKeyPair,
    user_id: cv_chain::UserId,
) -> Result<Block, Error> {
    let mut key_pair_bytes = [0u8; 64];
    key_pair_bytes[..32].copy_from_slice(identity.private_encryption_key.as_bytes());
    key_pair_bytes[32..].copy_from_slice(
        provider_keys.encryption_key_pair.private_key.as_bytes(),
    );
    let sealed_keys = sealed::seal_encrypt(&key_pair_bytes, &user_key_pair.public_key)?;

    let mut claim = ProvisionalIdentityClaim {
        user_id,
        app_public_signature_key: identity.public_signature_key,
        provider_public_signature_key: provider_keys.signature_key_pair.public_key,
        author_signature_by_app_key: cv_crypto::Signature::default(),
        author_signature_by_provider_key: cv_crypto::Signature::default(),
        recipient_user_public_key: user_key_pair.public_key,
        sealed_private_encryption_keys: SealedPrivateEncryptionKeyPair::try_from(
            sealed_keys.as_slice(),
        )?,
    };
    let signed_data = claim.signature_data(&signer.device_id);
    claim.author_signature_by_app_key =
        sign::sign(&signed_data, &identity.private_signature_key);
    claim.author_signature_by_provider_key = sign::sign(
        &signed_data,
        &provider_keys.signature_key_pair.private_key,
    );

    Ok(signer.make_block(&Action::ProvisionalIdentityClaim(claim)))
}

/// Apply a verified claim: unseal both private encryption keys, store them,
/// then promote any group whose provisional entries this identity unlocks.
pub(crate) async fn apply_claim(
    store: &Store,
    local: &LocalUser,
    entry: &VerifiedEntry,
    claim: &ProvisionalIdentityClaim,
    events: &EventSink,
) -> Result<(), Error> {
    if claim.user_id != *local.user_id() {
        return Ok(());
    }
    let user_key_pair = local
        .find_user_key_pair(&claim.recipient_user_public_key)
        .await?
        .ok_or_else(|| {
            Error::InternalError("cannot find user key for claim decryption".into())
        })?;

    let key_pair_bytes =
        sealed::seal_decrypt(claim.sealed_private_encryption_keys.as_ref(), &user_key_pair)?;
    if key_pair_bytes.len() != 64 {
        return Err(Error::InternalError(
            "claim carries a malformed private key pair".into(),
        ));
    }
    let app_private: PrivateEncryptionKey = key_pair_bytes[..32].try_into()?;
    let provider_private: PrivateEncryptionKey = key_pair_bytes[32..].try_into()?;
    let keys = ProvisionalUserKeys {
        app_keys: sealed::make_encryption_key_pair_from_private(&app_private),
        provider_keys: sealed::make_encryption_key_pair_from_private(&provider_private),
    };
    store
        .provisional_user_keys()
        .put(
            &claim.app_public_signature_key,
            &claim.provider_public_signature_key,
            &keys,
        )
        .await?;

    promote_stashed_groups(store, claim, &keys).await?;
    events.push(SessionEvent::ProvisionalIdentityClaimed(claim.user_id));
    Ok(())
}

async fn promote_stashed_groups(
    store: &Store,
    claim: &ProvisionalIdentityClaim,
    keys: &ProvisionalUserKeys,
) -> Result<(), Error> {
    let groups = store.groups();
    let stashed = groups
        .find_provisional_keys(
            &claim.app_public_signature_key,
            &claim.provider_public_signature_key,
        )
        .await?;
    for (group_id, twice_sealed) in stashed {
        let Some(Group::External(external)) = groups.find_by_id(&group_id).await? else {
            continue;
        };
        let inner = sealed::seal_decrypt(twice_sealed.as_ref(), &keys.app_keys)?;
        let group_private: PrivateEncryptionKey =
            sealed::seal_decrypt(&inner, &keys.provider_keys)?.as_slice().try_into()?;
        promote_to_internal(
            store,
            &external,
            group_private,
            external.last_block_hash,
            external.last_block_index,
        )
        .await?;
    }
    groups
        .delete_provisional_keys(
            &claim.app_public_signature_key,
            &claim.provider_public_signature_key,
        )
        .await?;
    Ok(())
}
