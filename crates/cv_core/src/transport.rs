//! Server transport seam and the typed requester over it.
//!
//! The transport is a request/response JSON channel plus a push notification
//! (`block_available`) that re-arms catch-up. The session only ever talks to
//! the server through `Requester`; tests plug in an in-process double.

use std::rc::Rc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use cv_chain::{DeviceId, ResourceId, TrustchainId, UserId};
use cv_crypto::{
    hash::generic_hash, sign, PrivateSignatureKey, PublicEncryptionKey, PublicSignatureKey,
    Signature,
};

use crate::error::Error;

/// The server could get us to sign anything if we skipped this check.
pub const AUTH_CHALLENGE_PREFIX: &str = "\u{1F512} Auth Challenge. 1234567890.";

#[async_trait(?Send)]
pub trait Transport {
    async fn emit(&self, target: &str, message: Value) -> Result<Value, Error>;
}

/// Provider-half public keys of a provisional identity, as served for a
/// hashed email lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProviderPublicKeys {
    pub signature_public_key: PublicSignatureKey,
    pub encryption_public_key: PublicEncryptionKey,
}

/// Provider-half private key material, disclosed on claim.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderKeys {
    pub signature_key_pair: cv_crypto::SignatureKeyPair,
    pub encryption_key_pair: cv_crypto::EncryptionKeyPair,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct UserStatus {
    pub user_exists: bool,
    pub device_exists: bool,
}

pub struct Requester {
    transport: Rc<dyn Transport>,
}

impl Requester {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self { transport }
    }

    fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, Error> {
        serde_json::from_value(value)
            .map_err(|e| Error::InternalError(format!("malformed server response: {e}")))
    }

    /// Fetch the auth challenge, check the mandatory prefix, sign it with
    /// the device signature key and authenticate.
    pub async fn authenticate(
        &self,
        trustchain_id: &TrustchainId,
        user_id: &UserId,
        public_signature_key: &PublicSignatureKey,
        private_signature_key: &PrivateSignatureKey,
    ) -> Result<(), Error> {
        let response = self
            .transport
            .emit("request auth challenge", json!({}))
            .await?;
        let challenge = response
            .get("challenge")
            .and_then(|c| c.as_str())
            .ok_or_else(|| Error::InternalError("auth challenge without challenge".into()))?
            .to_owned();
        if !challenge.starts_with(AUTH_CHALLENGE_PREFIX) {
            return Err(Error::InternalError(
                "received auth challenge does not contain mandatory prefix, server may \
                 not be up to date, or we may be under attack"
                    .into(),
            ));
        }
        let signature: Signature = sign::sign(challenge.as_bytes(), private_signature_key);
        self.transport
            .emit(
                "authenticate device",
                json!({
                    "signature": signature,
                    "public_signature_key": public_signature_key,
                    "trustchain_id": trustchain_id,
                    "user_id": user_id,
                }),
            )
            .await?;
        Ok(())
    }

    /// All blocks strictly after `index`, in server order, plus the chains
    /// of any explicitly named users and groups.
    pub async fn get_blocks(
        &self,
        index: u64,
        extra_users: &[UserId],
        extra_groups: &[cv_chain::GroupId],
    ) -> Result<Vec<String>, Error> {
        let response = self
            .transport
            .emit(
                "get blocks",
                json!({
                    "index": index,
                    "extra_users": extra_users,
                    "extra_groups": extra_groups,
                }),
            )
            .await?;
        Self::decode(response)
    }

    pub async fn get_me(&self) -> Result<Vec<String>, Error> {
        let response = self.transport.emit("get my user blocks", json!({})).await?;
        Self::decode(response)
    }

    pub async fn get_users_by_ids(&self, user_ids: &[UserId]) -> Result<Vec<String>, Error> {
        let response = self
            .transport
            .emit("get users blocks", json!({ "user_ids": user_ids }))
            .await?;
        Self::decode(response)
    }

    pub async fn get_users_by_device_ids(
        &self,
        device_ids: &[DeviceId],
    ) -> Result<Vec<String>, Error> {
        let response = self
            .transport
            .emit("get users blocks", json!({ "device_ids": device_ids }))
            .await?;
        Self::decode(response)
    }

    pub async fn get_key_publishes(
        &self,
        resource_ids: &[ResourceId],
    ) -> Result<Vec<String>, Error> {
        let response = self
            .transport
            .emit("get key publishes", json!({ "resource_ids": resource_ids }))
            .await?;
        Self::decode(response)
    }

    /// Look up the provider-half public keys for provisional recipients,
    /// by hashed email. Emails are hashed before they leave the device.
    pub async fn get_public_provisional_identities(
        &self,
        emails: &[&str],
    ) -> Result<Vec<Option<ProviderPublicKeys>>, Error> {
        if emails.is_empty() {
            return Ok(vec![]);
        }
        let message: Vec<Value> = emails
            .iter()
            .map(|email| {
                json!({
                    "type": "email",
                    "hashed_email": generic_hash(email.as_bytes()),
                })
            })
            .collect();
        let response = self
            .transport
            .emit("get public provisional identities", Value::Array(message))
            .await?;
        Self::decode(response)
    }

    /// Claim-time disclosure of the provider identity half.
    pub async fn get_provisional_identity_keys(
        &self,
        email: &str,
    ) -> Result<ProviderKeys, Error> {
        let response = self
            .transport
            .emit(
                "get provisional identity",
                json!({
                    "type": "email",
                    "hashed_email": generic_hash(email.as_bytes()),
                }),
            )
            .await?;
        Self::decode(response)
    }

    pub async fn push_block(&self, block: String) -> Result<(), Error> {
        self.transport.emit("push block", json!(block)).await?;
        Ok(())
    }

    pub async fn push_keys(&self, blocks: Vec<String>) -> Result<(), Error> {
        if blocks.is_empty() {
            return Ok(());
        }
        self.transport.emit("push keys", json!(blocks)).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn create_user(
        &self,
        trustchain_id: &TrustchainId,
        user_id: &UserId,
        user_creation_block: String,
        first_device_block: String,
        encrypted_verification_key: String,
    ) -> Result<(), Error> {
        self.transport
            .emit(
                "create user 2",
                json!({
                    "trustchain_id": trustchain_id,
                    "user_id": user_id,
                    "user_creation_block": user_creation_block,
                    "first_device_block": first_device_block,
                    "encrypted_unlock_key": encrypted_verification_key,
                    "verification": {"type": "verification_key"},
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_verification_key(&self, user_id: &UserId) -> Result<String, Error> {
        let response = self
            .transport
            .emit("get verification key", json!({ "user_id": user_id }))
            .await?;
        Self::decode(response)
    }

    pub async fn set_verification_method(
        &self,
        user_id: &UserId,
        method: Value,
    ) -> Result<(), Error> {
        self.transport
            .emit(
                "set verification method",
                json!({ "user_id": user_id, "method": method }),
            )
            .await?;
        Ok(())
    }

    pub async fn get_verification_methods(&self, user_id: &UserId) -> Result<Vec<String>, Error> {
        let response = self
            .transport
            .emit("get verification methods", json!({ "user_id": user_id }))
            .await?;
        Self::decode(response)
    }

    pub async fn get_user_status(
        &self,
        trustchain_id: &TrustchainId,
        user_id: &UserId,
        device_public_signature_key: &PublicSignatureKey,
    ) -> Result<UserStatus, Error> {
        let response = self
            .transport
            .emit(
                "get user status",
                json!({
                    "trustchain_id": trustchain_id,
                    "user_id": user_id,
                    "device_public_signature_key": device_public_signature_key,
                }),
            )
            .await?;
        Self::decode(response)
    }
}
