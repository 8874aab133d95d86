//! Identity strings: opaque base64-encoded JSON documents.
//!
//! A *secret permanent identity* is issued by the application backend (which
//! holds the trustchain private key): it carries the obfuscated user id, an
//! ephemeral signature keypair with a trustchain delegation over it, and the
//! user secret used to protect the verification key. A *secret provisional
//! identity* is the app-controlled half of a not-yet-registered recipient
//! (typically an email); the provider half lives server-side until claim.
//! Public identities are the same documents with the secrets stripped.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use cv_chain::ids::obfuscate_user_id;
use cv_chain::{TrustchainId, UserId};
use cv_crypto::{
    rand::make_symmetric_key, sealed::make_encryption_key_pair, sign,
    EncryptionKeyPair, PrivateEncryptionKey, PrivateSignatureKey, PublicEncryptionKey,
    PublicSignatureKey, Signature, SignatureKeyPair, SymmetricKey,
};

use crate::error::Error;

/// The trustchain delegation embedded in a permanent identity: a signature
/// over `ephemeral_public_signature_key ‖ user_id`, made with the trustchain
/// private key at issuance. The device key itself is bound by the block
/// signature, which the ephemeral key makes over the block hash.
pub fn delegation_data(
    ephemeral_public_signature_key: &PublicSignatureKey,
    user_id: &UserId,
) -> Vec<u8> {
    let mut data = Vec::with_capacity(PublicSignatureKey::SIZE + UserId::SIZE);
    data.extend_from_slice(ephemeral_public_signature_key.as_ref());
    data.extend_from_slice(user_id.as_ref());
    data
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretPermanentIdentity {
    pub trustchain_id: TrustchainId,
    pub target: String,
    /// Base64 of the obfuscated user id.
    pub value: String,
    pub delegation_signature: Signature,
    pub ephemeral_public_signature_key: PublicSignatureKey,
    pub ephemeral_private_signature_key: PrivateSignatureKey,
    pub user_secret: SymmetricKey,
}

impl SecretPermanentIdentity {
    pub fn user_id(&self) -> Result<UserId, Error> {
        UserId::from_base64(&self.value)
            .map_err(|e| Error::InvalidArgument(format!("bad identity value: {e}")))
    }

    pub fn ephemeral_key_pair(&self) -> SignatureKeyPair {
        SignatureKeyPair {
            public_key: self.ephemeral_public_signature_key,
            private_key: self.ephemeral_private_signature_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretProvisionalIdentity {
    pub trustchain_id: TrustchainId,
    pub target: String,
    /// The email address.
    pub value: String,
    pub public_signature_key: PublicSignatureKey,
    pub private_signature_key: PrivateSignatureKey,
    pub public_encryption_key: PublicEncryptionKey,
    pub private_encryption_key: PrivateEncryptionKey,
}

impl SecretProvisionalIdentity {
    pub fn app_signature_key_pair(&self) -> SignatureKeyPair {
        SignatureKeyPair {
            public_key: self.public_signature_key,
            private_key: self.private_signature_key.clone(),
        }
    }

    pub fn app_encryption_key_pair(&self) -> EncryptionKeyPair {
        EncryptionKeyPair {
            public_key: self.public_encryption_key,
            private_key: self.private_encryption_key.clone(),
        }
    }
}

/// What a caller may name as a recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicIdentity {
    Permanent {
        trustchain_id: TrustchainId,
        user_id: UserId,
        /// The value string as supplied, reported back on resolution errors.
        value: String,
    },
    Provisional {
        trustchain_id: TrustchainId,
        email: String,
        app_public_signature_key: PublicSignatureKey,
        app_public_encryption_key: PublicEncryptionKey,
    },
}

impl PublicIdentity {
    /// The clear identifier to surface in errors.
    pub fn clear_value(&self) -> &str {
        match self {
            PublicIdentity::Permanent { value, .. } => value,
            PublicIdentity::Provisional { email, .. } => email,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PublicIdentityJson {
    trustchain_id: TrustchainId,
    target: String,
    value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_signature_key: Option<PublicSignatureKey>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_encryption_key: Option<PublicEncryptionKey>,
}

fn decode_json<T: serde::de::DeserializeOwned>(encoded: &str) -> Result<T, Error> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| Error::InvalidArgument(format!("identity is not valid base64: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::InvalidArgument(format!("identity is not valid JSON: {e}")))
}

fn encode_json<T: Serialize>(value: &T) -> String {
    STANDARD.encode(serde_json::to_vec(value).expect("identity serialization cannot fail"))
}

/// Issue a permanent identity. Runs wherever the trustchain private key
/// lives (the application backend).
pub fn create_permanent_identity(
    trustchain_id: &TrustchainId,
    trustchain_private_key: &PrivateSignatureKey,
    app_user_id: &str,
) -> String {
    let user_id = obfuscate_user_id(app_user_id, trustchain_id);
    let ephemeral = sign::make_signature_key_pair();
    let delegation_signature = sign::sign(
        &delegation_data(&ephemeral.public_key, &user_id),
        trustchain_private_key,
    );
    encode_json(&SecretPermanentIdentity {
        trustchain_id: *trustchain_id,
        target: "user".into(),
        value: user_id.to_base64(),
        delegation_signature,
        ephemeral_public_signature_key: ephemeral.public_key,
        ephemeral_private_signature_key: ephemeral.private_key,
        user_secret: make_symmetric_key(),
    })
}

/// Issue a provisional identity for an email recipient. Purely client-side:
/// only the app half is generated here.
pub fn create_provisional_identity(trustchain_id: &TrustchainId, email: &str) -> String {
    let signature = sign::make_signature_key_pair();
    let encryption = make_encryption_key_pair();
    encode_json(&SecretProvisionalIdentity {
        trustchain_id: *trustchain_id,
        target: "email".into(),
        value: email.into(),
        public_signature_key: signature.public_key,
        private_signature_key: signature.private_key,
        public_encryption_key: encryption.public_key,
        private_encryption_key: encryption.private_key,
    })
}

pub fn parse_permanent_identity(encoded: &str) -> Result<SecretPermanentIdentity, Error> {
    let identity: SecretPermanentIdentity = decode_json(encoded)?;
    if identity.target != "user" {
        return Err(Error::InvalidArgument(format!(
            "expected a permanent identity, got target \"{}\"",
            identity.target
        )));
    }
    Ok(identity)
}

pub fn parse_provisional_identity(encoded: &str) -> Result<SecretProvisionalIdentity, Error> {
    let identity: SecretProvisionalIdentity = decode_json(encoded)?;
    if identity.target != "email" {
        return Err(Error::InvalidArgument(format!(
            "expected a provisional identity, got target \"{}\"",
            identity.target
        )));
    }
    Ok(identity)
}

/// Strip the secrets out of either identity kind.
pub fn get_public_identity(encoded: &str) -> Result<String, Error> {
    let raw: serde_json::Value = decode_json(encoded)?;
    let target = raw
        .get("target")
        .and_then(|t| t.as_str())
        .ok_or_else(|| Error::InvalidArgument("identity has no target".into()))?;
    match target {
        "user" => {
            let identity: SecretPermanentIdentity = decode_json(encoded)?;
            Ok(encode_json(&PublicIdentityJson {
                trustchain_id: identity.trustchain_id,
                target: "user".into(),
                value: identity.value,
                public_signature_key: None,
                public_encryption_key: None,
            }))
        }
        "email" => {
            let identity: SecretProvisionalIdentity = decode_json(encoded)?;
            Ok(encode_json(&PublicIdentityJson {
                trustchain_id: identity.trustchain_id,
                target: "email".into(),
                value: identity.value,
                public_signature_key: Some(identity.public_signature_key),
                public_encryption_key: Some(identity.public_encryption_key),
            }))
        }
        other => Err(Error::InvalidArgument(format!(
            "unknown identity target \"{other}\""
        ))),
    }
}

pub fn parse_public_identity(encoded: &str) -> Result<PublicIdentity, Error> {
    let raw: PublicIdentityJson = decode_json(encoded)?;
    match raw.target.as_str() {
        "user" => Ok(PublicIdentity::Permanent {
            trustchain_id: raw.trustchain_id,
            user_id: UserId::from_base64(&raw.value)
                .map_err(|e| Error::InvalidArgument(format!("bad identity value: {e}")))?,
            value: raw.value,
        }),
        "email" => Ok(PublicIdentity::Provisional {
            trustchain_id: raw.trustchain_id,
            email: raw.value,
            app_public_signature_key: raw.public_signature_key.ok_or_else(|| {
                Error::InvalidArgument("provisional identity without signature key".into())
            })?,
            app_public_encryption_key: raw.public_encryption_key.ok_or_else(|| {
                Error::InvalidArgument("provisional identity without encryption key".into())
            })?,
        }),
        other => Err(Error::InvalidArgument(format!(
            "unknown identity target \"{other}\""
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_crypto::sign::make_signature_key_pair;

    #[test]
    fn permanent_identity_round_trip() {
        let trustchain_id = TrustchainId::from([1u8; 32]);
        let tc_keys = make_signature_key_pair();
        let encoded = create_permanent_identity(&trustchain_id, &tc_keys.private_key, "alice");
        let identity = parse_permanent_identity(&encoded).unwrap();

        assert_eq!(identity.trustchain_id, trustchain_id);
        let user_id = identity.user_id().unwrap();
        assert_eq!(user_id, obfuscate_user_id("alice", &trustchain_id));

        // The embedded delegation verifies under the trustchain key.
        assert!(sign::verify(
            &delegation_data(&identity.ephemeral_public_signature_key, &user_id),
            &identity.delegation_signature,
            &tc_keys.public_key,
        ));
    }

    #[test]
    fn public_identity_strips_secrets() {
        let trustchain_id = TrustchainId::from([2u8; 32]);
        let tc_keys = make_signature_key_pair();
        let secret = create_permanent_identity(&trustchain_id, &tc_keys.private_key, "bob");
        let public = get_public_identity(&secret).unwrap();
        let decoded = STANDARD.decode(&public).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert!(json.get("ephemeral_private_signature_key").is_none());
        assert!(json.get("user_secret").is_none());

        match parse_public_identity(&public).unwrap() {
            PublicIdentity::Permanent { user_id, .. } => {
                assert_eq!(user_id, obfuscate_user_id("bob", &trustchain_id));
            }
            other => panic!("expected permanent identity, got {other:?}"),
        }
    }

    #[test]
    fn provisional_identity_round_trip() {
        let trustchain_id = TrustchainId::from([3u8; 32]);
        let secret = create_provisional_identity(&trustchain_id, "kate@example.com");
        let identity = parse_provisional_identity(&secret).unwrap();
        assert_eq!(identity.value, "kate@example.com");

        let public = get_public_identity(&secret).unwrap();
        match parse_public_identity(&public).unwrap() {
            PublicIdentity::Provisional {
                email,
                app_public_signature_key,
                ..
            } => {
                assert_eq!(email, "kate@example.com");
                assert_eq!(app_public_signature_key, identity.public_signature_key);
            }
            other => panic!("expected provisional identity, got {other:?}"),
        }
    }

    #[test]
    fn mismatched_target_is_rejected() {
        let trustchain_id = TrustchainId::from([4u8; 32]);
        let provisional = create_provisional_identity(&trustchain_id, "x@example.com");
        assert!(parse_permanent_identity(&provisional).is_err());
    }
}
