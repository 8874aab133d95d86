//! In-process server double: assigns block indexes, answers the typed
//! queries, and plays the application backend (identity issuance). It never
//! verifies anything — clients are the ones with invariants to enforce.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use async_trait::async_trait;
use serde_json::{json, Value};

use cv_chain::actions::Action;
use cv_chain::block::make_trustchain_root;
use cv_chain::{ResourceId, ServerEntry, TrustchainId, UserId};
use cv_core::error::Error;
use cv_core::identity;
use cv_core::transport::{Transport, AUTH_CHALLENGE_PREFIX};
use cv_crypto::{
    sealed::make_encryption_key_pair, sign::make_signature_key_pair, EncryptionKeyPair, Hash,
    PublicSignatureKey, SignatureKeyPair,
};

pub struct TestServer {
    state: RefCell<ServerState>,
}

struct ServerState {
    trustchain_id: TrustchainId,
    trustchain_keys: SignatureKeyPair,
    /// Wire blocks with their assigned index baked in, in index order.
    blocks: Vec<(u64, String)>,
    next_index: u64,
    /// Registered device signature keys per user.
    user_devices: HashMap<UserId, HashSet<PublicSignatureKey>>,
    verification_keys: HashMap<UserId, String>,
    /// Provider identity halves, keyed by hashed email.
    provisional: HashMap<Hash, (SignatureKeyPair, EncryptionKeyPair)>,
}

impl TestServer {
    pub fn new() -> Rc<Self> {
        let trustchain_keys = make_signature_key_pair();
        let (trustchain_id, root) = make_trustchain_root(trustchain_keys.public_key);
        let server = Rc::new(Self {
            state: RefCell::new(ServerState {
                trustchain_id,
                trustchain_keys,
                blocks: Vec::new(),
                next_index: 1,
                user_devices: HashMap::new(),
                verification_keys: HashMap::new(),
                provisional: HashMap::new(),
            }),
        });
        server.record_block(&root.to_base64(0));
        server
    }

    pub fn trustchain_id(&self) -> TrustchainId {
        self.state.borrow().trustchain_id
    }

    /// What the application backend hands the user at signup.
    pub fn create_identity(&self, app_user_id: &str) -> String {
        let state = self.state.borrow();
        identity::create_permanent_identity(
            &state.trustchain_id,
            &state.trustchain_keys.private_key,
            app_user_id,
        )
    }

    /// Append a block, assigning the next index. Exposed so tests can push
    /// hand-crafted blocks past the client APIs.
    pub fn record_block(&self, wire_base64: &str) -> u64 {
        let entry = ServerEntry::from_base64(wire_base64).expect("test block must parse");
        let mut state = self.state.borrow_mut();
        let index = state.next_index;
        state.next_index += 1;
        if let Action::DeviceCreation(creation) = &entry.action {
            state
                .user_devices
                .entry(*creation.user_id())
                .or_default()
                .insert(*creation.public_signature_key());
        }
        let reindexed = entry.to_block().to_base64(index);
        state.blocks.push((index, reindexed));
        index
    }

    /// The whole chain as currently served, for tests that need to craft
    /// blocks out of real ones.
    pub fn blocks_snapshot(&self) -> Vec<String> {
        self.blocks_after(0, true)
    }

    fn provider_keys_for(
        &self,
        hashed_email: Hash,
    ) -> (SignatureKeyPair, EncryptionKeyPair) {
        let mut state = self.state.borrow_mut();
        state
            .provisional
            .entry(hashed_email)
            .or_insert_with(|| (make_signature_key_pair(), make_encryption_key_pair()))
            .clone()
    }

    fn blocks_after(&self, index: u64, whole_chain: bool) -> Vec<String> {
        let state = self.state.borrow();
        state
            .blocks
            .iter()
            .filter(|(idx, _)| whole_chain || *idx > index)
            .map(|(_, wire)| wire.clone())
            .collect()
    }

    fn key_publishes(&self, resource_ids: &[ResourceId]) -> Vec<String> {
        let state = self.state.borrow();
        state
            .blocks
            .iter()
            .filter(|(_, wire)| {
                let entry = ServerEntry::from_base64(wire).expect("stored block parses");
                matches!(&entry.action, Action::KeyPublish(kp)
                    if resource_ids.contains(kp.resource_id()))
            })
            .map(|(_, wire)| wire.clone())
            .collect()
    }
}

fn field<T: serde::de::DeserializeOwned>(message: &Value, name: &str) -> T {
    serde_json::from_value(message.get(name).cloned().unwrap_or(Value::Null))
        .unwrap_or_else(|e| panic!("test server: bad field {name}: {e}"))
}

#[async_trait(?Send)]
impl Transport for TestServer {
    async fn emit(&self, target: &str, message: Value) -> Result<Value, Error> {
        match target {
            "request auth challenge" => Ok(json!({
                "challenge": format!("{AUTH_CHALLENGE_PREFIX} 42"),
            })),
            "authenticate device" => Ok(json!({})),
            "get blocks" => {
                let index: u64 = field(&message, "index");
                let extra_users: Vec<UserId> = field(&message, "extra_users");
                let extra_groups: Vec<cv_chain::GroupId> = field(&message, "extra_groups");
                // Sub-queries may reach back before the caller's index.
                let whole_chain = !extra_users.is_empty() || !extra_groups.is_empty();
                Ok(json!(self.blocks_after(index, whole_chain)))
            }
            "get my user blocks" | "get users blocks" => Ok(json!(self.blocks_after(0, true))),
            "get key publishes" => {
                let resource_ids: Vec<ResourceId> = field(&message, "resource_ids");
                Ok(json!(self.key_publishes(&resource_ids)))
            }
            "get public provisional identities" => {
                let requests: Vec<Value> =
                    serde_json::from_value(message).expect("lookup list");
                let mut out = Vec::new();
                for request in requests {
                    let hashed: Hash = field(&request, "hashed_email");
                    let (signature, encryption) = self.provider_keys_for(hashed);
                    out.push(json!({
                        "signature_public_key": signature.public_key,
                        "encryption_public_key": encryption.public_key,
                    }));
                }
                Ok(json!(out))
            }
            "get provisional identity" => {
                let hashed: Hash = field(&message, "hashed_email");
                let (signature, encryption) = self.provider_keys_for(hashed);
                Ok(json!({
                    "signature_key_pair": signature,
                    "encryption_key_pair": encryption,
                }))
            }
            "push block" => {
                let wire: String = serde_json::from_value(message).expect("block string");
                self.record_block(&wire);
                Ok(json!({}))
            }
            "push keys" => {
                let wires: Vec<String> =
                    serde_json::from_value(message).expect("block strings");
                for wire in &wires {
                    self.record_block(wire);
                }
                Ok(json!({}))
            }
            "create user 2" => {
                let user_id: UserId = field(&message, "user_id");
                let user_creation: String = field(&message, "user_creation_block");
                let first_device: String = field(&message, "first_device_block");
                let encrypted_key: String = field(&message, "encrypted_unlock_key");
                self.record_block(&user_creation);
                self.record_block(&first_device);
                self.state
                    .borrow_mut()
                    .verification_keys
                    .insert(user_id, encrypted_key);
                Ok(json!({}))
            }
            "get verification key" => {
                let user_id: UserId = field(&message, "user_id");
                let key = self
                    .state
                    .borrow()
                    .verification_keys
                    .get(&user_id)
                    .cloned()
                    .ok_or_else(|| {
                        Error::InvalidVerification("no verification key registered".into())
                    })?;
                Ok(json!(key))
            }
            "get user status" => {
                let user_id: UserId = field(&message, "user_id");
                let device_key: PublicSignatureKey =
                    field(&message, "device_public_signature_key");
                let state = self.state.borrow();
                let devices = state.user_devices.get(&user_id);
                Ok(json!({
                    "user_exists": devices.is_some(),
                    "device_exists": devices.is_some_and(|d| d.contains(&device_key)),
                }))
            }
            "set verification method" => Ok(json!({})),
            "get verification methods" => Ok(json!(["verification_key"])),
            other => Err(Error::NetworkError(format!("unknown message {other}"))),
        }
    }
}
