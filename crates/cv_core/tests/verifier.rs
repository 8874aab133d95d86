//! Verifier acceptance and rejection over hand-crafted entries. The stores
//! are populated directly; the verifier only ever reads them.

use cv_chain::actions::{
    delegation_signature_data, Action, DeviceCreation, DeviceCreation1, DeviceCreation3,
    DeviceRevocation, DeviceRevocation2, GroupMember2, KeyPublish, KeyPublishToUser,
    KeyPublishToUserGroup, ProvisionalIdentityClaim, UserGroupAddition, UserGroupAddition2,
    UserGroupCreation, UserGroupCreation2, UserKeyPair,
};
use cv_chain::block::make_trustchain_root;
use cv_chain::{Block, DeviceId, GroupId, ResourceId, ServerEntry, TrustchainId, UserId};
use cv_core::error::{Error, VerificationCode};
use cv_core::identity::delegation_data;
use cv_core::verif::Verifier;
use cv_crypto::{
    sealed::{self, make_encryption_key_pair},
    sign::{self, make_signature_key_pair},
    EncryptionKeyPair, Hash, PublicEncryptionKey, SealedPrivateEncryptionKey,
    SealedPrivateEncryptionKeyPair, SealedPrivateSignatureKey, Signature, SignatureKeyPair,
};
use cv_store::models::{Device, InternalGroup};
use cv_store::Store;

struct TestChain {
    trustchain_id: TrustchainId,
    trustchain_keys: SignatureKeyPair,
    store: Store,
}

struct TestDevice {
    id: DeviceId,
    user_id: UserId,
    signature: SignatureKeyPair,
    encryption: EncryptionKeyPair,
}

impl TestChain {
    async fn new() -> Self {
        let trustchain_keys = make_signature_key_pair();
        let (trustchain_id, _root) = make_trustchain_root(trustchain_keys.public_key);
        let store = Store::open_in_memory().await.unwrap();
        store
            .trustchain()
            .set_trustchain_public_signature_key(&trustchain_keys.public_key)
            .await
            .unwrap();
        Self {
            trustchain_id,
            trustchain_keys,
            store,
        }
    }

    fn verifier(&self) -> Verifier {
        Verifier::new(self.trustchain_id, self.store.clone())
    }

    fn entry(&self, block: &Block, index: u64) -> ServerEntry {
        ServerEntry::from_wire(&block.to_wire(index)).unwrap()
    }

    /// Install a device (and its user) straight into the contact store.
    async fn put_device(
        &self,
        user_id: UserId,
        created_at: u64,
        revoked_at: Option<u64>,
        user_key: Option<&EncryptionKeyPair>,
    ) -> TestDevice {
        let signature = make_signature_key_pair();
        let encryption = make_encryption_key_pair();
        let id = DeviceId::from(*cv_crypto::hash::generic_hash(
            signature.public_key.as_ref(),
        )
        .as_bytes());
        self.store
            .contacts()
            .put_user_device(&Device {
                id,
                user_id,
                public_signature_key: signature.public_key,
                public_encryption_key: encryption.public_key,
                created_at_index: created_at,
                revoked_at_index: revoked_at,
                is_ghost: false,
            })
            .await
            .unwrap();
        if let Some(user_key) = user_key {
            self.store
                .contacts()
                .put_user_key(&user_id, &user_key.public_key)
                .await
                .unwrap();
        }
        TestDevice {
            id,
            user_id,
            signature,
            encryption,
        }
    }
}

fn expect_code(result: Result<cv_chain::VerifiedEntry, Error>, code: VerificationCode) {
    match result {
        Err(Error::VerificationFailed { code: got, .. }) => assert_eq!(got, code),
        other => panic!("expected {code:?}, got {other:?}"),
    }
}

fn seal_to(key_bytes: &[u8], to: &PublicEncryptionKey) -> SealedPrivateEncryptionKey {
    SealedPrivateEncryptionKey::try_from(
        sealed::seal_encrypt(key_bytes, to).unwrap().as_slice(),
    )
    .unwrap()
}

// ── Trustchain creation ──────────────────────────────────────────────────────

#[tokio::test]
async fn root_block_is_accepted() {
    let chain = TestChain::new().await;
    let (_, root) = make_trustchain_root(chain.trustchain_keys.public_key);
    // The stored root must be the configured one.
    let verifier = Verifier::new(TrustchainId::from(*root.hash().as_bytes()), chain.store.clone());
    let entry = ServerEntry::from_wire(&root.to_wire(1)).unwrap();
    verifier.verify(&entry).await.unwrap();
}

#[tokio::test]
async fn foreign_root_block_is_rejected() {
    let chain = TestChain::new().await;
    let other_keys = make_signature_key_pair();
    let (_, other_root) = make_trustchain_root(other_keys.public_key);
    // Configured id differs from the root's own hash.
    let entry = chain.entry(&other_root, 1);
    // Entries from another chain are refused outright by the puller; here
    // the verifier sees the id mismatch as a bad hash.
    let verifier = chain.verifier();
    let result = verifier.verify(&entry).await;
    expect_code(result, VerificationCode::InvalidHash);
}

// ── Device creation ──────────────────────────────────────────────────────────

fn first_device_block(
    chain: &TestChain,
    user_id: UserId,
    device_signature: &SignatureKeyPair,
    device_encryption: &EncryptionKeyPair,
    user_key: &EncryptionKeyPair,
    delegation_key: &SignatureKeyPair,
) -> Block {
    let ephemeral = make_signature_key_pair();
    let delegation_signature = sign::sign(
        &delegation_data(&ephemeral.public_key, &user_id),
        &delegation_key.private_key,
    );
    let action = Action::DeviceCreation(DeviceCreation::V3(DeviceCreation3 {
        ephemeral_public_signature_key: ephemeral.public_key,
        user_id,
        delegation_signature,
        public_signature_key: device_signature.public_key,
        public_encryption_key: device_encryption.public_key,
        user_key_pair: UserKeyPair {
            public_encryption_key: user_key.public_key,
            sealed_private_encryption_key: seal_to(
                user_key.private_key.as_bytes(),
                &device_encryption.public_key,
            ),
        },
        is_ghost_device: false,
    }));
    Block::sign(
        chain.trustchain_id,
        Hash::from(chain.trustchain_id),
        &action,
        &ephemeral.private_key,
    )
}

#[tokio::test]
async fn first_device_is_accepted() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([1u8; 32]);
    let block = first_device_block(
        &chain,
        user_id,
        &make_signature_key_pair(),
        &make_encryption_key_pair(),
        &make_encryption_key_pair(),
        &chain.trustchain_keys.clone(),
    );
    chain.verifier().verify(&chain.entry(&block, 2)).await.unwrap();
}

#[tokio::test]
async fn first_device_for_known_user_is_rejected() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([1u8; 32]);
    chain.put_device(user_id, 1, None, None).await;
    let block = first_device_block(
        &chain,
        user_id,
        &make_signature_key_pair(),
        &make_encryption_key_pair(),
        &make_encryption_key_pair(),
        &chain.trustchain_keys.clone(),
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 2)).await,
        VerificationCode::UserAlreadyExists,
    );
}

#[tokio::test]
async fn first_device_with_foreign_delegation_is_rejected() {
    let chain = TestChain::new().await;
    let block = first_device_block(
        &chain,
        UserId::from([1u8; 32]),
        &make_signature_key_pair(),
        &make_encryption_key_pair(),
        &make_encryption_key_pair(),
        &make_signature_key_pair(), // not the trustchain key
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 2)).await,
        VerificationCode::InvalidDelegationSignature,
    );
}

fn added_device_block(
    chain: &TestChain,
    author: &TestDevice,
    user_id: UserId,
    user_key: &EncryptionKeyPair,
    device_signature: &SignatureKeyPair,
) -> Block {
    let ephemeral = make_signature_key_pair();
    let device_encryption = make_encryption_key_pair();
    let delegation_signature = sign::sign(
        &delegation_signature_data(&ephemeral.public_key, &user_id, &device_signature.public_key),
        &author.signature.private_key,
    );
    let action = Action::DeviceCreation(DeviceCreation::V3(DeviceCreation3 {
        ephemeral_public_signature_key: ephemeral.public_key,
        user_id,
        delegation_signature,
        public_signature_key: device_signature.public_key,
        public_encryption_key: device_encryption.public_key,
        user_key_pair: UserKeyPair {
            public_encryption_key: user_key.public_key,
            sealed_private_encryption_key: seal_to(
                user_key.private_key.as_bytes(),
                &device_encryption.public_key,
            ),
        },
        is_ghost_device: false,
    }));
    Block::sign(
        chain.trustchain_id,
        Hash::from(author.id),
        &action,
        &ephemeral.private_key,
    )
}

#[tokio::test]
async fn added_device_is_accepted() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([2u8; 32]);
    let user_key = make_encryption_key_pair();
    let author = chain.put_device(user_id, 1, None, Some(&user_key)).await;
    let block = added_device_block(
        &chain,
        &author,
        user_id,
        &user_key,
        &make_signature_key_pair(),
    );
    chain.verifier().verify(&chain.entry(&block, 5)).await.unwrap();
}

#[tokio::test]
async fn revoked_author_cannot_add_devices() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([2u8; 32]);
    let user_key = make_encryption_key_pair();
    let author = chain.put_device(user_id, 1, Some(3), Some(&user_key)).await;
    let block = added_device_block(
        &chain,
        &author,
        user_id,
        &user_key,
        &make_signature_key_pair(),
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 5)).await,
        VerificationCode::InvalidAuthor,
    );
}

#[tokio::test]
async fn added_device_with_stale_user_key_is_rejected() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([2u8; 32]);
    let current_key = make_encryption_key_pair();
    let stale_key = make_encryption_key_pair();
    let author = chain.put_device(user_id, 1, None, Some(&current_key)).await;
    let block = added_device_block(
        &chain,
        &author,
        user_id,
        &stale_key,
        &make_signature_key_pair(),
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 5)).await,
        VerificationCode::InvalidUserKey,
    );
}

#[tokio::test]
async fn v1_device_for_user_with_user_key_is_rejected() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([2u8; 32]);
    let user_key = make_encryption_key_pair();
    let author = chain.put_device(user_id, 1, None, Some(&user_key)).await;

    let ephemeral = make_signature_key_pair();
    let device_signature = make_signature_key_pair();
    let delegation_signature = sign::sign(
        &delegation_signature_data(
            &ephemeral.public_key,
            &user_id,
            &device_signature.public_key,
        ),
        &author.signature.private_key,
    );
    let action = Action::DeviceCreation(DeviceCreation::V1(DeviceCreation1 {
        ephemeral_public_signature_key: ephemeral.public_key,
        user_id,
        delegation_signature,
        public_signature_key: device_signature.public_key,
        public_encryption_key: make_encryption_key_pair().public_key,
    }));
    let block = Block::sign(
        chain.trustchain_id,
        Hash::from(author.id),
        &action,
        &ephemeral.private_key,
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 5)).await,
        VerificationCode::InvalidUserKey,
    );
}

// ── Device revocation ────────────────────────────────────────────────────────

struct RevocationFixture {
    chain: TestChain,
    author: TestDevice,
    target: TestDevice,
    user_key: EncryptionKeyPair,
}

async fn revocation_fixture() -> RevocationFixture {
    let chain = TestChain::new().await;
    let user_id = UserId::from([3u8; 32]);
    let user_key = make_encryption_key_pair();
    let author = chain.put_device(user_id, 1, None, Some(&user_key)).await;
    let target = chain.put_device(user_id, 2, None, Some(&user_key)).await;
    RevocationFixture {
        chain,
        author,
        target,
        user_key,
    }
}

fn revocation_block(
    fixture: &RevocationFixture,
    sealed_user_keys_for_devices: Vec<(DeviceId, SealedPrivateEncryptionKey)>,
    previous_key: &PublicEncryptionKey,
) -> Block {
    let new_key = make_encryption_key_pair();
    let action = Action::DeviceRevocation(DeviceRevocation::V2(DeviceRevocation2 {
        device_id: fixture.target.id,
        public_encryption_key: new_key.public_key,
        previous_public_encryption_key: *previous_key,
        sealed_key_for_previous_user_key: seal_to(
            fixture.user_key.private_key.as_bytes(),
            &new_key.public_key,
        ),
        sealed_user_keys_for_devices,
    }));
    Block::sign(
        fixture.chain.trustchain_id,
        Hash::from(fixture.author.id),
        &action,
        &fixture.author.signature.private_key,
    )
}

#[tokio::test]
async fn valid_revocation_is_accepted() {
    let fixture = revocation_fixture().await;
    let sealed = vec![(
        fixture.author.id,
        seal_to(
            fixture.user_key.private_key.as_bytes(),
            &fixture.author.encryption.public_key,
        ),
    )];
    let block = revocation_block(&fixture, sealed, &fixture.user_key.public_key);
    fixture
        .chain
        .verifier()
        .verify(&fixture.chain.entry(&block, 7))
        .await
        .unwrap();
}

#[tokio::test]
async fn revocation_missing_a_device_entry_is_rejected() {
    let fixture = revocation_fixture().await;
    let block = revocation_block(&fixture, vec![], &fixture.user_key.public_key);
    expect_code(
        fixture
            .chain
            .verifier()
            .verify(&fixture.chain.entry(&block, 7))
            .await,
        VerificationCode::InvalidUserKeys,
    );
}

#[tokio::test]
async fn revocation_sealing_to_the_target_is_rejected() {
    let fixture = revocation_fixture().await;
    let sealed = vec![(
        fixture.target.id,
        seal_to(
            fixture.user_key.private_key.as_bytes(),
            &fixture.target.encryption.public_key,
        ),
    )];
    let block = revocation_block(&fixture, sealed, &fixture.user_key.public_key);
    expect_code(
        fixture
            .chain
            .verifier()
            .verify(&fixture.chain.entry(&block, 7))
            .await,
        VerificationCode::InvalidUserKeys,
    );
}

#[tokio::test]
async fn revocation_with_duplicate_entries_is_rejected() {
    let fixture = revocation_fixture().await;
    let entry = (
        fixture.author.id,
        seal_to(
            fixture.user_key.private_key.as_bytes(),
            &fixture.author.encryption.public_key,
        ),
    );
    let block = revocation_block(
        &fixture,
        vec![entry.clone(), entry],
        &fixture.user_key.public_key,
    );
    expect_code(
        fixture
            .chain
            .verifier()
            .verify(&fixture.chain.entry(&block, 7))
            .await,
        VerificationCode::InvalidUserKeys,
    );
}

#[tokio::test]
async fn revocation_with_foreign_device_is_rejected() {
    let fixture = revocation_fixture().await;
    let foreign_user = UserId::from([9u8; 32]);
    let foreign = fixture.chain.put_device(foreign_user, 1, None, None).await;
    let sealed = vec![
        (
            fixture.author.id,
            seal_to(
                fixture.user_key.private_key.as_bytes(),
                &fixture.author.encryption.public_key,
            ),
        ),
        (
            foreign.id,
            seal_to(
                fixture.user_key.private_key.as_bytes(),
                &foreign.encryption.public_key,
            ),
        ),
    ];
    let block = revocation_block(&fixture, sealed, &fixture.user_key.public_key);
    expect_code(
        fixture
            .chain
            .verifier()
            .verify(&fixture.chain.entry(&block, 7))
            .await,
        VerificationCode::InvalidUserKeys,
    );
}

#[tokio::test]
async fn revocation_with_wrong_previous_key_is_rejected() {
    let fixture = revocation_fixture().await;
    let sealed = vec![(
        fixture.author.id,
        seal_to(
            fixture.user_key.private_key.as_bytes(),
            &fixture.author.encryption.public_key,
        ),
    )];
    let wrong = make_encryption_key_pair().public_key;
    let block = revocation_block(&fixture, sealed, &wrong);
    expect_code(
        fixture
            .chain
            .verifier()
            .verify(&fixture.chain.entry(&block, 7))
            .await,
        VerificationCode::InvalidEncryptionKey,
    );
}

#[tokio::test]
async fn already_revoked_target_is_rejected() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([3u8; 32]);
    let user_key = make_encryption_key_pair();
    let author = chain.put_device(user_id, 1, None, Some(&user_key)).await;
    let target = chain.put_device(user_id, 2, Some(4), Some(&user_key)).await;
    let fixture = RevocationFixture {
        chain,
        author,
        target,
        user_key,
    };
    let sealed = vec![(
        fixture.author.id,
        seal_to(
            fixture.user_key.private_key.as_bytes(),
            &fixture.author.encryption.public_key,
        ),
    )];
    let block = revocation_block(&fixture, sealed, &fixture.user_key.public_key);
    expect_code(
        fixture
            .chain
            .verifier()
            .verify(&fixture.chain.entry(&block, 7))
            .await,
        VerificationCode::InvalidTargetDevice,
    );
}

// ── Key publishes ────────────────────────────────────────────────────────────

#[tokio::test]
async fn key_publish_to_unknown_group_is_rejected() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([4u8; 32]);
    let author = chain.put_device(user_id, 1, None, None).await;
    let action = Action::KeyPublish(KeyPublish::ToUserGroup(KeyPublishToUserGroup {
        recipient_public_encryption_key: make_encryption_key_pair().public_key,
        resource_id: ResourceId::from([1u8; 16]),
        sealed_symmetric_key: cv_crypto::SealedSymmetricKey::from([2u8; 80]),
    }));
    let block = Block::sign(
        chain.trustchain_id,
        Hash::from(author.id),
        &action,
        &author.signature.private_key,
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 3)).await,
        VerificationCode::InvalidGroup,
    );
}

#[tokio::test]
async fn key_publish_by_unknown_author_is_rejected() {
    let chain = TestChain::new().await;
    let ghost_signature = make_signature_key_pair();
    let action = Action::KeyPublish(KeyPublish::ToUser(KeyPublishToUser {
        recipient_public_encryption_key: make_encryption_key_pair().public_key,
        resource_id: ResourceId::from([1u8; 16]),
        sealed_symmetric_key: cv_crypto::SealedSymmetricKey::from([2u8; 80]),
    }));
    let block = Block::sign(
        chain.trustchain_id,
        Hash::from([0xeeu8; 32]),
        &action,
        &ghost_signature.private_key,
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 3)).await,
        VerificationCode::InvalidAuthor,
    );
}

// ── Groups ───────────────────────────────────────────────────────────────────

fn group_creation_action(
    group_signature: &SignatureKeyPair,
    group_encryption: &EncryptionKeyPair,
    member: (UserId, &EncryptionKeyPair),
    corrupt_self_signature: bool,
) -> Action {
    let sealed_private_signature_key = SealedPrivateSignatureKey::try_from(
        sealed::seal_encrypt(
            group_signature.private_key.as_bytes(),
            &group_encryption.public_key,
        )
        .unwrap()
        .as_slice(),
    )
    .unwrap();
    let mut creation = UserGroupCreation2 {
        public_signature_key: group_signature.public_key,
        public_encryption_key: group_encryption.public_key,
        sealed_private_signature_key,
        members: vec![GroupMember2 {
            user_id: member.0,
            public_encryption_key: member.1.public_key,
            sealed_private_encryption_key: seal_to(
                group_encryption.private_key.as_bytes(),
                &member.1.public_key,
            ),
        }],
        provisional_members: vec![],
        self_signature: Signature::default(),
    };
    let data = UserGroupCreation::V2(creation.clone()).signature_data();
    creation.self_signature = if corrupt_self_signature {
        sign::sign(&data, &make_signature_key_pair().private_key)
    } else {
        sign::sign(&data, &group_signature.private_key)
    };
    Action::UserGroupCreation(UserGroupCreation::V2(creation))
}

#[tokio::test]
async fn group_creation_is_accepted_and_bad_self_signature_rejected() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([5u8; 32]);
    let user_key = make_encryption_key_pair();
    let author = chain.put_device(user_id, 1, None, Some(&user_key)).await;

    let good = group_creation_action(
        &make_signature_key_pair(),
        &make_encryption_key_pair(),
        (user_id, &user_key),
        false,
    );
    let block = Block::sign(
        chain.trustchain_id,
        Hash::from(author.id),
        &good,
        &author.signature.private_key,
    );
    chain.verifier().verify(&chain.entry(&block, 4)).await.unwrap();

    let bad = group_creation_action(
        &make_signature_key_pair(),
        &make_encryption_key_pair(),
        (user_id, &user_key),
        true,
    );
    let block = Block::sign(
        chain.trustchain_id,
        Hash::from(author.id),
        &bad,
        &author.signature.private_key,
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 5)).await,
        VerificationCode::InvalidSignature,
    );
}

#[tokio::test]
async fn group_addition_with_stale_previous_hash_is_rejected() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([6u8; 32]);
    let user_key = make_encryption_key_pair();
    let author = chain.put_device(user_id, 1, None, Some(&user_key)).await;

    let group_signature = make_signature_key_pair();
    let group_encryption = make_encryption_key_pair();
    let group = InternalGroup {
        id: GroupId::from(group_signature.public_key),
        signature_key_pair: group_signature.clone(),
        encryption_key_pair: group_encryption.clone(),
        last_block_hash: Hash::from([0x11u8; 32]),
        last_block_index: 4,
    };
    chain.store.groups().put_internal(&group).await.unwrap();

    let mut addition = UserGroupAddition2 {
        group_id: group.id,
        previous_group_block_hash: Hash::from([0x22u8; 32]), // stale
        members: vec![],
        provisional_members: vec![],
        self_signature: Signature::default(),
    };
    let data = UserGroupAddition::V2(addition.clone()).signature_data();
    addition.self_signature = sign::sign(&data, &group_signature.private_key);
    let block = Block::sign(
        chain.trustchain_id,
        Hash::from(author.id),
        &Action::UserGroupAddition(UserGroupAddition::V2(addition)),
        &author.signature.private_key,
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 6)).await,
        VerificationCode::InvalidGroup,
    );
}

// ── Provisional identity claims ──────────────────────────────────────────────

#[tokio::test]
async fn claim_with_bad_inner_signature_is_rejected() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([7u8; 32]);
    let user_key = make_encryption_key_pair();
    let author = chain.put_device(user_id, 1, None, Some(&user_key)).await;

    let app_keys = make_signature_key_pair();
    let provider_keys = make_signature_key_pair();
    let mut claim = ProvisionalIdentityClaim {
        user_id,
        app_public_signature_key: app_keys.public_key,
        provider_public_signature_key: provider_keys.public_key,
        author_signature_by_app_key: Signature::default(),
        author_signature_by_provider_key: Signature::default(),
        recipient_user_public_key: user_key.public_key,
        sealed_private_encryption_keys: SealedPrivateEncryptionKeyPair::from([1u8; 112]),
    };
    let data = claim.signature_data(&author.id);
    // app signature made with the wrong key
    claim.author_signature_by_app_key =
        sign::sign(&data, &make_signature_key_pair().private_key);
    claim.author_signature_by_provider_key = sign::sign(&data, &provider_keys.private_key);

    let block = Block::sign(
        chain.trustchain_id,
        Hash::from(author.id),
        &Action::ProvisionalIdentityClaim(claim),
        &author.signature.private_key,
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 4)).await,
        VerificationCode::InvalidSignature,
    );
}

#[tokio::test]
async fn claim_against_stale_user_key_is_rejected() {
    let chain = TestChain::new().await;
    let user_id = UserId::from([7u8; 32]);
    let user_key = make_encryption_key_pair();
    let author = chain.put_device(user_id, 1, None, Some(&user_key)).await;

    let app_keys = make_signature_key_pair();
    let provider_keys = make_signature_key_pair();
    let stale_key = make_encryption_key_pair();
    let mut claim = ProvisionalIdentityClaim {
        user_id,
        app_public_signature_key: app_keys.public_key,
        provider_public_signature_key: provider_keys.public_key,
        author_signature_by_app_key: Signature::default(),
        author_signature_by_provider_key: Signature::default(),
        recipient_user_public_key: stale_key.public_key,
        sealed_private_encryption_keys: SealedPrivateEncryptionKeyPair::from([1u8; 112]),
    };
    let data = claim.signature_data(&author.id);
    claim.author_signature_by_app_key = sign::sign(&data, &app_keys.private_key);
    claim.author_signature_by_provider_key = sign::sign(&data, &provider_keys.private_key);

    let block = Block::sign(
        chain.trustchain_id,
        Hash::from(author.id),
        &Action::ProvisionalIdentityClaim(claim),
        &author.signature.private_key,
    );
    expect_code(
        chain.verifier().verify(&chain.entry(&block, 4)).await,
        VerificationCode::InvalidUserKey,
    );
}
