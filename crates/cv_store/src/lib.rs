//! cv_store — Covault local stores over SQLite
//!
//! Typed views over one SQLite database: contacts (users/devices seen on the
//! chain), this device's own keys and user-key history, groups, resource
//! keys, claimed provisional identities, and the verified trustchain with
//! its resource index.
//!
//! The session is the single writer; the pool is capped at one connection
//! and every view is a thin handle over it. SQLx migrations in `migrations/`
//! run on open, followed by a one-shot legacy upgrade that converts
//! historical base64 TEXT columns to raw BLOBs.

pub mod contact_store;
pub mod db;
pub mod error;
pub mod group_store;
pub mod legacy;
pub mod local_user_store;
pub mod models;
pub mod provisional_user_key_store;
pub mod resource_key_store;
pub mod trustchain_store;

pub use contact_store::ContactStore;
pub use db::Store;
pub use error::StoreError;
pub use group_store::GroupStore;
pub use local_user_store::LocalUserStore;
pub use models::{
    Device, ExternalGroup, Group, GroupProvisionalKey, InternalGroup, ProvisionalUserKeys, User,
};
pub use provisional_user_key_store::ProvisionalUserKeyStore;
pub use resource_key_store::ResourceKeyStore;
pub use trustchain_store::TrustchainStore;
