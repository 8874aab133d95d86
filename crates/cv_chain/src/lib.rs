//! cv_chain — Covault trustchain data model
//!
//! The trustchain is an append-only, hash-chained log of signed *actions*.
//! This crate owns the canonical byte layout of every action, the block
//! envelope that wraps an action (trustchain id, nature, author, signature),
//! and the hash rule that names blocks.
//!
//! # Module layout
//! - `ser`     — varints and canonical, length-prefixed serialization
//! - `ids`     — trustchain/user/device/group/resource identifiers
//! - `nature`  — the action nature codes
//! - `actions` — one payload struct per action variant, plus the `Action` sum
//! - `block`   — block envelope, wire layout, hashing and signing
//! - `error`   — unified error type
//!
//! The byte layout is deliberately hand-rolled rather than serde-derived:
//! hashes and signatures are computed over these exact bytes, so the format
//! must be canonical and self-delimiting.

pub mod actions;
pub mod block;
pub mod error;
pub mod ids;
pub mod nature;
pub mod ser;

pub use block::{Block, ServerEntry, VerifiedEntry};
pub use error::ChainError;
pub use ids::{DeviceId, GroupId, ResourceId, TrustchainId, UserId};
pub use nature::Nature;
