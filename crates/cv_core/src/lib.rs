//! cv_core — Covault client-side end-to-end encryption SDK
//!
//! A session binds one device of one user to a trustchain: an append-only,
//! hash-chained log of signed actions that the server relays but cannot
//! forge or read into. Everything a user encrypts is sealed per resource to
//! recipient user keys, group keys or provisional identities; everything
//! pulled from the server is verified against local invariants before any
//! side-effect is applied.
//!
//! # Module layout
//! - `identity`    — identity strings (issuance, parsing, public stripping)
//! - `transport`   — server seam: `Transport` trait + typed `Requester`
//! - `local_user`  — this device's keys, block signing, user-key history
//! - `verif`       — per-nature chain entry verification
//! - `puller`      — catch-up: pull → verify → index → apply
//! - `users`       — user/device appliers and the user accessor
//! - `groups`      — group blocks, group applier, group accessor
//! - `provisional` — provisional identity claims
//! - `share`       — recipient resolution and key-publish generation
//! - `receive_key` — key-publish decryption cascade
//! - `encryptor`   — buffer formats v2/v3/v5 and the v4 streaming format
//! - `session`     — the user-visible operations and state machine
//! - `events`      — ordered session events
//! - `error`       — the public error surface
//!
//! Concurrency model: single-threaded cooperative. One session drives all
//! of its futures on one executor; stores and session internals are
//! deliberately `!Send`.

pub mod encryptor;
pub mod error;
pub mod events;
pub mod groups;
pub mod identity;
pub mod local_user;
pub mod provisional;
pub mod puller;
pub mod receive_key;
pub mod session;
pub mod share;
pub mod transport;
pub mod users;
pub mod verif;

pub use error::{Error, VerificationCode};
pub use events::SessionEvent;
pub use session::{EncryptionSession, Session, Status};
pub use transport::{Requester, Transport, AUTH_CHALLENGE_PREFIX};

pub use cv_chain::{DeviceId, GroupId, ResourceId, TrustchainId, UserId};
pub use cv_store::Store;
