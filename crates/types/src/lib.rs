// Path: crates/types/src/lib.rs
#![cfg_attr(
    not(test),
    deny(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::panic,
        clippy::unimplemented,
        clippy::todo,
        clippy::indexing_slicing
    )
)]

//! # ByteCave Types
//!
//! Core data structures and error types shared by every crate of the vault
//! node: content identifiers, blob metadata, replication state, authorization
//! records, peer observations, the shard map, and the node configuration.
//!
//! This crate has minimal dependencies to remain stable.

/// Audit records for the read path: disputes and censorship events.
pub mod audit;
/// Authorization records submitted alongside writes.
pub mod auth;
/// Blob metadata and store statistics.
pub mod blob;
/// The content identifier type.
pub mod cid;
/// Node configuration and validation.
pub mod config;
/// Error taxonomy for all subsystems.
pub mod error;
/// Peer records, observations, and misbehavior accounting.
pub mod peer;
/// Per-CID replication state records.
pub mod replication;
/// Shard keyspace ownership.
pub mod shard;
/// Declared durability classes.
pub mod tier;

pub use cid::Cid;

/// Milliseconds since the unix epoch, as used in every persisted record.
pub type UnixMillis = i64;

/// Returns the current time as unix milliseconds.
pub fn now_millis() -> UnixMillis {
    chrono::Utc::now().timestamp_millis()
}
