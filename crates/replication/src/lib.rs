// Path: crates/replication/src/lib.rs
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

//! # ByteCave Replication
//!
//! The replication engine: deterministic rendezvous target selection,
//! bounded-parallel fanout with retry-and-replacement, a durable state table
//! whose records carry HMAC integrity tags, live peer verification for GC
//! safety, and the intake pipeline for pushes arriving from peers.

/// The fanout engine and the GC-facing probe.
pub mod engine;
/// The server-side intake for incoming replication pushes.
pub mod intake;
/// Deterministic target selection.
pub mod select;
/// The durable, integrity-tagged state table.
pub mod state;
/// Shipped `PeerTransport` implementations.
pub mod transport;

pub use engine::ReplicationEngine;
pub use intake::{IncomingReplica, ReplicationIntake};
pub use state::StateTable;
