// Path: crates/consensus/src/lib.rs
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

//! # ByteCave Consensus
//!
//! The read path across replicas: hedged parallel fetches with majority-hash
//! voting, dispute and censorship auditing, and the anti-censorship retry
//! that re-samples a reputation-weighted pool until an honest copy surfaces.

/// The bounded audit log of disputes and censorship events.
pub mod audit;
/// The consensus fetch algorithms.
pub mod fetch;

pub use audit::AuditLog;
pub use fetch::{ConsensusFetcher, ConsensusResult, FetchOptions};
// The durability classes this engine publishes to clients.
pub use bytecave_types::tier::PermanenceTier;
