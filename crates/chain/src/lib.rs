// Path: crates/chain/src/lib.rs
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

//! # ByteCave Chain
//!
//! Access to the external verifier oracle. Chain RPCs are the slowest part
//! of the write path, so every call here is deadline-bounded and the hot
//! lookups (CID-on-chain presence, app-registry authorization) are cached.

/// TTL caching decorators over the `ChainClient` and `AppRegistry` seams.
pub mod cache;
/// An in-memory chain used by tests and local development.
pub mod mock;
/// A REST client against a chain indexer service.
pub mod rest;

pub use cache::{CachingAppRegistry, CachingChainClient};
pub use mock::MockChain;
pub use rest::RestChainClient;
