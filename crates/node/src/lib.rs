// Path: crates/node/src/lib.rs
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

//! # ByteCave Node
//!
//! The composition root. Components are constructed explicitly in
//! dependency order (store, shard map, authorization, replication, GC) and
//! wired together here; inverse dependencies go through the narrow
//! interfaces in `bytecave-api`. The binary lives in `src/bin/bytecave.rs`.

/// Background maintenance tasks and graceful shutdown.
pub mod runtime;
/// The vault: write pipeline, read path, and the HTTP-facing API.
pub mod vault;

pub use runtime::Background;
pub use vault::{Vault, VaultOptions};
