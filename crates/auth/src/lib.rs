// Path: crates/auth/src/lib.rs
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

//! # ByteCave Auth
//!
//! The authorization oracle deciding whether a write is permitted. The
//! pipeline runs field checks, registry policy, freshness, content binding,
//! replay defense, signature recovery, and the type-specific on-chain check,
//! in that order; a nonce is only burned once everything else has passed.

/// The replay nonce cache.
pub mod nonce;
/// The authorization pipeline.
pub mod oracle;

pub use nonce::NonceCache;
pub use oracle::AuthorizationOracle;
