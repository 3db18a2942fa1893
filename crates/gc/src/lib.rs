// Path: crates/gc/src/lib.rs
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

//! # ByteCave GC
//!
//! Garbage collection under the hybrid retention policy. Candidates are
//! scored, filtered by the retention mode, then run through a safety
//! pipeline that refuses to delete pinned blobs, blobs in shards this node
//! no longer owns, and blobs the rest of the federation cannot cover.

/// The collection engine and its periodic driver.
pub mod engine;
/// Pure candidate scoring and retention filtering.
pub mod policy;

pub use engine::{GcEngine, GcReport, GcStatus};
