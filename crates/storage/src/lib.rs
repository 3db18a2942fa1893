// Path: crates/storage/src/lib.rs
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

//! # ByteCave Storage
//!
//! The on-disk ciphertext store: one `.enc` file per blob under `blobs/`,
//! one JSON sidecar under `meta/`, both written atomically via temp+rename.
//! Every blob file has a matching metadata file and vice versa; orphans are
//! reportable through the integrity scan.

mod metrics;
/// The blob store proper.
pub mod store;

pub use store::{BlobStore, IntegrityReport, PutExtras, PutOutcome, StoreOptions};
