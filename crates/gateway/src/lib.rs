// Path: crates/gateway/src/lib.rs
#![forbid(unsafe_code)]

//! # ByteCave Gateway
//!
//! The HTTP surface of the vault. The router is built over the narrow
//! [`VaultApi`] seam so the core stays constructible and testable without a
//! listening socket; the composition root implements the trait and serves
//! the router.

/// The wire contract: requests, receipts, reports.
pub mod contract;
/// Route handlers and the router builder.
pub mod routes;

pub use contract::{FetchedBlob, HealthReport, ShardReport, StoreReceipt, StoreRequest, VaultApi};
pub use routes::router;
