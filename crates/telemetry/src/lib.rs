// Path: crates/telemetry/src/lib.rs
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

//! # ByteCave Telemetry
//!
//! Observability infrastructure for the vault node: structured logging
//! initialization, a Prometheus metrics endpoint, and abstract sinks that
//! decouple metric instrumentation from the backend.

/// A lightweight HTTP server exposing `/metrics` and `/healthz`.
pub mod http;
/// The initialization routine for global structured logging.
pub mod init;
/// The concrete implementation of metrics sinks using the `prometheus` crate.
pub mod prometheus;
/// Abstract traits (`*MetricsSink`) that define the contract for metrics reporting.
pub mod sinks;
/// A simple RAII timer for measuring the duration of a scope.
pub mod time;

pub use sinks::{consensus_metrics, gc_metrics, replication_metrics, store_metrics};
