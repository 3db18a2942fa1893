// Path: crates/replication/src/transport/mod.rs

//! Shipped `PeerTransport` implementations: HTTP for real deployments, an
//! in-memory federation for tests and local development.

pub mod http;
pub mod memory;

pub use http::HttpPeerTransport;
pub use memory::{InMemoryFederation, PeerBehavior};
