// Path: crates/crypto/src/lib.rs
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

//! # ByteCave Crypto
//!
//! Cryptographic primitives of the vault: SHA-256 content identifiers,
//! HMAC integrity tags over persisted state, and EIP-191 personal-sign
//! recovery against the federation's signed request template.

/// EIP-191 signature recovery, address derivation, thread ids.
pub mod eth;
/// Content hashing and CID verification.
pub mod hash;
/// HMAC tags protecting persisted state records.
pub mod tag;

pub use eth::{
    build_auth_message, eth_address_of_pubkey, node_id_of_public_key, recover_personal_sign,
    thread_id_for,
};
pub use hash::{cid_of, keccak256, verify_cid};
pub use tag::StateTagger;
