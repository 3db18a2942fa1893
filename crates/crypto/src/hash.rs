// Path: crates/crypto/src/hash.rs

//! Content hashing: the CID function and its verification.

use bytecave_types::Cid;
use sha2::{Digest, Sha256};
use sha3::Keccak256;
use subtle::ConstantTimeEq;

/// The content identifier of a ciphertext: SHA-256 over the raw bytes.
pub fn cid_of(bytes: &[u8]) -> Cid {
    let digest = Sha256::digest(bytes);
    Cid::from_digest(digest.into())
}

/// Whether `bytes` hash to `cid`. The digest compare is constant time so a
/// probing caller learns nothing from timing.
pub fn verify_cid(cid: &Cid, bytes: &[u8]) -> bool {
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    digest.ct_eq(cid.as_bytes()).into()
}

/// keccak-256, as used for addresses, node ids, and thread ids.
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let digest = Keccak256::digest(bytes);
    digest.into()
}
