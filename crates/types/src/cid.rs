// Path: crates/types/src/cid.rs

//! The content identifier: a SHA-256 digest of the ciphertext, canonically
//! rendered as 64 lowercase hex characters.

use crate::error::CidParseError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A 256-bit content digest addressing one ciphertext blob.
///
/// The canonical textual form is 64 lowercase hex characters; any other form
/// (uppercase, wrong length, non-hex) is rejected at parse time.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid([u8; 32]);

impl Cid {
    /// Wraps a raw 32-byte digest.
    pub fn from_digest(digest: [u8; 32]) -> Self {
        Cid(digest)
    }

    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Returns the canonical lowercase hex rendering.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Maps this CID onto a shard: the first 4 digest bytes interpreted as a
    /// big-endian unsigned integer, modulo `shard_count`.
    pub fn shard_key(&self, shard_count: u32) -> u32 {
        let prefix = u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]]);
        if shard_count == 0 {
            return 0;
        }
        prefix % shard_count
    }
}

impl FromStr for Cid {
    type Err = CidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 64 {
            return Err(CidParseError::Length(s.len()));
        }
        // Uppercase hex decodes, but is not the canonical form.
        if s.bytes().any(|b| b.is_ascii_uppercase()) {
            return Err(CidParseError::NotLowercase);
        }
        let raw = hex::decode(s).map_err(|_| CidParseError::NotHex)?;
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&raw);
        Ok(Cid(digest))
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.to_hex())
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    #[test]
    fn parses_canonical_form() {
        let cid: Cid = HELLO_SHA256.parse().unwrap();
        assert_eq!(cid.to_hex(), HELLO_SHA256);
    }

    #[test]
    fn rejects_uppercase() {
        let upper = HELLO_SHA256.to_uppercase();
        assert!(matches!(
            upper.parse::<Cid>(),
            Err(CidParseError::NotLowercase)
        ));
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            "abcd".parse::<Cid>(),
            Err(CidParseError::Length(4))
        ));
    }

    #[test]
    fn rejects_non_hex() {
        let bad = "z".repeat(64);
        assert!(matches!(bad.parse::<Cid>(), Err(CidParseError::NotHex)));
    }

    #[test]
    fn shard_key_is_prefix_mod_count() {
        let cid: Cid = HELLO_SHA256.parse().unwrap();
        // First four bytes are 2c f2 4d ba.
        let prefix = u32::from_be_bytes([0x2c, 0xf2, 0x4d, 0xba]);
        assert_eq!(cid.shard_key(1024), prefix % 1024);
        assert_eq!(cid.shard_key(1), 0);
    }

    #[test]
    fn serde_round_trips_as_string() {
        let cid: Cid = HELLO_SHA256.parse().unwrap();
        let json = serde_json::to_string(&cid).unwrap();
        assert_eq!(json, format!("\"{}\"", HELLO_SHA256));
        let back: Cid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cid);
    }

    proptest::proptest! {
        #[test]
        fn shard_key_in_range_and_stable(digest in proptest::array::uniform32(0u8..), count in 1u32..=65536) {
            let cid = Cid::from_digest(digest);
            let key = cid.shard_key(count);
            proptest::prop_assert!(key < count);
            proptest::prop_assert_eq!(key, cid.shard_key(count));
        }

        #[test]
        fn display_parse_round_trips(digest in proptest::array::uniform32(0u8..)) {
            let cid = Cid::from_digest(digest);
            let parsed: Cid = cid.to_hex().parse().unwrap();
            proptest::prop_assert_eq!(parsed, cid);
        }
    }
}
