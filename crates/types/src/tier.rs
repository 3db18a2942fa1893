// Path: crates/types/src/tier.rs

//! Declared durability classes and the replication/GC policy they imply.

use serde::{Deserialize, Serialize};

/// A blob's declared durability class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermanenceTier {
    Ephemeral,
    Persistent,
    Archival,
}

impl PermanenceTier {
    /// The replication factor this tier demands.
    pub fn replication_factor(&self) -> u32 {
        match self {
            PermanenceTier::Ephemeral => 2,
            PermanenceTier::Persistent => 3,
            PermanenceTier::Archival => 7,
        }
    }

    /// Whether garbage collection may reclaim blobs of this tier.
    pub fn gc_allowed(&self) -> bool {
        matches!(self, PermanenceTier::Ephemeral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_policy_table() {
        assert_eq!(PermanenceTier::Ephemeral.replication_factor(), 2);
        assert_eq!(PermanenceTier::Persistent.replication_factor(), 3);
        assert_eq!(PermanenceTier::Archival.replication_factor(), 7);
        assert!(PermanenceTier::Ephemeral.gc_allowed());
        assert!(!PermanenceTier::Persistent.gc_allowed());
        assert!(!PermanenceTier::Archival.gc_allowed());
    }
}
