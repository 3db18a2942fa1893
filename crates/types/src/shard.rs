// Path: crates/types/src/shard.rs

//! Shard keyspace ownership: which slices of the CID space this node serves.

use crate::cid::Cid;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Refuse to expand shard specs past this many shards.
const MAX_EXPANDED_SHARDS: usize = 1 << 16;

/// An inclusive range of shard ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardRange {
    pub start: u32,
    pub end: u32,
}

impl ShardRange {
    pub fn contains(&self, shard: u32) -> bool {
        shard >= self.start && shard <= self.end
    }

    pub fn len(&self) -> u64 {
        (self.end as u64 - self.start as u64) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}

/// The shards one node owns: an ordered list of inclusive ranges plus any
/// explicitly listed ids. The two representations may be mixed in one spec.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardMap {
    shard_count: u32,
    ranges: Vec<ShardRange>,
    explicit: BTreeSet<u32>,
}

impl ShardMap {
    /// Parses a spec like `"0-255,512-767"` or `"0,1,2,3"` (mixed allowed).
    pub fn parse(spec: &str, shard_count: u32) -> Result<Self, ConfigError> {
        if shard_count == 0 {
            return Err(ConfigError::InvalidShardSpec(
                "shard count must be positive".into(),
            ));
        }
        let mut ranges = Vec::new();
        let mut explicit = BTreeSet::new();
        for token in spec.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.split_once('-') {
                Some((lo, hi)) => {
                    let start: u32 = lo.trim().parse().map_err(|_| {
                        ConfigError::InvalidShardSpec(format!("bad range start in '{token}'"))
                    })?;
                    let end: u32 = hi.trim().parse().map_err(|_| {
                        ConfigError::InvalidShardSpec(format!("bad range end in '{token}'"))
                    })?;
                    if start > end {
                        return Err(ConfigError::InvalidShardSpec(format!(
                            "inverted range '{token}'"
                        )));
                    }
                    if end >= shard_count {
                        return Err(ConfigError::InvalidShardSpec(format!(
                            "range '{token}' exceeds shard count {shard_count}"
                        )));
                    }
                    ranges.push(ShardRange { start, end });
                }
                None => {
                    let id: u32 = token.parse().map_err(|_| {
                        ConfigError::InvalidShardSpec(format!("bad shard id '{token}'"))
                    })?;
                    if id >= shard_count {
                        return Err(ConfigError::InvalidShardSpec(format!(
                            "shard id {id} exceeds shard count {shard_count}"
                        )));
                    }
                    explicit.insert(id);
                }
            }
        }
        if ranges.is_empty() && explicit.is_empty() {
            return Err(ConfigError::InvalidShardSpec("empty shard spec".into()));
        }
        let expanded: u64 = ranges.iter().map(ShardRange::len).sum::<u64>() + explicit.len() as u64;
        if expanded > MAX_EXPANDED_SHARDS as u64 {
            return Err(ConfigError::InvalidShardSpec(format!(
                "spec expands to {expanded} shards, limit is {MAX_EXPANDED_SHARDS}"
            )));
        }
        Ok(ShardMap {
            shard_count,
            ranges,
            explicit,
        })
    }

    /// A map owning the full keyspace.
    pub fn full(shard_count: u32) -> Self {
        ShardMap {
            shard_count,
            ranges: vec![ShardRange {
                start: 0,
                end: shard_count.saturating_sub(1),
            }],
            explicit: BTreeSet::new(),
        }
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn owns_shard(&self, shard: u32) -> bool {
        self.explicit.contains(&shard) || self.ranges.iter().any(|r| r.contains(shard))
    }

    pub fn owns_cid(&self, cid: &Cid) -> bool {
        self.owns_shard(cid.shard_key(self.shard_count))
    }

    /// Number of distinct shards this node owns.
    pub fn owned_shards(&self) -> u64 {
        let mut seen: BTreeSet<u32> = self.explicit.clone();
        for r in &self.ranges {
            seen.extend(r.start..=r.end);
        }
        seen.len() as u64
    }

    /// The inclusive ranges, for the ownership report.
    pub fn ranges(&self) -> &[ShardRange] {
        &self.ranges
    }

    /// The explicitly listed shard ids, for the ownership report.
    pub fn explicit_shards(&self) -> impl Iterator<Item = u32> + '_ {
        self.explicit.iter().copied()
    }
}

/// Distribution statistics over a sample of CIDs, for observability and the
/// uniformity checks in tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShardDistribution {
    pub sampled: u64,
    pub covered_shards: u64,
    pub max_shard_count: u64,
}

/// Tallies how a CID sample spreads over `shard_count` shards.
pub fn distribution_of<'a>(
    cids: impl IntoIterator<Item = &'a Cid>,
    shard_count: u32,
) -> ShardDistribution {
    let mut counts: std::collections::HashMap<u32, u64> = std::collections::HashMap::new();
    let mut sampled = 0u64;
    for cid in cids {
        *counts.entry(cid.shard_key(shard_count)).or_default() += 1;
        sampled += 1;
    }
    ShardDistribution {
        sampled,
        covered_shards: counts.len() as u64,
        max_shard_count: counts.values().copied().max().unwrap_or(0),
    }
}

/// Average number of nodes covering each shard, across a set of node maps.
pub fn avg_nodes_per_shard(maps: &[ShardMap], shard_count: u32) -> f64 {
    if shard_count == 0 {
        return 0.0;
    }
    let total: u64 = maps.iter().map(ShardMap::owned_shards).sum();
    total as f64 / shard_count as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ranges() {
        let map = ShardMap::parse("0-255,512-767", 1024).unwrap();
        assert!(map.owns_shard(0));
        assert!(map.owns_shard(255));
        assert!(!map.owns_shard(256));
        assert!(map.owns_shard(512));
        assert!(!map.owns_shard(1000));
        assert_eq!(map.owned_shards(), 512);
    }

    #[test]
    fn parses_explicit_list() {
        let map = ShardMap::parse("0,1,2,3", 1024).unwrap();
        assert!(map.owns_shard(3));
        assert!(!map.owns_shard(4));
        assert_eq!(map.owned_shards(), 4);
    }

    #[test]
    fn parses_mixed_spec() {
        let map = ShardMap::parse("7, 100-103", 1024).unwrap();
        assert!(map.owns_shard(7));
        assert!(map.owns_shard(101));
        assert_eq!(map.owned_shards(), 5);
    }

    #[test]
    fn rejects_out_of_bounds() {
        assert!(ShardMap::parse("0-2048", 1024).is_err());
        assert!(ShardMap::parse("1024", 1024).is_err());
        assert!(ShardMap::parse("9-3", 1024).is_err());
        assert!(ShardMap::parse("", 1024).is_err());
        assert!(ShardMap::parse("abc", 1024).is_err());
    }

    #[test]
    fn full_map_owns_everything() {
        let map = ShardMap::full(1024);
        assert!(map.owns_shard(0));
        assert!(map.owns_shard(1023));
        assert_eq!(map.owned_shards(), 1024);
    }

    #[test]
    fn avg_nodes_counts_overlap() {
        let a = ShardMap::parse("0-511", 1024).unwrap();
        let b = ShardMap::parse("0-1023", 1024).unwrap();
        let avg = avg_nodes_per_shard(&[a, b], 1024);
        assert!((avg - 1.5).abs() < 1e-9);
    }
}
