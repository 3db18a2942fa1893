// Path: crates/gc/src/policy.rs

//! Candidate scoring and retention filtering. Everything here is pure so the
//! policy can be tested without a store or a federation.

use bytecave_types::blob::BlobMetadata;
use bytecave_types::config::{GcConfig, RetentionMode};
use bytecave_types::UnixMillis;
use std::collections::BTreeSet;

const MIB: f64 = 1024.0 * 1024.0;

/// Pinned blobs sink to the bottom of the priority order but stay in the
/// candidate list so runs can report them as skipped.
pub const PINNED_PRIORITY: f64 = -1000.0;

/// One scored deletion candidate.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub metadata: BlobMetadata,
    pub priority: f64,
}

/// `10·ageDays + 5·idleDays + size/MiB`, except pinned.
pub fn priority(metadata: &BlobMetadata, now: UnixMillis) -> f64 {
    if metadata.pinned {
        return PINNED_PRIORITY;
    }
    10.0 * metadata.age_days(now) + 5.0 * metadata.idle_days(now) + metadata.size as f64 / MIB
}

/// Scores every blob and sorts highest priority first.
pub fn score_candidates(blobs: Vec<BlobMetadata>, now: UnixMillis) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = blobs
        .into_iter()
        .map(|metadata| Candidate {
            priority: priority(&metadata, now),
            metadata,
        })
        .collect();
    candidates.sort_by(|a, b| b.priority.total_cmp(&a.priority));
    candidates
}

/// Disk pressure inputs for the size-based filter.
#[derive(Debug, Clone, Copy)]
pub struct Pressure {
    /// Bytes currently used by the store.
    pub used: u64,
    /// Bytes held by pinned blobs.
    pub pinned_size: u64,
    /// Free bytes on the backing filesystem.
    pub free_disk: u64,
}

fn time_selected(candidates: &[Candidate], config: &GcConfig, now: UnixMillis) -> BTreeSet<String> {
    candidates
        .iter()
        .filter(|c| c.metadata.age_days(now) > config.max_blob_age_days as f64)
        .map(|c| c.metadata.cid.to_hex())
        .collect()
}

fn size_selected(candidates: &[Candidate], config: &GcConfig, pressure: Pressure) -> BTreeSet<String> {
    let max_storage = config.max_storage_mb * 1024 * 1024;
    let min_free = config.min_free_disk_mb * 1024 * 1024;
    let reserved = config.reserved_for_pinned_mb * 1024 * 1024;

    let over_capacity = pressure.used.saturating_sub(max_storage);
    // Trigger only strictly below the threshold.
    let free_shortfall = if pressure.free_disk < min_free {
        min_free - pressure.free_disk
    } else {
        0
    };
    let unpinned_budget = max_storage.saturating_sub(reserved);
    let unpinned_used = pressure.used.saturating_sub(pressure.pinned_size);
    let over_reservation = unpinned_used.saturating_sub(unpinned_budget);

    let target = over_capacity.max(free_shortfall).max(over_reservation);
    if target == 0 {
        return BTreeSet::new();
    }

    // Highest-priority candidates until their cumulative size covers the
    // target. Pinned blobs never contribute to coverage; reclaiming past the
    // target would eat into the reservation floor.
    let mut selected = BTreeSet::new();
    let mut covered: u64 = 0;
    for candidate in candidates {
        if covered >= target {
            break;
        }
        selected.insert(candidate.metadata.cid.to_hex());
        if !candidate.metadata.pinned {
            covered += candidate.metadata.size;
        }
    }
    selected
}

/// Applies the retention mode, returning the CIDs (hex) selected for the
/// safety pipeline.
pub fn filter_by_retention(
    candidates: &[Candidate],
    config: &GcConfig,
    pressure: Pressure,
    now: UnixMillis,
) -> BTreeSet<String> {
    match config.retention_mode {
        RetentionMode::Time => time_selected(candidates, config, now),
        RetentionMode::Size => size_selected(candidates, config, pressure),
        RetentionMode::Hybrid => {
            let mut union = time_selected(candidates, config, now);
            union.extend(size_selected(candidates, config, pressure));
            union
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecave_types::Cid;

    const DAY_MS: i64 = 86_400_000;

    fn blob(byte: u8, size: u64, age_days: i64, pinned: bool) -> BlobMetadata {
        let now = 100 * DAY_MS;
        let mut md = BlobMetadata::new(
            Cid::from_digest([byte; 32]),
            size,
            "application/octet-stream",
            now - age_days * DAY_MS,
        );
        md.pinned = pinned;
        md
    }

    fn now() -> UnixMillis {
        100 * DAY_MS
    }

    #[test]
    fn priority_weights_age_idleness_and_size() {
        let md = blob(1, 2 * 1024 * 1024, 10, false);
        // 10·10 + 5·10 + 2 = 152 (never accessed, so idle = age).
        assert!((priority(&md, now()) - 152.0).abs() < 0.01);
    }

    #[test]
    fn pinned_scores_sentinel_but_stays_listed() {
        let scored = score_candidates(vec![blob(1, 1024, 40, true), blob(2, 1024, 1, false)], now());
        assert_eq!(scored.len(), 2);
        assert_eq!(scored.last().unwrap().priority, PINNED_PRIORITY);
        assert!(scored.last().unwrap().metadata.pinned);
    }

    #[test]
    fn time_mode_selects_only_overage_blobs() {
        let config = GcConfig {
            retention_mode: RetentionMode::Time,
            max_blob_age_days: 30,
            ..GcConfig::default()
        };
        let candidates = score_candidates(
            vec![blob(1, 10, 40, false), blob(2, 10, 10, false), blob(3, 10, 31, true)],
            now(),
        );
        let selected = filter_by_retention(
            &candidates,
            &config,
            Pressure {
                used: 30,
                pinned_size: 10,
                free_disk: u64::MAX,
            },
            now(),
        );
        // Both over-age blobs are selected, the pinned one included so the
        // safety pipeline can report it as skipped.
        assert_eq!(selected.len(), 2);
        assert!(selected.contains(&Cid::from_digest([1; 32]).to_hex()));
        assert!(selected.contains(&Cid::from_digest([3; 32]).to_hex()));
    }

    #[test]
    fn size_mode_covers_exactly_the_excess() {
        let mib = 1024 * 1024;
        let config = GcConfig {
            retention_mode: RetentionMode::Size,
            max_storage_mb: 10,
            min_free_disk_mb: 0,
            reserved_for_pinned_mb: 0,
            ..GcConfig::default()
        };
        // 14 MiB used, 10 MiB cap: 4 MiB excess. Oldest-first coverage
        // takes the 40-day 3 MiB blob and the 30-day 3 MiB blob.
        let candidates = score_candidates(
            vec![
                blob(1, 3 * mib, 40, false),
                blob(2, 3 * mib, 30, false),
                blob(3, 8 * mib, 1, false),
            ],
            now(),
        );
        let selected = filter_by_retention(
            &candidates,
            &config,
            Pressure {
                used: 14 * mib,
                pinned_size: 0,
                free_disk: u64::MAX,
            },
            now(),
        );
        assert_eq!(selected.len(), 2);
        assert!(selected.contains(&Cid::from_digest([1; 32]).to_hex()));
        assert!(selected.contains(&Cid::from_digest([2; 32]).to_hex()));
    }

    #[test]
    fn size_mode_idles_under_capacity() {
        let config = GcConfig {
            retention_mode: RetentionMode::Size,
            max_storage_mb: 100,
            min_free_disk_mb: 0,
            reserved_for_pinned_mb: 0,
            ..GcConfig::default()
        };
        let candidates = score_candidates(vec![blob(1, 1024, 40, false)], now());
        let selected = filter_by_retention(
            &candidates,
            &config,
            Pressure {
                used: 1024,
                pinned_size: 0,
                free_disk: u64::MAX,
            },
            now(),
        );
        assert!(selected.is_empty());
    }

    #[test]
    fn low_free_disk_triggers_selection_strictly_below_threshold() {
        let mib = 1024 * 1024;
        let config = GcConfig {
            retention_mode: RetentionMode::Size,
            max_storage_mb: 1000,
            min_free_disk_mb: 10,
            reserved_for_pinned_mb: 0,
            ..GcConfig::default()
        };
        let candidates = score_candidates(vec![blob(1, 5 * mib, 40, false)], now());
        // Exactly at the threshold: no trigger.
        let at = filter_by_retention(
            &candidates,
            &config,
            Pressure {
                used: 5 * mib,
                pinned_size: 0,
                free_disk: 10 * mib,
            },
            now(),
        );
        assert!(at.is_empty());
        // One byte below: trigger.
        let below = filter_by_retention(
            &candidates,
            &config,
            Pressure {
                used: 5 * mib,
                pinned_size: 0,
                free_disk: 10 * mib - 1,
            },
            now(),
        );
        assert_eq!(below.len(), 1);
    }

    #[test]
    fn reservation_pressure_broadens_selection() {
        let mib = 1024 * 1024;
        let config = GcConfig {
            retention_mode: RetentionMode::Size,
            max_storage_mb: 10,
            min_free_disk_mb: 0,
            reserved_for_pinned_mb: 6,
            ..GcConfig::default()
        };
        // Unpinned budget is 4 MiB; 5 MiB of unpinned data exceeds it even
        // though total use is under capacity.
        let candidates = score_candidates(
            vec![blob(1, 5 * mib, 40, false), blob(2, 4 * mib, 40, true)],
            now(),
        );
        let selected = filter_by_retention(
            &candidates,
            &config,
            Pressure {
                used: 9 * mib,
                pinned_size: 4 * mib,
                free_disk: u64::MAX,
            },
            now(),
        );
        assert!(selected.contains(&Cid::from_digest([1; 32]).to_hex()));
    }

    #[test]
    fn hybrid_is_the_union() {
        let mib = 1024 * 1024;
        let config = GcConfig {
            retention_mode: RetentionMode::Hybrid,
            max_blob_age_days: 30,
            max_storage_mb: 10,
            min_free_disk_mb: 0,
            reserved_for_pinned_mb: 0,
            ..GcConfig::default()
        };
        // Blob 1 is selected by age, blob 3 by size pressure.
        let candidates = score_candidates(
            vec![
                blob(1, 1024, 40, false),
                blob(2, 1024, 1, false),
                blob(3, 11 * mib, 20, false),
            ],
            now(),
        );
        let selected = filter_by_retention(
            &candidates,
            &config,
            Pressure {
                used: 11 * mib + 2048,
                pinned_size: 0,
                free_disk: u64::MAX,
            },
            now(),
        );
        assert!(selected.contains(&Cid::from_digest([1; 32]).to_hex()));
        assert!(selected.contains(&Cid::from_digest([3; 32]).to_hex()));
        assert!(!selected.contains(&Cid::from_digest([2; 32]).to_hex()));
    }
}
