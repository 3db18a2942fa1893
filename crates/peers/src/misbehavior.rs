// Path: crates/peers/src/misbehavior.rs

//! The misbehavior ledger. Proof failures escalate through soft bans to a
//! permanent one; content-integrity offenses (wrong bytes for a CID, corrupt
//! blobs) ban permanently on the first strike. Timeouts only ever count.

use bytecave_types::peer::MisbehaviorKind;
use bytecave_types::UnixMillis;
use dashmap::DashMap;
use std::collections::VecDeque;

const SOFT_BAN_SHORT_MS: i64 = 10 * 60 * 1000;
const SOFT_BAN_LONG_MS: i64 = 60 * 60 * 1000;
/// The rolling window for the repeated-failure soft ban.
const FAILURE_WINDOW_MS: i64 = 30 * 1000;
const FAILURE_WINDOW_LIMIT: usize = 3;

/// A peer's standing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BanState {
    Clear,
    /// Banned until the contained instant.
    SoftBanned(UnixMillis),
    Permanent,
}

/// Per-peer offense counters.
#[derive(Debug, Default, Clone)]
pub struct MisbehaviorRecord {
    pub invalid_proofs: u32,
    pub cid_mismatches: u32,
    pub corrupt_blobs: u32,
    pub timeouts: u32,
    pub ban_until: Option<UnixMillis>,
    pub permanent_ban: bool,
    recent_failures: VecDeque<UnixMillis>,
}

impl MisbehaviorRecord {
    fn state(&self, now: UnixMillis) -> BanState {
        if self.permanent_ban {
            return BanState::Permanent;
        }
        match self.ban_until {
            Some(until) if until > now => BanState::SoftBanned(until),
            _ => BanState::Clear,
        }
    }

    fn push_failure(&mut self, now: UnixMillis) -> bool {
        self.recent_failures.push_back(now);
        while let Some(first) = self.recent_failures.front() {
            if now - *first > FAILURE_WINDOW_MS {
                self.recent_failures.pop_front();
            } else {
                break;
            }
        }
        self.recent_failures.len() >= FAILURE_WINDOW_LIMIT
    }
}

/// The concurrent ledger of offenses across all peers.
#[derive(Debug, Default)]
pub struct MisbehaviorLedger {
    records: DashMap<String, MisbehaviorRecord>,
}

impl MisbehaviorLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one misbehavior event and returns the resulting standing.
    pub fn record(&self, node_id: &str, kind: MisbehaviorKind, now: UnixMillis) -> BanState {
        let mut entry = self.records.entry(node_id.to_string()).or_default();
        match kind {
            MisbehaviorKind::InvalidProof => {
                entry.invalid_proofs += 1;
                match entry.invalid_proofs {
                    1 => entry.ban_until = Some(now + SOFT_BAN_SHORT_MS),
                    2 => entry.ban_until = Some(now + SOFT_BAN_LONG_MS),
                    _ => entry.permanent_ban = true,
                }
            }
            MisbehaviorKind::CidMismatch => {
                entry.cid_mismatches += 1;
                entry.permanent_ban = true;
            }
            MisbehaviorKind::CorruptBlob => {
                entry.corrupt_blobs += 1;
                entry.permanent_ban = true;
            }
            MisbehaviorKind::Timeout => {
                entry.timeouts += 1;
                if entry.push_failure(now) {
                    entry.ban_until = Some(now + SOFT_BAN_SHORT_MS);
                }
            }
        }
        let state = entry.state(now);
        if state != BanState::Clear {
            tracing::warn!(
                target: "peers",
                event = "peer_banned",
                node_id,
                kind = ?kind,
                permanent = entry.permanent_ban,
            );
        }
        state
    }

    /// Registers a plain failure (dial error, rejection) toward the rolling
    /// repeated-failure ban.
    pub fn record_failure(&self, node_id: &str, now: UnixMillis) -> BanState {
        let mut entry = self.records.entry(node_id.to_string()).or_default();
        if entry.push_failure(now) {
            entry.ban_until = Some(now + SOFT_BAN_SHORT_MS);
        }
        entry.state(now)
    }

    pub fn state(&self, node_id: &str, now: UnixMillis) -> BanState {
        self.records
            .get(node_id)
            .map(|r| r.state(now))
            .unwrap_or(BanState::Clear)
    }

    pub fn is_banned(&self, node_id: &str, now: UnixMillis) -> bool {
        self.state(node_id, now) != BanState::Clear
    }

    pub fn get(&self, node_id: &str) -> Option<MisbehaviorRecord> {
        self.records.get(node_id).map(|r| r.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: UnixMillis = 1_000_000;

    #[test]
    fn invalid_proofs_escalate() {
        let ledger = MisbehaviorLedger::new();
        let s1 = ledger.record("p", MisbehaviorKind::InvalidProof, NOW);
        assert_eq!(s1, BanState::SoftBanned(NOW + SOFT_BAN_SHORT_MS));
        // First soft ban lapses.
        assert_eq!(ledger.state("p", NOW + SOFT_BAN_SHORT_MS + 1), BanState::Clear);

        let s2 = ledger.record("p", MisbehaviorKind::InvalidProof, NOW);
        assert_eq!(s2, BanState::SoftBanned(NOW + SOFT_BAN_LONG_MS));

        let s3 = ledger.record("p", MisbehaviorKind::InvalidProof, NOW);
        assert_eq!(s3, BanState::Permanent);
        assert!(ledger.is_banned("p", NOW + 100 * SOFT_BAN_LONG_MS));
    }

    #[test]
    fn content_offenses_ban_permanently() {
        let ledger = MisbehaviorLedger::new();
        assert_eq!(
            ledger.record("a", MisbehaviorKind::CidMismatch, NOW),
            BanState::Permanent
        );
        assert_eq!(
            ledger.record("b", MisbehaviorKind::CorruptBlob, NOW),
            BanState::Permanent
        );
    }

    #[test]
    fn timeouts_alone_never_ban() {
        let ledger = MisbehaviorLedger::new();
        for i in 0..10 {
            // Spread out beyond the rolling window.
            ledger.record("p", MisbehaviorKind::Timeout, NOW + i * FAILURE_WINDOW_MS * 2);
        }
        assert!(!ledger.is_banned("p", NOW + 20 * FAILURE_WINDOW_MS));
        assert_eq!(ledger.get("p").unwrap().timeouts, 10);
    }

    #[test]
    fn three_failures_in_window_soft_ban() {
        let ledger = MisbehaviorLedger::new();
        assert_eq!(ledger.record_failure("p", NOW), BanState::Clear);
        assert_eq!(ledger.record_failure("p", NOW + 10_000), BanState::Clear);
        let state = ledger.record_failure("p", NOW + 20_000);
        assert_eq!(state, BanState::SoftBanned(NOW + 20_000 + SOFT_BAN_SHORT_MS));
    }

    #[test]
    fn failures_outside_window_do_not_ban() {
        let ledger = MisbehaviorLedger::new();
        ledger.record_failure("p", NOW);
        ledger.record_failure("p", NOW + 31_000);
        assert_eq!(ledger.record_failure("p", NOW + 62_000), BanState::Clear);
    }
}
