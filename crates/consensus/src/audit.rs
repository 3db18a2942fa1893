// Path: crates/consensus/src/audit.rs

//! The bounded audit log. Disputes and censorship events are evidence for
//! operators and reputation feeds, kept in memory with a hard cap.

use bytecave_telemetry::consensus_metrics;
use bytecave_types::audit::{CensorshipEvent, CensorshipKind, DisputeRecord, DisputeResolution};
use bytecave_types::{now_millis, Cid};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};

/// Keep at most this many entries of each kind.
const AUDIT_LOG_CAP: usize = 10_000;

/// In-memory audit trail for the read path.
#[derive(Default)]
pub struct AuditLog {
    disputes: Mutex<VecDeque<DisputeRecord>>,
    censorship: Mutex<VecDeque<CensorshipEvent>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that replicas of `cid` served conflicting ciphertexts.
    pub fn record_dispute(&self, cid: Cid, conflicting_hashes: BTreeMap<String, Vec<String>>) {
        consensus_metrics().inc_disputes();
        tracing::warn!(
            target: "consensus",
            event = "dispute_recorded",
            cid = %cid,
            distinct_hashes = conflicting_hashes.len(),
        );
        let mut disputes = self.disputes.lock();
        if disputes.len() == AUDIT_LOG_CAP {
            disputes.pop_front();
        }
        disputes.push_back(DisputeRecord {
            cid,
            conflicting_hashes,
            resolution: DisputeResolution::Pending,
            recorded_at: now_millis(),
        });
    }

    /// Records that `node_id` failed to serve a CID it should hold.
    pub fn record_censorship(&self, cid: Cid, node_id: &str, kind: CensorshipKind) {
        let kind_label = match kind {
            CensorshipKind::Refusal => "refusal",
            CensorshipKind::Timeout => "timeout",
            CensorshipKind::InvalidResponse => "invalid_response",
        };
        consensus_metrics().inc_censorship_events(kind_label);
        tracing::warn!(
            target: "consensus",
            event = "censorship_recorded",
            cid = %cid,
            node_id,
            kind = kind_label,
        );
        let mut events = self.censorship.lock();
        if events.len() == AUDIT_LOG_CAP {
            events.pop_front();
        }
        events.push_back(CensorshipEvent {
            cid,
            node_id: node_id.to_string(),
            at: now_millis(),
            kind,
        });
    }

    pub fn disputes(&self) -> Vec<DisputeRecord> {
        self.disputes.lock().iter().cloned().collect()
    }

    pub fn censorship_events(&self) -> Vec<CensorshipEvent> {
        self.censorship.lock().iter().cloned().collect()
    }
}
