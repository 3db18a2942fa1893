// Path: crates/replication/src/state.rs

//! The durable replication state table. Every record carries an HMAC
//! integrity tag over its canonicalized tuple; on load, records whose tag
//! fails verification are discarded and counted, never silently trusted.

use bytecave_crypto::StateTagger;
use bytecave_telemetry::replication_metrics;
use bytecave_types::error::StorageError;
use bytecave_types::replication::ReplicationState;
use bytecave_types::{Cid, UnixMillis};
use dashmap::DashMap;
use std::path::PathBuf;

fn canonical_fields(state: &ReplicationState) -> Vec<String> {
    let mut targets = state.target_nodes.clone();
    targets.sort();
    let mut confirmed = state.confirmed_nodes.clone();
    confirmed.sort();
    let mut failed = state.failed_nodes.clone();
    failed.sort();
    vec![
        state.cid.to_hex(),
        state.replication_factor.to_string(),
        targets.join(","),
        confirmed.join(","),
        failed.join(","),
        state.last_updated.to_string(),
        state.complete.to_string(),
        state
            .last_verified
            .map(|v| v.to_string())
            .unwrap_or_default(),
    ]
}

/// The in-memory table with JSON persistence at `replication-state.json`.
pub struct StateTable {
    tagger: StateTagger,
    path: PathBuf,
    states: DashMap<Cid, ReplicationState>,
}

impl StateTable {
    /// Opens the table, verifying every record's integrity tag. Tampered
    /// records are dropped and counted.
    pub fn open(path: PathBuf, tagger: StateTagger) -> Result<Self, StorageError> {
        let table = StateTable {
            tagger,
            path,
            states: DashMap::new(),
        };
        let mut discarded = 0u64;
        if table.path.exists() {
            let raw = std::fs::read(&table.path)?;
            let records: Vec<ReplicationState> = serde_json::from_slice(&raw)?;
            for record in records {
                if table.verify(&record) {
                    table.states.insert(record.cid, record);
                } else {
                    discarded += 1;
                }
            }
        }
        if discarded > 0 {
            replication_metrics().inc_tampered_states(discarded);
            tracing::warn!(
                target: "replication",
                event = "tampered_state_discarded",
                count = discarded,
                "Replication state records failed integrity verification and were dropped"
            );
        }
        Ok(table)
    }

    /// An ephemeral table for tests.
    pub fn in_memory(tagger: StateTagger) -> Self {
        StateTable {
            tagger,
            path: PathBuf::new(),
            states: DashMap::new(),
        }
    }

    fn verify(&self, state: &ReplicationState) -> bool {
        let fields = canonical_fields(state);
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        self.tagger.verify(&state.integrity_hash, &refs)
    }

    fn stamp(&self, state: &mut ReplicationState) {
        let fields = canonical_fields(state);
        let refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        state.integrity_hash = self.tagger.tag(&refs);
    }

    pub fn get(&self, cid: &Cid) -> Option<ReplicationState> {
        self.states.get(cid).map(|s| s.clone())
    }

    pub fn contains(&self, cid: &Cid) -> bool {
        self.states.contains_key(cid)
    }

    /// Applies a mutation to the state for `cid`, creating the record if
    /// missing. The completeness flag and the integrity tag are recomputed
    /// on every transition; updates for one CID are serialized by the entry
    /// lock.
    pub fn update<F>(&self, cid: &Cid, replication_factor: u32, now: UnixMillis, mutate: F)
    where
        F: FnOnce(&mut ReplicationState),
    {
        let mut entry = self
            .states
            .entry(*cid)
            .or_insert_with(|| ReplicationState::new(*cid, replication_factor, now));
        mutate(&mut entry);
        entry.last_updated = now;
        entry.recompute_complete();
        self.stamp(&mut entry);
    }

    pub fn remove(&self, cid: &Cid) {
        self.states.remove(cid);
    }

    /// CIDs whose replication has not reached its factor.
    pub fn incomplete(&self) -> Vec<ReplicationState> {
        self.states
            .iter()
            .filter(|s| !s.complete)
            .map(|s| s.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Persists the whole table atomically. Called by the engine after each
    /// batch of transitions.
    pub fn persist(&self) -> Result<(), StorageError> {
        if self.path.as_os_str().is_empty() {
            return Ok(());
        }
        let records: Vec<ReplicationState> = self.states.iter().map(|s| s.clone()).collect();
        let incomplete = records.iter().filter(|s| !s.complete).count() as u64;
        replication_metrics().set_incomplete_states(incomplete);
        let bytes = serde_json::to_vec_pretty(&records)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(byte: u8) -> Cid {
        Cid::from_digest([byte; 32])
    }

    fn tagger() -> StateTagger {
        StateTagger::from_key([9u8; 32])
    }

    #[test]
    fn update_restamps_and_recomputes_complete() {
        let table = StateTable::in_memory(tagger());
        table.update(&cid(1), 2, 100, |s| {
            s.target_nodes = vec!["a".into(), "b".into()];
            s.confirmed_nodes.push("a".into());
        });
        let state = table.get(&cid(1)).unwrap();
        assert!(!state.complete);
        assert!(!state.integrity_hash.is_empty());
        assert!(state.is_consistent());

        table.update(&cid(1), 2, 200, |s| s.confirmed_nodes.push("b".into()));
        let state = table.get(&cid(1)).unwrap();
        assert!(state.complete);
        assert_eq!(state.last_updated, 200);
    }

    #[test]
    fn persisted_records_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replication-state.json");
        {
            let table = StateTable::open(path.clone(), tagger()).unwrap();
            table.update(&cid(1), 3, 100, |s| s.confirmed_nodes.push("a".into()));
            table.persist().unwrap();
        }
        let table = StateTable::open(path, tagger()).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(&cid(1)).unwrap().confirmed_nodes, vec!["a"]);
    }

    #[test]
    fn tampered_records_are_discarded_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replication-state.json");
        {
            let table = StateTable::open(path.clone(), tagger()).unwrap();
            table.update(&cid(1), 3, 100, |s| s.confirmed_nodes.push("a".into()));
            table.update(&cid(2), 3, 100, |s| s.confirmed_nodes.push("b".into()));
            table.persist().unwrap();
        }
        // An attacker with file access inflates a confirmed set.
        let text = std::fs::read_to_string(&path).unwrap();
        let tampered = text.replace("\"a\"", "\"a\",\"forged\"");
        std::fs::write(&path, tampered).unwrap();

        let table = StateTable::open(path, tagger()).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.get(&cid(1)).is_none());
        assert!(table.get(&cid(2)).is_some());
    }

    #[test]
    fn wrong_key_discards_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("replication-state.json");
        {
            let table = StateTable::open(path.clone(), tagger()).unwrap();
            table.update(&cid(1), 3, 100, |s| s.confirmed_nodes.push("a".into()));
            table.persist().unwrap();
        }
        let table = StateTable::open(path, StateTagger::from_key([1u8; 32])).unwrap();
        assert!(table.is_empty());
    }
}
