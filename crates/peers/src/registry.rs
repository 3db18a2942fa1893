// Path: crates/peers/src/registry.rs

//! The peer registry: the authoritative peer list plus local observations,
//! scores, and selection for uploads and downloads.

use crate::events::{EventLog, PeerCache};
use crate::misbehavior::{BanState, MisbehaviorLedger};
use crate::score;
use bytecave_types::peer::{MisbehaviorKind, PeerObservation, PeerRecord, ReputationEvent, ScoreWeights};
use bytecave_types::shard::ShardMap;
use bytecave_types::{Cid, UnixMillis};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Observations idle beyond this are dropped by the sweep.
const OBSERVATION_IDLE_MS: i64 = 24 * 60 * 60 * 1000;

/// One ranked peer with its score, as returned by selection.
#[derive(Debug, Clone)]
pub struct RankedPeer {
    pub record: PeerRecord,
    pub score: f64,
}

/// The local view of the federation's peers.
pub struct PeerRegistry {
    self_node_id: String,
    shard_count: u32,
    weights: ScoreWeights,
    peers: RwLock<HashMap<String, PeerRecord>>,
    shard_maps: DashMap<String, Option<ShardMap>>,
    observations: DashMap<String, PeerObservation>,
    ledger: MisbehaviorLedger,
    event_log: Option<EventLog>,
    cache: Option<PeerCache>,
}

impl PeerRegistry {
    pub fn new(self_node_id: impl Into<String>, shard_count: u32) -> Self {
        PeerRegistry {
            self_node_id: self_node_id.into(),
            shard_count,
            weights: ScoreWeights::default(),
            peers: RwLock::new(HashMap::new()),
            shard_maps: DashMap::new(),
            observations: DashMap::new(),
            ledger: MisbehaviorLedger::new(),
            event_log: None,
            cache: None,
        }
    }

    /// Attaches the durable artifacts (event log, peer cache) and seeds the
    /// peer list from the cache.
    pub fn with_persistence(mut self, event_log: EventLog, cache: PeerCache) -> Self {
        let seeded = cache.load();
        if !seeded.is_empty() {
            tracing::info!(target: "peers", event = "peer_cache_loaded", peers = seeded.len());
            let mut peers = self.peers.write();
            for peer in seeded {
                peers.insert(peer.node_id.clone(), peer);
            }
        }
        self.event_log = Some(event_log);
        self.cache = Some(cache);
        self
    }

    pub fn ledger(&self) -> &MisbehaviorLedger {
        &self.ledger
    }

    /// Replaces the registered peer list with a fresh authoritative snapshot
    /// and persists it to the bootstrap cache.
    pub fn set_registered_peers(&self, list: Vec<PeerRecord>) {
        {
            let mut peers = self.peers.write();
            peers.clear();
            self.shard_maps.clear();
            for peer in list {
                peers.insert(peer.node_id.clone(), peer);
            }
        }
        if let Some(cache) = &self.cache {
            let peers: Vec<PeerRecord> = self.peers.read().values().cloned().collect();
            if let Err(e) = cache.save(&peers) {
                tracing::warn!(target: "peers", event = "peer_cache_save_failed", error = %e);
            }
        }
    }

    pub fn get_peer(&self, node_id: &str) -> Option<PeerRecord> {
        self.peers.read().get(node_id).cloned()
    }

    /// Active peers other than this node.
    pub fn active_peers(&self) -> Vec<PeerRecord> {
        self.peers
            .read()
            .values()
            .filter(|p| p.active && p.node_id != self.self_node_id)
            .cloned()
            .collect()
    }

    /// Records a successful interaction with `latency_ms`.
    pub fn record_success(&self, node_id: &str, latency_ms: u64, now: UnixMillis) {
        let mut obs = self
            .observations
            .entry(node_id.to_string())
            .or_insert_with(|| PeerObservation::new(now));
        obs.success_count += 1;
        obs.last_seen = now;
        let n = (obs.success_count + obs.failure_count) as f64;
        obs.avg_latency_ms += (latency_ms as f64 - obs.avg_latency_ms) / n;
    }

    /// Records a failed interaction; repeated failures soft-ban.
    pub fn record_failure(&self, node_id: &str, now: UnixMillis) {
        let mut obs = self
            .observations
            .entry(node_id.to_string())
            .or_insert_with(|| PeerObservation::new(now));
        obs.failure_count += 1;
        drop(obs);
        self.ledger.record_failure(node_id, now);
    }

    /// Records a misbehavior event, feeding the ban state machine and the
    /// durable event log. Timeouts also count as plain failures.
    pub fn record_misbehavior(
        &self,
        node_id: &str,
        kind: MisbehaviorKind,
        now: UnixMillis,
    ) -> BanState {
        if kind == MisbehaviorKind::Timeout {
            if let Some(mut obs) = self.observations.get_mut(node_id) {
                obs.failure_count += 1;
            }
        }
        if let Some(log) = &self.event_log {
            log.append(&ReputationEvent {
                node_id: node_id.to_string(),
                kind,
                at: now,
                detail: None,
            });
        }
        self.ledger.record(node_id, kind, now)
    }

    pub fn is_banned(&self, node_id: &str, now: UnixMillis) -> bool {
        self.ledger.is_banned(node_id, now)
    }

    fn owns_shard(&self, peer: &PeerRecord, shard: u32) -> Option<bool> {
        let spec = peer.shards.clone()?;
        let entry = self
            .shard_maps
            .entry(peer.node_id.clone())
            .or_insert_with(|| ShardMap::parse(&spec, self.shard_count).ok());
        entry.value().as_ref().map(|map| map.owns_shard(shard))
    }

    /// The score of one peer, zero when banned.
    pub fn score(&self, node_id: &str, cid: Option<&Cid>, now: UnixMillis) -> f64 {
        if self.ledger.is_banned(node_id, now) {
            return 0.0;
        }
        let Some(peer) = self.get_peer(node_id) else {
            return 0.0;
        };
        let observation = self
            .observations
            .get(node_id)
            .map(|o| o.clone())
            .unwrap_or_else(|| PeerObservation::new(now));
        let owns = cid.and_then(|c| self.owns_shard(&peer, c.shard_key(self.shard_count)));
        score::score(&observation, owns, &self.weights, now)
    }

    /// Ranks active, unbanned peers by score and takes the best `n`.
    /// Upload and download selection share this algorithm; callers decide
    /// the hedge width.
    pub fn select_peers(&self, cid: Option<&Cid>, n: usize, now: UnixMillis) -> Vec<RankedPeer> {
        let mut ranked: Vec<RankedPeer> = self
            .active_peers()
            .into_iter()
            .filter(|p| !self.ledger.is_banned(&p.node_id, now))
            .map(|record| {
                let score = self.score(&record.node_id, cid, now);
                RankedPeer { record, score }
            })
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(n);
        ranked
    }

    /// Drops observations idle for more than a day.
    pub fn sweep_observations(&self, now: UnixMillis) -> usize {
        let before = self.observations.len();
        self.observations
            .retain(|_, obs| now - obs.last_seen <= OBSERVATION_IDLE_MS);
        before - self.observations.len()
    }

    pub fn observation(&self, node_id: &str) -> Option<PeerObservation> {
        self.observations.get(node_id).map(|o| o.clone())
    }
}

/// Convenience constructor used in tests across crates.
pub fn test_peer(node_id: &str) -> PeerRecord {
    PeerRecord {
        node_id: node_id.to_string(),
        endpoint: format!("http://{node_id}:3004"),
        public_key: format!("04{node_id}"),
        active: true,
        shards: None,
    }
}
