// Path: crates/replication/src/engine.rs

//! The replication fanout engine.
//!
//! Targets come from deterministic rendezvous selection; dials run in
//! parallel under a concurrency bound with a per-peer deadline. The engine
//! gives foreground writes a short acceptance window and keeps working in
//! the background until the factor is met or candidates run out.

use crate::select::{self, Candidate, SelectionOutcome};
use crate::state::StateTable;
use async_trait::async_trait;
use bytecave_api::query::ReplicationProbe;
use bytecave_api::transport::{PeerTransport, ReplicaMeta, TransportError};
use bytecave_peers::PeerRegistry;
use bytecave_telemetry::replication_metrics;
use bytecave_types::peer::{MisbehaviorKind, PeerRecord};
use bytecave_types::replication::ReplicationStatus;
use bytecave_types::{now_millis, Cid};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Construction options for the engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub node_id: String,
    pub replication_factor: u32,
    pub shard_count: u32,
    /// Deadline for one peer dial.
    pub per_peer_timeout: Duration,
    /// How long a foreground write waits before the engine goes async.
    pub acceptance_window: Duration,
    /// Concurrent dials across all fanouts.
    pub max_parallel: usize,
    pub enabled: bool,
}

impl EngineOptions {
    pub fn from_config(config: &bytecave_types::config::NodeConfig) -> Self {
        EngineOptions {
            node_id: config.node_id.clone(),
            replication_factor: config.replication_factor,
            shard_count: config.shard_count,
            per_peer_timeout: Duration::from_millis(config.replication_timeout_ms),
            acceptance_window: Duration::from_secs(2),
            max_parallel: 16,
            enabled: config.replication_enabled,
        }
    }
}

enum DialOutcome {
    Confirmed { latency_ms: u64 },
    TimedOut,
    Failed(TransportError),
}

/// Fans blobs out to peers and tracks per-CID replication state.
pub struct ReplicationEngine<T> {
    options: EngineOptions,
    transport: Arc<T>,
    registry: Arc<PeerRegistry>,
    states: Arc<StateTable>,
    permits: Arc<Semaphore>,
}

impl<T: PeerTransport + 'static> ReplicationEngine<T> {
    pub fn new(
        options: EngineOptions,
        transport: Arc<T>,
        registry: Arc<PeerRegistry>,
        states: Arc<StateTable>,
    ) -> Arc<Self> {
        let permits = Arc::new(Semaphore::new(options.max_parallel.max(1)));
        Arc::new(ReplicationEngine {
            options,
            transport,
            registry,
            states,
            permits,
        })
    }

    pub fn states(&self) -> &StateTable {
        &self.states
    }

    /// The current status for a CID, as reported to writers.
    pub fn status(&self, cid: &Cid) -> ReplicationStatus {
        let target = self.options.replication_factor;
        match self.states.get(cid) {
            Some(state) => ReplicationStatus {
                target,
                confirmed: state.confirmed_nodes.len() as u32,
                complete: state.complete,
            },
            None => ReplicationStatus {
                target,
                confirmed: 0,
                complete: false,
            },
        }
    }

    fn candidates(&self, cid: &Cid) -> Vec<Candidate> {
        let now = now_millis();
        self.registry
            .active_peers()
            .into_iter()
            .filter(|p| p.node_id != self.options.node_id)
            .filter(|p| !self.registry.is_banned(&p.node_id, now))
            .map(|record| {
                let score = self.registry.score(&record.node_id, Some(cid), now);
                Candidate { record, score }
            })
            .collect()
    }

    fn select(&self, cid: &Cid, exclude: &HashSet<String>) -> SelectionOutcome {
        let candidates = self.candidates(cid);
        select::select_targets(
            cid,
            &candidates,
            self.options.replication_factor as usize,
            self.options.shard_count,
            exclude,
        )
    }

    /// Replicates `bytes` to up to R peers. Returns after the acceptance
    /// window with whatever has been confirmed by then; the fanout keeps
    /// running in the background.
    pub async fn replicate(
        self: &Arc<Self>,
        cid: Cid,
        bytes: Vec<u8>,
        mime_type: String,
        meta: ReplicaMeta,
    ) -> ReplicationStatus {
        if !self.options.enabled {
            return self.status(&cid);
        }

        let prior_failures: HashSet<String> = self
            .states
            .get(&cid)
            .map(|s| s.failed_nodes.iter().cloned().collect())
            .unwrap_or_default();
        let selection = self.select(&cid, &prior_failures);
        if selection.targets.is_empty() {
            tracing::warn!(
                target: "replication",
                event = "no_targets",
                cid = %cid,
                excluded = selection.excluded.len(),
            );
            return self.status(&cid);
        }
        tracing::debug!(
            target: "replication",
            event = "targets_selected",
            cid = %cid,
            targets = selection.targets.len(),
            excluded = ?selection.excluded,
        );

        let engine = Arc::clone(self);
        let targets = selection.targets;
        let payload = Arc::new(bytes);
        let mut handle = tokio::spawn(async move {
            engine.run_fanout(cid, payload, mime_type, meta, targets).await;
        });

        // The write path only waits this long; completion may be async.
        let _ = tokio::time::timeout(self.options.acceptance_window, &mut handle).await;
        self.status(&cid)
    }

    async fn run_fanout(
        self: Arc<Self>,
        cid: Cid,
        bytes: Arc<Vec<u8>>,
        mime_type: String,
        meta: ReplicaMeta,
        targets: Vec<PeerRecord>,
    ) {
        self.record_targets(&cid, &targets);
        self.round(&cid, &bytes, &mime_type, &meta, targets).await;

        // One replacement round with peers not yet tried.
        let state = self.states.get(&cid);
        let confirmed = state
            .as_ref()
            .map(|s| s.confirmed_nodes.len() as u32)
            .unwrap_or(0);
        if confirmed < self.options.replication_factor {
            let mut exclude: HashSet<String> = HashSet::new();
            if let Some(state) = &state {
                exclude.extend(state.confirmed_nodes.iter().cloned());
                exclude.extend(state.failed_nodes.iter().cloned());
            }
            let replacement = self.select(&cid, &exclude);
            let fresh: Vec<PeerRecord> = replacement
                .targets
                .into_iter()
                .filter(|p| !exclude.contains(&p.node_id))
                .collect();
            if !fresh.is_empty() {
                tracing::info!(
                    target: "replication",
                    event = "replacement_round",
                    cid = %cid,
                    confirmed,
                    replacements = fresh.len(),
                );
                self.record_targets(&cid, &fresh);
                self.round(&cid, &bytes, &mime_type, &meta, fresh).await;
            }
        }

        if let Err(e) = self.states.persist() {
            tracing::warn!(target: "replication", event = "state_persist_failed", error = %e);
        }
    }

    fn record_targets(&self, cid: &Cid, targets: &[PeerRecord]) {
        let factor = self.options.replication_factor;
        self.states.update(cid, factor, now_millis(), |state| {
            for peer in targets {
                if !state.target_nodes.contains(&peer.node_id) {
                    state.target_nodes.push(peer.node_id.clone());
                }
            }
        });
    }

    async fn round(
        &self,
        cid: &Cid,
        bytes: &Arc<Vec<u8>>,
        mime_type: &str,
        meta: &ReplicaMeta,
        targets: Vec<PeerRecord>,
    ) {
        let mut dials = FuturesUnordered::new();
        for peer in targets {
            let bytes = Arc::clone(bytes);
            let meta = meta.clone();
            let mime = mime_type.to_string();
            dials.push(async move {
                let outcome = self.dial(&peer, cid, &bytes, &mime, &meta).await;
                (peer, outcome)
            });
        }

        while let Some((peer, outcome)) = dials.next().await {
            self.apply_outcome(cid, &peer, outcome);
        }
    }

    async fn dial(
        &self,
        peer: &PeerRecord,
        cid: &Cid,
        bytes: &[u8],
        mime_type: &str,
        meta: &ReplicaMeta,
    ) -> DialOutcome {
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(_) => return DialOutcome::Failed(TransportError::Connect("engine closed".into())),
        };
        let started = Instant::now();
        match tokio::time::timeout(
            self.options.per_peer_timeout,
            self.transport.replicate(peer, cid, bytes, mime_type, meta),
        )
        .await
        {
            Ok(Ok(_ack)) => DialOutcome::Confirmed {
                latency_ms: started.elapsed().as_millis() as u64,
            },
            Ok(Err(TransportError::Timeout)) => DialOutcome::TimedOut,
            Ok(Err(e)) => DialOutcome::Failed(e),
            Err(_) => DialOutcome::TimedOut,
        }
    }

    fn apply_outcome(&self, cid: &Cid, peer: &PeerRecord, outcome: DialOutcome) {
        let now = now_millis();
        let factor = self.options.replication_factor;
        match outcome {
            DialOutcome::Confirmed { latency_ms } => {
                self.registry.record_success(&peer.node_id, latency_ms, now);
                replication_metrics().inc_fanout("confirmed");
                self.states.update(cid, factor, now, |state| {
                    if !state.confirmed_nodes.contains(&peer.node_id) {
                        state.confirmed_nodes.push(peer.node_id.clone());
                    }
                    state.failed_nodes.retain(|n| n != &peer.node_id);
                });
                tracing::debug!(target: "replication", event = "replica_confirmed", cid = %cid, peer = %peer.node_id, latency_ms);
            }
            DialOutcome::TimedOut => {
                self.registry
                    .record_misbehavior(&peer.node_id, MisbehaviorKind::Timeout, now);
                replication_metrics().inc_fanout("timeout");
                self.mark_failed(cid, peer, now);
                tracing::warn!(target: "replication", event = "replica_timeout", cid = %cid, peer = %peer.node_id);
            }
            DialOutcome::Failed(e) => {
                self.registry.record_failure(&peer.node_id, now);
                replication_metrics().inc_fanout("failed");
                self.mark_failed(cid, peer, now);
                tracing::warn!(target: "replication", event = "replica_failed", cid = %cid, peer = %peer.node_id, error = %e);
            }
        }
    }

    fn mark_failed(&self, cid: &Cid, peer: &PeerRecord, now: bytecave_types::UnixMillis) {
        let factor = self.options.replication_factor;
        self.states.update(cid, factor, now, |state| {
            if !state.confirmed_nodes.contains(&peer.node_id)
                && !state.failed_nodes.contains(&peer.node_id)
            {
                state.failed_nodes.push(peer.node_id.clone());
            }
        });
    }

    /// Live existence probes against the peers recorded as holding `cid`.
    /// The returned count only includes peers that answered positively; it
    /// drives GC safety, never the locally-claimed count.
    pub async fn verify_with_peers(&self, cid: &Cid) -> usize {
        let Some(state) = self.states.get(cid) else {
            return 0;
        };
        let mut probes = FuturesUnordered::new();
        for node_id in &state.confirmed_nodes {
            let Some(peer) = self.registry.get_peer(node_id) else {
                continue;
            };
            probes.push(async move {
                let result = tokio::time::timeout(
                    self.options.per_peer_timeout,
                    self.transport.probe_has(&peer, cid),
                )
                .await;
                (peer, result)
            });
        }

        let mut verified = 0usize;
        let now = now_millis();
        while let Some((peer, result)) = probes.next().await {
            match result {
                Ok(Ok(true)) => {
                    verified += 1;
                    self.registry.record_success(&peer.node_id, 0, now);
                }
                Ok(Ok(false)) | Ok(Err(_)) => {
                    self.registry.record_failure(&peer.node_id, now);
                }
                Err(_) => {
                    self.registry
                        .record_misbehavior(&peer.node_id, MisbehaviorKind::Timeout, now);
                }
            }
        }

        self.states.update(cid, state.replication_factor, now, |s| {
            s.last_verified = Some(now);
        });
        verified
    }
}

#[async_trait]
impl<T: PeerTransport + 'static> ReplicationProbe for ReplicationEngine<T> {
    async fn verified_replica_count(&self, cid: &Cid) -> usize {
        self.verify_with_peers(cid).await
    }

    async fn claimed_replica_count(&self, cid: &Cid) -> usize {
        self.states
            .get(cid)
            .map(|s| s.confirmed_nodes.len())
            .unwrap_or(0)
    }

    async fn is_safe_to_delete(&self, cid: &Cid) -> bool {
        // Verified copies elsewhere plus the local one must cover R.
        let verified = self.verify_with_peers(cid).await;
        verified + 1 >= self.options.replication_factor as usize
    }
}
