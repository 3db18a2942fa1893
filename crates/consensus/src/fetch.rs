// Path: crates/consensus/src/fetch.rs

//! Consensus fetches across replicas.
//!
//! `fetch_with_consensus` dials a fixed replica set in parallel and takes a
//! majority-hash vote, recording disputes and censorship as evidence.
//! `fetch_with_anti_censorship` keeps re-sampling a reputation-weighted pool
//! until a copy that hashes to the CID surfaces or the retry budget runs out.

use crate::audit::AuditLog;
use bytecave_api::transport::{PeerTransport, TransportError};
use bytecave_peers::PeerRegistry;
use bytecave_telemetry::consensus_metrics;
use bytecave_types::audit::CensorshipKind;
use bytecave_types::error::ConsensusError;
use bytecave_types::peer::{MisbehaviorKind, PeerRecord};
use bytecave_types::{now_millis, Cid};
use futures::stream::{FuturesUnordered, StreamExt};
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Tuning for the read path.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Deadline for one replica dial.
    pub per_peer_timeout: Duration,
    /// Retry rounds for the anti-censorship path.
    pub max_retries: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        FetchOptions {
            per_peer_timeout: Duration::from_millis(5000),
            max_retries: 5,
        }
    }
}

/// The outcome of a majority-vote fetch.
#[derive(Debug, Clone)]
pub struct ConsensusResult {
    pub bytes: Vec<u8>,
    pub accepted_hash: String,
    pub matching_replicas: usize,
    pub disputed_nodes: Vec<String>,
    pub censoring_nodes: Vec<String>,
    pub consensus: bool,
}

enum Response {
    Bytes(Vec<u8>, u64),
    Absent,
    TimedOut,
    Errored(TransportError),
}

/// Dials replicas and votes on what they serve.
pub struct ConsensusFetcher<T> {
    transport: Arc<T>,
    registry: Arc<PeerRegistry>,
    audit: Arc<AuditLog>,
    options: FetchOptions,
}

impl<T: PeerTransport> ConsensusFetcher<T> {
    pub fn new(
        transport: Arc<T>,
        registry: Arc<PeerRegistry>,
        audit: Arc<AuditLog>,
        options: FetchOptions,
    ) -> Self {
        ConsensusFetcher {
            transport,
            registry,
            audit,
            options,
        }
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    async fn dial(&self, peer: &PeerRecord, cid: &Cid) -> Response {
        let started = Instant::now();
        match tokio::time::timeout(
            self.options.per_peer_timeout,
            self.transport.fetch_blob(peer, cid),
        )
        .await
        {
            Ok(Ok(Some(bytes))) => Response::Bytes(bytes, started.elapsed().as_millis() as u64),
            Ok(Ok(None)) => Response::Absent,
            Ok(Err(TransportError::Timeout)) => Response::TimedOut,
            Ok(Err(e)) => Response::Errored(e),
            Err(_) => Response::TimedOut,
        }
    }

    fn punish(&self, cid: &Cid, node_id: &str, kind: CensorshipKind) {
        let now = now_millis();
        match kind {
            CensorshipKind::Timeout => {
                self.registry
                    .record_misbehavior(node_id, MisbehaviorKind::Timeout, now);
            }
            CensorshipKind::Refusal | CensorshipKind::InvalidResponse => {
                self.registry.record_failure(node_id, now);
            }
        }
        self.audit.record_censorship(*cid, node_id, kind);
    }

    /// Dials every replica concurrently, hashes each response locally, and
    /// accepts the majority hash. Replicas serving a minority hash land in
    /// `disputed_nodes`; null or failed responses land in `censoring_nodes`.
    pub async fn fetch_with_consensus(
        &self,
        cid: &Cid,
        replicas: &[PeerRecord],
    ) -> Result<ConsensusResult, ConsensusError> {
        if replicas.is_empty() {
            return Err(ConsensusError::NoReplicas);
        }
        let started = Instant::now();
        let mut dials = FuturesUnordered::new();
        for peer in replicas {
            dials.push(async move { (peer.clone(), self.dial(peer, cid).await) });
        }

        // hash -> (nodes that served it, one sample ciphertext)
        let mut tally: BTreeMap<String, (Vec<String>, Vec<u8>)> = BTreeMap::new();
        let mut censoring: Vec<String> = Vec::new();
        let now = now_millis();

        while let Some((peer, response)) = dials.next().await {
            match response {
                Response::Bytes(bytes, latency_ms) => {
                    let hash = hex::encode(Sha256::digest(&bytes));
                    if hash == cid.to_hex() {
                        self.registry.record_success(&peer.node_id, latency_ms, now);
                    } else {
                        // Serving bytes that do not hash to the CID is a
                        // provable offense, not a mere disagreement.
                        self.registry.record_misbehavior(
                            &peer.node_id,
                            MisbehaviorKind::CidMismatch,
                            now,
                        );
                    }
                    let entry = tally.entry(hash).or_insert_with(|| (Vec::new(), bytes));
                    entry.0.push(peer.node_id.clone());
                }
                Response::Absent => {
                    self.punish(cid, &peer.node_id, CensorshipKind::Refusal);
                    censoring.push(peer.node_id.clone());
                }
                Response::TimedOut => {
                    self.punish(cid, &peer.node_id, CensorshipKind::Timeout);
                    censoring.push(peer.node_id.clone());
                }
                Response::Errored(e) => {
                    tracing::debug!(target: "consensus", event = "replica_error", peer = %peer.node_id, error = %e);
                    self.punish(cid, &peer.node_id, CensorshipKind::InvalidResponse);
                    censoring.push(peer.node_id.clone());
                }
            }
        }
        consensus_metrics().observe_fetch_duration(started.elapsed().as_secs_f64());

        if tally.is_empty() {
            return Err(ConsensusError::AllReplicasFailed(replicas.len()));
        }

        if tally.len() >= 2 {
            let conflicting: BTreeMap<String, Vec<String>> = tally
                .iter()
                .map(|(hash, (nodes, _))| (hash.clone(), nodes.clone()))
                .collect();
            self.audit.record_dispute(*cid, conflicting);
        }

        let responses: usize = tally.values().map(|(nodes, _)| nodes.len()).sum();
        let distinct = tally.len();
        // Highest count wins; ties break on the hash for determinism.
        let (accepted_hash, (winning_nodes, bytes)) = tally
            .iter()
            .max_by(|a, b| a.1 .0.len().cmp(&b.1 .0.len()).then(b.0.cmp(a.0)))
            .map(|(h, v)| (h.clone(), v.clone()))
            .ok_or(ConsensusError::AllReplicasFailed(replicas.len()))?;

        let matching = winning_nodes.len();
        let quorum = matching >= 2 || matching > replicas.len().div_ceil(2);
        if !quorum {
            return Err(ConsensusError::NoQuorum {
                responses,
                distinct,
            });
        }

        let disputed_nodes: Vec<String> = tally
            .iter()
            .filter(|(hash, _)| **hash != accepted_hash)
            .flat_map(|(_, (nodes, _))| nodes.clone())
            .collect();

        Ok(ConsensusResult {
            bytes,
            accepted_hash,
            matching_replicas: matching,
            disputed_nodes,
            censoring_nodes: censoring,
            consensus: true,
        })
    }

    /// Retries across a reputation-weighted pool until one replica serves
    /// bytes that hash to the CID. Censoring and lying replicas are dropped
    /// from the pool between rounds.
    pub async fn fetch_with_anti_censorship<R: Rng>(
        &self,
        cid: &Cid,
        rng: &mut R,
    ) -> Result<Vec<u8>, ConsensusError> {
        let now = now_millis();
        let mut pool: Vec<(PeerRecord, f64)> = self
            .registry
            .select_peers(Some(cid), usize::MAX, now)
            .into_iter()
            .map(|ranked| (ranked.record, ranked.score))
            .collect();
        if pool.is_empty() {
            return Err(ConsensusError::NoReplicas);
        }

        let mut tried = 0usize;
        while tried < self.options.max_retries && !pool.is_empty() {
            let index = sample_weighted(&pool, rng);
            let (peer, _) = pool.swap_remove(index);
            tried += 1;

            match self.dial(&peer, cid).await {
                Response::Bytes(bytes, latency_ms) => {
                    let hash = hex::encode(Sha256::digest(&bytes));
                    if hash == cid.to_hex() {
                        self.registry
                            .record_success(&peer.node_id, latency_ms, now_millis());
                        return Ok(bytes);
                    }
                    self.registry.record_misbehavior(
                        &peer.node_id,
                        MisbehaviorKind::CidMismatch,
                        now_millis(),
                    );
                    self.punish(cid, &peer.node_id, CensorshipKind::InvalidResponse);
                }
                Response::Absent => self.punish(cid, &peer.node_id, CensorshipKind::Refusal),
                Response::TimedOut => self.punish(cid, &peer.node_id, CensorshipKind::Timeout),
                Response::Errored(_) => {
                    self.punish(cid, &peer.node_id, CensorshipKind::InvalidResponse)
                }
            }
        }
        Err(ConsensusError::AllReplicasFailed(tried))
    }
}

fn sample_weighted<R: Rng>(pool: &[(PeerRecord, f64)], rng: &mut R) -> usize {
    let weights: Vec<f64> = pool.iter().map(|(_, score)| score.max(0.01)).collect();
    match WeightedIndex::new(&weights) {
        Ok(dist) => dist.sample(rng),
        Err(_) => rng.gen_range(0..pool.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytecave_crypto::cid_of;
    use bytecave_peers::registry::test_peer;
    use bytecave_replication::transport::{InMemoryFederation, PeerBehavior};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn harness(
        peer_ids: &[&str],
    ) -> (
        ConsensusFetcher<InMemoryFederation>,
        Arc<InMemoryFederation>,
        Arc<PeerRegistry>,
    ) {
        let registry = Arc::new(PeerRegistry::new("self", 1024));
        registry.set_registered_peers(peer_ids.iter().map(|p| test_peer(p)).collect());
        let transport = Arc::new(InMemoryFederation::new());
        let fetcher = ConsensusFetcher::new(
            transport.clone(),
            registry.clone(),
            Arc::new(AuditLog::new()),
            FetchOptions {
                per_peer_timeout: Duration::from_millis(100),
                max_retries: 5,
            },
        );
        (fetcher, transport, registry)
    }

    fn peers(ids: &[&str]) -> Vec<PeerRecord> {
        ids.iter().map(|id| test_peer(id)).collect()
    }

    #[tokio::test]
    async fn majority_wins_over_a_liar() {
        let (fetcher, transport, registry) = harness(&["p1", "p2", "p3"]);
        let honest = b"the true ciphertext".to_vec();
        let cid = cid_of(&honest);
        transport.seed("p1", cid, honest.clone());
        transport.seed("p2", cid, honest.clone());
        transport.set_behavior("p3", PeerBehavior::Lying(b"forged bytes".to_vec()));
        transport.seed("p3", cid, honest.clone());

        let result = fetcher
            .fetch_with_consensus(&cid, &peers(&["p1", "p2", "p3"]))
            .await
            .unwrap();
        assert!(result.consensus);
        assert_eq!(result.matching_replicas, 2);
        assert_eq!(result.bytes, honest);
        assert_eq!(result.accepted_hash, cid.to_hex());
        assert_eq!(result.disputed_nodes, vec!["p3".to_string()]);
        assert!(result.censoring_nodes.is_empty());

        // The dispute is on record, pending resolution.
        let disputes = fetcher.audit().disputes();
        assert_eq!(disputes.len(), 1);
        assert_eq!(disputes.first().unwrap().conflicting_hashes.len(), 2);

        // Serving wrong bytes for a CID is a permanent offense.
        assert!(registry.is_banned("p3", now_millis()));
    }

    #[tokio::test]
    async fn two_matching_replicas_reach_consensus() {
        let (fetcher, transport, _) = harness(&["p1", "p2"]);
        let bytes = b"pair".to_vec();
        let cid = cid_of(&bytes);
        transport.seed("p1", cid, bytes.clone());
        transport.seed("p2", cid, bytes.clone());
        let result = fetcher
            .fetch_with_consensus(&cid, &peers(&["p1", "p2"]))
            .await
            .unwrap();
        assert_eq!(result.matching_replicas, 2);
    }

    #[tokio::test]
    async fn single_response_is_no_quorum() {
        let (fetcher, transport, _) = harness(&["p1", "p2", "p3"]);
        let bytes = b"lonely copy".to_vec();
        let cid = cid_of(&bytes);
        transport.seed("p1", cid, bytes);
        // p2 and p3 simply do not hold the blob.
        let err = fetcher
            .fetch_with_consensus(&cid, &peers(&["p1", "p2", "p3"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::NoQuorum { responses: 1, .. }));
    }

    #[tokio::test]
    async fn all_failures_is_consensus_failed_with_events() {
        let (fetcher, transport, _) = harness(&["p1", "p2", "p3"]);
        let bytes = b"nobody serves this".to_vec();
        let cid = cid_of(&bytes);
        for p in ["p1", "p2", "p3"] {
            transport.set_behavior(p, PeerBehavior::Refusing);
        }
        let err = fetcher
            .fetch_with_consensus(&cid, &peers(&["p1", "p2", "p3"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ConsensusError::AllReplicasFailed(3)));
        assert_eq!(fetcher.audit().censorship_events().len(), 3);
    }

    #[tokio::test]
    async fn anti_censorship_finds_the_honest_copy() {
        let (fetcher, transport, _) = harness(&["bad1", "bad2", "bad3", "good1", "good2"]);
        let bytes = b"worth retrying for".to_vec();
        let cid = cid_of(&bytes);
        for p in ["bad1", "bad2", "bad3"] {
            transport.set_behavior(p, PeerBehavior::Refusing);
        }
        transport.seed("good1", cid, bytes.clone());
        transport.seed("good2", cid, bytes.clone());

        let mut rng = StdRng::seed_from_u64(7);
        let fetched = fetcher
            .fetch_with_anti_censorship(&cid, &mut rng)
            .await
            .unwrap();
        assert_eq!(fetched, bytes);

        // Every failed try left an audit event naming a refusing peer.
        let events = fetcher.audit().censorship_events();
        assert!(events.len() <= 3);
        for event in &events {
            assert!(event.node_id.starts_with("bad"));
            assert_eq!(event.kind, CensorshipKind::Refusal);
        }
    }

    #[tokio::test]
    async fn anti_censorship_exhausts_a_hostile_pool() {
        let (fetcher, transport, _) = harness(&["bad1", "bad2", "bad3"]);
        let bytes = b"fully censored".to_vec();
        let cid = cid_of(&bytes);
        for p in ["bad1", "bad2", "bad3"] {
            transport.set_behavior(p, PeerBehavior::Refusing);
        }
        let mut rng = StdRng::seed_from_u64(7);
        let err = fetcher
            .fetch_with_anti_censorship(&cid, &mut rng)
            .await
            .unwrap_err();
        // Each peer was tried once, removed, and logged.
        assert!(matches!(err, ConsensusError::AllReplicasFailed(3)));
        assert_eq!(fetcher.audit().censorship_events().len(), 3);
    }

    #[tokio::test]
    async fn lying_replica_is_dropped_between_rounds() {
        let (fetcher, transport, registry) = harness(&["liar", "honest"]);
        let bytes = b"eventually served".to_vec();
        let cid = cid_of(&bytes);
        transport.set_behavior("liar", PeerBehavior::Lying(b"garbage".to_vec()));
        transport.seed("honest", cid, bytes.clone());

        let mut rng = StdRng::seed_from_u64(7);
        let fetched = fetcher
            .fetch_with_anti_censorship(&cid, &mut rng)
            .await
            .unwrap();
        assert_eq!(fetched, bytes);
        // If the liar was sampled it is now permanently banned.
        let events = fetcher.audit().censorship_events();
        if !events.is_empty() {
            assert!(registry.is_banned("liar", now_millis()));
        }
    }
}
