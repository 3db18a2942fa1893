// Path: crates/node/src/vault.rs

//! The vault: every component constructed explicitly, wired in dependency
//! order, with the write pipeline and the read path on top.

use async_trait::async_trait;
use bytecave_api::chain::{AppRegistry, ChainClient};
use bytecave_api::transport::{PeerTransport, ReplicaMeta, ReplicateAck};
use bytecave_auth::AuthorizationOracle;
use bytecave_chain::{CachingAppRegistry, CachingChainClient};
use bytecave_consensus::{AuditLog, ConsensusFetcher, FetchOptions};
use bytecave_crypto::{cid_of, StateTagger};
use bytecave_gateway::{
    FetchedBlob, HealthReport, ShardReport, StoreReceipt, StoreRequest, VaultApi,
};
use bytecave_gc::{GcEngine, GcReport, GcStatus};
use bytecave_peers::events::{EventLog, PeerCache};
use bytecave_peers::PeerRegistry;
use bytecave_replication::engine::{EngineOptions, ReplicationEngine};
use bytecave_replication::{IncomingReplica, ReplicationIntake, StateTable};
use bytecave_storage::{BlobStore, PutExtras, StoreOptions};
use bytecave_types::blob::BlobMetadata;
use bytecave_types::config::NodeConfig;
use bytecave_types::error::{ConsensusError, StorageError, VaultError};
use bytecave_types::peer::PeerRecord;
use bytecave_types::shard::ShardMap;
use bytecave_types::{now_millis, Cid};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Construction options beyond the node configuration.
#[derive(Debug, Clone, Default)]
pub struct VaultOptions {
    /// Overrides the 2 s replication acceptance window, mainly for tests.
    pub acceptance_window: Option<Duration>,
}

/// The composed vault node.
pub struct Vault<T, C, R>
where
    T: PeerTransport + 'static,
    C: ChainClient + 'static,
    R: AppRegistry + 'static,
{
    config: Arc<NodeConfig>,
    shard_map: ShardMap,
    store: Arc<BlobStore>,
    registry: Arc<PeerRegistry>,
    oracle: AuthorizationOracle<CachingAppRegistry<R>, CachingChainClient<C>>,
    transport: Arc<T>,
    engine: Arc<ReplicationEngine<T>>,
    gc: Arc<GcEngine<ReplicationEngine<T>>>,
    fetcher: ConsensusFetcher<T>,
    intake: ReplicationIntake<C>,
    /// Hot-swappable CID blocklist; replaced atomically, read per request.
    blocked_cids: RwLock<Arc<HashSet<String>>>,
    started: Instant,
    requests_total: AtomicU64,
    requests_failed: AtomicU64,
}

impl<T, C, R> Vault<T, C, R>
where
    T: PeerTransport + 'static,
    C: ChainClient + 'static,
    R: AppRegistry + 'static,
{
    /// Builds the vault from its external collaborators. Fails fast on
    /// invalid configuration, an unreadable data directory, or a tampered
    /// key file; these are fatal at startup.
    pub fn open(
        config: NodeConfig,
        chain: Arc<C>,
        app_registry: Arc<R>,
        transport: Arc<T>,
        options: VaultOptions,
    ) -> anyhow::Result<Arc<Self>> {
        config.validate()?;
        let shard_map = config.shard_map()?;
        let data_dir = config.data_dir.clone();
        std::fs::create_dir_all(&data_dir)?;

        let store = Arc::new(BlobStore::open(StoreOptions {
            root: data_dir.clone(),
            capacity: config.max_storage(),
            max_blob_size: config.max_blob_size(),
            compression_enabled: config.compression_enabled,
        })?);

        let tagger = StateTagger::load_or_create(&data_dir.join("state-hmac.key"))?;
        let states = Arc::new(StateTable::open(
            data_dir.join("replication-state.json"),
            tagger,
        )?);

        let registry = Arc::new(
            PeerRegistry::new(config.node_id.clone(), config.shard_count).with_persistence(
                EventLog::open(&data_dir.join("reputation-events.json"))?,
                PeerCache::new(data_dir.join("peer-cache.json")),
            ),
        );

        let chain_timeout = Duration::from_millis(config.chain_timeout_ms);
        let caching_chain = Arc::new(CachingChainClient::new(chain, chain_timeout));
        let caching_registry = Arc::new(CachingAppRegistry::new(app_registry, chain_timeout));
        let oracle = AuthorizationOracle::new(
            caching_registry,
            caching_chain.clone(),
            config.auth.clone(),
        );

        let mut engine_options = EngineOptions::from_config(&config);
        if let Some(window) = options.acceptance_window {
            engine_options.acceptance_window = window;
        }
        let engine = ReplicationEngine::new(
            engine_options,
            transport.clone(),
            registry.clone(),
            states,
        );

        let gc = GcEngine::new(
            store.clone(),
            engine.clone(),
            shard_map.clone(),
            config.gc.clone(),
            config.replication_factor,
        );

        let fetcher = ConsensusFetcher::new(
            transport.clone(),
            registry.clone(),
            Arc::new(AuditLog::new()),
            FetchOptions {
                per_peer_timeout: Duration::from_millis(config.replication_timeout_ms),
                max_retries: 5,
            },
        );

        let intake = ReplicationIntake::new(
            caching_chain,
            store.clone(),
            config.blocked_cids.iter().cloned(),
            config.blocked_peers.iter().cloned(),
            config.enable_blocked_content,
        );

        let blocked_cids = RwLock::new(Arc::new(config.blocked_cids.iter().cloned().collect()));
        tracing::info!(
            target: "vault",
            event = "vault_opened",
            node_id = %config.node_id,
            shard_count = config.shard_count,
            shards = %config.node_shards,
            replication_factor = config.replication_factor,
        );

        Ok(Arc::new(Vault {
            config: Arc::new(config),
            shard_map,
            store,
            registry,
            oracle,
            transport,
            engine,
            gc,
            fetcher,
            intake,
            blocked_cids,
            started: Instant::now(),
            requests_total: AtomicU64::new(0),
            requests_failed: AtomicU64::new(0),
        }))
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn blob_store(&self) -> &Arc<BlobStore> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<PeerRegistry> {
        &self.registry
    }

    pub fn gc_engine(&self) -> &Arc<GcEngine<ReplicationEngine<T>>> {
        &self.gc
    }

    pub fn replication(&self) -> &Arc<ReplicationEngine<T>> {
        &self.engine
    }

    pub fn audit(&self) -> &bytecave_consensus::AuditLog {
        self.fetcher.audit()
    }

    pub fn consensus(&self) -> &ConsensusFetcher<T> {
        &self.fetcher
    }

    /// Installs a fresh authoritative peer list.
    pub fn set_peers(&self, peers: Vec<PeerRecord>) {
        self.registry.set_registered_peers(peers);
    }

    /// Atomically replaces the CID blocklist snapshot.
    pub fn replace_blocked_cids(&self, cids: impl IntoIterator<Item = String>) {
        *self.blocked_cids.write() = Arc::new(cids.into_iter().collect());
    }

    /// Sweeps expired replay nonces; driven by the background runtime.
    pub fn sweep_nonces(&self) -> usize {
        self.oracle.nonces().sweep(now_millis())
    }

    /// Probes every active peer's liveness, feeding latency and failure
    /// observations into the registry so freshness scores stay honest even
    /// on an idle node.
    pub async fn probe_peer_health(&self) {
        for peer in self.registry.active_peers() {
            let now = now_millis();
            match self.transport.health(&peer).await {
                Ok(health) if health.healthy => {
                    self.registry
                        .record_success(&peer.node_id, health.latency_ms, now);
                }
                Ok(_) | Err(_) => {
                    self.registry.record_failure(&peer.node_id, now);
                }
            }
        }
    }

    /// Retries replication for CIDs below their factor.
    pub async fn backfill_replication(&self) {
        for state in self.engine.states().incomplete() {
            match self.store.peek(&state.cid) {
                Ok((bytes, metadata)) => {
                    let meta = ReplicaMeta {
                        content_type: metadata.content_type.clone(),
                        sender: None,
                        guild_id: metadata.guild_id.clone(),
                        from_peer: Some(self.config.node_id.clone()),
                    };
                    let status = self
                        .engine
                        .replicate(state.cid, bytes, metadata.mime_type, meta)
                        .await;
                    self.sync_replicated_to(&state.cid);
                    tracing::debug!(
                        target: "vault",
                        event = "backfill_attempt",
                        cid = %state.cid,
                        confirmed = status.confirmed,
                    );
                }
                Err(StorageError::BlobNotFound(_)) => {
                    // The blob is gone; its state record serves no one.
                    self.engine.states().remove(&state.cid);
                }
                Err(e) => {
                    tracing::warn!(target: "vault", event = "backfill_read_failed", cid = %state.cid, error = %e);
                }
            }
        }
    }

    fn track<V>(&self, result: Result<V, VaultError>) -> Result<V, VaultError> {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = &result {
            if e.http_status() >= 500 {
                self.requests_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
        result
    }

    /// Mirrors the confirmed replica set into the blob's metadata.
    fn sync_replicated_to(&self, cid: &Cid) {
        let Some(state) = self.engine.states().get(cid) else {
            return;
        };
        let result = self.store.update_metadata(cid, |md| {
            md.replication.replicated_to = state.confirmed_nodes.clone();
            if !state.confirmed_nodes.is_empty() {
                md.replication.replicated_at = Some(state.last_updated);
            }
        });
        if let Err(e) = result {
            tracing::debug!(target: "vault", event = "replicated_to_sync_failed", cid = %cid, error = %e);
        }
    }

    async fn write(&self, request: StoreRequest) -> Result<StoreReceipt, VaultError> {
        // 1. Shard ownership.
        let cid = cid_of(&request.ciphertext);
        let shard = cid.shard_key(self.config.shard_count);
        if !self.shard_map.owns_shard(shard) {
            return Err(VaultError::ShardMismatch { shard });
        }

        // 2. Authorization, with the ciphertext bound by content hash.
        let outcome = self
            .oracle
            .authorize(&request.authorization, &request.ciphertext, now_millis())
            .await?;

        // 3. Local blocklist, on the immutable snapshot.
        if self.config.enable_blocked_content {
            let blocked = self.blocked_cids.read().clone();
            if blocked.contains(&cid.to_hex()) {
                return Err(VaultError::ContentBlocked);
            }
        }

        // 4–5. Capacity is enforced by the store's atomic put.
        self.store.put(
            &cid,
            &request.ciphertext,
            &request.mime_type,
            PutExtras {
                content_type: Some(request.authorization.content_type.clone()),
                guild_id: None,
                from_peer: None,
                integrity_hash: None,
            },
        )?;

        // 6. Replication, bounded by the acceptance window.
        let status = if self.config.replication_enabled {
            let meta = ReplicaMeta {
                content_type: Some(request.authorization.content_type.clone()),
                sender: Some(outcome.sender),
                guild_id: None,
                from_peer: Some(self.config.node_id.clone()),
            };
            let status = self
                .engine
                .replicate(cid, request.ciphertext, request.mime_type, meta)
                .await;
            self.sync_replicated_to(&cid);
            status
        } else {
            self.engine.status(&cid)
        };

        // 7. The receipt.
        tracing::info!(
            target: "vault",
            event = "blob_stored",
            cid = %cid,
            confirmed = status.confirmed,
            target_replicas = status.target,
        );
        Ok(StoreReceipt {
            success: true,
            cid,
            timestamp: now_millis(),
            replication_status: status,
        })
    }

    async fn read(&self, cid: &Cid) -> Result<FetchedBlob, VaultError> {
        let (had_local, mime_hint) = match self.store.get(cid) {
            Ok((bytes, metadata)) => {
                return Ok(FetchedBlob {
                    bytes,
                    mime_type: metadata.mime_type,
                    local: true,
                })
            }
            Err(StorageError::Corrupt(_)) => {
                tracing::warn!(target: "vault", event = "local_copy_corrupt", cid = %cid);
                let mime = self.store.get_metadata(cid).ok().map(|md| md.mime_type);
                (true, mime)
            }
            Err(StorageError::BlobNotFound(_)) => (false, None),
            Err(e) => return Err(e.into()),
        };

        let mut rng = StdRng::from_entropy();
        match self.fetcher.fetch_with_anti_censorship(cid, &mut rng).await {
            Ok(bytes) => {
                if had_local {
                    self.repair_local_copy(cid, &bytes, mime_hint.as_deref());
                }
                Ok(FetchedBlob {
                    bytes,
                    mime_type: mime_hint.unwrap_or_else(|| "application/octet-stream".into()),
                    local: false,
                })
            }
            Err(ConsensusError::NoReplicas) | Err(ConsensusError::AllReplicasFailed(_))
                if !had_local =>
            {
                Err(VaultError::BlobNotFound(cid.to_hex()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces a corrupt local blob with a verified copy from the
    /// federation. Best effort; the read already succeeded.
    fn repair_local_copy(&self, cid: &Cid, bytes: &[u8], mime_hint: Option<&str>) {
        let mime = mime_hint.unwrap_or("application/octet-stream").to_string();
        if self.store.delete(cid).is_ok() {
            match self.store.put(cid, bytes, &mime, PutExtras::default()) {
                Ok(_) => {
                    tracing::info!(target: "vault", event = "local_copy_repaired", cid = %cid)
                }
                Err(e) => {
                    tracing::warn!(target: "vault", event = "repair_failed", cid = %cid, error = %e)
                }
            }
        }
    }
}

#[async_trait]
impl<T, C, R> VaultApi for Vault<T, C, R>
where
    T: PeerTransport + 'static,
    C: ChainClient + 'static,
    R: AppRegistry + 'static,
{
    async fn store(&self, request: StoreRequest) -> Result<StoreReceipt, VaultError> {
        let result = self.write(request).await;
        self.track(result)
    }

    async fn fetch(&self, cid: &Cid) -> Result<FetchedBlob, VaultError> {
        let result = self.read(cid).await;
        self.track(result)
    }

    async fn contains(&self, cid: &Cid) -> bool {
        self.store.has_blob(cid)
    }

    async fn list(&self) -> Result<Vec<BlobMetadata>, VaultError> {
        Ok(self.store.list()?)
    }

    async fn health(&self) -> HealthReport {
        let total = self.requests_total.load(Ordering::Relaxed);
        let failed = self.requests_failed.load(Ordering::Relaxed);
        let success_rate = if total == 0 {
            1.0
        } else {
            (total - failed) as f64 / total as f64
        };
        HealthReport {
            node_id: self.config.node_id.clone(),
            uptime_secs: self.started.elapsed().as_secs(),
            stats: self.store.stats(),
            success_rate,
        }
    }

    async fn shard_report(&self) -> ShardReport {
        let mut maps = vec![self.shard_map.clone()];
        for peer in self.registry.active_peers() {
            if let Some(spec) = &peer.shards {
                if let Ok(map) = ShardMap::parse(spec, self.config.shard_count) {
                    maps.push(map);
                }
            }
        }
        ShardReport {
            shard_count: self.config.shard_count,
            ranges: self.shard_map.ranges().to_vec(),
            explicit: self.shard_map.explicit_shards().collect(),
            owned_shards: self.shard_map.owned_shards(),
            avg_nodes_per_shard: bytecave_types::shard::avg_nodes_per_shard(
                &maps,
                self.config.shard_count,
            ),
        }
    }

    async fn gc_status(&self) -> GcStatus {
        self.gc.status()
    }

    async fn run_gc(&self, dry_run: bool) -> Result<GcReport, VaultError> {
        Ok(self.gc.run(dry_run).await?)
    }

    async fn pin(&self, cid: &Cid) -> Result<(), VaultError> {
        Ok(self.store.pin(cid)?)
    }

    async fn unpin(&self, cid: &Cid) -> Result<(), VaultError> {
        Ok(self.store.unpin(cid)?)
    }

    async fn list_pinned(&self) -> Result<Vec<BlobMetadata>, VaultError> {
        Ok(self.store.list_pinned()?)
    }

    async fn replicate_in(&self, replica: IncomingReplica) -> Result<ReplicateAck, VaultError> {
        let result = self.intake.handle(replica).await.map_err(VaultError::from);
        self.track(result)
    }
}
