// Path: crates/gc/src/engine.rs

//! The collection engine: a single-flight, cooperatively-cancellable run
//! over the scored candidates, with a safety pipeline in front of every
//! deletion and a periodic driver for background operation.

use crate::policy::{self, Pressure};
use bytecave_api::query::ReplicationProbe;
use bytecave_storage::BlobStore;
use bytecave_telemetry::gc_metrics;
use bytecave_telemetry::time::RunTimer;
use bytecave_types::config::GcConfig;
use bytecave_types::error::{GcError, StorageError};
use bytecave_types::shard::ShardMap;
use bytecave_types::{now_millis, Cid};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// The counters returned by every run, dry or live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcReport {
    pub dry_run: bool,
    pub checked: u64,
    pub deleted: u64,
    pub freed_bytes: u64,
    pub skipped_pinned: u64,
    pub skipped_insufficient_replicas: u64,
    pub skipped_shard_mismatch: u64,
    pub skipped_missing_metadata: u64,
    pub started_at: i64,
    pub finished_at: i64,
    pub cancelled: bool,
}

impl GcReport {
    /// The accounting invariant every run upholds.
    pub fn is_balanced(&self) -> bool {
        self.deleted
            + self.skipped_pinned
            + self.skipped_insufficient_replicas
            + self.skipped_shard_mismatch
            + self.skipped_missing_metadata
            <= self.checked
    }
}

/// What `/gc/status` reports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcStatus {
    pub enabled: bool,
    pub running: bool,
    pub last_report: Option<GcReport>,
}

/// Replication-aware garbage collection over one blob store.
pub struct GcEngine<P> {
    store: Arc<BlobStore>,
    probe: Arc<P>,
    shard_map: ShardMap,
    config: GcConfig,
    replication_factor: u32,
    running: AtomicBool,
    cancelled: AtomicBool,
    last_report: Mutex<Option<GcReport>>,
}

impl<P: ReplicationProbe> GcEngine<P> {
    pub fn new(
        store: Arc<BlobStore>,
        probe: Arc<P>,
        shard_map: ShardMap,
        config: GcConfig,
        replication_factor: u32,
    ) -> Arc<Self> {
        Arc::new(GcEngine {
            store,
            probe,
            shard_map,
            config,
            replication_factor,
            running: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            last_report: Mutex::new(None),
        })
    }

    pub fn status(&self) -> GcStatus {
        GcStatus {
            enabled: self.config.enabled,
            running: self.running.load(Ordering::Acquire),
            last_report: self.last_report.lock().clone(),
        }
    }

    /// Requests cooperative cancellation of an in-flight run.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// One collection pass. Re-entry while a run is in flight fails with
    /// `GC already running`.
    pub async fn run(&self, dry_run: bool) -> Result<GcReport, GcError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(GcError::AlreadyRunning);
        }
        self.cancelled.store(false, Ordering::Release);
        let result = self.collect(dry_run).await;
        if let Ok(report) = &result {
            *self.last_report.lock() = Some(report.clone());
        }
        self.running.store(false, Ordering::Release);
        result
    }

    async fn collect(&self, dry_run: bool) -> Result<GcReport, GcError> {
        let _timer = RunTimer::new(gc_metrics());
        let now = now_millis();
        let mut report = GcReport {
            dry_run,
            started_at: now,
            ..GcReport::default()
        };

        let stats = self.store.stats();
        let free_disk = self.store.free_disk().unwrap_or(u64::MAX);
        let pressure = Pressure {
            used: stats.total_size,
            pinned_size: stats.pinned_size,
            free_disk,
        };

        let candidates = policy::score_candidates(self.store.list()?, now);
        let selected = policy::filter_by_retention(&candidates, &self.config, pressure, now);
        tracing::info!(
            target: "gc",
            event = "run_started",
            dry_run,
            blobs = candidates.len(),
            selected = selected.len(),
            used = stats.total_size,
            free_disk,
        );

        for candidate in &candidates {
            if self.cancelled.load(Ordering::Acquire) {
                report.cancelled = true;
                break;
            }
            let cid_hex = candidate.metadata.cid.to_hex();
            if !selected.contains(&cid_hex) {
                continue;
            }
            report.checked += 1;
            match self.safety_check(&candidate.metadata.cid).await {
                Safety::Deletable => {
                    if dry_run {
                        report.deleted += 1;
                        report.freed_bytes += candidate.metadata.size;
                    } else {
                        match self.store.delete(&candidate.metadata.cid) {
                            Ok(freed) => {
                                report.deleted += 1;
                                report.freed_bytes += freed;
                                gc_metrics().inc_deleted(1);
                                gc_metrics().inc_freed_bytes(freed);
                            }
                            Err(StorageError::BlobNotFound(_)) => {
                                report.skipped_missing_metadata += 1;
                                gc_metrics().inc_skipped("missing_metadata");
                            }
                            Err(e) => return Err(e.into()),
                        }
                    }
                }
                Safety::Skip(reason) => {
                    match reason {
                        SkipReason::MissingMetadata => report.skipped_missing_metadata += 1,
                        SkipReason::Pinned => report.skipped_pinned += 1,
                        SkipReason::ShardMismatch => report.skipped_shard_mismatch += 1,
                        SkipReason::InsufficientReplicas => {
                            report.skipped_insufficient_replicas += 1
                        }
                    }
                    gc_metrics().inc_skipped(reason.as_str());
                    tracing::debug!(
                        target: "gc",
                        event = "candidate_skipped",
                        cid = %cid_hex,
                        reason = reason.as_str(),
                    );
                }
            }
        }

        report.finished_at = now_millis();
        tracing::info!(
            target: "gc",
            event = "run_finished",
            dry_run,
            checked = report.checked,
            deleted = report.deleted,
            freed_bytes = report.freed_bytes,
            skipped_pinned = report.skipped_pinned,
            skipped_insufficient_replicas = report.skipped_insufficient_replicas,
            skipped_shard_mismatch = report.skipped_shard_mismatch,
            cancelled = report.cancelled,
        );
        Ok(report)
    }

    /// The ordered safety pipeline; the first failing step names the skip.
    async fn safety_check(&self, cid: &Cid) -> Safety {
        // 1. Metadata still exists (a concurrent delete may have won).
        let metadata = match self.store.get_metadata(cid) {
            Ok(md) => md,
            Err(_) => return Safety::Skip(SkipReason::MissingMetadata),
        };

        // 2. Pinned blobs are immune.
        if metadata.pinned {
            return Safety::Skip(SkipReason::Pinned);
        }

        // 3. Only shards this node still owns are collectable here.
        if !self.shard_map.owns_cid(cid) {
            return Safety::Skip(SkipReason::ShardMismatch);
        }

        // 4. Enough other nodes must hold the blob. Live probes when
        // configured; the locally-claimed set otherwise. No replication
        // record at all counts as insufficient.
        let required = self.replication_factor.saturating_sub(1) as usize;
        let replicas = if self.config.verify_replicas || self.config.verify_proofs {
            self.probe.verified_replica_count(cid).await
        } else {
            let claimed = self.probe.claimed_replica_count(cid).await;
            claimed.max(metadata.replication.replicated_to.len())
        };
        if replicas < required {
            return Safety::Skip(SkipReason::InsufficientReplicas);
        }
        if self.config.verify_proofs && !self.probe.is_safe_to_delete(cid).await {
            return Safety::Skip(SkipReason::InsufficientReplicas);
        }
        Safety::Deletable
    }

    /// Drives periodic collection until shutdown flips.
    pub async fn run_periodic(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        if !self.config.enabled {
            tracing::info!(target: "gc", event = "disabled");
            return;
        }
        let period = Duration::from_secs(self.config.interval_minutes.max(1) * 60);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The immediate first tick would collect at boot.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.run(false).await {
                        Ok(report) => {
                            tracing::debug!(target: "gc", event = "periodic_done", deleted = report.deleted);
                        }
                        Err(GcError::AlreadyRunning) => {
                            tracing::warn!(target: "gc", event = "periodic_overlap");
                        }
                        Err(e) => {
                            tracing::error!(target: "gc", event = "periodic_failed", error = %e);
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.cancel();
                        tracing::info!(target: "gc", event = "periodic_stopped");
                        return;
                    }
                }
            }
        }
    }
}

enum Safety {
    Deletable,
    Skip(SkipReason),
}

#[derive(Debug, Clone, Copy)]
enum SkipReason {
    MissingMetadata,
    Pinned,
    ShardMismatch,
    InsufficientReplicas,
}

impl SkipReason {
    fn as_str(self) -> &'static str {
        match self {
            SkipReason::MissingMetadata => "missing_metadata",
            SkipReason::Pinned => "pinned",
            SkipReason::ShardMismatch => "shard_mismatch",
            SkipReason::InsufficientReplicas => "insufficient_replicas",
        }
    }
}
