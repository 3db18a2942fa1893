// Path: crates/telemetry/src/sinks.rs
//! Defines abstract traits for metrics reporting, decoupling core logic from the backend.

use once_cell::sync::OnceCell;

// --- Static Sink Access ---

/// A no-op sink for use in tests or when telemetry is disabled.
#[derive(Debug, Clone, Copy)]
pub struct NopSink;

/// A lazily-initialized static reference to the global `MetricsSink` implementation.
pub static SINK: OnceCell<&'static dyn MetricsSink> = OnceCell::new();
static NOP_SINK: NopSink = NopSink;

/// Returns a static reference to the configured blob store metrics sink.
/// If no sink has been initialized, it returns a no-op sink.
pub fn store_metrics() -> &'static dyn StoreMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured replication metrics sink.
pub fn replication_metrics() -> &'static dyn ReplicationMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured consensus metrics sink.
pub fn consensus_metrics() -> &'static dyn ConsensusMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

/// Returns a static reference to the configured GC metrics sink.
pub fn gc_metrics() -> &'static dyn GcMetricsSink {
    SINK.get().copied().unwrap_or(&NOP_SINK)
}

// --- Trait Definitions ---

/// A sink for metrics related to the local blob store.
pub trait StoreMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments the total number of blobs ingested.
    fn inc_blobs_stored(&self);
    /// Increments the total number of blobs deleted.
    fn inc_blobs_deleted(&self);
    /// Increments the total ciphertext bytes written.
    fn inc_bytes_written(&self, bytes: u64);
    /// Sets the gauge for the store's current total size.
    fn set_store_size_bytes(&self, bytes: u64);
    /// Sets the gauge for the bytes held by pinned blobs.
    fn set_pinned_size_bytes(&self, bytes: u64);
}
impl StoreMetricsSink for NopSink {
    fn inc_blobs_stored(&self) {}
    fn inc_blobs_deleted(&self) {}
    fn inc_bytes_written(&self, _bytes: u64) {}
    fn set_store_size_bytes(&self, _bytes: u64) {}
    fn set_pinned_size_bytes(&self, _bytes: u64) {}
}

/// A sink for metrics related to the replication engine.
pub trait ReplicationMetricsSink: Send + Sync + std::fmt::Debug {
    /// Increments a counter for fanout pushes, labeled by outcome.
    fn inc_fanout(&self, outcome: &str);
    /// Sets the gauge for CIDs whose replication is incomplete.
    fn set_incomplete_states(&self, count: u64);
    /// Increments the counter for state records discarded on load because
    /// their integrity tag failed.
    fn inc_tampered_states(&self, count: u64);
}
impl ReplicationMetricsSink for NopSink {
    fn inc_fanout(&self, _outcome: &str) {}
    fn set_incomplete_states(&self, _count: u64) {}
    fn inc_tampered_states(&self, _count: u64) {}
}

/// A sink for metrics related to the read-path consensus engine.
pub trait ConsensusMetricsSink: Send + Sync + std::fmt::Debug {
    /// Observes the duration of one consensus fetch.
    fn observe_fetch_duration(&self, duration_secs: f64);
    /// Increments the counter for recorded disputes.
    fn inc_disputes(&self);
    /// Increments the counter for recorded censorship events, by kind.
    fn inc_censorship_events(&self, kind: &str);
}
impl ConsensusMetricsSink for NopSink {
    fn observe_fetch_duration(&self, _duration_secs: f64) {}
    fn inc_disputes(&self) {}
    fn inc_censorship_events(&self, _kind: &str) {}
}

/// A sink for metrics related to garbage collection.
pub trait GcMetricsSink: Send + Sync + std::fmt::Debug {
    /// Observes the duration of one GC run.
    fn observe_run_duration(&self, duration_secs: f64);
    /// Increments the counter for deleted blobs.
    fn inc_deleted(&self, count: u64);
    /// Increments the counter for freed bytes.
    fn inc_freed_bytes(&self, bytes: u64);
    /// Increments a counter for skipped candidates, labeled by reason.
    fn inc_skipped(&self, reason: &str);
}
impl GcMetricsSink for NopSink {
    fn observe_run_duration(&self, _duration_secs: f64) {}
    fn inc_deleted(&self, _count: u64) {}
    fn inc_freed_bytes(&self, _bytes: u64) {}
    fn inc_skipped(&self, _reason: &str) {}
}

/// A unified sink that implements all domain-specific traits, providing a
/// single point of implementation for metrics backends like Prometheus.
pub trait MetricsSink:
    StoreMetricsSink + ReplicationMetricsSink + ConsensusMetricsSink + GcMetricsSink
{
}

// Blanket implementation to allow any type that implements all sub-traits
// to be used as a `MetricsSink`.
impl<T> MetricsSink for T where
    T: StoreMetricsSink + ReplicationMetricsSink + ConsensusMetricsSink + GcMetricsSink
{
}
