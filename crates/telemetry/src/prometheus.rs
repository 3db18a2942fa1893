// Path: crates/telemetry/src/prometheus.rs
//! A concrete implementation of the metrics sinks using the Prometheus crate.

use crate::sinks::*;
use once_cell::sync::OnceCell;
use prometheus::{
    exponential_buckets, register_gauge, register_histogram, register_int_counter,
    register_int_counter_vec, Gauge, Histogram, IntCounter, IntCounterVec,
};

// --- Metric Statics ---
// OnceCell holds the collectors; they are initialized exactly once by `install`.

static STORE_BLOBS_STORED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STORE_BLOBS_DELETED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STORE_BYTES_WRITTEN_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static STORE_SIZE_BYTES: OnceCell<Gauge> = OnceCell::new();
static STORE_PINNED_BYTES: OnceCell<Gauge> = OnceCell::new();
static REPLICATION_FANOUT_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static REPLICATION_INCOMPLETE_STATES: OnceCell<Gauge> = OnceCell::new();
static REPLICATION_TAMPERED_STATES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CONSENSUS_FETCH_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static CONSENSUS_DISPUTES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static CONSENSUS_CENSORSHIP_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();
static GC_RUN_DURATION_SECONDS: OnceCell<Histogram> = OnceCell::new();
static GC_DELETED_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static GC_FREED_BYTES_TOTAL: OnceCell<IntCounter> = OnceCell::new();
static GC_SKIPPED_TOTAL: OnceCell<IntCounterVec> = OnceCell::new();

#[derive(Debug, Clone, Copy)]
pub struct PrometheusSink;

/// Helper macro for getting a metric from OnceCell. Falls through to a no-op
/// when `install()` has not run, so library tests never panic.
macro_rules! with_metric {
    ($metric:ident, $op:expr) => {
        if let Some(m) = $metric.get() {
            let op = $op;
            op(m);
        }
    };
}

impl StoreMetricsSink for PrometheusSink {
    fn inc_blobs_stored(&self) {
        with_metric!(STORE_BLOBS_STORED_TOTAL, |m: &IntCounter| m.inc());
    }
    fn inc_blobs_deleted(&self) {
        with_metric!(STORE_BLOBS_DELETED_TOTAL, |m: &IntCounter| m.inc());
    }
    fn inc_bytes_written(&self, bytes: u64) {
        with_metric!(STORE_BYTES_WRITTEN_TOTAL, |m: &IntCounter| m.inc_by(bytes));
    }
    fn set_store_size_bytes(&self, bytes: u64) {
        with_metric!(STORE_SIZE_BYTES, |m: &Gauge| m.set(bytes as f64));
    }
    fn set_pinned_size_bytes(&self, bytes: u64) {
        with_metric!(STORE_PINNED_BYTES, |m: &Gauge| m.set(bytes as f64));
    }
}

impl ReplicationMetricsSink for PrometheusSink {
    fn inc_fanout(&self, outcome: &str) {
        with_metric!(REPLICATION_FANOUT_TOTAL, |m: &IntCounterVec| m
            .with_label_values(&[outcome])
            .inc());
    }
    fn set_incomplete_states(&self, count: u64) {
        with_metric!(REPLICATION_INCOMPLETE_STATES, |m: &Gauge| m
            .set(count as f64));
    }
    fn inc_tampered_states(&self, count: u64) {
        with_metric!(REPLICATION_TAMPERED_STATES_TOTAL, |m: &IntCounter| m
            .inc_by(count));
    }
}

impl ConsensusMetricsSink for PrometheusSink {
    fn observe_fetch_duration(&self, duration_secs: f64) {
        with_metric!(CONSENSUS_FETCH_DURATION_SECONDS, |m: &Histogram| m
            .observe(duration_secs));
    }
    fn inc_disputes(&self) {
        with_metric!(CONSENSUS_DISPUTES_TOTAL, |m: &IntCounter| m.inc());
    }
    fn inc_censorship_events(&self, kind: &str) {
        with_metric!(CONSENSUS_CENSORSHIP_TOTAL, |m: &IntCounterVec| m
            .with_label_values(&[kind])
            .inc());
    }
}

impl GcMetricsSink for PrometheusSink {
    fn observe_run_duration(&self, duration_secs: f64) {
        with_metric!(GC_RUN_DURATION_SECONDS, |m: &Histogram| m
            .observe(duration_secs));
    }
    fn inc_deleted(&self, count: u64) {
        with_metric!(GC_DELETED_TOTAL, |m: &IntCounter| m.inc_by(count));
    }
    fn inc_freed_bytes(&self, bytes: u64) {
        with_metric!(GC_FREED_BYTES_TOTAL, |m: &IntCounter| m.inc_by(bytes));
    }
    fn inc_skipped(&self, reason: &str) {
        with_metric!(GC_SKIPPED_TOTAL, |m: &IntCounterVec| m
            .with_label_values(&[reason])
            .inc());
    }
}

static SINK_INSTANCE: PrometheusSink = PrometheusSink;

/// Registers every collector and installs the sink globally. Idempotent for
/// the sink itself; registration errors (double install) are returned.
pub fn install() -> Result<(), prometheus::Error> {
    let _ = STORE_BLOBS_STORED_TOTAL.set(register_int_counter!(
        "bytecave_store_blobs_stored_total",
        "Blobs ingested into the local store"
    )?);
    let _ = STORE_BLOBS_DELETED_TOTAL.set(register_int_counter!(
        "bytecave_store_blobs_deleted_total",
        "Blobs deleted from the local store"
    )?);
    let _ = STORE_BYTES_WRITTEN_TOTAL.set(register_int_counter!(
        "bytecave_store_bytes_written_total",
        "Ciphertext bytes written"
    )?);
    let _ = STORE_SIZE_BYTES.set(register_gauge!(
        "bytecave_store_size_bytes",
        "Current total store size"
    )?);
    let _ = STORE_PINNED_BYTES.set(register_gauge!(
        "bytecave_store_pinned_bytes",
        "Bytes held by pinned blobs"
    )?);
    let _ = REPLICATION_FANOUT_TOTAL.set(register_int_counter_vec!(
        "bytecave_replication_fanout_total",
        "Replication pushes by outcome",
        &["outcome"]
    )?);
    let _ = REPLICATION_INCOMPLETE_STATES.set(register_gauge!(
        "bytecave_replication_incomplete_states",
        "CIDs below their replication factor"
    )?);
    let _ = REPLICATION_TAMPERED_STATES_TOTAL.set(register_int_counter!(
        "bytecave_replication_tampered_states_total",
        "State records discarded for bad integrity tags"
    )?);
    let _ = CONSENSUS_FETCH_DURATION_SECONDS.set(register_histogram!(
        "bytecave_consensus_fetch_duration_seconds",
        "Duration of consensus fetches",
        exponential_buckets(0.01, 2.0, 12)?
    )?);
    let _ = CONSENSUS_DISPUTES_TOTAL.set(register_int_counter!(
        "bytecave_consensus_disputes_total",
        "Recorded replica disputes"
    )?);
    let _ = CONSENSUS_CENSORSHIP_TOTAL.set(register_int_counter_vec!(
        "bytecave_consensus_censorship_total",
        "Recorded censorship events by kind",
        &["kind"]
    )?);
    let _ = GC_RUN_DURATION_SECONDS.set(register_histogram!(
        "bytecave_gc_run_duration_seconds",
        "Duration of GC runs",
        exponential_buckets(0.01, 2.0, 12)?
    )?);
    let _ = GC_DELETED_TOTAL.set(register_int_counter!(
        "bytecave_gc_deleted_total",
        "Blobs deleted by GC"
    )?);
    let _ = GC_FREED_BYTES_TOTAL.set(register_int_counter!(
        "bytecave_gc_freed_bytes_total",
        "Bytes reclaimed by GC"
    )?);
    let _ = GC_SKIPPED_TOTAL.set(register_int_counter_vec!(
        "bytecave_gc_skipped_total",
        "GC candidates skipped by reason",
        &["reason"]
    )?);

    let _ = crate::sinks::SINK.set(&SINK_INSTANCE);
    Ok(())
}
