// Path: crates/storage/src/metrics.rs
use bytecave_telemetry::sinks::StoreMetricsSink;

pub fn metrics() -> &'static dyn StoreMetricsSink {
    bytecave_telemetry::store_metrics()
}
