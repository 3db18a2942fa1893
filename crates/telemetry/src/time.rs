// Path: crates/telemetry/src/time.rs
use crate::sinks::GcMetricsSink;
use std::time::Instant;

/// Observes the duration of a GC run when dropped.
pub struct RunTimer<'a> {
    sink: &'a dyn GcMetricsSink,
    start: Instant,
}

impl<'a> RunTimer<'a> {
    pub fn new(sink: &'a dyn GcMetricsSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
        }
    }
}

impl Drop for RunTimer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_run_duration(self.start.elapsed().as_secs_f64());
    }
}
