//! Progress reporting for long-running research flows.
//!
//! The engine calls the sink synchronously after every stage transition
//! and at least once per completed unit of work inside a stage. Sinks
//! must be cheap and non-blocking; any UI marshalling is the sink's job.

/// Receives `(stage, progress)` updates during a run. Progress is in
/// [0, 1] and monotonically non-decreasing within a run.
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, stage: &str, progress: f64);
}

/// Sink that discards all updates. Useful for tests and batch runs.
pub struct NoOpProgressSink;

impl ProgressSink for NoOpProgressSink {
    fn on_progress(&self, _stage: &str, _progress: f64) {}
}

/// Sink that logs updates at INFO level.
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_progress(&self, stage: &str, progress: f64) {
        tracing::info!(stage, progress = format!("{:.0}%", progress * 100.0), "research progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSink {
        updates: Mutex<Vec<(String, f64)>>,
    }

    impl ProgressSink for RecordingSink {
        fn on_progress(&self, stage: &str, progress: f64) {
            self.updates.lock().unwrap().push((stage.to_string(), progress));
        }
    }

    #[test]
    fn test_sink_receives_updates() {
        let sink = RecordingSink {
            updates: Mutex::new(Vec::new()),
        };
        sink.on_progress("Collecting Data", 0.3);
        sink.on_progress("Collecting Data", 0.4);
        let updates = sink.updates.lock().unwrap();
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].0, "Collecting Data");
    }
}
