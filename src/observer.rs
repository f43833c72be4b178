//! Diagnostics hook for level changes and completed iterations.

use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

use tracing::{debug, info};

/// Level and scale of a ciphertext right after `operation`.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelChange {
    pub operation: &'static str,
    pub level: usize,
    pub remaining: usize,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationReport {
    pub iteration: usize,
    /// Deepest level reached before the refresh.
    pub level_reached: usize,
    pub elapsed: Duration,
}

pub trait TrainingObserver: Send + Sync {
    fn on_level_change(&self, _event: &LevelChange) {}
    fn on_iteration_complete(&self, _report: &IterationReport) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl TrainingObserver for NoopObserver {}

/// Forwards events to `tracing`: level changes at debug, iterations at info.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TrainingObserver for TracingObserver {
    fn on_level_change(&self, event: &LevelChange) {
        debug!(
            operation = event.operation,
            level = event.level,
            remaining = event.remaining,
            scale_bits = event.scale.log2(),
            "level change"
        );
    }

    fn on_iteration_complete(&self, report: &IterationReport) {
        info!(
            iteration = report.iteration,
            level_reached = report.level_reached,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "iteration complete"
        );
    }
}

/// Records every event in memory.
#[derive(Debug, Default)]
pub struct EventLog {
    levels: Mutex<Vec<LevelChange>>,
    iterations: Mutex<Vec<IterationReport>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level_changes(&self) -> Vec<LevelChange> {
        self.levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn iterations(&self) -> Vec<IterationReport> {
        self.iterations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Level changes reported for `operation`, in order.
    pub fn levels_for(&self, operation: &str) -> Vec<usize> {
        self.level_changes()
            .into_iter()
            .filter(|e| e.operation == operation)
            .map(|e| e.level)
            .collect()
    }
}

impl TrainingObserver for EventLog {
    fn on_level_change(&self, event: &LevelChange) {
        self.levels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }

    fn on_iteration_complete(&self, report: &IterationReport) {
        self.iterations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_keeps_order() {
        let log = EventLog::new();
        for level in [1, 2, 3] {
            log.on_level_change(&LevelChange {
                operation: "horner",
                level,
                remaining: 5 - level,
                scale: 2f64.powi(40),
            });
        }
        log.on_level_change(&LevelChange {
            operation: "dot",
            level: 4,
            remaining: 1,
            scale: 2f64.powi(40),
        });
        assert_eq!(log.levels_for("horner"), vec![1, 2, 3]);
        assert_eq!(log.levels_for("dot"), vec![4]);
        assert!(log.iterations().is_empty());
    }

    #[test]
    fn default_hooks_do_nothing() {
        let observer = NoopObserver;
        observer.on_iteration_complete(&IterationReport {
            iteration: 0,
            level_reached: 3,
            elapsed: Duration::from_millis(5),
        });
    }
}
