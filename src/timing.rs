//! Explicit timing context for the refinement, assembly and boundary condition phases.
use log::debug;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimingEntry {
    pub label: String,
    pub duration: Duration,
}

/// Collects named phase durations.
///
/// A `Timings` value is passed by mutable reference into operations that report timing, so
/// no global timer state is involved. Every recorded phase is also emitted at debug level.
#[derive(Debug, Clone, Default)]
pub struct Timings {
    entries: Vec<TimingEntry>,
}

impl Timings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: impl Into<String>, duration: Duration) {
        let label = label.into();
        debug!("{} took {:.3?}", label, duration);
        self.entries.push(TimingEntry { label, duration });
    }

    /// Runs `f` and records its duration under `label`.
    pub fn time<R>(&mut self, label: &str, f: impl FnOnce() -> R) -> R {
        let start = Instant::now();
        let result = f();
        self.record(label, start.elapsed());
        result
    }

    pub fn entries(&self) -> &[TimingEntry] {
        &self.entries
    }

    /// Accumulated duration of all entries with the given label.
    pub fn total(&self, label: &str) -> Duration {
        self.entries
            .iter()
            .filter(|entry| entry.label == label)
            .map(|entry| entry.duration)
            .sum()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.entries.iter().any(|entry| entry.label == label)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
