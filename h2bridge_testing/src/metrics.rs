//! Helpers for reading metrics captured by a debugging recorder.
//!
//! Taking a snapshot drains the recorder's counters, so a scenario should
//! read everything it asserts on from a single [`MetricsSnapshot`].

use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder, Snapshotter},
};

/// Creates a debugging recorder and the snapshotter reading it.
#[must_use]
pub fn debugging_recorder_setup() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Values recorded up to one point in time.
#[derive(Debug)]
pub struct MetricsSnapshot {
    entries: Vec<(CompositeKey, DebugValue)>,
}

impl MetricsSnapshot {
    /// Capture everything `snapshotter` has recorded so far.
    #[must_use]
    pub fn take(snapshotter: &Snapshotter) -> Self {
        let entries = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(key, _, _, value)| (key, value))
            .collect();
        Self { entries }
    }

    /// Sum of the counters named `name`, optionally filtered by one label.
    #[must_use]
    pub fn counter(&self, name: &str, label: Option<(&str, &str)>) -> u64 {
        self.entries
            .iter()
            .filter(|(key, _)| key.key().name() == name && labels_match(key.key(), label))
            .map(|(_, value)| match value {
                DebugValue::Counter(c) => *c,
                _ => 0,
            })
            .sum()
    }

    /// Value of the gauge named `name`, if it was recorded.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.entries.iter().find_map(|(key, value)| match value {
            DebugValue::Gauge(g) if key.key().name() == name => Some(g.into_inner()),
            _ => None,
        })
    }
}

fn labels_match(key: &metrics::Key, label: Option<(&str, &str)>) -> bool {
    match label {
        Some((name, value)) => key.labels().any(|l| l.key() == name && l.value() == value),
        None => true,
    }
}
