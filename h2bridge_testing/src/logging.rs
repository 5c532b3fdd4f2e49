//! Captured `log` records for tests that assert on bridge diagnostics.
//!
//! `logtest` installs one process-wide logger. [`LoggerHandle`] holds the
//! lock around it for the life of a test, so combine it with
//! `#[serial(bridge_logs)]` and start each test with [`LoggerHandle::clear`].

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use log::Level;
use logtest::Logger;
use rstest::fixture;

static CAPTURE: OnceLock<Mutex<Logger>> = OnceLock::new();

/// One record taken out of the capture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Captured {
    /// Level the record was logged at.
    pub level: Level,
    /// Rendered message.
    pub message: String,
}

/// Exclusive view of the captured records.
pub struct LoggerHandle {
    capture: MutexGuard<'static, Logger>,
}

impl LoggerHandle {
    /// Lock the capture, installing the logger the first time.
    ///
    /// A test that panicked while holding the lock leaves its records
    /// behind; [`Self::clear`] discards them.
    #[must_use]
    pub fn new() -> Self {
        let capture = CAPTURE
            .get_or_init(|| Mutex::new(Logger::start()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Self { capture }
    }

    /// Oldest record not yet taken.
    pub fn pop(&mut self) -> Option<Captured> {
        self.capture.pop().map(|record| Captured {
            level: record.level(),
            message: record.args().to_string(),
        })
    }

    /// Take every record, keeping the messages logged at `level`.
    pub fn drain_at(&mut self, level: Level) -> Vec<String> {
        std::iter::from_fn(|| self.pop())
            .filter(|captured| captured.level == level)
            .map(|captured| captured.message)
            .collect()
    }

    /// Discard every record.
    pub fn clear(&mut self) { while self.pop().is_some() {} }
}

impl Default for LoggerHandle {
    fn default() -> Self { Self::new() }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn logger() -> LoggerHandle { LoggerHandle::new() }
