//! Test doubles for driving `h2bridge` stream machines without a transport.
//!
//! [`RecordingTarget`] captures everything the bridge writes,
//! [`RecordingEngineFactory`] hands out engines that log each call they
//! receive, and [`logger`] serialises access to captured log records.
//!
//! ```rust
//! use h2bridge_testing::{RecordingEngineFactory, RecordingTarget};
//!
//! let network = RecordingTarget::new();
//! let engines = RecordingEngineFactory::new();
//! assert!(network.messages().is_empty());
//! assert_eq!(engines.engines_created(), 0);
//! ```

pub mod engine;
pub mod logging;
pub mod metrics;
pub mod target;

pub use engine::{BoundEngine, EngineEvent, EngineOptions, RecordingEngine, RecordingEngineFactory};
pub use logging::{Captured, LoggerHandle, logger};
pub use metrics::{MetricsSnapshot, debugging_recorder_setup};
pub use target::RecordingTarget;
