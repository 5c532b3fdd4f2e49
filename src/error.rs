//! Canonical error and result types for the crate.
//!
//! Each module reports its own failures through a small `thiserror` enum;
//! [`BridgeError`] gathers them for callers that construct or drive the
//! bridge as a whole.

use thiserror::Error;

pub use crate::{
    config::ConfigError,
    correlation::CorrelationError,
    route::RouteError,
    slab::SlabError,
    window::FlowControlError,
};

/// Top-level error type exposed by `h2bridge`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// The configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// A pooled buffer could not be acquired or written.
    #[error("slab error: {0}")]
    Slab(#[from] SlabError),
    /// The correlation table rejected an operation.
    #[error("correlation error: {0}")]
    Correlation(#[from] CorrelationError),
    /// The route table rejected an edit.
    #[error("route error: {0}")]
    Route(#[from] RouteError),
    /// A peer exceeded the credit it was granted.
    #[error("flow control error: {0}")]
    FlowControl(#[from] FlowControlError),
}

/// Canonical result alias used by `h2bridge` public APIs.
pub type Result<T> = std::result::Result<T, BridgeError>;
