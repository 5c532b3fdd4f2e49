//! Metric helpers for `h2bridge`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to no-ops.

/// Name of the gauge tracking bridged connections past their begin.
pub const CONNECTIONS_ACTIVE: &str = "h2bridge_connections_active";
/// Name of the counter tracking resets emitted by the bridge.
pub const RESETS_TOTAL: &str = "h2bridge_resets_total";
/// Name of the counter tracking credit granted to senders, in bytes.
pub const CREDIT_BYTES_TOTAL: &str = "h2bridge_credit_bytes_total";
/// Name of the counter tracking failed slab acquisitions.
pub const SLAB_EXHAUSTED_TOTAL: &str = "h2bridge_slab_exhausted_total";

/// Side of the bridge a credit update was issued to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Credit returned to the network peer.
    Network,
    /// Credit returned to the application.
    Application,
}

impl Direction {
    #[cfg_attr(not(feature = "metrics"), allow(dead_code))]
    fn as_str(self) -> &'static str {
        match self {
            Direction::Network => "network",
            Direction::Application => "application",
        }
    }
}

/// Why the bridge reset a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetReason {
    /// A message arrived that the current state does not accept.
    UnexpectedMessage,
    /// No route matched an inbound begin.
    NoRoute,
    /// The network peer exceeded its inbound window.
    FlowControl,
    /// A reply arrived without an outstanding correlation.
    MissingCorrelation,
    /// The application reset the connection's outbound stream.
    Cascade,
    /// An internal invariant was violated.
    Invariant,
}

impl ResetReason {
    /// Label value used for the reset counter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ResetReason::UnexpectedMessage => "unexpected_message",
            ResetReason::NoRoute => "no_route",
            ResetReason::FlowControl => "flow_control",
            ResetReason::MissingCorrelation => "missing_correlation",
            ResetReason::Cascade => "cascade",
            ResetReason::Invariant => "invariant",
        }
    }
}

#[cfg(feature = "metrics")]
mod recorder {
    use metrics::{counter, gauge};

    use super::{
        CONNECTIONS_ACTIVE,
        CREDIT_BYTES_TOTAL,
        Direction,
        RESETS_TOTAL,
        ResetReason,
        SLAB_EXHAUSTED_TOTAL,
    };

    pub fn inc_connections() { gauge!(CONNECTIONS_ACTIVE).increment(1.0); }

    pub fn dec_connections() { gauge!(CONNECTIONS_ACTIVE).decrement(1.0); }

    pub fn inc_resets(reason: ResetReason) {
        counter!(RESETS_TOTAL, "reason" => reason.as_str()).increment(1);
    }

    pub fn add_credit(direction: Direction, bytes: i32) {
        let Ok(bytes) = u64::try_from(bytes) else {
            return;
        };
        counter!(CREDIT_BYTES_TOTAL, "direction" => direction.as_str()).increment(bytes);
    }

    pub fn inc_slab_exhausted() { counter!(SLAB_EXHAUSTED_TOTAL).increment(1); }
}

#[cfg(not(feature = "metrics"))]
mod recorder {
    use super::{Direction, ResetReason};

    pub fn inc_connections() {}

    pub fn dec_connections() {}

    pub fn inc_resets(_reason: ResetReason) {}

    pub fn add_credit(_direction: Direction, _bytes: i32) {}

    pub fn inc_slab_exhausted() {}
}

/// Increment the active connections gauge.
pub fn inc_connections() { recorder::inc_connections(); }

/// Decrement the active connections gauge.
pub fn dec_connections() { recorder::dec_connections(); }

/// Record a reset emitted for the given reason.
pub fn inc_resets(reason: ResetReason) { recorder::inc_resets(reason); }

/// Record credit granted in the given direction. Negative updates are ignored.
pub fn add_credit(direction: Direction, bytes: i32) { recorder::add_credit(direction, bytes); }

/// Record a failed slab acquisition.
pub fn inc_slab_exhausted() { recorder::inc_slab_exhausted(); }
