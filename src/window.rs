//! Flow-control windows for both directions of a bridged connection.
//!
//! [`InboundWindow`] bounds what the network peer may send before the bridge
//! returns credit. [`OutboundWindow`] bounds what the connection may forward
//! to the application; it is owned by the protocol engine and only grows
//! when the application grants credit.

use thiserror::Error;

/// Fraction of the first credit update used as the low-water mark.
const LOW_WATER_NUMERATOR: i32 = 1;
const LOW_WATER_DENOMINATOR: i32 = 2;

/// Errors raised when a sender exceeds its credit.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FlowControlError {
    /// More bytes arrived or were requested than the window allows.
    #[error("window exceeded: {attempted} bytes against {available} available")]
    WindowExceeded {
        /// Bytes the sender attempted to transmit.
        attempted: i32,
        /// Credit available before the attempt.
        available: i32,
    },
}

/// Low-water mark derived from a credit update.
///
/// Computed once, from the first update a connection observes.
#[must_use]
pub const fn low_water_mark(first_update: i32) -> i32 {
    first_update / LOW_WATER_DENOMINATOR * LOW_WATER_NUMERATOR
}

/// Credit granted to the network peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InboundWindow {
    available: i32,
}

impl InboundWindow {
    /// Create a window holding `initial` bytes of credit.
    #[must_use]
    pub const fn new(initial: i32) -> Self { Self { available: initial } }

    /// Credit currently available to the peer.
    #[must_use]
    pub const fn available(&self) -> i32 { self.available }

    /// Account for `len` received bytes.
    ///
    /// The window is left untouched when the bytes do not fit.
    ///
    /// # Errors
    ///
    /// Returns [`FlowControlError::WindowExceeded`] when `len` exceeds the
    /// available credit.
    pub fn consume(&mut self, len: i32) -> Result<(), FlowControlError> {
        let remaining = self.available.checked_sub(len).filter(|remaining| *remaining >= 0);
        let Some(remaining) = remaining else {
            return Err(FlowControlError::WindowExceeded {
                attempted: len,
                available: self.available,
            });
        };
        self.available = remaining;
        Ok(())
    }

    /// Return `len` bytes of credit to the peer.
    pub fn replenish(&mut self, len: i32) { self.available = self.available.saturating_add(len); }
}

/// Credit granted by the application, shared with the protocol engine.
///
/// The bridge only ever calls [`credit`](Self::credit); the engine calls
/// [`consume`](Self::consume) for every byte it forwards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OutboundWindow {
    available: i32,
    threshold: i32,
}

impl OutboundWindow {
    /// Create an empty window.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            available: 0,
            threshold: 0,
        }
    }

    /// Credit currently available for forwarding.
    #[must_use]
    pub const fn available(&self) -> i32 { self.available }

    /// Low-water mark below which suspended output stays suspended.
    #[must_use]
    pub const fn threshold(&self) -> i32 { self.threshold }

    /// Accumulate `update` bytes of credit and record the connection's
    /// low-water mark.
    pub fn credit(&mut self, update: i32, threshold: i32) {
        self.available = self.available.saturating_add(update);
        self.threshold = threshold;
    }

    /// Spend `len` bytes of credit.
    ///
    /// # Errors
    ///
    /// Returns [`FlowControlError::WindowExceeded`] and leaves the window
    /// unchanged when `len` exceeds the available credit.
    pub fn consume(&mut self, len: i32) -> Result<(), FlowControlError> {
        if len > self.available {
            return Err(FlowControlError::WindowExceeded {
                attempted: len,
                available: self.available,
            });
        }
        self.available -= len;
        Ok(())
    }

    /// Whether enough credit has accumulated to resume suspended output.
    #[must_use]
    pub const fn can_resume(&self) -> bool {
        self.available > 0 && self.available >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(65_535, 32_767)]
    #[case(1, 0)]
    #[case(0, 0)]
    #[case(-5, -2)]
    fn low_water_mark_is_half_truncated(#[case] update: i32, #[case] expected: i32) {
        assert_eq!(low_water_mark(update), expected);
    }

    #[test]
    fn inbound_rejects_overrun_without_mutating() {
        let mut window = InboundWindow::new(100);
        window.consume(60).expect("fits");
        let err = window.consume(41).expect_err("overrun");
        assert_eq!(
            err,
            FlowControlError::WindowExceeded {
                attempted: 41,
                available: 40,
            }
        );
        assert_eq!(window.available(), 40);
    }

    #[test]
    fn inbound_accepts_exact_fill() {
        let mut window = InboundWindow::new(100);
        window.consume(100).expect("exact fill");
        assert_eq!(window.available(), 0);
        window.replenish(100);
        assert_eq!(window.available(), 100);
    }

    #[test]
    fn outbound_grows_only_through_credit() {
        let mut window = OutboundWindow::new();
        assert!(!window.can_resume());
        window.credit(1000, 500);
        assert!(window.can_resume());
        window.consume(600).expect("within credit");
        assert_eq!(window.available(), 400);
        assert!(!window.can_resume());
        assert!(window.consume(401).is_err());
        assert_eq!(window.available(), 400);
        window.credit(100, 500);
        assert!(window.can_resume());
        assert_eq!(window.threshold(), 500);
    }

    proptest! {
        #[test]
        fn inbound_pass_through_keeps_window_stable(
            initial in 1_i32..=1_000_000,
            lengths in proptest::collection::vec(0_i32..=4096, 0..64),
        ) {
            let mut window = InboundWindow::new(initial);
            for len in lengths {
                if window.consume(len).is_ok() {
                    window.replenish(len);
                }
                prop_assert_eq!(window.available(), initial);
            }
        }
    }
}
