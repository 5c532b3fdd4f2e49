//! Bridge configuration.
//!
//! [`BridgeConfig`] carries the initial credit granted to each side of a
//! bridged connection and the sizing basis for the staging slabs. Values are
//! usually deserialised by the embedding process and checked with
//! [`BridgeConfig::validate`]; [`BridgeConfig::builder`] offers the same
//! checks for programmatic construction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Initial HTTP/2 flow-control window defined by RFC 9113.
pub const DEFAULT_INITIAL_WINDOW_SIZE: usize = 65_535;
/// Default credit granted to the network peer on begin.
pub const DEFAULT_NETWORK_WINDOW: i32 = 65_535;
/// Default credit granted to the application on each reply.
pub const DEFAULT_APPLICATION_WINDOW: i32 = 65_535;
/// Default number of slots per slab, before rounding to a power of two.
pub const DEFAULT_SLOT_COUNT: usize = 128;
/// Default name written as the source of streams the bridge opens.
pub const DEFAULT_NAME: &str = "http2";

/// Errors returned when validating a [`BridgeConfig`].
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A window was zero or negative.
    #[error("{name} must be positive, got {value}")]
    NonPositiveWindow {
        /// Which window was rejected.
        name: &'static str,
        /// The rejected value.
        value: i32,
    },
    /// The slab would hold no slots.
    #[error("slot count must be at least 1")]
    NoSlots,
    /// The slot sizing basis was zero.
    #[error("slot capacity basis must be at least 1")]
    EmptySlots,
    /// Rounding the slab dimensions to powers of two overflowed `usize`.
    #[error("slab of {slot_count} slots sized from {basis} bytes overflows usize")]
    CapacityOverflow {
        /// Configured slot count.
        slot_count: usize,
        /// Configured capacity basis.
        basis: usize,
    },
    /// The local stream source name was empty.
    #[error("source name must not be empty")]
    EmptyName,
}

/// Configuration consumed by [`StreamFactory`](crate::server::StreamFactory).
///
/// # Examples
///
/// ```
/// use h2bridge::config::BridgeConfig;
///
/// let config = BridgeConfig::builder()
///     .network_window(16_384)
///     .slot_count(8)
///     .build()
///     .expect("valid configuration");
///
/// assert_eq!(config.network_window(), 16_384);
/// assert_eq!(config.slot_capacity(), 65_536);
/// assert_eq!(config.slab_capacity(), 8 * 65_536);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    name: String,
    network_window: i32,
    application_window: i32,
    slot_count: usize,
    slot_capacity_basis: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            network_window: DEFAULT_NETWORK_WINDOW,
            application_window: DEFAULT_APPLICATION_WINDOW,
            slot_count: DEFAULT_SLOT_COUNT,
            slot_capacity_basis: DEFAULT_INITIAL_WINDOW_SIZE,
        }
    }
}

impl BridgeConfig {
    /// Start building a configuration from the defaults.
    #[must_use]
    pub fn builder() -> BridgeConfigBuilder { BridgeConfigBuilder::default() }

    /// Name written as the source of streams the bridge opens.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Credit granted to the network peer when its connection begins.
    #[must_use]
    pub const fn network_window(&self) -> i32 { self.network_window }

    /// Credit granted to the application when a reply begins.
    #[must_use]
    pub const fn application_window(&self) -> i32 { self.application_window }

    /// Configured slot count before rounding.
    #[must_use]
    pub const fn slot_count(&self) -> usize { self.slot_count }

    /// Byte count the slot capacity is derived from.
    #[must_use]
    pub const fn slot_capacity_basis(&self) -> usize { self.slot_capacity_basis }

    /// Capacity of one slab slot: the basis rounded up to a power of two.
    ///
    /// Returns zero when the value overflows; [`validate`](Self::validate)
    /// rejects such configurations.
    #[must_use]
    pub fn slot_capacity(&self) -> usize {
        self.slot_capacity_basis.checked_next_power_of_two().unwrap_or(0)
    }

    /// Total capacity of one slab in bytes.
    ///
    /// Returns zero when the value overflows; [`validate`](Self::validate)
    /// rejects such configurations.
    #[must_use]
    pub fn slab_capacity(&self) -> usize { self.checked_slab_capacity().unwrap_or(0) }

    fn checked_slab_capacity(&self) -> Option<usize> {
        let slots = self.slot_count.checked_next_power_of_two()?;
        let slot_capacity = self.slot_capacity_basis.checked_next_power_of_two()?;
        slots.checked_mul(slot_capacity)
    }

    /// Check every value for consistency.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.network_window <= 0 {
            return Err(ConfigError::NonPositiveWindow {
                name: "network window",
                value: self.network_window,
            });
        }
        if self.application_window <= 0 {
            return Err(ConfigError::NonPositiveWindow {
                name: "application window",
                value: self.application_window,
            });
        }
        if self.slot_count == 0 {
            return Err(ConfigError::NoSlots);
        }
        if self.slot_capacity_basis == 0 {
            return Err(ConfigError::EmptySlots);
        }
        if self.checked_slab_capacity().is_none() {
            return Err(ConfigError::CapacityOverflow {
                slot_count: self.slot_count,
                basis: self.slot_capacity_basis,
            });
        }
        Ok(())
    }
}

/// Builder for [`BridgeConfig`].
#[derive(Clone, Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Set the source name written on streams the bridge opens.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the credit granted to the network peer on begin.
    #[must_use]
    pub fn network_window(mut self, window: i32) -> Self {
        self.config.network_window = window;
        self
    }

    /// Set the credit granted to the application on each reply.
    #[must_use]
    pub fn application_window(mut self, window: i32) -> Self {
        self.config.application_window = window;
        self
    }

    /// Set the number of slots per slab.
    #[must_use]
    pub fn slot_count(mut self, count: usize) -> Self {
        self.config.slot_count = count;
        self
    }

    /// Set the byte count slot capacity is derived from.
    #[must_use]
    pub fn slot_capacity_basis(mut self, basis: usize) -> Self {
        self.config.slot_capacity_basis = basis;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid value.
    pub fn build(self) -> Result<BridgeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn defaults_size_slabs_from_initial_window() {
        let config = BridgeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.name(), "http2");
        assert_eq!(config.slot_capacity(), 65_536);
        assert_eq!(config.slab_capacity(), 128 * 65_536);
    }

    #[test]
    fn slot_count_rounds_up_to_power_of_two() {
        let config = BridgeConfig::builder()
            .slot_count(100)
            .slot_capacity_basis(1000)
            .build()
            .expect("valid configuration");
        assert_eq!(config.slot_capacity(), 1024);
        assert_eq!(config.slab_capacity(), 128 * 1024);
    }

    #[rstest]
    #[case(BridgeConfig::builder().network_window(0), ConfigError::NonPositiveWindow { name: "network window", value: 0 })]
    #[case(BridgeConfig::builder().application_window(-5), ConfigError::NonPositiveWindow { name: "application window", value: -5 })]
    #[case(BridgeConfig::builder().slot_count(0), ConfigError::NoSlots)]
    #[case(BridgeConfig::builder().slot_capacity_basis(0), ConfigError::EmptySlots)]
    #[case(BridgeConfig::builder().name(""), ConfigError::EmptyName)]
    #[case(
        BridgeConfig::builder().slot_count(usize::MAX / 2).slot_capacity_basis(4096),
        ConfigError::CapacityOverflow { slot_count: usize::MAX / 2, basis: 4096 }
    )]
    fn builder_rejects_invalid_values(
        #[case] builder: BridgeConfigBuilder,
        #[case] expected: ConfigError,
    ) {
        assert_eq!(builder.build(), Err(expected));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: BridgeConfig = toml::from_str(
            r#"
            name = "h2c"
            network_window = 16384
            "#,
        )
        .expect("valid toml");
        assert_eq!(config.name(), "h2c");
        assert_eq!(config.network_window(), 16_384);
        assert_eq!(config.application_window(), DEFAULT_APPLICATION_WINDOW);
        assert_eq!(config.slot_count(), DEFAULT_SLOT_COUNT);
        assert!(config.validate().is_ok());
    }
}
