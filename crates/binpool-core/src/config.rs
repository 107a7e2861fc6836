//! Pool configuration.
//!
//! A pool is built from a [`PoolConfig`]. Defaults match the classic layout
//! of 24 classes in 8-byte steps (small regime `[1, 192]`), 5 extra blocks
//! seeded per carve and 11-block bulk spans.
//!
//! [`PoolConfig::from_env`] overlays these environment variables:
//! - `BINPOOL_GROUPS`, `BINPOOL_BYTES_INC`
//! - `BINPOOL_REFILL_EXTRA`, `BINPOOL_REFILL_SPAN`
//! - `BINPOOL_LOG_CAPACITY`, `BINPOOL_LOG_LEVEL`
//!
//! Unparsable values are ignored in favour of the default. The combined
//! result is still validated.

use std::mem;

use crate::error::ConfigError;
use crate::log::PoolLogLevel;

/// Upper bound on the number of size classes.
pub const MAX_GROUPS: usize = 64;

/// Upper bound on the class step in bytes.
pub const MAX_BYTES_INC: usize = 64;

/// Smallest legal class step: one free-list link.
pub const MIN_BYTES_INC: usize = mem::size_of::<usize>();

pub const DEFAULT_GROUPS: usize = 24;
pub const DEFAULT_BYTES_INC: usize = 8;
pub const DEFAULT_REFILL_EXTRA_BLOCKS: usize = 5;
pub const DEFAULT_REFILL_SPAN_BLOCKS: usize = 11;
pub const DEFAULT_LOG_CAPACITY: usize = 256;

pub const ENV_GROUPS: &str = "BINPOOL_GROUPS";
pub const ENV_BYTES_INC: &str = "BINPOOL_BYTES_INC";
pub const ENV_REFILL_EXTRA: &str = "BINPOOL_REFILL_EXTRA";
pub const ENV_REFILL_SPAN: &str = "BINPOOL_REFILL_SPAN";
pub const ENV_LOG_CAPACITY: &str = "BINPOOL_LOG_CAPACITY";
pub const ENV_LOG_LEVEL: &str = "BINPOOL_LOG_LEVEL";

/// Construction parameters for a [`Pool`](crate::Pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of size classes.
    pub groups: usize,
    /// Byte step between consecutive classes; also the smallest block.
    pub bytes_inc: usize,
    /// Extra same-class blocks pushed to the free list per arena carve.
    pub refill_extra_blocks: usize,
    /// Blocks requested from the bulk provider per refill span.
    pub refill_span_blocks: usize,
    /// Lifecycle log ring size. Zero disables logging.
    pub log_capacity: usize,
    /// Records below this level are dropped.
    pub log_level: PoolLogLevel,
}

impl PoolConfig {
    /// Default knobs with a custom class layout.
    #[must_use]
    pub const fn new(groups: usize, bytes_inc: usize) -> Self {
        Self {
            groups,
            bytes_inc,
            refill_extra_blocks: DEFAULT_REFILL_EXTRA_BLOCKS,
            refill_span_blocks: DEFAULT_REFILL_SPAN_BLOCKS,
            log_capacity: DEFAULT_LOG_CAPACITY,
            log_level: PoolLogLevel::Warn,
        }
    }

    #[must_use]
    pub const fn with_refill(mut self, extra_blocks: usize, span_blocks: usize) -> Self {
        self.refill_extra_blocks = extra_blocks;
        self.refill_span_blocks = span_blocks;
        self
    }

    #[must_use]
    pub const fn with_logging(mut self, capacity: usize, level: PoolLogLevel) -> Self {
        self.log_capacity = capacity;
        self.log_level = level;
        self
    }

    /// Largest request served by the free-list tier.
    #[must_use]
    pub const fn max_small_size(&self) -> usize {
        self.groups * self.bytes_inc
    }

    /// Checks the class layout and refill knobs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.groups == 0 || self.groups > MAX_GROUPS {
            return Err(ConfigError::GroupsOutOfRange {
                got: self.groups,
                max: MAX_GROUPS,
            });
        }
        if self.bytes_inc < MIN_BYTES_INC
            || self.bytes_inc > MAX_BYTES_INC
            || self.bytes_inc % mem::align_of::<usize>() != 0
        {
            return Err(ConfigError::BytesIncOutOfRange {
                got: self.bytes_inc,
                word: MIN_BYTES_INC,
                max: MAX_BYTES_INC,
            });
        }
        if self.refill_span_blocks == 0 {
            return Err(ConfigError::ZeroRefillSpan);
        }
        let block_bytes = self.max_small_size();
        if block_bytes.checked_mul(self.refill_span_blocks).is_none() {
            return Err(ConfigError::SpanOverflow {
                blocks: self.refill_span_blocks,
                block_bytes,
            });
        }
        Ok(())
    }

    /// Reads overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str, default: usize| {
            lookup(key)
                .and_then(|raw| raw.trim().parse::<usize>().ok())
                .unwrap_or(default)
        };
        let defaults = Self::default();
        let config = Self {
            groups: parse(ENV_GROUPS, defaults.groups),
            bytes_inc: parse(ENV_BYTES_INC, defaults.bytes_inc),
            refill_extra_blocks: parse(ENV_REFILL_EXTRA, defaults.refill_extra_blocks),
            refill_span_blocks: parse(ENV_REFILL_SPAN, defaults.refill_span_blocks),
            log_capacity: parse(ENV_LOG_CAPACITY, defaults.log_capacity),
            log_level: lookup(ENV_LOG_LEVEL)
                .map_or(defaults.log_level, |raw| PoolLogLevel::from_str_loose(&raw)),
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(DEFAULT_GROUPS, DEFAULT_BYTES_INC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn default_layout_is_24_by_8() {
        let config = PoolConfig::default();
        assert_eq!(config.groups, 24);
        assert_eq!(config.bytes_inc, 8);
        assert_eq!(config.max_small_size(), 192);
        assert_eq!(config.refill_extra_blocks, 5);
        assert_eq!(config.refill_span_blocks, 11);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_groups() {
        assert_eq!(
            PoolConfig::new(0, 8).validate(),
            Err(ConfigError::GroupsOutOfRange { got: 0, max: 64 })
        );
        assert!(PoolConfig::new(65, 8).validate().is_err());
        assert!(PoolConfig::new(64, 8).validate().is_ok());
    }

    #[test]
    fn rejects_steps_that_cannot_hold_a_link() {
        assert!(PoolConfig::new(4, 1).validate().is_err());
        assert!(PoolConfig::new(4, MIN_BYTES_INC + 1).validate().is_err());
        assert!(PoolConfig::new(4, 128).validate().is_err());
        assert!(PoolConfig::new(4, 16).validate().is_ok());
    }

    #[test]
    fn rejects_zero_span() {
        let config = PoolConfig::default().with_refill(5, 0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroRefillSpan));
    }

    #[test]
    fn rejects_span_overflow() {
        let config = PoolConfig::default().with_refill(5, usize::MAX / 2);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::SpanOverflow { .. })
        ));
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = PoolConfig::from_lookup(lookup_from(&[
            (ENV_GROUPS, "32"),
            (ENV_BYTES_INC, "16"),
            (ENV_REFILL_EXTRA, "2"),
            (ENV_REFILL_SPAN, "4"),
            (ENV_LOG_CAPACITY, "0"),
            (ENV_LOG_LEVEL, "TRACE"),
        ]))
        .unwrap();
        assert_eq!(config.groups, 32);
        assert_eq!(config.bytes_inc, 16);
        assert_eq!(config.refill_extra_blocks, 2);
        assert_eq!(config.refill_span_blocks, 4);
        assert_eq!(config.log_capacity, 0);
        assert_eq!(config.log_level, PoolLogLevel::Trace);
    }

    #[test]
    fn unparsable_values_fall_back() {
        let config =
            PoolConfig::from_lookup(lookup_from(&[(ENV_GROUPS, "many"), (ENV_BYTES_INC, " 16 ")]))
                .unwrap();
        assert_eq!(config.groups, DEFAULT_GROUPS);
        assert_eq!(config.bytes_inc, 16);
    }

    #[test]
    fn lookup_result_is_validated() {
        let err = PoolConfig::from_lookup(lookup_from(&[(ENV_BYTES_INC, "3")])).unwrap_err();
        assert!(matches!(err, ConfigError::BytesIncOutOfRange { got: 3, .. }));
    }
}
