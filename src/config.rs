// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Ring buffer configuration (capacity, atomic mode).

use serde::{Deserialize, Serialize};

use crate::error::RingBufferError;
use crate::realtime::{RingBuffer, CAPACITY_ALIGNMENT};

/// Serializable description of a ring buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    /// Capacity in bytes; must be a positive multiple of 256.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Publish positions with acquire/release ordering.
    #[serde(default = "default_true")]
    pub atomic: bool,
}

fn default_capacity() -> usize {
    65536
}

fn default_true() -> bool {
    true
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            atomic: true,
        }
    }
}

impl RingConfig {
    /// Load config from TOML string.
    pub fn from_toml(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Check the capacity without allocating.
    pub fn validate(&self) -> Result<(), RingBufferError> {
        if self.capacity == 0 || self.capacity % CAPACITY_ALIGNMENT != 0 {
            return Err(RingBufferError::InvalidCapacity {
                capacity: self.capacity,
            });
        }
        Ok(())
    }

    /// Create a ring buffer described by this config.
    pub fn build(&self) -> Result<RingBuffer, RingBufferError> {
        self.validate()?;
        let mut buffer = RingBuffer::new(self.capacity)?;
        if !self.atomic {
            buffer.set_atomic(false);
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = RingConfig::from_toml("").unwrap();
        assert_eq!(config, RingConfig::default());
        assert_eq!(config.capacity, 65536);
        assert!(config.atomic);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = RingConfig {
            capacity: 1024,
            atomic: false,
        };
        let parsed = RingConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_build() {
        let buffer = RingConfig::from_toml("capacity = 512\natomic = false")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(buffer.capacity(), 512);
        assert!(!buffer.is_atomic());
    }

    #[test]
    fn test_validate_rejects_bad_capacity() {
        let config = RingConfig {
            capacity: 1000,
            atomic: true,
        };
        assert_eq!(
            config.validate().unwrap_err(),
            RingBufferError::InvalidCapacity { capacity: 1000 }
        );
        assert!(config.build().is_err());
    }
}
