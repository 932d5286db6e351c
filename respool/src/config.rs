// Copyright 2025 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::time::Duration;

use crate::ConfigError;

/// The configuration of [`Pool`](crate::Pool).
///
/// A zero duration means "not set".
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
pub struct PoolConfig {
    /// Hard cap on the number of resources that exist at the same time.
    pub max_active: usize,

    /// Number of resources created up front. Release never closes a resource while the pool
    /// holds this many or fewer.
    pub min_active: usize,

    /// Number of resources kept idle on top of `min_active`.
    pub max_idle: usize,

    /// Number of callers allowed to wait when the pool is saturated.
    ///
    /// Zero means an acquire on a saturated pool fails immediately.
    pub max_wait: usize,

    /// How long a waiting caller waits before giving up. Required when `max_wait > 0`.
    pub max_wait_time: Duration,

    /// How long a resource may sit idle before it is discarded on the next acquire.
    ///
    /// Required when `max_idle > 0`. Zero disables idle eviction.
    pub idle_timeout: Duration,
}

impl PoolConfig {
    /// Creates a new [`PoolConfig`] with no warm floor, no idle spares and no wait queue.
    pub fn new(max_active: usize) -> Self {
        Self {
            max_active,
            min_active: 0,
            max_idle: 0,
            max_wait: 0,
            max_wait_time: Duration::ZERO,
            idle_timeout: Duration::ZERO,
        }
    }

    /// Returns a new [`PoolConfig`] with the specified warm floor.
    pub fn with_min_active(mut self, min_active: usize) -> Self {
        self.min_active = min_active;
        self
    }

    /// Returns a new [`PoolConfig`] with the specified number of idle spares.
    pub fn with_max_idle(mut self, max_idle: usize) -> Self {
        self.max_idle = max_idle;
        self
    }

    /// Returns a new [`PoolConfig`] with the specified wait queue bound.
    pub fn with_max_wait(mut self, max_wait: usize) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Returns a new [`PoolConfig`] with the specified wait timeout.
    pub fn with_max_wait_time(mut self, max_wait_time: Duration) -> Self {
        self.max_wait_time = max_wait_time;
        self
    }

    /// Returns a new [`PoolConfig`] with the specified idle timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Checks the bounds and the timeouts they depend on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_active == 0 {
            return Err(ConfigError::ZeroMaxActive);
        }
        if self.min_active > self.max_active {
            return Err(ConfigError::MinActiveExceedsMax {
                min_active: self.min_active,
                max_active: self.max_active,
            });
        }
        if self.max_wait > 0 && self.max_wait_time.is_zero() {
            return Err(ConfigError::MissingMaxWaitTime {
                max_wait: self.max_wait,
            });
        }
        if self.max_idle > 0 && self.idle_timeout.is_zero() {
            return Err(ConfigError::MissingIdleTimeout {
                max_idle: self.max_idle,
            });
        }
        Ok(())
    }

    /// Idle queue length up to which a release keeps the resource.
    pub(crate) fn idle_capacity(&self) -> usize {
        self.min_active.saturating_add(self.max_idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let config = PoolConfig::new(10)
            .with_min_active(5)
            .with_max_idle(2)
            .with_max_wait(20)
            .with_max_wait_time(Duration::from_secs(1))
            .with_idle_timeout(Duration::from_secs(5));
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.idle_capacity(), 7);

        assert_eq!(PoolConfig::new(1).validate(), Ok(()));
        assert_eq!(
            PoolConfig::new(0).validate(),
            Err(ConfigError::ZeroMaxActive)
        );
        assert_eq!(
            PoolConfig::new(2).with_min_active(3).validate(),
            Err(ConfigError::MinActiveExceedsMax {
                min_active: 3,
                max_active: 2
            })
        );
        assert_eq!(
            PoolConfig::new(2).with_max_wait(1).validate(),
            Err(ConfigError::MissingMaxWaitTime { max_wait: 1 })
        );
        assert_eq!(
            PoolConfig::new(2).with_max_idle(1).validate(),
            Err(ConfigError::MissingIdleTimeout { max_idle: 1 })
        );
    }

    #[test]
    fn test_timeouts_only_required_when_used() {
        let config = PoolConfig::new(4)
            .with_min_active(4)
            .with_max_wait_time(Duration::from_secs(1));
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.idle_capacity(), 4);
    }
}
