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

/// An invalid [`PoolConfig`](crate::PoolConfig).
///
/// Returned by [`PoolConfig::validate`](crate::PoolConfig::validate) before any resource is
/// created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `max_active` is zero.
    #[error("max_active must be greater than zero")]
    ZeroMaxActive,

    /// `min_active` is greater than `max_active`.
    #[error("min_active ({min_active}) must not exceed max_active ({max_active})")]
    MinActiveExceedsMax {
        /// The configured warm floor.
        min_active: usize,
        /// The configured hard cap.
        max_active: usize,
    },

    /// Callers may wait but no wait timeout is set.
    #[error("max_wait is {max_wait} but max_wait_time is zero")]
    MissingMaxWaitTime {
        /// The configured wait queue bound.
        max_wait: usize,
    },

    /// Resources may idle beyond the warm floor but no idle timeout is set.
    #[error("max_idle is {max_idle} but idle_timeout is zero")]
    MissingIdleTimeout {
        /// The configured idle bound.
        max_idle: usize,
    },
}

/// Errors returned when building a [`Pool`](crate::Pool) or acquiring a resource from it.
///
/// `E` is the error type of the [`ManageResource`](crate::ManageResource) implementation.
#[derive(Debug, thiserror::Error)]
pub enum PoolError<E> {
    /// The configuration was rejected.
    #[error("invalid pool configuration: {0}")]
    Config(#[from] ConfigError),

    /// The factory failed to create a resource. The error is passed through unchanged.
    #[error("failed to create resource")]
    Factory(#[source] E),

    /// The pool is saturated and `max_wait` callers are already waiting.
    #[error("wait queue overflow: {max_wait} callers are already waiting")]
    WaitQueueOverflow {
        /// The configured wait queue bound.
        max_wait: usize,
    },

    /// No resource became available within `max_wait_time`.
    #[error("timed out after {0:?} waiting for a resource")]
    WaitTimeout(Duration),

    /// The pool has been shut down.
    #[error("pool is shut down")]
    Closed,
}

impl<E> PoolError<E> {
    /// Whether retrying the same call later may succeed.
    ///
    /// The pool never retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::WaitQueueOverflow { .. } | Self::WaitTimeout(_))
    }

    /// Returns the factory error, if this is one.
    pub fn into_factory_error(self) -> Option<E> {
        match self {
            Self::Factory(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = PoolError::<std::io::Error>::WaitQueueOverflow { max_wait: 20 };
        assert_eq!(
            err.to_string(),
            "wait queue overflow: 20 callers are already waiting"
        );
        assert!(err.is_retryable());

        let err: PoolError<std::io::Error> = ConfigError::ZeroMaxActive.into();
        assert_eq!(
            err.to_string(),
            "invalid pool configuration: max_active must be greater than zero"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_factory_error_is_source() {
        use std::error::Error;

        let err = PoolError::Factory(std::io::Error::other("refused"));
        assert_eq!(err.source().map(|e| e.to_string()).as_deref(), Some("refused"));
        let inner = err.into_factory_error().unwrap();
        assert_eq!(inner.to_string(), "refused");
    }
}
