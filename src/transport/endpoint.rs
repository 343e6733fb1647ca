//! Service endpoint and connection options.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::codec::DEFAULT_MAX_MESSAGE_SIZE;

// ============================================================================
// Constants
// ============================================================================

/// Default host of the RPC service.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port of the RPC service.
pub const DEFAULT_PORT: u16 = 9092;

/// Default connect timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default per-call timeout.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// ServiceEndpoint
// ============================================================================

/// Address of the RPC service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoint {
    /// Host name or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self::new(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl ServiceEndpoint {
    /// Creates an endpoint.
    #[inline]
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Creates an endpoint on the default host.
    #[inline]
    #[must_use]
    pub fn localhost(port: u16) -> Self {
        Self::new(DEFAULT_HOST, port)
    }

    /// Validates the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an empty host or port 0.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("Service host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::config("Service port must be greater than zero"));
        }
        Ok(())
    }
}

impl fmt::Display for ServiceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ============================================================================
// RpcOptions
// ============================================================================

/// Timeouts and limits for one RPC connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RpcOptions {
    /// Maximum time to establish the TCP connection.
    pub connect_timeout: Duration,
    /// Maximum time for one call, request write through reply read.
    ///
    /// `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// Maximum bytes accepted for one reply.
    pub max_message_size: usize,
}

impl Default for RpcOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl RpcOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-call timeout.
    #[inline]
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the reply size cap.
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.max_message_size = bytes;
        self
    }
}

// ============================================================================
// RetryPolicy
// ============================================================================

/// Exponential backoff for the first connection to a starting service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay to wait after the given failed attempt (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

// ============================================================================
// Tests
// ============================================================================
