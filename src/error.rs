//! Error types for Thrift WebDriver.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use thrift_webdriver::{Result, RemoteDriver};
//!
//! async fn example(driver: &mut RemoteDriver) -> Result<()> {
//!     driver.get("https://example.com").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidUrl`] |
//! | Transport | [`Error::Io`], [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::CallTimeout`], [`Error::ConnectionClosed`], [`Error::ConnectionPoisoned`] |
//! | Protocol | [`Error::Protocol`], [`Error::Application`] |
//! | Remote | [`Error::RemoteWebDriver`], [`Error::SpecNotFound`] |
//! | Session | [`Error::UnrecognizedCommand`], [`Error::SessionNotBound`], [`Error::SessionAlreadyBound`], [`Error::SessionNotCreated`] |
//! | Lifecycle | [`Error::ProcessLaunchFailed`], [`Error::ProcessQuery`] |
//! | External | [`Error::Json`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::{Error as IoError, ErrorKind};
use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::SessionId;
use crate::protocol::ApplicationErrorKind;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when driver or service configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Remote URL could not be parsed.
    #[error("Invalid remote URL '{url}': {source}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Parser error.
        source: url::ParseError,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// IO error on the RPC socket.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// Connection to the RPC service failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connecting to the RPC service timed out.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A call did not complete within the call timeout.
    ///
    /// The connection is poisoned afterwards.
    #[error("Call '{method}' timed out after {timeout_ms}ms")]
    CallTimeout {
        /// Remote method name.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The service closed the connection.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A previous call failed mid-message, leaving the framing state undefined.
    ///
    /// Construct a fresh client to continue.
    #[error("Connection unusable after a failed call")]
    ConnectionPoisoned,

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed message on the wire.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Application-level exception raised by the RPC layer.
    #[error("Application error in '{method}' ({kind}): {message}")]
    Application {
        /// Remote method name.
        method: String,
        /// Exception kind.
        kind: ApplicationErrorKind,
        /// Exception message.
        message: String,
    },

    // ========================================================================
    // Declared Remote Failures
    // ========================================================================
    /// The remote WebDriver failed to execute a command.
    #[error("{message}")]
    RemoteWebDriver {
        /// Message from the remote end.
        message: String,
    },

    /// The layout specification could not be found by the service.
    #[error("Spec not found: {message}")]
    SpecNotFound {
        /// Message from the remote end.
        message: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Command name is not part of the WebDriver command table.
    #[error("Unrecognised command: {command}")]
    UnrecognizedCommand {
        /// The rejected command name.
        command: String,
    },

    /// A session-scoped command was issued before a session was bound.
    #[error("No session bound to this driver")]
    SessionNotBound,

    /// Attempted to replace the session bound to a driver.
    #[error("Session {current} already bound, refusing {attempted}")]
    SessionAlreadyBound {
        /// Session currently bound.
        current: SessionId,
        /// Session that was rejected.
        attempted: SessionId,
    },

    /// The new-session handshake did not yield a session.
    #[error("Session not created (status {status}): {message}")]
    SessionNotCreated {
        /// Status code returned by the service.
        status: i32,
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Failed to launch the service process.
    #[error("Failed to launch service: {message}")]
    ProcessLaunchFailed {
        /// Description of the launch failure.
        message: String,
    },

    /// Failed to query or signal OS processes.
    #[error("Process query failed: {message}")]
    ProcessQuery {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a call timeout error.
    #[inline]
    pub fn call_timeout(method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::CallTimeout {
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates an application error.
    #[inline]
    pub fn application(
        method: impl Into<String>,
        kind: ApplicationErrorKind,
        message: impl Into<String>,
    ) -> Self {
        Self::Application {
            method: method.into(),
            kind,
            message: message.into(),
        }
    }

    /// Creates a remote WebDriver error.
    #[inline]
    pub fn remote_webdriver(message: impl Into<String>) -> Self {
        Self::RemoteWebDriver {
            message: message.into(),
        }
    }

    /// Creates a spec not found error.
    #[inline]
    pub fn spec_not_found(message: impl Into<String>) -> Self {
        Self::SpecNotFound {
            message: message.into(),
        }
    }

    /// Creates an unrecognized command error.
    #[inline]
    pub fn unrecognized_command(command: impl Into<String>) -> Self {
        Self::UnrecognizedCommand {
            command: command.into(),
        }
    }

    /// Creates a session not created error.
    #[inline]
    pub fn session_not_created(status: i32, message: impl Into<String>) -> Self {
        Self::SessionNotCreated {
            status,
            message: message.into(),
        }
    }

    /// Creates a process launch failed error.
    #[inline]
    pub fn process_launch_failed(err: IoError) -> Self {
        Self::ProcessLaunchFailed {
            message: err.to_string(),
        }
    }

    /// Creates a process query error.
    #[inline]
    pub fn process_query(message: impl Into<String>) -> Self {
        Self::ProcessQuery {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ConnectionTimeout { .. } | Self::CallTimeout { .. }
        )
    }

    /// Returns `true` if this error is fatal to the current connection.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::CallTimeout { .. }
                | Self::ConnectionClosed
                | Self::ConnectionPoisoned
        )
    }

    /// Returns `true` if this is a declared failure of a well-formed call.
    ///
    /// These are expected outcomes and leave the connection usable.
    #[inline]
    #[must_use]
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            Self::RemoteWebDriver { .. } | Self::SpecNotFound { .. }
        )
    }

    /// Returns `true` if the peer went away (EOF, reset, broken pipe).
    #[must_use]
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::ConnectionClosed => true,
            Self::Io(err) => matches!(
                err.kind(),
                ErrorKind::UnexpectedEof
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
