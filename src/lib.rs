//! Thrift WebDriver - WebDriver commands over a binary RPC bridge.
//!
//! This library drives a remote WebDriver hub through a sidecar RPC
//! service. The service hosts the real WebDriver sessions and adds layout
//! checking and report generation on top.
//!
//! # Architecture
//!
//! The driver follows a client-sidecar model:
//!
//! - **Local End (Rust)**: Validates commands, serializes parameters, calls
//!   the service over a binary protocol on TCP
//! - **Sidecar (JVM)**: Forwards commands to the WebDriver hub, runs layout
//!   checks, writes reports
//!
//! Key design principles:
//!
//! - Each [`RemoteDriver`] owns one session and one connection
//! - One call in flight per connection, enforced by `&mut self`
//! - Unknown command names fail before any I/O
//! - Sidecar lifecycle is best-effort: OS faults are logged, not raised
//!
//! # Quick Start
//!
//! ```no_run
//! use thrift_webdriver::{RemoteDriver, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let mut driver = RemoteDriver::builder()
//!         .remote_url("http://127.0.0.1:4444/wd/hub")
//!         .capability("browserName", "firefox")
//!         .build()
//!         .await?;
//!
//!     driver.get("https://example.com").await?;
//!     let title = driver.title().await?;
//!     println!("Page title: {title:?}");
//!
//!     driver.quit().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`driver`] | [`RemoteDriver`], executors, response adapter |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire codec and message structs |
//! | [`service`] | Sidecar process supervision |
//! | [`transport`] | RPC client and connection options |

// ============================================================================
// Modules
// ============================================================================

/// WebDriver surface: driver, executors, response adapter.
///
/// Use [`RemoteDriver::builder()`] to create a configured driver.
pub mod driver;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Binary protocol codec and message types.
///
/// Defines the method args, results and exceptions of the RPC service.
pub mod protocol;

/// Sidecar service lifecycle.
///
/// Finds, launches and stops the RPC service process.
pub mod service;

/// RPC transport layer.
///
/// Client for the RPC service over TCP or any byte stream.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Driver types
pub use driver::{
    CommandExecutor, CommandResult, DriverBuilder, RemoteDriver, ResponseAdapter,
    RpcCommandExecutor, SessionState, SharedService, share_service,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::SessionId;

// Protocol types
pub use protocol::{DriverCommand, Response, ResponseValue};

// Service types
pub use service::{
    ProcessHandle, ProcessInfo, ProcessTable, ServiceConfig, ServiceSupervisor, StartOutcome,
    StreamRelay, SystemProcessTable,
};

// Transport types
pub use transport::{RemoteService, RetryPolicy, RpcClient, RpcOptions, ServiceEndpoint};
