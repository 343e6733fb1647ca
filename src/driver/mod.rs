//! WebDriver surface.
//!
//! This module provides the main entry point for running WebDriver commands
//! through the RPC service.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`RemoteDriver`] | Session-bound driver with typed helpers |
//! | [`DriverBuilder`] | Fluent configuration builder |
//! | [`CommandExecutor`] | Pluggable command transport |
//! | [`RpcCommandExecutor`] | RPC-backed executor and session state |
//! | [`ResponseAdapter`] | Unwrapping of the response value union |
//! | [`CommandResult`] | Flat `{status, sessionId, state, value}` result |
//!
//! # Example
//!
//! ```no_run
//! use thrift_webdriver::{RemoteDriver, Result, ServiceConfig};
//!
//! # async fn example() -> Result<()> {
//! let mut driver = RemoteDriver::builder()
//!     .auto_start(ServiceConfig::new().with_server_path("/opt/galen"))
//!     .capability("browserName", "chrome")
//!     .build()
//!     .await?;
//!
//! driver.get("https://example.com").await?;
//! let failures = driver.check_layout("homepage", "specs/home.spec", &[], &[]).await?;
//! driver.generate_report("/tmp/layout-report").await?;
//! driver.quit().await?;
//! # let _ = failures;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Response adaptation.
pub mod adapter;

/// Fluent builder pattern for driver configuration.
pub mod builder;

/// Remote driver implementation.
pub mod core;

/// Command executors and session state.
pub mod executor;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{CommandResult, ResponseAdapter};
pub use builder::{DEFAULT_REMOTE_URL, DriverBuilder};
pub use core::RemoteDriver;
pub use executor::{
    CommandExecutor, RpcCommandExecutor, ServiceGuard, SessionState, SharedService, share_service,
};
