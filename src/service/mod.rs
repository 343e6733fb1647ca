//! Sidecar service lifecycle.
//!
//! The RPC service runs as a separate JVM process on a fixed port. This
//! module finds it in the OS process table, launches it when absent, drains
//! its output into the log, and terminates it on request.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | Launch and detection settings |
//! | `handle` | Ownership of one spawned process |
//! | `process_table` | OS process table seam and system adapter |
//! | `relay` | Output stream draining into `tracing` |
//! | `supervisor` | Debounced start, stop, running check |

// ============================================================================
// Submodules
// ============================================================================

/// Launch and detection settings.
pub mod config;

/// Spawned process ownership.
pub mod handle;

/// OS process table access.
pub mod process_table;

/// Output stream relay.
pub mod relay;

/// Service supervisor.
pub mod supervisor;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::ServiceConfig;
pub use handle::ProcessHandle;
pub use process_table::{ProcessInfo, ProcessTable, SystemProcessTable};
pub use relay::{StreamKind, StreamRelay};
pub use supervisor::{ServiceSupervisor, StartOutcome};
