//! RPC transport layer.
//!
//! This module handles communication between the local end (Rust) and the
//! RPC service over a plain TCP socket.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  RemoteDriver   │                              │  RPC Service    │
//! │  (Rust)         │     binary protocol / TCP    │  (JVM sidecar)  │
//! │  RpcClient      │◄────────────────────────────►│                 │
//! │                 │      127.0.0.1:9092          │  WebDriver hub  │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `RpcClient::connect_with_retry` - Connect while the service starts
//! 2. `initialize` - Point the service at the WebDriver hub
//! 3. `execute` / `check_layout` / ... - One call at a time
//! 4. `RpcClient::close` - Shut down the socket
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `client` | Call/reply client over any byte stream |
//! | `endpoint` | Service address, timeouts, retry policy |
//! | `remote` | [`RemoteService`] trait implemented by the client |

// ============================================================================
// Submodules
// ============================================================================

/// Call/reply client.
pub mod client;

/// Service address and connection options.
pub mod endpoint;

/// Remote service trait.
pub mod remote;

// ============================================================================
// Re-exports
// ============================================================================

pub use client::RpcClient;
pub use endpoint::{DEFAULT_HOST, DEFAULT_PORT, RetryPolicy, RpcOptions, ServiceEndpoint};
pub use remote::RemoteService;
