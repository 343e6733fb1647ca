//! Wire protocol of the RPC service.
//!
//! This module defines the message format for communication between the
//! local end (Rust) and the RPC service that hosts the real WebDriver
//! sessions.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | `CALL` | Local → Service | Method invocation with an args struct |
//! | `REPLY` | Service → Local | Result struct (value or declared exception) |
//! | `EXCEPTION` | Service → Local | [`ApplicationException`] in place of a reply |
//!
//! Exactly one reply message follows each call. Calls on one connection
//! never overlap.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Binary encoding and decoding |
//! | `command` | Recognized WebDriver command names |
//! | `service` | Per-method args and result structs |
//! | `types` | Response envelope, value union, exceptions |

// ============================================================================
// Submodules
// ============================================================================

/// Binary protocol encoding and decoding.
pub mod codec;

/// WebDriver command table.
pub mod command;

/// Method args and result structs.
pub mod service;

/// Response envelope and exception structs.
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{
    MessageHeader, MessageReader, MessageType, MessageWriter, TType, ThriftStruct, WireStruct,
    WireValue,
};
pub use command::DriverCommand;
pub use service::{
    ActiveDriversResult, CheckLayoutArgs, CheckLayoutResult, ExecuteArgs, ExecuteResult,
    GenerateReportArgs, InitializeArgs, NoArgs, ServiceResult, VoidResult, method,
};
pub use types::{
    ApplicationErrorKind, ApplicationException, RemoteWebDriverException, Response,
    ResponseValue, SpecNotFoundException,
};
