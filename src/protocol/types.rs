//! Typed structs exchanged with the RPC service.
//!
//! | Struct | Fields |
//! |--------|--------|
//! | [`ResponseValue`] | tagged union: 1 `string_cap`, 2 `bool_cap`, 3 `set_cap` |
//! | [`Response`] | 1 `value`, 2 `session_id`, 3 `status`, 4 `state` |
//! | [`RemoteWebDriverException`] | 1 `message` |
//! | [`SpecNotFoundException`] | 1 `message` |
//! | [`ApplicationException`] | 1 `message`, 2 `type` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

use super::codec::{MessageWriter, TType, ThriftStruct, WireStruct};

// ============================================================================
// ResponseValue
// ============================================================================

/// Value carried by a command response: exactly one arm, or none at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseValue {
    /// String arm (`string_cap`).
    String(String),
    /// Boolean arm (`bool_cap`).
    Bool(bool),
    /// Set-of-strings arm (`set_cap`), in wire order without duplicates.
    Set(Vec<String>),
}

impl ResponseValue {
    /// Builds the set arm, dropping duplicates while keeping first-seen order.
    #[must_use]
    pub fn set<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let items = items.into_iter();
        let mut seen = FxHashSet::default();
        let mut values: Vec<String> = Vec::with_capacity(items.size_hint().0);
        for item in items {
            let item = item.into();
            if seen.insert(item.clone()) {
                values.push(item);
            }
        }
        Self::Set(values)
    }

    /// Returns the string arm.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the boolean arm.
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the set arm.
    #[inline]
    #[must_use]
    pub fn as_set(&self) -> Option<&[String]> {
        match self {
            Self::Set(values) => Some(values),
            _ => None,
        }
    }

    /// Decodes the union struct. `None` when no arm is populated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for malformed string contents.
    pub fn from_wire(wire: &WireStruct) -> Result<Option<Self>> {
        let mut arms = Vec::with_capacity(1);

        if let Some(value) = wire.string(1)? {
            arms.push(Self::String(value));
        }
        if let Some(value) = wire.bool(2) {
            arms.push(Self::Bool(value));
        }
        if let Some(values) = wire.string_set(3)? {
            arms.push(Self::set(values));
        }

        if arms.len() > 1 {
            warn!(arms = arms.len(), "Response value has more than one arm set, keeping the last");
        }

        Ok(arms.pop())
    }

    /// Writes the union struct with only this arm populated.
    pub fn write(value: Option<&Self>, writer: &mut MessageWriter) {
        match value {
            Some(Self::String(value)) => {
                writer.write_field_begin(TType::String, 1);
                writer.write_string(value);
            }
            Some(Self::Bool(value)) => {
                writer.write_field_begin(TType::Bool, 2);
                writer.write_bool(*value);
            }
            Some(Self::Set(values)) => {
                writer.write_field_begin(TType::Set, 3);
                writer.write_set_begin(TType::String, values.len());
                for value in values {
                    writer.write_string(value);
                }
            }
            None => {}
        }
        writer.write_field_stop();
    }
}

// ============================================================================
// Response
// ============================================================================

/// Success envelope of the `execute` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Decoded value union. `None` when the union is absent or empty.
    pub value: Option<ResponseValue>,
    /// Session id reported by the remote end.
    pub session_id: Option<String>,
    /// WebDriver status code.
    pub status: Option<i32>,
    /// WebDriver state string.
    pub state: Option<String>,
}

impl ThriftStruct for Response {
    fn write(&self, writer: &mut MessageWriter) {
        if self.value.is_some() {
            writer.write_field_begin(TType::Struct, 1);
            ResponseValue::write(self.value.as_ref(), writer);
        }
        writer.write_opt_string_field(2, self.session_id.as_deref());
        if let Some(status) = self.status {
            writer.write_field_begin(TType::I32, 3);
            writer.write_i32(status);
        }
        writer.write_opt_string_field(4, self.state.as_deref());
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        let value = match wire.structure(1) {
            Some(union) => ResponseValue::from_wire(union)?,
            None => None,
        };

        Ok(Self {
            value,
            session_id: wire.string(2)?,
            status: wire.i32(3),
            state: wire.string(4)?,
        })
    }
}

// ============================================================================
// Declared Exceptions
// ============================================================================

/// Declared failure of `execute`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteWebDriverException {
    /// Message from the remote WebDriver.
    pub message: Option<String>,
}

impl ThriftStruct for RemoteWebDriverException {
    fn write(&self, writer: &mut MessageWriter) {
        writer.write_opt_string_field(1, self.message.as_deref());
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        Ok(Self {
            message: wire.string(1)?,
        })
    }
}

impl From<RemoteWebDriverException> for Error {
    fn from(exc: RemoteWebDriverException) -> Self {
        Error::remote_webdriver(exc.message.unwrap_or_default())
    }
}

/// Declared failure of `check_layout`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpecNotFoundException {
    /// Message from the service.
    pub message: Option<String>,
}

impl ThriftStruct for SpecNotFoundException {
    fn write(&self, writer: &mut MessageWriter) {
        writer.write_opt_string_field(1, self.message.as_deref());
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        Ok(Self {
            message: wire.string(1)?,
        })
    }
}

impl From<SpecNotFoundException> for Error {
    fn from(exc: SpecNotFoundException) -> Self {
        Error::spec_not_found(exc.message.unwrap_or_default())
    }
}

// ============================================================================
// ApplicationException
// ============================================================================

/// Kind of an RPC-layer application exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationErrorKind {
    /// Unspecified.
    Unknown,
    /// Method not known to the service.
    UnknownMethod,
    /// Unexpected message type.
    InvalidMessageType,
    /// Reply for a different method.
    WrongMethodName,
    /// Reply for a different call.
    BadSequenceId,
    /// Result struct carried neither a value nor a declared exception.
    MissingResult,
    /// Service-side failure.
    InternalError,
    /// Malformed message.
    ProtocolError,
    /// Unsupported transform.
    InvalidTransform,
    /// Unsupported protocol.
    InvalidProtocol,
    /// Unsupported client type.
    UnsupportedClientType,
}

impl ApplicationErrorKind {
    /// Maps a wire code to a kind. Unknown codes map to [`Self::Unknown`].
    #[must_use]
    pub fn from_i32(code: i32) -> Self {
        match code {
            1 => Self::UnknownMethod,
            2 => Self::InvalidMessageType,
            3 => Self::WrongMethodName,
            4 => Self::BadSequenceId,
            5 => Self::MissingResult,
            6 => Self::InternalError,
            7 => Self::ProtocolError,
            8 => Self::InvalidTransform,
            9 => Self::InvalidProtocol,
            10 => Self::UnsupportedClientType,
            _ => Self::Unknown,
        }
    }

    /// Returns the wire code.
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::UnknownMethod => 1,
            Self::InvalidMessageType => 2,
            Self::WrongMethodName => 3,
            Self::BadSequenceId => 4,
            Self::MissingResult => 5,
            Self::InternalError => 6,
            Self::ProtocolError => 7,
            Self::InvalidTransform => 8,
            Self::InvalidProtocol => 9,
            Self::UnsupportedClientType => 10,
        }
    }
}

impl fmt::Display for ApplicationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::UnknownMethod => "UNKNOWN_METHOD",
            Self::InvalidMessageType => "INVALID_MESSAGE_TYPE",
            Self::WrongMethodName => "WRONG_METHOD_NAME",
            Self::BadSequenceId => "BAD_SEQUENCE_ID",
            Self::MissingResult => "MISSING_RESULT",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::InvalidTransform => "INVALID_TRANSFORM",
            Self::InvalidProtocol => "INVALID_PROTOCOL",
            Self::UnsupportedClientType => "UNSUPPORTED_CLIENT_TYPE",
        };
        f.write_str(name)
    }
}

/// RPC-layer exception sent in place of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationException {
    /// Exception message.
    pub message: Option<String>,
    /// Exception kind.
    pub kind: ApplicationErrorKind,
}

impl ApplicationException {
    /// Creates an exception.
    #[must_use]
    pub fn new(kind: ApplicationErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            kind,
        }
    }

    /// Converts into the crate error, tagged with the method name.
    #[must_use]
    pub fn into_error(self, method: &str) -> Error {
        Error::application(method, self.kind, self.message.unwrap_or_default())
    }
}

impl ThriftStruct for ApplicationException {
    fn write(&self, writer: &mut MessageWriter) {
        writer.write_opt_string_field(1, self.message.as_deref());
        writer.write_field_begin(TType::I32, 2);
        writer.write_i32(self.kind.code());
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        Ok(Self {
            message: wire.string(1)?,
            kind: ApplicationErrorKind::from_i32(wire.i32(2).unwrap_or_default()),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
