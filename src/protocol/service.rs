//! Argument and result structs of the remote service methods.
//!
//! | Method | Args | Result |
//! |--------|------|--------|
//! | `initialize` | [`InitializeArgs`] | [`VoidResult`] |
//! | `execute` | [`ExecuteArgs`] | [`ExecuteResult`] |
//! | `check_layout` | [`CheckLayoutArgs`] | [`CheckLayoutResult`] |
//! | `generate_report` | [`GenerateReportArgs`] | [`VoidResult`] |
//! | `active_drivers` | [`NoArgs`] | [`ActiveDriversResult`] |
//! | `shut_service` | [`NoArgs`] | [`VoidResult`] |
//!
//! Result structs carry the return value in field 0 and the declared
//! exception, if any, in field 1.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::codec::{MessageWriter, TType, ThriftStruct, WireStruct};
use super::types::{
    ApplicationErrorKind, RemoteWebDriverException, Response, SpecNotFoundException,
};

// ============================================================================
// Method Names
// ============================================================================

/// Wire names of the remote methods.
pub mod method {
    /// Points the service at the remote WebDriver hub.
    pub const INITIALIZE: &str = "initialize";
    /// Executes one WebDriver command.
    pub const EXECUTE: &str = "execute";
    /// Validates the current page layout against specs.
    pub const CHECK_LAYOUT: &str = "check_layout";
    /// Writes the HTML report.
    pub const GENERATE_REPORT: &str = "generate_report";
    /// Counts live WebDriver sessions held by the service.
    pub const ACTIVE_DRIVERS: &str = "active_drivers";
    /// Terminates the service.
    pub const SHUT_SERVICE: &str = "shut_service";

    /// All method names.
    pub const ALL: [&str; 6] = [
        INITIALIZE,
        EXECUTE,
        CHECK_LAYOUT,
        GENERATE_REPORT,
        ACTIVE_DRIVERS,
        SHUT_SERVICE,
    ];
}

// ============================================================================
// ServiceResult
// ============================================================================

/// A result struct that resolves to the method's return value.
pub trait ServiceResult: ThriftStruct {
    /// Return type of the method.
    type Output;

    /// Extracts the return value or the declared failure.
    ///
    /// # Errors
    ///
    /// - The declared exception, translated to the crate error
    /// - [`Error::Application`] with `MISSING_RESULT` if the struct is empty
    fn into_output(self, method: &str) -> Result<Self::Output>;
}

fn missing_result(method: &str) -> Error {
    Error::application(
        method,
        ApplicationErrorKind::MissingResult,
        format!("{method} failed: unknown result"),
    )
}

// ============================================================================
// Args
// ============================================================================

/// Arguments of methods that take none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoArgs;

impl ThriftStruct for NoArgs {
    fn write(&self, writer: &mut MessageWriter) {
        writer.write_field_stop();
    }

    fn from_wire(_wire: &WireStruct) -> Result<Self> {
        Ok(Self)
    }
}

/// Arguments of `initialize`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitializeArgs {
    /// URL of the remote WebDriver hub.
    pub remote_server_addr: Option<String>,
}

impl ThriftStruct for InitializeArgs {
    fn write(&self, writer: &mut MessageWriter) {
        writer.write_opt_string_field(1, self.remote_server_addr.as_deref());
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        Ok(Self {
            remote_server_addr: wire.string(1)?,
        })
    }
}

/// Arguments of `execute`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteArgs {
    /// Bound session id, absent for `newSession`.
    pub session_id: Option<String>,
    /// WebDriver command name.
    pub command: Option<String>,
    /// JSON-encoded command parameters.
    pub params: Option<String>,
}

impl ThriftStruct for ExecuteArgs {
    fn write(&self, writer: &mut MessageWriter) {
        writer.write_opt_string_field(1, self.session_id.as_deref());
        writer.write_opt_string_field(2, self.command.as_deref());
        writer.write_opt_string_field(3, self.params.as_deref());
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        Ok(Self {
            session_id: wire.string(1)?,
            command: wire.string(2)?,
            params: wire.string(3)?,
        })
    }
}

/// Arguments of `check_layout`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckLayoutArgs {
    /// Name of the test the check belongs to.
    pub test_name: Option<String>,
    /// Session whose page is checked.
    pub webdriver_session_id: Option<String>,
    /// Serialized layout specs.
    pub specs: Option<String>,
    /// Tags to include.
    pub included_tags: Vec<String>,
    /// Tags to exclude.
    pub excluded_tags: Vec<String>,
}

impl ThriftStruct for CheckLayoutArgs {
    fn write(&self, writer: &mut MessageWriter) {
        writer.write_opt_string_field(1, self.test_name.as_deref());
        writer.write_opt_string_field(2, self.webdriver_session_id.as_deref());
        writer.write_opt_string_field(3, self.specs.as_deref());
        writer.write_string_list_field(4, &self.included_tags);
        writer.write_string_list_field(5, &self.excluded_tags);
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        Ok(Self {
            test_name: wire.string(1)?,
            webdriver_session_id: wire.string(2)?,
            specs: wire.string(3)?,
            included_tags: wire.string_list(4)?.unwrap_or_default(),
            excluded_tags: wire.string_list(5)?.unwrap_or_default(),
        })
    }
}

/// Arguments of `generate_report`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateReportArgs {
    /// Folder the report is written to.
    pub report_folder_path: Option<String>,
}

impl ThriftStruct for GenerateReportArgs {
    fn write(&self, writer: &mut MessageWriter) {
        writer.write_opt_string_field(1, self.report_folder_path.as_deref());
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        Ok(Self {
            report_folder_path: wire.string(1)?,
        })
    }
}

// ============================================================================
// Results
// ============================================================================

/// Result of methods returning nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoidResult;

impl ThriftStruct for VoidResult {
    fn write(&self, writer: &mut MessageWriter) {
        writer.write_field_stop();
    }

    fn from_wire(_wire: &WireStruct) -> Result<Self> {
        Ok(Self)
    }
}

impl ServiceResult for VoidResult {
    type Output = ();

    fn into_output(self, _method: &str) -> Result<()> {
        Ok(())
    }
}

/// Result of `execute`: exactly one of `success` or `exc` is expected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteResult {
    /// Success envelope.
    pub success: Option<Response>,
    /// Declared failure.
    pub exc: Option<RemoteWebDriverException>,
}

impl ExecuteResult {
    /// Creates a success result.
    #[must_use]
    pub fn success(response: Response) -> Self {
        Self {
            success: Some(response),
            exc: None,
        }
    }

    /// Creates a failure result.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: None,
            exc: Some(RemoteWebDriverException {
                message: Some(message.into()),
            }),
        }
    }
}

impl ThriftStruct for ExecuteResult {
    fn write(&self, writer: &mut MessageWriter) {
        if let Some(success) = &self.success {
            writer.write_struct_field(0, success);
        }
        if let Some(exc) = &self.exc {
            writer.write_struct_field(1, exc);
        }
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        Ok(Self {
            success: wire.structure(0).map(Response::from_wire).transpose()?,
            exc: wire
                .structure(1)
                .map(RemoteWebDriverException::from_wire)
                .transpose()?,
        })
    }
}

impl ServiceResult for ExecuteResult {
    type Output = Response;

    fn into_output(self, method: &str) -> Result<Response> {
        if let Some(success) = self.success {
            return Ok(success);
        }
        if let Some(exc) = self.exc {
            return Err(exc.into());
        }
        Err(missing_result(method))
    }
}

/// Result of `check_layout`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckLayoutResult {
    /// Number reported by the layout check.
    pub success: Option<i32>,
    /// Declared failure.
    pub exc: Option<SpecNotFoundException>,
}

impl ThriftStruct for CheckLayoutResult {
    fn write(&self, writer: &mut MessageWriter) {
        if let Some(success) = self.success {
            writer.write_field_begin(TType::I32, 0);
            writer.write_i32(success);
        }
        if let Some(exc) = &self.exc {
            writer.write_struct_field(1, exc);
        }
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        Ok(Self {
            success: wire.i32(0),
            exc: wire
                .structure(1)
                .map(SpecNotFoundException::from_wire)
                .transpose()?,
        })
    }
}

impl ServiceResult for CheckLayoutResult {
    type Output = i32;

    fn into_output(self, method: &str) -> Result<i32> {
        if let Some(success) = self.success {
            return Ok(success);
        }
        if let Some(exc) = self.exc {
            return Err(exc.into());
        }
        Err(missing_result(method))
    }
}

/// Result of `active_drivers`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActiveDriversResult {
    /// Number of live sessions.
    pub success: Option<i32>,
}

impl ThriftStruct for ActiveDriversResult {
    fn write(&self, writer: &mut MessageWriter) {
        if let Some(success) = self.success {
            writer.write_field_begin(TType::I32, 0);
            writer.write_i32(success);
        }
        writer.write_field_stop();
    }

    fn from_wire(wire: &WireStruct) -> Result<Self> {
        Ok(Self {
            success: wire.i32(0),
        })
    }
}

impl ServiceResult for ActiveDriversResult {
    type Output = i32;

    fn into_output(self, method: &str) -> Result<i32> {
        self.success.ok_or_else(|| missing_result(method))
    }
}

// ============================================================================
// Tests
// ============================================================================
