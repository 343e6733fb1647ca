//! Response adaptation.
//!
//! Turns a success [`Response`] into the flat [`CommandResult`] a WebDriver
//! caller expects. Declared failures never reach the adapter: they surface
//! as [`crate::Error::RemoteWebDriver`], whose message is the remote text.
//!
//! # Value Arms
//!
//! | Arm | [`ResponseAdapter::SetOnly`] | [`ResponseAdapter::AllArms`] |
//! |-----|------------------------------|------------------------------|
//! | set of strings | JSON array | JSON array |
//! | string | `null` | JSON string |
//! | boolean | `null` | JSON bool |
//! | none | `null` | `null` |
//!
//! Whatever the adapter, [`CommandResult::raw_value`] keeps the decoded arm.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::{Response, ResponseValue};

// ============================================================================
// Constants
// ============================================================================

/// WebDriver status code of a successful command.
pub const STATUS_SUCCESS: i32 = 0;

// ============================================================================
// CommandResult
// ============================================================================

/// Result of one WebDriver command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    /// WebDriver status code. An absent status reads as success.
    pub status: i32,
    /// Session id reported by the remote end.
    pub session_id: Option<String>,
    /// WebDriver state string, empty when absent.
    pub state: String,
    /// Adapted value.
    pub value: Value,
    #[serde(skip)]
    raw: Option<ResponseValue>,
}

impl CommandResult {
    /// Returns `true` if the status is success.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }

    /// Returns the decoded value arm, regardless of the adapter.
    #[inline]
    #[must_use]
    pub fn raw_value(&self) -> Option<&ResponseValue> {
        self.raw.as_ref()
    }

    /// Returns the string arm, if that arm was sent.
    #[inline]
    #[must_use]
    pub fn raw_str(&self) -> Option<&str> {
        self.raw.as_ref().and_then(ResponseValue::as_str)
    }

    /// Consumes the result, returning the adapted value.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }
}

// ============================================================================
// ResponseAdapter
// ============================================================================

/// Strategy for unwrapping the value union.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseAdapter {
    /// Consult only the set arm.
    #[default]
    SetOnly,
    /// Consult every arm.
    AllArms,
}

impl ResponseAdapter {
    /// Adapts a success envelope.
    #[must_use]
    pub fn adapt(self, response: Response) -> CommandResult {
        let value = self.value_of(response.value.as_ref());

        CommandResult {
            status: response.status.unwrap_or(STATUS_SUCCESS),
            session_id: response.session_id,
            state: response.state.unwrap_or_default(),
            value,
            raw: response.value,
        }
    }

    fn value_of(self, value: Option<&ResponseValue>) -> Value {
        match (self, value) {
            (_, Some(ResponseValue::Set(items))) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            (Self::AllArms, Some(ResponseValue::String(text))) => Value::String(text.clone()),
            (Self::AllArms, Some(ResponseValue::Bool(flag))) => Value::Bool(*flag),
            _ => Value::Null,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn envelope(value: Option<ResponseValue>) -> Response {
        Response {
            value,
            session_id: Some("abc123".into()),
            status: Some(0),
            state: Some("success".into()),
        }
    }

    #[test]
    fn test_set_arm_becomes_value() {
        let result = ResponseAdapter::SetOnly.adapt(envelope(Some(ResponseValue::set(["a", "b"]))));

        assert_eq!(result.value, json!(["a", "b"]));
        assert_eq!(result.status, 0);
        assert_eq!(result.session_id.as_deref(), Some("abc123"));
        assert_eq!(result.state, "success");
        assert!(result.is_success());
    }

    #[test]
    fn test_no_arm_is_null() {
        let result = ResponseAdapter::SetOnly.adapt(envelope(None));
        assert!(result.value.is_null());
        assert!(result.raw_value().is_none());
    }

    #[test]
    fn test_set_only_ignores_scalar_arms() {
        let result = ResponseAdapter::SetOnly
            .adapt(envelope(Some(ResponseValue::String("Example Domain".into()))));

        assert!(result.value.is_null());
        assert_eq!(result.raw_str(), Some("Example Domain"));
    }

    #[test]
    fn test_all_arms() {
        let adapter = ResponseAdapter::AllArms;

        let text = adapter.adapt(envelope(Some(ResponseValue::String("t".into()))));
        assert_eq!(text.value, json!("t"));

        let flag = adapter.adapt(envelope(Some(ResponseValue::Bool(true))));
        assert_eq!(flag.value, json!(true));

        let set = adapter.adapt(envelope(Some(ResponseValue::set(["x"]))));
        assert_eq!(set.value, json!(["x"]));
    }

    #[test]
    fn test_missing_fields_default() {
        let result = ResponseAdapter::default().adapt(Response::default());
        assert_eq!(result.status, STATUS_SUCCESS);
        assert!(result.session_id.is_none());
        assert!(result.state.is_empty());
    }

    #[test]
    fn test_serializes_flat_shape() {
        let result = ResponseAdapter::SetOnly.adapt(envelope(Some(ResponseValue::set(["a"]))));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            json!({"status": 0, "sessionId": "abc123", "state": "success", "value": ["a"]})
        );
    }
}
