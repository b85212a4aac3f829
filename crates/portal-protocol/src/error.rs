//! Transport-level errors.
//!
//! Portal faults never surface here: they are absorbed by the portal and
//! answered with an empty reply. These codes only cover input the server
//! could not decode at all.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error codes sent in `error` messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed JSON or missing envelope fields
    InvalidRequest,
    /// Method name not part of the interface
    UnknownMethod,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::UnknownMethod => "UNKNOWN_METHOD",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error message payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    /// Serial of the offending call, when it could be recovered
    pub serial: Option<u64>,
    pub code: ErrorCode,
    /// Human-readable, single-line message
    pub message: String,
}

impl WireError {
    pub fn new(serial: Option<u64>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            serial,
            code,
            message: message.into(),
        }
    }

    /// Classify a decode failure of a call line.
    ///
    /// Lines that are valid JSON with a readable `call.method` naming no
    /// known method map to `UNKNOWN_METHOD`; everything else is
    /// `INVALID_REQUEST`.
    pub fn from_decode_failure(line: &str, err: &serde_json::Error) -> Self {
        let value: Option<serde_json::Value> = serde_json::from_str(line).ok();
        let serial = value
            .as_ref()
            .and_then(|v| v.get("serial"))
            .and_then(|s| s.as_u64());
        let method = value
            .as_ref()
            .and_then(|v| v.pointer("/call/method"))
            .and_then(|m| m.as_str())
            .map(str::to_string);

        match method {
            Some(name) if serde_json::from_value::<crate::Method>(name.clone().into()).is_err() => {
                Self::new(serial, ErrorCode::UnknownMethod, format!("unknown method: {}", name))
            }
            _ => Self::new(serial, ErrorCode::InvalidRequest, format!("invalid call: {}", err)),
        }
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for WireError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CallEnvelope;

    fn decode_error(line: &str) -> WireError {
        let err = serde_json::from_str::<CallEnvelope>(line).unwrap_err();
        WireError::from_decode_failure(line, &err)
    }

    #[test]
    fn test_malformed_json() {
        let err = decode_error("{not json");
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert_eq!(err.serial, None);
    }

    #[test]
    fn test_unknown_method_keeps_serial() {
        let err = decode_error(r#"{"serial":9,"call":{"method":"Explode","args":{}}}"#);
        assert_eq!(err.code, ErrorCode::UnknownMethod);
        assert_eq!(err.serial, Some(9));
        assert!(err.message.contains("Explode"));
    }

    #[test]
    fn test_missing_argument_is_invalid_request() {
        let err = decode_error(r#"{"serial":5,"call":{"method":"SelectDevices","args":{}}}"#);
        assert_eq!(err.code, ErrorCode::InvalidRequest);
        assert_eq!(err.serial, Some(5));
    }

    #[test]
    fn test_error_code_serialization() {
        let json = serde_json::to_string(&ErrorCode::UnknownMethod).unwrap();
        assert_eq!(json, "\"UNKNOWN_METHOD\"");
    }
}
