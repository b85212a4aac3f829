//! Method calls sent by portal clients.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Options;

/// Methods exposed by the RemoteDesktop interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    CreateSession,
    SelectDevices,
    Start,
    #[serde(rename = "ConnectToEIS")]
    ConnectToEis,
    NotifyPointerMotion,
    NotifyPointerMotionAbsolute,
    NotifyPointerButton,
    NotifyPointerAxis,
    NotifyPointerAxisDiscrete,
    NotifyKeyboardKeycode,
    NotifyKeyboardKeysym,
    NotifyTouchDown,
    NotifyTouchMotion,
    NotifyTouchUp,
    /// `org.freedesktop.DBus.Properties.GetAll` on the portal interface
    GetProperties,
}

impl Method {
    /// Name as it appears on the bus.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::CreateSession => "CreateSession",
            Method::SelectDevices => "SelectDevices",
            Method::Start => "Start",
            Method::ConnectToEis => "ConnectToEIS",
            Method::NotifyPointerMotion => "NotifyPointerMotion",
            Method::NotifyPointerMotionAbsolute => "NotifyPointerMotionAbsolute",
            Method::NotifyPointerButton => "NotifyPointerButton",
            Method::NotifyPointerAxis => "NotifyPointerAxis",
            Method::NotifyPointerAxisDiscrete => "NotifyPointerAxisDiscrete",
            Method::NotifyKeyboardKeycode => "NotifyKeyboardKeycode",
            Method::NotifyKeyboardKeysym => "NotifyKeyboardKeysym",
            Method::NotifyTouchDown => "NotifyTouchDown",
            Method::NotifyTouchMotion => "NotifyTouchMotion",
            Method::NotifyTouchUp => "NotifyTouchUp",
            Method::GetProperties => "GetProperties",
        }
    }

    /// Returns true for methods that answer with a request handle and
    /// complete later through a `Response` signal
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Method::CreateSession | Method::SelectDevices | Method::Start
        )
    }

    /// Returns true for the fire-and-forget input notifications
    pub fn is_notification(&self) -> bool {
        self.as_str().starts_with("Notify")
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A method call with its arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args")]
pub enum Call {
    CreateSession {
        #[serde(default)]
        options: Options,
    },
    SelectDevices {
        session_handle: String,
        #[serde(default)]
        options: Options,
    },
    Start {
        session_handle: String,
        #[serde(default)]
        parent_window: String,
        #[serde(default)]
        options: Options,
    },
    #[serde(rename = "ConnectToEIS")]
    ConnectToEis {
        session_handle: String,
        #[serde(default)]
        options: Options,
    },
    NotifyPointerMotion {
        session_handle: String,
        #[serde(default)]
        options: Options,
        dx: f64,
        dy: f64,
    },
    NotifyPointerMotionAbsolute {
        session_handle: String,
        #[serde(default)]
        options: Options,
        stream: u32,
        x: f64,
        y: f64,
    },
    NotifyPointerButton {
        session_handle: String,
        #[serde(default)]
        options: Options,
        button: i32,
        state: u32,
    },
    NotifyPointerAxis {
        session_handle: String,
        #[serde(default)]
        options: Options,
        dx: f64,
        dy: f64,
    },
    NotifyPointerAxisDiscrete {
        session_handle: String,
        #[serde(default)]
        options: Options,
        axis: u32,
        steps: i32,
    },
    NotifyKeyboardKeycode {
        session_handle: String,
        #[serde(default)]
        options: Options,
        keycode: i32,
        state: u32,
    },
    NotifyKeyboardKeysym {
        session_handle: String,
        #[serde(default)]
        options: Options,
        keysym: i32,
        state: u32,
    },
    NotifyTouchDown {
        session_handle: String,
        #[serde(default)]
        options: Options,
        stream: u32,
        slot: u32,
        x: f64,
        y: f64,
    },
    NotifyTouchMotion {
        session_handle: String,
        #[serde(default)]
        options: Options,
        stream: u32,
        slot: u32,
        x: f64,
        y: f64,
    },
    NotifyTouchUp {
        session_handle: String,
        #[serde(default)]
        options: Options,
        slot: u32,
    },
    GetProperties,
}

impl Call {
    /// The method this call invokes
    pub fn method(&self) -> Method {
        match self {
            Call::CreateSession { .. } => Method::CreateSession,
            Call::SelectDevices { .. } => Method::SelectDevices,
            Call::Start { .. } => Method::Start,
            Call::ConnectToEis { .. } => Method::ConnectToEis,
            Call::NotifyPointerMotion { .. } => Method::NotifyPointerMotion,
            Call::NotifyPointerMotionAbsolute { .. } => Method::NotifyPointerMotionAbsolute,
            Call::NotifyPointerButton { .. } => Method::NotifyPointerButton,
            Call::NotifyPointerAxis { .. } => Method::NotifyPointerAxis,
            Call::NotifyPointerAxisDiscrete { .. } => Method::NotifyPointerAxisDiscrete,
            Call::NotifyKeyboardKeycode { .. } => Method::NotifyKeyboardKeycode,
            Call::NotifyKeyboardKeysym { .. } => Method::NotifyKeyboardKeysym,
            Call::NotifyTouchDown { .. } => Method::NotifyTouchDown,
            Call::NotifyTouchMotion { .. } => Method::NotifyTouchMotion,
            Call::NotifyTouchUp { .. } => Method::NotifyTouchUp,
            Call::GetProperties => Method::GetProperties,
        }
    }
}

/// Call envelope: one JSON object per line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallEnvelope {
    /// Caller-chosen serial, echoed in the reply
    pub serial: u64,
    pub call: Call,
}

impl CallEnvelope {
    pub fn new(serial: u64, call: Call) -> Self {
        Self { serial, call }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_parsing() {
        let line = r#"{"serial":7,"call":{"method":"Start","args":{"session_handle":"/s/1","parent_window":"x11:1","options":{"handle_token":"t"}}}}"#;
        let envelope: CallEnvelope = serde_json::from_str(line).unwrap();
        assert_eq!(envelope.serial, 7);
        match envelope.call {
            Call::Start {
                session_handle,
                parent_window,
                options,
            } => {
                assert_eq!(session_handle, "/s/1");
                assert_eq!(parent_window, "x11:1");
                assert_eq!(options["handle_token"], json!("t"));
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_call_options_default_to_empty() {
        let line = r#"{"serial":1,"call":{"method":"CreateSession","args":{}}}"#;
        let envelope: CallEnvelope = serde_json::from_str(line).unwrap();
        assert_eq!(envelope.call, Call::CreateSession { options: Options::new() });
    }

    #[test]
    fn test_connect_to_eis_wire_name() {
        let call = Call::ConnectToEis {
            session_handle: "/s/1".to_string(),
            options: Options::new(),
        };
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["method"], "ConnectToEIS");
        assert_eq!(call.method().as_str(), "ConnectToEIS");
    }

    #[test]
    fn test_get_properties_without_args() {
        let envelope: CallEnvelope =
            serde_json::from_str(r#"{"serial":3,"call":{"method":"GetProperties"}}"#).unwrap();
        assert_eq!(envelope.call, Call::GetProperties);
    }

    #[test]
    fn test_method_classification() {
        assert!(Method::CreateSession.is_request());
        assert!(!Method::ConnectToEis.is_request());
        assert!(Method::NotifyTouchUp.is_notification());
        assert!(!Method::Start.is_notification());
    }
}
