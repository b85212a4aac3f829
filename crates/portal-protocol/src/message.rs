//! Messages sent by the portal to its clients.

use serde::{Deserialize, Serialize};

use crate::error::WireError;
use crate::types::{Properties, ResponseCode, Results};

/// Anything the server writes to a client connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection: the caller's unique name
    Hello { sender: String },
    /// Method return for the call with the same serial
    Reply { serial: u64, body: ReplyBody },
    /// `org.freedesktop.portal.Request::Response` emitted on a request handle
    Signal(ResponseSignal),
    /// The call could not be decoded; never sent for portal-level faults
    Error(WireError),
}

/// Return value of a method call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyBody {
    /// Object path of a request (`o`)
    Handle { value: String },
    /// A Unix descriptor (`h`) rides in the ancillary data of this message
    Fd,
    /// Methods without a return value
    Unit,
    Properties(Properties),
    /// The portal absorbed a fault and produced no result
    None,
}

impl ReplyBody {
    /// The request handle, if this reply carries one
    pub fn handle(&self) -> Option<&str> {
        match self {
            ReplyBody::Handle { value } => Some(value),
            _ => None,
        }
    }
}

/// Completion of a request, delivered after the configured delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseSignal {
    /// Request handle the signal is emitted on
    pub handle: String,
    pub response: ResponseCode,
    #[serde(default)]
    pub results: Results,
}
