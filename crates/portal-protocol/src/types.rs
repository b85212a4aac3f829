//! Value types carried by calls, replies and signals.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Caller-supplied `a{sv}` options.
pub type Options = BTreeMap<String, serde_json::Value>;

/// `a{sv}` results carried by a `Response` signal.
pub type Results = BTreeMap<String, serde_json::Value>;

/// Response code of a completed request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum ResponseCode {
    /// The interaction succeeded
    #[default]
    Success,
    /// The user cancelled the interaction
    Cancelled,
    /// The interaction ended in some other way
    Other,
}

impl ResponseCode {
    /// Numeric value used on the wire.
    pub fn as_u32(self) -> u32 {
        match self {
            ResponseCode::Success => 0,
            ResponseCode::Cancelled => 1,
            ResponseCode::Other => 2,
        }
    }

    /// Lowercase name, as accepted in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            ResponseCode::Success => "success",
            ResponseCode::Cancelled => "cancelled",
            ResponseCode::Other => "other",
        }
    }
}

impl From<ResponseCode> for u32 {
    fn from(code: ResponseCode) -> Self {
        code.as_u32()
    }
}

impl TryFrom<u32> for ResponseCode {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ResponseCode::Success),
            1 => Ok(ResponseCode::Cancelled),
            2 => Ok(ResponseCode::Other),
            other => Err(format!("response code {} is outside 0..=2", other)),
        }
    }
}

impl FromStr for ResponseCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "success" => Ok(ResponseCode::Success),
            "cancelled" | "canceled" => Ok(ResponseCode::Cancelled),
            "other" => Ok(ResponseCode::Other),
            _ => s
                .parse::<u32>()
                .map_err(|_| format!("unknown response code '{}'", s))
                .and_then(ResponseCode::try_from),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bitmask of simulated input device classes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceTypes(u32);

impl DeviceTypes {
    pub const NONE: DeviceTypes = DeviceTypes(0);
    pub const KEYBOARD: DeviceTypes = DeviceTypes(1);
    pub const POINTER: DeviceTypes = DeviceTypes(2);
    pub const TOUCHSCREEN: DeviceTypes = DeviceTypes(4);
    pub const ALL: DeviceTypes = DeviceTypes(0b111);

    /// Build a mask from raw bits, rejecting unknown device classes.
    pub fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL.0 == 0 {
            Some(DeviceTypes(bits))
        } else {
            None
        }
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: DeviceTypes) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DeviceTypes {
    type Output = DeviceTypes;

    fn bitor(self, rhs: DeviceTypes) -> DeviceTypes {
        DeviceTypes(self.0 | rhs.0)
    }
}

impl fmt::Display for DeviceTypes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = [
            (DeviceTypes::KEYBOARD, "keyboard"),
            (DeviceTypes::POINTER, "pointer"),
            (DeviceTypes::TOUCHSCREEN, "touchscreen"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        write!(f, "{}", names.join("|"))
    }
}

/// Read-only properties published by the portal object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    pub version: u32,
    #[serde(rename = "AvailableDeviceTypes")]
    pub available_device_types: DeviceTypes,
}
