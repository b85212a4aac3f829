//! Mock parameters
//!
//! The parameter set a portal instance is built with. Constructed once at
//! load time, then shared read-only by every component.

use std::time::Duration;

use portal_protocol::{DeviceTypes, Properties, ResponseCode};
use serde_json::{Map, Value};

use super::ConfigError;

/// Default accept-to-completion latency in milliseconds
pub const DEFAULT_DELAY_MS: u64 = 500;

/// Default published interface version
pub const DEFAULT_VERSION: u32 = 2;

/// Parameter keys understood by [`MockParams::from_parameters`]
pub const KNOWN_KEYS: &[&str] = &["delay", "version", "response", "devices", "device-types"];

/// Process-wide parameters of the mock portal
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockParams {
    /// Time between accepting a request and emitting its `Response`
    pub delay: Duration,

    /// Published as the `version` property
    pub version: u32,

    /// Response code of every simulated completion
    pub response: ResponseCode,

    /// Device mask returned in the `devices` result of `Start`
    pub devices: DeviceTypes,

    /// Published as `AvailableDeviceTypes`, independent from `devices`
    pub available_device_types: DeviceTypes,
}

impl Default for MockParams {
    fn default() -> Self {
        Self {
            delay: Duration::from_millis(DEFAULT_DELAY_MS),
            version: DEFAULT_VERSION,
            response: ResponseCode::Success,
            devices: DeviceTypes::ALL,
            available_device_types: DeviceTypes::ALL,
        }
    }
}

impl MockParams {
    /// Build parameters from a flat key/value map.
    ///
    /// Missing keys take their defaults; `device-types` falls back to
    /// whatever `devices` resolved to. Unknown keys are ignored with a
    /// warning.
    pub fn from_parameters(parameters: &Map<String, Value>) -> Result<Self, ConfigError> {
        for key in parameters.keys() {
            if !KNOWN_KEYS.contains(&key.as_str()) {
                tracing::warn!(key = %key, "ignoring unknown mock parameter");
            }
        }

        let delay_ms = match parameters.get("delay") {
            Some(value) => as_u64("delay", value)?,
            None => DEFAULT_DELAY_MS,
        };

        let version = match parameters.get("version") {
            Some(value) => as_u32("version", value)?,
            None => DEFAULT_VERSION,
        };
        if version == 0 {
            return Err(ConfigError::ValidationError(
                "version must be a positive integer".to_string(),
            ));
        }

        let response = match parameters.get("response") {
            Some(value) => parse_response(value)?,
            None => ResponseCode::Success,
        };

        let devices = match parameters.get("devices") {
            Some(value) => parse_devices("devices", value)?,
            None => DeviceTypes::ALL,
        };

        let available_device_types = match parameters.get("device-types") {
            Some(value) => parse_devices("device-types", value)?,
            None => devices,
        };

        Ok(Self {
            delay: Duration::from_millis(delay_ms),
            version,
            response,
            devices,
            available_device_types,
        })
    }

    /// Builder-style delay override, mostly for tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_response(mut self, response: ResponseCode) -> Self {
        self.response = response;
        self
    }

    /// Set the `Start` device mask; the published mask follows it.
    pub fn with_devices(mut self, devices: DeviceTypes) -> Self {
        self.devices = devices;
        self.available_device_types = devices;
        self
    }

    /// Override only the published `AvailableDeviceTypes`
    pub fn with_available_device_types(mut self, devices: DeviceTypes) -> Self {
        self.available_device_types = devices;
        self
    }

    /// Properties published on the portal object
    pub fn properties(&self) -> Properties {
        Properties {
            version: self.version,
            available_device_types: self.available_device_types,
        }
    }

    /// Convert to the flat parameter form accepted by [`Self::from_parameters`]
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "delay": self.delay.as_millis() as u64,
            "version": self.version,
            "response": self.response.as_u32(),
            "devices": self.devices.bits(),
            "device-types": self.available_device_types.bits(),
        })
    }
}

fn as_u64(key: &str, value: &Value) -> Result<u64, ConfigError> {
    value.as_u64().ok_or_else(|| {
        ConfigError::ValidationError(format!(
            "{} must be a non-negative integer, got {}",
            key, value
        ))
    })
}

fn as_u32(key: &str, value: &Value) -> Result<u32, ConfigError> {
    let raw = as_u64(key, value)?;
    u32::try_from(raw)
        .map_err(|_| ConfigError::ValidationError(format!("{} is out of range: {}", key, raw)))
}

fn parse_response(value: &Value) -> Result<ResponseCode, ConfigError> {
    match value {
        Value::String(s) => s
            .parse::<ResponseCode>()
            .map_err(|e| ConfigError::ValidationError(format!("response: {}", e))),
        other => ResponseCode::try_from(as_u32("response", other)?)
            .map_err(|e| ConfigError::ValidationError(format!("response: {}", e))),
    }
}

fn parse_devices(key: &str, value: &Value) -> Result<DeviceTypes, ConfigError> {
    let bits = as_u32(key, value)?;
    DeviceTypes::from_bits(bits).ok_or_else(|| {
        ConfigError::ValidationError(format!(
            "{} has unknown device bits: {:#b} (allowed: {:#b})",
            key,
            bits,
            DeviceTypes::ALL.bits()
        ))
    })
}
