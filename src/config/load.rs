//! Parameter loading
//!
//! Parameters are layered, last wins:
//! 1. Built-in defaults
//! 2. A TOML parameter file (flat table, same keys as the `-p` flags)
//! 3. Command-line `key=value` overrides

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ConfigError, MockParams};

/// Origin of a parameter layer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

/// Parameters together with the layers they were built from
#[derive(Debug, Clone)]
pub struct LoadedParams {
    pub params: MockParams,
    pub sources: Vec<ConfigSource>,
}

impl LoadedParams {
    /// Load parameters from an optional file and `key=value` overrides.
    pub fn load(config_path: Option<&Path>, overrides: &[String]) -> Result<Self, ConfigError> {
        let mut merged = Map::new();
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
        }];

        if let Some(path) = config_path {
            let table = load_toml_file(path)?;
            overlay(&mut merged, table);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path.to_string_lossy().to_string()),
            });
        }

        if !overrides.is_empty() {
            let mut cli = Map::new();
            for raw in overrides {
                let (key, value) = parse_override(raw)?;
                cli.insert(key, value);
            }
            overlay(&mut merged, cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
            });
        }

        let params = MockParams::from_parameters(&merged)?;
        Ok(Self { params, sources })
    }

    /// Effective parameters plus provenance, as printed by `portal-mock params`
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "params": self.params.to_value(),
            "sources": self.sources,
        })
    }
}

fn overlay(base: &mut Map<String, Value>, layer: Map<String, Value>) {
    for (key, value) in layer {
        base.insert(key, value);
    }
}

/// Parse a `key=value` override.
///
/// The value is read as JSON when it parses (`delay=0`, `response=1`),
/// and as a plain string otherwise (`response=cancelled`).
pub fn parse_override(raw: &str) -> Result<(String, Value), ConfigError> {
    let (key, value) = raw.split_once('=').ok_or_else(|| {
        ConfigError::ParseError(format!("expected key=value, got '{}'", raw))
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ConfigError::ParseError(format!("empty key in '{}'", raw)));
    }
    let value = value.trim();
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), parsed))
}

/// Load a flat TOML parameter table
fn load_toml_file(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

    let table: toml::Table = toml::from_str(&contents)
        .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

    match toml_to_json(toml::Value::Table(table)) {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::ParseError(
            "parameter file must be a table".to_string(),
        )),
    }
}

/// Convert TOML Value to JSON Value
fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(arr) => Value::Array(arr.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}
