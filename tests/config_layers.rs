//! Parameter loading feeding a live portal

mod fixtures;

use std::io::Write;
use std::sync::Arc;

use fixtures::*;
use portal_mock::config::{ConfigError, ConfigOrigin};
use portal_mock::{LoadedParams, RemoteDesktop};
use portal_protocol::{DeviceTypes, ResponseCode};
use serde_json::json;
use tempfile::NamedTempFile;

fn param_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_file_and_overrides_drive_the_portal() {
    let file = param_file("delay = 0\nresponse = \"cancelled\"\ndevices = 1\n\"device-types\" = 7\n");
    let loaded = LoadedParams::load(Some(file.path()), &["version=5".to_string()]).unwrap();

    let origins: Vec<ConfigOrigin> = loaded.sources.iter().map(|s| s.origin.clone()).collect();
    assert_eq!(origins, vec![ConfigOrigin::Builtin, ConfigOrigin::File, ConfigOrigin::Cli]);

    let portal = RemoteDesktop::new(Arc::new(loaded.params)).unwrap();
    let props = portal.properties();
    assert_eq!(props.version, 5);
    assert_eq!(props.available_device_types, DeviceTypes::ALL);

    let rx = portal.subscribe();
    portal.start(SENDER, "/s", "", options()).unwrap();
    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.response, ResponseCode::Cancelled);
    assert_eq!(completion.results["devices"], json!(1));
}

#[test]
fn test_cli_override_beats_file() {
    let file = param_file("delay = 250\n");
    let loaded = LoadedParams::load(Some(file.path()), &["delay=0".to_string()]).unwrap();
    assert!(loaded.params.delay.is_zero());
}

#[test]
fn test_invalid_values_are_config_errors() {
    let err = LoadedParams::load(None, &["devices=64".to_string()]).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)), "got {:?}", err);

    let err = LoadedParams::load(None, &["version=0".to_string()]).unwrap_err();
    assert!(matches!(err, ConfigError::ValidationError(_)));

    let err = LoadedParams::load(None, &["nonsense".to_string()]).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}
