//! Request lifecycle tests
//!
//! Handles are returned synchronously, completions follow after the
//! configured delay, and every accepted request completes exactly once.

mod fixtures;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use fixtures::*;
use portal_mock::mock::SessionState;
use portal_mock::{MockParams, ResponseOverride};
use portal_protocol::{DeviceTypes, Method, ResponseCode, REQUEST_PATH_PREFIX};
use serde_json::json;

// =============================================================================
// Handles and completions
// =============================================================================

#[test]
fn test_create_session_handles_are_distinct_and_resolve_once() {
    let portal = portal(instant_params());
    let rx = portal.subscribe();

    let handles: Vec<String> = (0..50)
        .map(|_| portal.create_session(SENDER, options()).unwrap())
        .collect();
    let unique: HashSet<&String> = handles.iter().collect();
    assert_eq!(unique.len(), handles.len(), "request handles must be pairwise distinct");

    let mut completed = HashSet::new();
    for _ in 0..handles.len() {
        let completion = rx.recv_timeout(WAIT).expect("every request should complete");
        assert!(completed.insert(completion.handle), "no request may complete twice");
    }
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err(), "no extra completions");
    assert_eq!(completed, handles.into_iter().collect::<HashSet<_>>());
}

#[test]
fn test_session_handles_are_distinct_without_tokens() {
    let portal = portal(instant_params());
    for _ in 0..10 {
        portal.create_session(SENDER, options()).unwrap();
    }
    assert_eq!(portal.session_handles().len(), 10);
}

#[test]
fn test_request_handle_uses_token() {
    let portal = portal(instant_params());
    let handle = portal.create_session(":1.42", request_token("create1")).unwrap();
    assert_eq!(handle, format!("{}/1_42/create1", REQUEST_PATH_PREFIX));

    // Same token again falls back to a fresh suffix
    let again = portal.create_session(":1.42", request_token("create1")).unwrap();
    assert_ne!(again, handle);
    assert!(again.starts_with(&format!("{}/1_42/create1", REQUEST_PATH_PREFIX)));
}

#[test]
fn test_elapsed_time_respects_delay() {
    let delay = Duration::from_millis(150);
    let portal = portal(MockParams::default().with_delay(delay));
    let rx = portal.subscribe();

    let accepted = Instant::now();
    let handle = portal.create_session(SENDER, options()).unwrap();
    assert!(accepted.elapsed() < delay, "the call must not wait for its own delay");
    assert_eq!(portal.outstanding_requests(), 1);

    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.handle, handle);
    assert!(completion.elapsed() >= delay);
    assert!(accepted.elapsed() >= delay);
    assert_eq!(portal.outstanding_requests(), 0);
}

#[test]
fn test_zero_delay_completes_immediately_with_empty_success() {
    let portal = portal(instant_params().with_response(ResponseCode::Success));
    let rx = portal.subscribe();

    let handle = portal.create_session(SENDER, options()).expect("request handle");
    let completion = rx.recv_timeout(Duration::from_millis(500)).unwrap();

    assert_eq!(completion.handle, handle);
    assert_eq!(completion.response, ResponseCode::Success);
    assert!(completion.results.is_empty());

    let request = portal.request(&handle).unwrap();
    assert!(request.is_resolved());
    assert_eq!(request.method, Method::CreateSession);
}

#[test]
fn test_configured_response_code_applies_to_all_requests() {
    let portal = portal(instant_params().with_response(ResponseCode::Cancelled));
    let rx = portal.subscribe();

    let session = create_session(&portal, SENDER, "s");
    rx.recv_timeout(WAIT).unwrap();
    portal.select_devices(SENDER, &session, options()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().response, ResponseCode::Cancelled);
}

// =============================================================================
// Session-scoped requests
// =============================================================================

#[test]
fn test_select_and_start_on_created_session() {
    let portal = portal(instant_params());
    let rx = portal.subscribe();

    let session = create_session(&portal, SENDER, "lifecycle");
    rx.recv_timeout(WAIT).unwrap();

    let mut select_options = options();
    select_options.insert("types".to_string(), json!(DeviceTypes::KEYBOARD.bits()));
    let select = portal.select_devices(SENDER, &session, select_options.clone()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().handle, select);

    let start = portal.start(SENDER, &session, "x11:0x1", options()).unwrap();
    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.handle, start);
    assert_eq!(completion.response, ResponseCode::Success);

    let record = portal.session(&session).unwrap();
    assert_eq!(record.state, SessionState::Started);
    assert_eq!(record.selected_devices, Some(select_options));
}

#[test]
fn test_start_devices_equal_configured_mask() {
    let devices = DeviceTypes::POINTER | DeviceTypes::KEYBOARD;
    let portal = portal(instant_params().with_devices(devices));
    let rx = portal.subscribe();

    let session = create_session(&portal, SENDER, "mask");
    rx.recv_timeout(WAIT).unwrap();
    portal.start(SENDER, &session, "", options()).unwrap();

    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.results["devices"], json!(3));
    assert_eq!(completion.results["devices"], json!(devices.bits()));
}

#[test]
fn test_device_types_do_not_affect_start_result() {
    let params = instant_params()
        .with_devices(DeviceTypes::TOUCHSCREEN)
        .with_available_device_types(DeviceTypes::ALL);
    let portal = portal(params);
    let rx = portal.subscribe();

    assert_eq!(portal.properties().available_device_types, DeviceTypes::ALL);
    portal.start(SENDER, "/org/freedesktop/portal/desktop/session/1_7/x", "", options()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap().results["devices"], json!(4));
}

// =============================================================================
// Permissive handling of unknown sessions
// =============================================================================

#[test]
fn test_unknown_session_is_permissive() {
    let portal = portal(instant_params());
    let rx = portal.subscribe();

    let known = create_session(&portal, SENDER, "known");
    rx.recv_timeout(WAIT).unwrap();

    let bogus = "/org/freedesktop/portal/desktop/session/9_9/nope";
    let select = portal.select_devices(SENDER, bogus, options());
    let start = portal.start(SENDER, bogus, "", options());
    assert!(select.is_some(), "unknown session still gets a request handle");
    assert!(start.is_some());

    let handles: HashSet<String> = (0..2).map(|_| rx.recv_timeout(WAIT).unwrap().handle).collect();
    assert!(handles.contains(&select.unwrap()));
    assert!(handles.contains(&start.unwrap()));

    // The registered session is untouched and no phantom session appeared
    assert_eq!(portal.session_handles(), vec![known.clone()]);
    assert_eq!(portal.session(&known).unwrap().state, SessionState::Created);
}

// =============================================================================
// Response injection
// =============================================================================

#[test]
fn test_injected_cancelled_response() {
    let portal = portal(instant_params());
    let rx = portal.subscribe();
    portal.inject(Method::Start, ResponseOverride::response(ResponseCode::Cancelled));

    let session = create_session(&portal, SENDER, "c");
    assert_eq!(rx.recv_timeout(WAIT).unwrap().response, ResponseCode::Success);

    portal.start(SENDER, &session, "", options()).unwrap();
    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.response, ResponseCode::Cancelled);
    assert_eq!(completion.results["devices"], json!(DeviceTypes::ALL.bits()));
}

#[test]
fn test_injected_fault_yields_no_handle_and_no_completion() {
    let portal = portal(instant_params());
    let rx = portal.subscribe();
    portal.inject(Method::SelectDevices, ResponseOverride::fault("simulated failure"));

    let session = create_session(&portal, SENDER, "f");
    rx.recv_timeout(WAIT).unwrap();

    assert!(portal.select_devices(SENDER, &session, options()).is_none());
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(portal.session(&session).unwrap().state, SessionState::Created);

    // The portal keeps serving other methods
    assert!(portal.start(SENDER, &session, "", options()).is_some());
}

#[test]
fn test_injected_delay_for_one_call() {
    let portal = portal(instant_params());
    let rx = portal.subscribe();
    portal.inject(
        Method::CreateSession,
        ResponseOverride::delay(Duration::from_millis(100)).with_count(1),
    );

    let slow = portal.create_session(SENDER, options()).unwrap();
    let fast = portal.create_session(SENDER, options()).unwrap();

    // The second request overtakes the delayed first one
    assert_eq!(rx.recv_timeout(WAIT).unwrap().handle, fast);
    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.handle, slow);
    assert!(completion.elapsed() >= Duration::from_millis(100));
}

// =============================================================================
// Disconnect
// =============================================================================

#[test]
fn test_disconnect_removes_only_that_callers_sessions() {
    let portal = portal(instant_params());
    let rx = portal.subscribe();

    let mine = create_session(&portal, ":1.1", "a");
    let theirs = create_session(&portal, ":1.2", "b");
    rx.recv_timeout(WAIT).unwrap();
    rx.recv_timeout(WAIT).unwrap();

    portal.disconnect(":1.1");
    assert!(portal.session(&mine).is_none());
    assert!(portal.session(&theirs).is_some());
}

#[test]
fn test_pending_request_still_completes_after_disconnect() {
    let portal = portal(MockParams::default().with_delay(Duration::from_millis(50)));
    let rx = portal.subscribe();

    let handle = portal.create_session(SENDER, options()).unwrap();
    portal.disconnect(SENDER);

    let completion = rx.recv_timeout(WAIT).unwrap();
    assert_eq!(completion.handle, handle);
    assert!(portal.request(&handle).unwrap().is_resolved());
}
