//! Input notification tests
//!
//! Notifications are acknowledged, logged and recorded; nothing else.

mod fixtures;

use fixtures::*;
use portal_mock::mock::InputEvent;
use portal_mock::ResponseOverride;
use portal_protocol::Method;
use serde_json::json;

#[test]
fn test_all_ten_notifications_are_acknowledged() {
    let portal = portal(instant_params());
    let session = create_session(&portal, SENDER, "input");

    portal.notify_pointer_motion(&session, options(), 1.5, -2.0);
    portal.notify_pointer_motion_absolute(&session, options(), 0, 100.0, 200.0);
    portal.notify_pointer_button(&session, options(), 272, 1);
    portal.notify_pointer_axis(&session, options(), 0.0, 10.0);
    portal.notify_pointer_axis_discrete(&session, options(), 0, -1);
    portal.notify_keyboard_keycode(&session, options(), 30, 1);
    portal.notify_keyboard_keysym(&session, options(), 0x61, 0);
    portal.notify_touch_down(&session, options(), 0, 1, 10.0, 20.0);
    portal.notify_touch_motion(&session, options(), 0, 1, 11.0, 21.0);
    portal.notify_touch_up(&session, options(), 1);

    let methods: Vec<Method> = portal
        .notifications()
        .iter()
        .map(|n| n.event.method())
        .collect();
    assert_eq!(
        methods,
        vec![
            Method::NotifyPointerMotion,
            Method::NotifyPointerMotionAbsolute,
            Method::NotifyPointerButton,
            Method::NotifyPointerAxis,
            Method::NotifyPointerAxisDiscrete,
            Method::NotifyKeyboardKeycode,
            Method::NotifyKeyboardKeysym,
            Method::NotifyTouchDown,
            Method::NotifyTouchMotion,
            Method::NotifyTouchUp,
        ]
    );
    assert!(methods.iter().all(|m| m.is_notification()));
}

#[test]
fn test_parameters_are_recorded() {
    let portal = portal(instant_params());
    let session = create_session(&portal, SENDER, "params");

    let mut opts = options();
    opts.insert("finish".to_string(), json!(true));
    portal.notify_touch_down(&session, opts.clone(), 3, 2, 0.25, 0.75);

    let received = portal.take_notifications();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].session_handle, session);
    assert_eq!(received[0].options, opts);
    assert!(received[0].known_session);
    assert_eq!(
        received[0].event,
        InputEvent::TouchDown {
            stream: 3,
            slot: 2,
            x: 0.25,
            y: 0.75
        }
    );
    assert!(portal.notifications().is_empty());
}

#[test]
fn test_unknown_session_notifications_do_not_fail() {
    let portal = portal(instant_params());
    let bogus = "/org/freedesktop/portal/desktop/session/1_1/none";

    portal.notify_keyboard_keycode(bogus, options(), 1, 1);
    portal.notify_pointer_motion(bogus, options(), 0.0, 0.0);

    let received = portal.notifications();
    assert_eq!(received.len(), 2);
    assert!(received.iter().all(|n| !n.known_session));
    assert!(portal.session_handles().is_empty());
}

#[test]
fn test_notifications_never_produce_completions() {
    let portal = portal(instant_params());
    let rx = portal.subscribe();

    portal.notify_pointer_button("/s", options(), 1, 1);
    portal.notify_touch_up("/s", options(), 0);
    assert!(rx.recv_timeout(std::time::Duration::from_millis(100)).is_err());
    assert_eq!(portal.outstanding_requests(), 0);
}

#[test]
fn test_fault_in_one_notification_is_swallowed() {
    let portal = portal(instant_params());
    portal.inject(Method::NotifyPointerAxis, ResponseOverride::fault("broken axis"));

    portal.notify_pointer_axis("/s", options(), 1.0, 1.0);
    portal.notify_pointer_axis_discrete("/s", options(), 1, 2);

    let received = portal.notifications();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].event, InputEvent::PointerAxisDiscrete { axis: 1, steps: 2 });
}
