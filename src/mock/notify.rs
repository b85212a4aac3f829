//! Input notification sink
//!
//! The `Notify*` calls are acknowledged and logged, nothing else. A
//! bounded receipt log keeps the most recent events for test assertions.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use portal_protocol::{Method, Options};
use serde::Serialize;

/// Maximum number of receipts kept; older ones are dropped first
pub const RECEIPT_LOG_LIMIT: usize = 4096;

/// An input event notified by the client
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum InputEvent {
    PointerMotion { dx: f64, dy: f64 },
    PointerMotionAbsolute { stream: u32, x: f64, y: f64 },
    PointerButton { button: i32, state: u32 },
    PointerAxis { dx: f64, dy: f64 },
    PointerAxisDiscrete { axis: u32, steps: i32 },
    KeyboardKeycode { keycode: i32, state: u32 },
    KeyboardKeysym { keysym: i32, state: u32 },
    TouchDown { stream: u32, slot: u32, x: f64, y: f64 },
    TouchMotion { stream: u32, slot: u32, x: f64, y: f64 },
    TouchUp { slot: u32 },
}

impl InputEvent {
    /// The portal method that carries this event
    pub fn method(&self) -> Method {
        match self {
            InputEvent::PointerMotion { .. } => Method::NotifyPointerMotion,
            InputEvent::PointerMotionAbsolute { .. } => Method::NotifyPointerMotionAbsolute,
            InputEvent::PointerButton { .. } => Method::NotifyPointerButton,
            InputEvent::PointerAxis { .. } => Method::NotifyPointerAxis,
            InputEvent::PointerAxisDiscrete { .. } => Method::NotifyPointerAxisDiscrete,
            InputEvent::KeyboardKeycode { .. } => Method::NotifyKeyboardKeycode,
            InputEvent::KeyboardKeysym { .. } => Method::NotifyKeyboardKeysym,
            InputEvent::TouchDown { .. } => Method::NotifyTouchDown,
            InputEvent::TouchMotion { .. } => Method::NotifyTouchMotion,
            InputEvent::TouchUp { .. } => Method::NotifyTouchUp,
        }
    }
}

/// Receipt of one notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub session_handle: String,
    pub options: Options,
    pub event: InputEvent,
    /// Whether the session handle was registered when the event arrived
    pub known_session: bool,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct NotificationSink {
    received: Mutex<VecDeque<Notification>>,
}

impl NotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log and record one event
    pub fn record(
        &self,
        session_handle: &str,
        options: Options,
        event: InputEvent,
        known_session: bool,
    ) {
        tracing::debug!(
            method = %event.method(),
            session = %session_handle,
            known_session,
            ?options,
            ?event,
            "input notification"
        );

        let mut received = self.lock();
        if received.len() == RECEIPT_LOG_LIMIT {
            received.pop_front();
        }
        received.push_back(Notification {
            session_handle: session_handle.to_string(),
            options,
            event,
            known_session,
            received_at: Utc::now(),
        });
    }

    /// Snapshot of the receipt log, oldest first
    pub fn received(&self) -> Vec<Notification> {
        self.lock().iter().cloned().collect()
    }

    /// Drain the receipt log
    pub fn take(&self) -> Vec<Notification> {
        self.lock().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.received.lock().unwrap_or_else(|e| e.into_inner())
    }
}
