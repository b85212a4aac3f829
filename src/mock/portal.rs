//! Mock RemoteDesktop portal
//!
//! The service object behind every transport. Request methods return a
//! handle at once and complete later through the engine; `ConnectToEIS`
//! hands off a poisoned channel; the `Notify*` methods only acknowledge.
//!
//! Unknown session handles are tolerated everywhere: the call proceeds as
//! if the session existed and a warning is logged.

use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::{Arc, Mutex, MutexGuard};

use crossbeam_channel::Receiver;
use portal_protocol::{Call, Method, Options, Properties, ReplyBody, Results};
use serde_json::json;

use super::boundary::boundary;
use super::channel::{self, ChannelKeeper};
use super::inject::{ResponseInjector, ResponseOverride};
use super::notify::{InputEvent, Notification, NotificationSink};
use super::request::{Completion, CompletionPlan, Request, RequestEngine};
use super::session::{Session, SessionRegistry, SessionState};
use crate::config::MockParams;
use crate::error::PortalError;

/// Result of dispatching a [`Call`]
#[derive(Debug)]
pub enum CallOutcome {
    Handle(Option<String>),
    Fd(Option<OwnedFd>),
    Unit,
    Properties(Properties),
}

impl CallOutcome {
    /// Split into the reply body and the descriptor riding along with it
    pub fn into_reply(self) -> (ReplyBody, Option<OwnedFd>) {
        match self {
            CallOutcome::Handle(Some(value)) => (ReplyBody::Handle { value }, None),
            CallOutcome::Fd(Some(fd)) => (ReplyBody::Fd, Some(fd)),
            CallOutcome::Handle(None) | CallOutcome::Fd(None) => (ReplyBody::None, None),
            CallOutcome::Unit => (ReplyBody::Unit, None),
            CallOutcome::Properties(props) => (ReplyBody::Properties(props), None),
        }
    }
}

/// The mock `org.freedesktop.portal.RemoteDesktop` implementation
pub struct RemoteDesktop {
    params: Arc<MockParams>,
    sessions: SessionRegistry,
    engine: RequestEngine,
    channels: ChannelKeeper,
    sink: NotificationSink,
    injector: Mutex<ResponseInjector>,
}

impl RemoteDesktop {
    /// Create a portal and start its completion scheduler
    pub fn new(params: Arc<MockParams>) -> Result<Self, PortalError> {
        tracing::debug!(
            delay_ms = params.delay.as_millis() as u64,
            version = params.version,
            response = %params.response,
            devices = %params.devices,
            "loading RemoteDesktop portal"
        );
        Ok(Self {
            params,
            sessions: SessionRegistry::new(),
            engine: RequestEngine::new()?,
            channels: ChannelKeeper::new(),
            sink: NotificationSink::new(),
            injector: Mutex::new(ResponseInjector::new()),
        })
    }

    pub fn params(&self) -> &MockParams {
        &self.params
    }

    /// Published `version` and `AvailableDeviceTypes`
    pub fn properties(&self) -> Properties {
        self.params.properties()
    }

    // === Test configuration and inspection ===

    /// Override what calls of `method` produce
    pub fn inject(&self, method: Method, config: ResponseOverride) {
        self.injector().inject(method, config);
    }

    /// Drop the override for `method` only
    pub fn clear_injection(&self, method: Method) {
        self.injector().clear_method(method);
    }

    pub fn clear_injections(&self) {
        self.injector().clear();
    }

    /// Receive every completion delivered from now on
    pub fn subscribe(&self) -> Receiver<Completion> {
        self.engine.subscribe()
    }

    pub fn session(&self, handle: &str) -> Option<Session> {
        self.sessions.lookup(handle)
    }

    /// Handles of all live sessions, sorted
    pub fn session_handles(&self) -> Vec<String> {
        self.sessions.handles()
    }

    pub fn request(&self, handle: &str) -> Option<Request> {
        self.engine.request(handle)
    }

    /// Requests accepted but not yet completed
    pub fn outstanding_requests(&self) -> usize {
        self.engine.outstanding()
    }

    /// Receipt log of input notifications, oldest first
    pub fn notifications(&self) -> Vec<Notification> {
        self.sink.received()
    }

    pub fn take_notifications(&self) -> Vec<Notification> {
        self.sink.take()
    }

    /// Server ends of handed-off channels held for a session
    pub fn held_channels(&self, session_handle: &str) -> usize {
        self.channels.held(session_handle)
    }

    /// The caller went away: drop its sessions and every channel held for
    /// it or for those sessions
    pub fn disconnect(&self, sender: &str) {
        let removed = self.sessions.remove_by_sender(sender);
        let mut channels = self.channels.release_by_sender(sender);
        for session in &removed {
            channels += self.channels.release(&session.handle);
        }
        let forgotten = self.engine.forget_sender(sender);
        tracing::debug!(
            sender = %sender,
            sessions = removed.len(),
            channels,
            requests = forgotten,
            "caller disconnected"
        );
    }

    // === Portal methods ===

    /// `CreateSession(a{sv}) -> o`
    pub fn create_session(&self, sender: &str, options: Options) -> Option<String> {
        boundary(Method::CreateSession, || {
            tracing::debug!(sender = %sender, ?options, "CreateSession");
            let plan = self.plan(Method::CreateSession)?;

            // Registered before the request exists so its completion can
            // never be observed ahead of the session
            let session = self.sessions.create(sender, options.clone());
            let submitted =
                self.engine
                    .submit(sender, Method::CreateSession, options, plan, || Ok(Results::new()));
            if submitted.is_err() {
                self.sessions.remove(&session.handle);
            }
            let handle = submitted?;
            tracing::debug!(session = %session.handle, request = %handle, "session created");
            Ok(handle)
        })
    }

    /// `SelectDevices(o, a{sv}) -> o`
    pub fn select_devices(
        &self,
        sender: &str,
        session_handle: &str,
        options: Options,
    ) -> Option<String> {
        boundary(Method::SelectDevices, || {
            tracing::debug!(sender = %sender, session = %session_handle, ?options, "SelectDevices");
            let plan = self.plan(Method::SelectDevices)?;

            let selected = options.clone();
            let known = self
                .sessions
                .update(session_handle, |session| {
                    session.selected_devices = Some(selected);
                    session.transition(SessionState::DevicesSelected);
                })
                .is_some();
            self.note_unknown(Method::SelectDevices, session_handle, known);

            self.engine
                .submit(sender, Method::SelectDevices, options, plan, || Ok(Results::new()))
        })
    }

    /// `Start(o, s, a{sv}) -> o`
    ///
    /// Completes with `{"devices": u32}` set to the configured device mask.
    pub fn start(
        &self,
        sender: &str,
        session_handle: &str,
        parent_window: &str,
        options: Options,
    ) -> Option<String> {
        boundary(Method::Start, || {
            tracing::debug!(
                sender = %sender,
                session = %session_handle,
                parent_window = %parent_window,
                ?options,
                "Start"
            );
            let plan = self.plan(Method::Start)?;

            let known = self.sessions.mark(session_handle, SessionState::Started);
            self.note_unknown(Method::Start, session_handle, known);

            let devices = self.params.devices;
            self.engine.submit(sender, Method::Start, options, plan, || {
                let mut results = Results::new();
                results.insert("devices".to_string(), json!(devices.bits()));
                Ok(results)
            })
        })
    }

    /// `ConnectToEIS(o, a{sv}) -> h`
    ///
    /// The server end is held until `sender` disconnects, even when the
    /// session handle is unknown.
    pub fn connect_to_eis(
        &self,
        sender: &str,
        session_handle: &str,
        options: Options,
    ) -> Option<OwnedFd> {
        boundary(Method::ConnectToEis, || {
            tracing::debug!(sender = %sender, session = %session_handle, ?options, "ConnectToEIS");
            self.check_fault(Method::ConnectToEis)?;
            self.note_unknown(
                Method::ConnectToEis,
                session_handle,
                self.sessions.contains(session_handle),
            );

            let handoff = channel::open()?;
            tracing::debug!(fd = handoff.client.as_raw_fd(), "ConnectToEIS handing off fd");
            self.channels.keep(sender, session_handle, handoff.server);
            Ok(handoff.client)
        })
    }

    /// Acknowledge one input notification
    pub fn notify(&self, session_handle: &str, options: Options, event: InputEvent) {
        let method = event.method();
        boundary(method, || {
            self.check_fault(method)?;
            let known = self.sessions.contains(session_handle);
            self.sink.record(session_handle, options, event, known);
            Ok(())
        });
    }

    /// `NotifyPointerMotion(o, a{sv}, d, d)`
    pub fn notify_pointer_motion(&self, session_handle: &str, options: Options, dx: f64, dy: f64) {
        self.notify(session_handle, options, InputEvent::PointerMotion { dx, dy });
    }

    /// `NotifyPointerMotionAbsolute(o, a{sv}, u, d, d)`
    pub fn notify_pointer_motion_absolute(
        &self,
        session_handle: &str,
        options: Options,
        stream: u32,
        x: f64,
        y: f64,
    ) {
        self.notify(session_handle, options, InputEvent::PointerMotionAbsolute { stream, x, y });
    }

    /// `NotifyPointerButton(o, a{sv}, i, u)`
    pub fn notify_pointer_button(&self, session_handle: &str, options: Options, button: i32, state: u32) {
        self.notify(session_handle, options, InputEvent::PointerButton { button, state });
    }

    /// `NotifyPointerAxis(o, a{sv}, d, d)`
    pub fn notify_pointer_axis(&self, session_handle: &str, options: Options, dx: f64, dy: f64) {
        self.notify(session_handle, options, InputEvent::PointerAxis { dx, dy });
    }

    /// `NotifyPointerAxisDiscrete(o, a{sv}, u, i)`
    pub fn notify_pointer_axis_discrete(&self, session_handle: &str, options: Options, axis: u32, steps: i32) {
        self.notify(session_handle, options, InputEvent::PointerAxisDiscrete { axis, steps });
    }

    /// `NotifyKeyboardKeycode(o, a{sv}, i, u)`
    pub fn notify_keyboard_keycode(&self, session_handle: &str, options: Options, keycode: i32, state: u32) {
        self.notify(session_handle, options, InputEvent::KeyboardKeycode { keycode, state });
    }

    /// `NotifyKeyboardKeysym(o, a{sv}, i, u)`
    pub fn notify_keyboard_keysym(&self, session_handle: &str, options: Options, keysym: i32, state: u32) {
        self.notify(session_handle, options, InputEvent::KeyboardKeysym { keysym, state });
    }

    /// `NotifyTouchDown(o, a{sv}, u, u, d, d)`
    pub fn notify_touch_down(
        &self,
        session_handle: &str,
        options: Options,
        stream: u32,
        slot: u32,
        x: f64,
        y: f64,
    ) {
        self.notify(session_handle, options, InputEvent::TouchDown { stream, slot, x, y });
    }

    /// `NotifyTouchMotion(o, a{sv}, u, u, d, d)`
    pub fn notify_touch_motion(
        &self,
        session_handle: &str,
        options: Options,
        stream: u32,
        slot: u32,
        x: f64,
        y: f64,
    ) {
        self.notify(session_handle, options, InputEvent::TouchMotion { stream, slot, x, y });
    }

    /// `NotifyTouchUp(o, a{sv}, u)`
    pub fn notify_touch_up(&self, session_handle: &str, options: Options, slot: u32) {
        self.notify(session_handle, options, InputEvent::TouchUp { slot });
    }

    /// Dispatch a decoded call on behalf of `sender`
    pub fn handle_call(&self, sender: &str, call: Call) -> CallOutcome {
        match call {
            Call::CreateSession { options } => CallOutcome::Handle(self.create_session(sender, options)),
            Call::SelectDevices {
                session_handle,
                options,
            } => CallOutcome::Handle(self.select_devices(sender, &session_handle, options)),
            Call::Start {
                session_handle,
                parent_window,
                options,
            } => CallOutcome::Handle(self.start(sender, &session_handle, &parent_window, options)),
            Call::ConnectToEis {
                session_handle,
                options,
            } => CallOutcome::Fd(self.connect_to_eis(sender, &session_handle, options)),
            Call::NotifyPointerMotion {
                session_handle,
                options,
                dx,
                dy,
            } => self.ack(&session_handle, options, InputEvent::PointerMotion { dx, dy }),
            Call::NotifyPointerMotionAbsolute {
                session_handle,
                options,
                stream,
                x,
                y,
            } => self.ack(
                &session_handle,
                options,
                InputEvent::PointerMotionAbsolute { stream, x, y },
            ),
            Call::NotifyPointerButton {
                session_handle,
                options,
                button,
                state,
            } => self.ack(&session_handle, options, InputEvent::PointerButton { button, state }),
            Call::NotifyPointerAxis {
                session_handle,
                options,
                dx,
                dy,
            } => self.ack(&session_handle, options, InputEvent::PointerAxis { dx, dy }),
            Call::NotifyPointerAxisDiscrete {
                session_handle,
                options,
                axis,
                steps,
            } => self.ack(
                &session_handle,
                options,
                InputEvent::PointerAxisDiscrete { axis, steps },
            ),
            Call::NotifyKeyboardKeycode {
                session_handle,
                options,
                keycode,
                state,
            } => self.ack(
                &session_handle,
                options,
                InputEvent::KeyboardKeycode { keycode, state },
            ),
            Call::NotifyKeyboardKeysym {
                session_handle,
                options,
                keysym,
                state,
            } => self.ack(&session_handle, options, InputEvent::KeyboardKeysym { keysym, state }),
            Call::NotifyTouchDown {
                session_handle,
                options,
                stream,
                slot,
                x,
                y,
            } => self.ack(
                &session_handle,
                options,
                InputEvent::TouchDown { stream, slot, x, y },
            ),
            Call::NotifyTouchMotion {
                session_handle,
                options,
                stream,
                slot,
                x,
                y,
            } => self.ack(
                &session_handle,
                options,
                InputEvent::TouchMotion { stream, slot, x, y },
            ),
            Call::NotifyTouchUp {
                session_handle,
                options,
                slot,
            } => self.ack(&session_handle, options, InputEvent::TouchUp { slot }),
            Call::GetProperties => CallOutcome::Properties(self.properties()),
        }
    }

    // === Internal helpers ===

    fn ack(&self, session_handle: &str, options: Options, event: InputEvent) -> CallOutcome {
        self.notify(session_handle, options, event);
        CallOutcome::Unit
    }

    fn injector(&self) -> MutexGuard<'_, ResponseInjector> {
        self.injector.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Completion plan for one call of a request method
    fn plan(&self, method: Method) -> Result<CompletionPlan, PortalError> {
        let mut plan = CompletionPlan {
            response: self.params.response,
            delay: self.params.delay,
        };
        if let Some(config) = self.injector().check(method) {
            if let Some(message) = config.fault {
                return Err(PortalError::InjectedFault { method, message });
            }
            if let Some(response) = config.response {
                plan.response = response;
            }
            if let Some(delay) = config.delay {
                plan.delay = delay;
            }
        }
        Ok(plan)
    }

    fn check_fault(&self, method: Method) -> Result<(), PortalError> {
        match self.injector().check(method).and_then(|c| c.fault) {
            Some(message) => Err(PortalError::InjectedFault { method, message }),
            None => Ok(()),
        }
    }

    fn note_unknown(&self, method: Method, session_handle: &str, known: bool) {
        if !known {
            tracing::warn!(
                method = %method,
                session = %session_handle,
                "unknown session handle, proceeding anyway"
            );
        }
    }
}
