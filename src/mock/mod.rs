//! Mock RemoteDesktop portal
//!
//! In-process implementation of `org.freedesktop.portal.RemoteDesktop`
//! for exercising portal clients. It is configured through
//! [`crate::config::MockParams`] and never prompts a user.
//!
//! # Methods
//!
//! - `CreateSession`, `SelectDevices`, `Start`: return a request handle;
//!   the `Response` completion follows after the configured delay
//! - `ConnectToEIS`: hands off one end of a socket pair poisoned with a
//!   marker that is not a valid EIS handshake
//! - `Notify*`: acknowledged and logged, no effect
//!
//! Test code can inject per-method responses and faults, subscribe to
//! completions, and inspect sessions, requests and received notifications.

mod boundary;
mod channel;
mod handle;
mod inject;
mod notify;
mod portal;
mod request;
mod scheduler;
mod session;

pub use boundary::boundary;
pub use channel::{ChannelKeeper, Handoff, MARKER};
pub use handle::{escape_sender, HandleAllocator, HandleKind};
pub use inject::{ResponseInjector, ResponseOverride};
pub use notify::{InputEvent, Notification, NotificationSink, RECEIPT_LOG_LIMIT};
pub use portal::{CallOutcome, RemoteDesktop};
pub use request::{Completion, CompletionPlan, Request, RequestEngine, Response};
pub use scheduler::Scheduler;
pub use session::{Session, SessionRegistry, SessionState};

/// Open a poisoned channel pair outside of a portal call
pub use channel::open as open_channel;
