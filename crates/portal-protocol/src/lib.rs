//! RemoteDesktop Portal Protocol Types
//!
//! Wire types shared by the portal mock server and its clients: the call
//! envelope, replies, `Response` signals and the value types they carry
//! (response codes, device masks, option maps).
//!
//! Framing is newline-delimited JSON over a Unix stream socket. Channel
//! descriptors travel out of band as `SCM_RIGHTS` ancillary data attached
//! to the reply that announces them.

pub mod call;
pub mod error;
pub mod message;
pub mod types;

pub use call::{Call, CallEnvelope, Method};
pub use error::{ErrorCode, WireError};
pub use message::{ReplyBody, ResponseSignal, ServerMessage};
pub use types::{DeviceTypes, Options, Properties, ResponseCode, Results};

/// Interface name of the emulated portal.
pub const INTERFACE: &str = "org.freedesktop.portal.RemoteDesktop";

/// Object path the portal is served on.
pub const OBJECT_PATH: &str = "/org/freedesktop/portal/desktop";

/// Prefix of request handles.
pub const REQUEST_PATH_PREFIX: &str = "/org/freedesktop/portal/desktop/request";

/// Prefix of session handles.
pub const SESSION_PATH_PREFIX: &str = "/org/freedesktop/portal/desktop/session";
