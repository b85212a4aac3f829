//! Portal mock - test double for `org.freedesktop.portal.RemoteDesktop`
//!
//! This crate implements a scriptable RemoteDesktop portal for exercising
//! portal clients: request handles answered by delayed `Response`
//! signals, a poisoned `ConnectToEIS` channel, and acknowledged input
//! notifications. It runs in-process or behind a Unix socket.

pub mod client;
pub mod config;
pub mod error;
pub mod mock;
pub mod server;
pub mod signal;
pub mod transport;

pub use client::PortalClient;
pub use config::{ConfigError, LoadedParams, MockParams};
pub use error::PortalError;
pub use mock::{RemoteDesktop, ResponseOverride};
pub use server::{Server, ServerHandle};
pub use transport::TransportError;
