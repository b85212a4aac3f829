//! Channel hand-off for `ConnectToEIS`
//!
//! The caller receives one end of a fresh Unix socket pair. The other end
//! stays with the portal after the marker bytes have been written into
//! it, so a client that treats the channel as a real EIS stream reads
//! garbage straight away.

use std::collections::HashMap;
use std::io::Write;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::sync::{Mutex, MutexGuard};

use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};

use crate::error::PortalError;

/// Bytes written into every handed-off channel; not an EIS preamble
pub const MARKER: &[u8] = b"VANILLA";

/// Both ends of a freshly opened channel
#[derive(Debug)]
pub struct Handoff {
    /// Transferred to the caller
    pub client: OwnedFd,
    /// Kept by the portal, marker already written
    pub server: UnixStream,
}

/// Open a connected stream pair and poison the client's view of it
pub fn open() -> Result<Handoff, PortalError> {
    let (server, client) = socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        SockFlag::SOCK_CLOEXEC,
    )?;
    let mut server = UnixStream::from(server);
    server.write_all(MARKER)?;
    Ok(Handoff { client, server })
}

/// Server end held for a channel, with the caller it was handed to
#[derive(Debug)]
struct HeldEnd {
    sender: String,
    stream: UnixStream,
}

/// Server ends of handed-off channels, held per session handle
#[derive(Debug, Default)]
pub struct ChannelKeeper {
    held: Mutex<HashMap<String, Vec<HeldEnd>>>,
}

impl ChannelKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keep(&self, sender: &str, session_handle: &str, server: UnixStream) {
        self.lock()
            .entry(session_handle.to_string())
            .or_default()
            .push(HeldEnd {
                sender: sender.to_string(),
                stream: server,
            });
    }

    /// Close every server end held for a session; returns how many
    pub fn release(&self, session_handle: &str) -> usize {
        self.lock()
            .remove(session_handle)
            .map(|ends| ends.len())
            .unwrap_or(0)
    }

    /// Close every server end handed to `sender`, whatever session it
    /// was requested for; returns how many
    pub fn release_by_sender(&self, sender: &str) -> usize {
        let mut held = self.lock();
        let mut released = 0;
        held.retain(|_, ends| {
            let before = ends.len();
            ends.retain(|end| end.sender != sender);
            released += before - ends.len();
            !ends.is_empty()
        });
        released
    }

    /// Number of server ends held for a session
    pub fn held(&self, session_handle: &str) -> usize {
        self.lock().get(session_handle).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<HeldEnd>>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }
}
