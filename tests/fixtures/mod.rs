//! Shared helpers for portal integration tests

#![allow(dead_code)]

use std::io::Read;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use portal_mock::{MockParams, RemoteDesktop, Server, ServerHandle};
use portal_protocol::Options;
use serde_json::json;
use tempfile::TempDir;

/// Generous upper bound for anything that should happen "immediately"
pub const WAIT: Duration = Duration::from_secs(2);

pub const SENDER: &str = ":1.7";

/// Parameters with no completion delay
pub fn instant_params() -> MockParams {
    MockParams::default().with_delay(Duration::ZERO)
}

pub fn portal(params: MockParams) -> RemoteDesktop {
    RemoteDesktop::new(Arc::new(params)).expect("portal should start")
}

pub fn options() -> Options {
    Options::new()
}

/// Options naming the session via `session_handle_token`
pub fn session_token(token: &str) -> Options {
    let mut options = Options::new();
    options.insert("session_handle_token".to_string(), json!(token));
    options
}

/// Options naming the request via `handle_token`
pub fn request_token(token: &str) -> Options {
    let mut options = Options::new();
    options.insert("handle_token".to_string(), json!(token));
    options
}

/// Create a session for `sender` and return its handle
pub fn create_session(portal: &RemoteDesktop, sender: &str, token: &str) -> String {
    portal
        .create_session(sender, session_token(token))
        .expect("CreateSession should return a request handle");
    let handle = format!(
        "{}/{}/{}",
        portal_protocol::SESSION_PATH_PREFIX,
        portal_mock::mock::escape_sender(sender),
        token
    );
    assert!(portal.session(&handle).is_some(), "session {} should exist", handle);
    handle
}

/// Read exactly `len` bytes from a handed-off descriptor
pub fn read_prefix(fd: OwnedFd, len: usize) -> Vec<u8> {
    let mut stream = UnixStream::from(fd);
    stream.set_read_timeout(Some(WAIT)).unwrap();
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).unwrap();
    buf
}

/// A portal served on a socket inside a temporary directory
pub struct Served {
    pub portal: Arc<RemoteDesktop>,
    pub server: ServerHandle,
    pub socket: PathBuf,
    _dir: TempDir,
}

pub fn serve(params: MockParams) -> Served {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("portal.sock");
    let portal = Arc::new(portal(params));
    let server = Server::bind(&socket, Arc::clone(&portal))
        .unwrap()
        .spawn()
        .unwrap();
    Served {
        portal,
        server,
        socket,
        _dir: dir,
    }
}

/// Poll `cond` until it holds or [`WAIT`] runs out
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + WAIT;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    cond()
}
