//! Blocking portal client
//!
//! Speaks the line protocol of [`crate::server`]. Calls block until their
//! reply arrives; `Response` signals read in the meantime are buffered and
//! handed out by [`PortalClient::next_signal`] and
//! [`PortalClient::wait_response`].

use std::collections::VecDeque;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::{Duration, Instant};

use portal_protocol::{
    Call, CallEnvelope, Options, Properties, ReplyBody, ResponseSignal, ServerMessage,
};

use crate::mock::{escape_sender, HandleKind};
use crate::transport::{send_line, LineReader, TransportError};

/// Default time to wait for a reply
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Reply to one call
#[derive(Debug)]
pub struct Reply {
    pub serial: u64,
    pub body: ReplyBody,
    /// Descriptor carried by an `fd` reply
    pub fd: Option<OwnedFd>,
}

pub struct PortalClient {
    stream: UnixStream,
    reader: LineReader,
    sender: String,
    next_serial: u64,
    signals: VecDeque<ResponseSignal>,
    timeout: Duration,
}

impl PortalClient {
    /// Connect and read the caller name assigned by the server
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, TransportError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| {
            TransportError::ConnectionFailed(format!("{}: {}", path.display(), e))
        })?;

        let mut client = Self {
            stream,
            reader: LineReader::new(),
            sender: String::new(),
            next_serial: 0,
            signals: VecDeque::new(),
            timeout: DEFAULT_CALL_TIMEOUT,
        };
        match client.read_message(Instant::now() + client.timeout)? {
            ServerMessage::Hello { sender } => client.sender = sender,
            other => {
                return Err(TransportError::Protocol(format!(
                    "expected hello, got {:?}",
                    other
                )))
            }
        }
        tracing::debug!(sender = %client.sender, "connected to portal");
        Ok(client)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Unique name the server assigned to this connection
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Session handle the portal mints for `session_handle_token`
    pub fn session_handle(&self, token: &str) -> String {
        format!(
            "{}/{}/{}",
            HandleKind::Session.prefix(),
            escape_sender(&self.sender),
            token
        )
    }

    /// Send a call and wait for its reply
    pub fn call(&mut self, call: Call) -> Result<Reply, TransportError> {
        self.next_serial += 1;
        let serial = self.next_serial;
        send_line(&self.stream, &CallEnvelope::new(serial, call), None)?;
        self.await_reply(Some(serial))
    }

    /// Send a raw line, bypassing the envelope; for malformed-input tests
    pub fn call_raw(&mut self, line: &str) -> Result<Reply, TransportError> {
        let mut writer = &self.stream;
        std::io::Write::write_all(&mut writer, line.as_bytes())?;
        std::io::Write::write_all(&mut writer, b"\n")?;
        self.await_reply(None)
    }

    pub fn create_session(&mut self, options: Options) -> Result<Option<String>, TransportError> {
        Ok(self.call(Call::CreateSession { options })?.body.handle().map(str::to_string))
    }

    pub fn select_devices(
        &mut self,
        session_handle: &str,
        options: Options,
    ) -> Result<Option<String>, TransportError> {
        let call = Call::SelectDevices {
            session_handle: session_handle.to_string(),
            options,
        };
        Ok(self.call(call)?.body.handle().map(str::to_string))
    }

    pub fn start(
        &mut self,
        session_handle: &str,
        parent_window: &str,
        options: Options,
    ) -> Result<Option<String>, TransportError> {
        let call = Call::Start {
            session_handle: session_handle.to_string(),
            parent_window: parent_window.to_string(),
            options,
        };
        Ok(self.call(call)?.body.handle().map(str::to_string))
    }

    pub fn connect_to_eis(
        &mut self,
        session_handle: &str,
        options: Options,
    ) -> Result<Option<OwnedFd>, TransportError> {
        let call = Call::ConnectToEis {
            session_handle: session_handle.to_string(),
            options,
        };
        Ok(self.call(call)?.fd)
    }

    pub fn properties(&mut self) -> Result<Properties, TransportError> {
        match self.call(Call::GetProperties)?.body {
            ReplyBody::Properties(props) => Ok(props),
            other => Err(TransportError::Protocol(format!(
                "unexpected properties reply {:?}",
                other
            ))),
        }
    }

    /// Next buffered or incoming `Response` signal
    pub fn next_signal(&mut self, timeout: Duration) -> Result<ResponseSignal, TransportError> {
        if let Some(signal) = self.signals.pop_front() {
            return Ok(signal);
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.read_message(deadline)? {
                ServerMessage::Signal(signal) => return Ok(signal),
                other => tracing::debug!(?other, "ignoring message while waiting for a signal"),
            }
        }
    }

    /// Wait for the `Response` signal emitted on `handle`
    pub fn wait_response(
        &mut self,
        handle: &str,
        timeout: Duration,
    ) -> Result<ResponseSignal, TransportError> {
        if let Some(pos) = self.signals.iter().position(|s| s.handle == handle) {
            if let Some(signal) = self.signals.remove(pos) {
                return Ok(signal);
            }
        }
        let deadline = Instant::now() + timeout;
        loop {
            match self.read_message(deadline)? {
                ServerMessage::Signal(signal) if signal.handle == handle => return Ok(signal),
                ServerMessage::Signal(signal) => self.signals.push_back(signal),
                other => tracing::debug!(?other, "ignoring message while waiting for a signal"),
            }
        }
    }

    /// Signals received so far but not yet handed out
    pub fn buffered_signals(&self) -> usize {
        self.signals.len()
    }

    fn await_reply(&mut self, serial: Option<u64>) -> Result<Reply, TransportError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.read_message(deadline)? {
                ServerMessage::Reply { serial: got, body } if serial.map_or(true, |s| s == got) => {
                    let fd = match body {
                        ReplyBody::Fd => Some(self.reader.take_fd().ok_or_else(|| {
                            TransportError::Protocol("fd reply without a descriptor".to_string())
                        })?),
                        _ => None,
                    };
                    return Ok(Reply {
                        serial: got,
                        body,
                        fd,
                    });
                }
                ServerMessage::Reply { serial: got, .. } => {
                    tracing::warn!(serial = got, "discarding reply to an earlier call");
                }
                ServerMessage::Signal(signal) => self.signals.push_back(signal),
                ServerMessage::Error(error) => return Err(TransportError::Rejected(error)),
                ServerMessage::Hello { .. } => {
                    return Err(TransportError::Protocol("unexpected hello".to_string()))
                }
            }
        }
    }

    fn read_message(&mut self, deadline: Instant) -> Result<ServerMessage, TransportError> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(TransportError::Timeout);
        }
        self.stream.set_read_timeout(Some(remaining))?;
        let line = self.reader.read_line(&self.stream)?;
        Ok(serde_json::from_str(&line)?)
    }
}
