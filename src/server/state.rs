//! Server state thread
//!
//! Owns every connection's write half. Calls are served strictly one at a
//! time and each reply is written before the next event is looked at, so
//! a completion can never overtake the reply that announced its handle.

use std::collections::HashMap;
use std::net::Shutdown;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{select, Receiver};
use portal_protocol::{CallEnvelope, ServerMessage, WireError};

use crate::mock::{Completion, RemoteDesktop};
use crate::transport::send_line;

/// How often the loop wakes up to look at the shutdown flag
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Input to the state thread
#[derive(Debug)]
pub(crate) enum Event {
    Connected { sender: String, stream: UnixStream },
    Line { sender: String, line: String },
    /// Input that never made it to a call line
    Rejected { sender: String, error: WireError },
    Closed { sender: String },
}

pub(crate) struct StateThread {
    portal: Arc<RemoteDesktop>,
    connections: HashMap<String, UnixStream>,
}

impl StateThread {
    pub(crate) fn new(portal: Arc<RemoteDesktop>) -> Self {
        Self {
            portal,
            connections: HashMap::new(),
        }
    }

    pub(crate) fn run(
        mut self,
        events: Receiver<Event>,
        completions: Receiver<Completion>,
        shutdown: Arc<AtomicBool>,
    ) {
        while !shutdown.load(Ordering::SeqCst) {
            select! {
                recv(events) -> event => match event {
                    Ok(event) => self.handle_event(event),
                    Err(_) => break,
                },
                recv(completions) -> completion => {
                    if let Ok(completion) = completion {
                        self.forward(completion);
                    }
                },
                default(POLL_INTERVAL) => {}
            }
        }

        for (sender, stream) in self.connections.drain() {
            let _ = stream.shutdown(Shutdown::Both);
            self.portal.disconnect(&sender);
        }
        tracing::debug!("state thread stopped");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Connected { sender, stream } => {
                let hello = ServerMessage::Hello {
                    sender: sender.clone(),
                };
                match send_line(&stream, &hello, None) {
                    Ok(()) => {
                        tracing::info!(sender = %sender, "client connected");
                        self.connections.insert(sender, stream);
                    }
                    Err(e) => {
                        tracing::warn!(sender = %sender, error = %e, "failed to greet client");
                    }
                }
            }
            Event::Line { sender, line } => self.serve(&sender, &line),
            Event::Rejected { sender, error } => self.reject(&sender, error),
            Event::Closed { sender } => self.close(&sender),
        }
    }

    fn serve(&mut self, sender: &str, line: &str) {
        if !self.connections.contains_key(sender) {
            return;
        }

        let envelope: CallEnvelope = match serde_json::from_str(line) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.reject(sender, WireError::from_decode_failure(line, &e));
                return;
            }
        };

        let method = envelope.call.method();
        let (body, fd) = self.portal.handle_call(sender, envelope.call).into_reply();
        tracing::trace!(sender = %sender, serial = envelope.serial, method = %method, "reply");
        let reply = ServerMessage::Reply {
            serial: envelope.serial,
            body,
        };
        self.send(sender, &reply, fd.as_ref().map(|fd| fd.as_fd()));
        // Our copy of a handed-off descriptor closes here
    }

    fn reject(&mut self, sender: &str, error: WireError) {
        tracing::warn!(sender = %sender, code = %error.code.as_str(), error = %error.message, "rejecting call");
        self.send(sender, &ServerMessage::Error(error), None);
    }

    fn forward(&mut self, completion: Completion) {
        if !self.connections.contains_key(&completion.sender) {
            tracing::debug!(
                sender = %completion.sender,
                handle = %completion.handle,
                "dropping completion for departed caller"
            );
            return;
        }
        let signal = ServerMessage::Signal(completion.to_signal());
        self.send(&completion.sender, &signal, None);
    }

    fn send(
        &mut self,
        sender: &str,
        message: &ServerMessage,
        fd: Option<std::os::fd::BorrowedFd<'_>>,
    ) {
        let Some(stream) = self.connections.get(sender) else {
            return;
        };
        if let Err(e) = send_line(stream, message, fd) {
            tracing::warn!(sender = %sender, error = %e, "write failed, dropping client");
            self.close(sender);
        }
    }

    fn close(&mut self, sender: &str) {
        if let Some(stream) = self.connections.remove(sender) {
            let _ = stream.shutdown(Shutdown::Both);
            self.portal.disconnect(sender);
            tracing::info!(sender = %sender, "client disconnected");
        }
    }
}
