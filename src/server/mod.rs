//! Portal socket server
//!
//! Serves a [`RemoteDesktop`] over a Unix stream socket. Threads:
//!
//! - **listener**: accepts connections and names each caller `:1.N`
//! - **reader** (one per connection): turns incoming lines into events
//! - **state**: serves calls, writes replies and forwards completions
//!
//! Dropping a connection runs the portal's disconnect cleanup for that
//! caller. Lines that are not UTF-8 or exceed [`MAX_LINE_BYTES`] are
//! answered with an `error` message; the connection stays open. A caller
//! that stops reading is dropped once a write has blocked for the write
//! timeout. The socket file is removed when the server stops.

mod state;

use std::io::{self, BufRead, BufReader, ErrorKind, Read};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;
use portal_protocol::{ErrorCode, WireError};

use crate::mock::RemoteDesktop;
use crate::transport::{TransportError, MAX_LINE_BYTES};
use state::{Event, StateThread, POLL_INTERVAL};

/// Default limit on how long a reply or signal write may block
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// A bound, not yet running, portal server
pub struct Server {
    listener: UnixListener,
    path: PathBuf,
    portal: Arc<RemoteDesktop>,
    write_timeout: Duration,
}

impl Server {
    /// Bind the socket at `path`.
    ///
    /// A stale socket file nobody listens on is replaced; a live one is an
    /// error.
    pub fn bind(path: impl AsRef<Path>, portal: Arc<RemoteDesktop>) -> Result<Self, TransportError> {
        let path = path.as_ref().to_path_buf();
        if path.exists() {
            if UnixStream::connect(&path).is_ok() {
                return Err(TransportError::ConnectionFailed(format!(
                    "{} is already served",
                    path.display()
                )));
            }
            tracing::warn!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(&path)?;
        }

        let listener = UnixListener::bind(&path)?;
        listener.set_nonblocking(true)?;
        tracing::info!(path = %path.display(), "portal listening");
        Ok(Self {
            listener,
            path,
            portal,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        })
    }

    /// Drop callers whose writes block longer than `timeout`
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn portal(&self) -> &Arc<RemoteDesktop> {
        &self.portal
    }

    /// Serve until `shutdown` is set
    pub fn run(self, shutdown: Arc<AtomicBool>) -> Result<(), TransportError> {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let completions = self.portal.subscribe();

        let state = StateThread::new(Arc::clone(&self.portal));
        let state_shutdown = Arc::clone(&shutdown);
        let state_thread = thread::Builder::new()
            .name("portal-state".to_string())
            .spawn(move || state.run(events_rx, completions, state_shutdown))?;

        let result = accept_loop(&self.listener, &events_tx, &shutdown, self.write_timeout);

        // The state thread also stops if accepting failed
        shutdown.store(true, Ordering::SeqCst);
        if state_thread.join().is_err() {
            tracing::error!("portal state thread panicked");
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove socket");
        }
        tracing::info!("portal stopped");
        result
    }

    /// Serve on a background thread
    pub fn spawn(self) -> Result<ServerHandle, TransportError> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&shutdown);
        let path = self.path.clone();
        let thread = thread::Builder::new()
            .name("portal-listener".to_string())
            .spawn(move || self.run(flag))?;
        Ok(ServerHandle {
            path,
            shutdown,
            thread: Some(thread),
        })
    }
}

/// Running server started by [`Server::spawn`]; stops on drop
pub struct ServerHandle {
    path: PathBuf,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), TransportError>>>,
}

impl ServerHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop serving and wait for the server threads
    pub fn stop(mut self) -> Result<(), TransportError> {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> Result<(), TransportError> {
        self.shutdown.store(true, Ordering::SeqCst);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| TransportError::Protocol("server thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Err(e) = self.stop_inner() {
            tracing::warn!(error = %e, "server stopped with error");
        }
    }
}

fn accept_loop(
    listener: &UnixListener,
    events: &Sender<Event>,
    shutdown: &AtomicBool,
    write_timeout: Duration,
) -> Result<(), TransportError> {
    let mut next_id: u64 = 1;

    while !shutdown.load(Ordering::SeqCst) {
        let stream = match listener.accept() {
            Ok((stream, _)) => stream,
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                thread::sleep(POLL_INTERVAL);
                continue;
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        let sender = format!(":1.{}", next_id);
        next_id += 1;

        if let Err(e) = start_connection(&sender, stream, events, write_timeout) {
            tracing::warn!(sender = %sender, error = %e, "failed to set up connection");
        }
    }
    Ok(())
}

fn start_connection(
    sender: &str,
    stream: UnixStream,
    events: &Sender<Event>,
    write_timeout: Duration,
) -> Result<(), TransportError> {
    stream.set_nonblocking(false)?;
    let writer = stream.try_clone()?;
    // Shared by both halves; only the state thread writes
    writer.set_write_timeout(Some(write_timeout))?;

    // Registered before the reader can produce lines for it
    events
        .send(Event::Connected {
            sender: sender.to_string(),
            stream: writer,
        })
        .map_err(|_| TransportError::Closed)?;

    let reader_events = events.clone();
    let reader_sender = sender.to_string();
    thread::Builder::new()
        .name(format!("portal-conn-{}", sender.trim_start_matches(':')))
        .spawn(move || read_loop(reader_sender, stream, reader_events))?;
    Ok(())
}

fn read_loop(sender: String, stream: UnixStream, events: Sender<Event>) {
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let event = match read_frame(&mut reader, &mut buf) {
            Ok(Frame::Eof) => break,
            Ok(Frame::Line) => {
                while buf.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
                    buf.pop();
                }
                match String::from_utf8(std::mem::take(&mut buf)) {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => Event::Line {
                        sender: sender.clone(),
                        line,
                    },
                    Err(e) => Event::Rejected {
                        sender: sender.clone(),
                        error: WireError::new(
                            None,
                            ErrorCode::InvalidRequest,
                            format!("message is not UTF-8: {}", e.utf8_error()),
                        ),
                    },
                }
            }
            Ok(Frame::Oversized) => Event::Rejected {
                sender: sender.clone(),
                error: WireError::new(
                    None,
                    ErrorCode::InvalidRequest,
                    format!("message exceeds {} bytes", MAX_LINE_BYTES),
                ),
            },
            Err(e) => {
                tracing::debug!(sender = %sender, error = %e, "connection read failed");
                break;
            }
        };
        if events.send(event).is_err() {
            return;
        }
    }
    let _ = events.send(Event::Closed { sender });
}

enum Frame {
    /// `buf` holds one line, possibly unterminated at end of stream
    Line,
    /// The line was longer than [`MAX_LINE_BYTES`] and has been skipped
    Oversized,
    Eof,
}

fn read_frame(reader: &mut BufReader<UnixStream>, buf: &mut Vec<u8>) -> io::Result<Frame> {
    let limit = MAX_LINE_BYTES as u64 + 1;
    if reader.by_ref().take(limit).read_until(b'\n', buf)? == 0 {
        return Ok(Frame::Eof);
    }
    if buf.last() == Some(&b'\n') || buf.len() <= MAX_LINE_BYTES {
        return Ok(Frame::Line);
    }
    skip_line(reader)?;
    Ok(Frame::Oversized)
}

/// Discard input up to and including the next newline
fn skip_line(reader: &mut impl BufRead) -> io::Result<()> {
    loop {
        let available = match reader.fill_buf() {
            Ok(available) => available,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return Ok(());
        }
        match available.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                reader.consume(pos + 1);
                return Ok(());
            }
            None => {
                let len = available.len();
                reader.consume(len);
            }
        }
    }
}
