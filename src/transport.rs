//! Line transport over Unix stream sockets
//!
//! Messages are single JSON objects terminated by `\n`. A descriptor that
//! belongs to a message travels as `SCM_RIGHTS` ancillary data on the
//! first bytes of that message; the reading side queues received
//! descriptors in arrival order and matches them to `fd` replies.

use std::collections::VecDeque;
use std::io::{self, IoSlice, IoSliceMut, Write};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::net::UnixStream;

use nix::errno::Errno;
use nix::sys::socket::{
    recvmsg, sendmsg, ControlMessage, ControlMessageOwned, MsgFlags, UnixAddr,
};
use serde::Serialize;

/// Upper bound on a single message line
pub const MAX_LINE_BYTES: usize = 1 << 20;

const READ_CHUNK: usize = 8192;

/// Client/server I/O errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timed out waiting for the portal")]
    Timeout,

    #[error("Connection closed by peer")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Socket error: {0}")]
    Os(#[from] nix::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Call rejected: {0}")]
    Rejected(portal_protocol::WireError),
}

/// Write one message line, attaching `fd` if given
pub fn send_line<T: Serialize>(
    stream: &UnixStream,
    message: &T,
    fd: Option<BorrowedFd<'_>>,
) -> Result<(), TransportError> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');

    let mut sent = 0;
    if let Some(fd) = fd {
        let fds = [fd.as_raw_fd()];
        let cmsgs = [ControlMessage::ScmRights(&fds)];
        let iov = [IoSlice::new(&bytes)];
        sent = loop {
            match sendmsg::<UnixAddr>(stream.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None) {
                Ok(n) => break n,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        };
    }

    // The descriptor went out with the first chunk; the rest is plain data
    let mut writer = stream;
    writer.write_all(&bytes[sent..])?;
    Ok(())
}

/// Splits a byte stream into lines and collects passed descriptors
#[derive(Debug, Default)]
pub struct LineReader {
    buf: Vec<u8>,
    fds: VecDeque<OwnedFd>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the next complete line, without its terminator.
    ///
    /// Honors the stream's read timeout: an expired timeout yields
    /// [`TransportError::Timeout`] and keeps any partial line buffered.
    pub fn read_line(&mut self, stream: &UnixStream) -> Result<String, TransportError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                return String::from_utf8(line)
                    .map_err(|e| TransportError::Protocol(format!("message is not UTF-8: {}", e)));
            }
            if self.buf.len() > MAX_LINE_BYTES {
                return Err(TransportError::Protocol(format!(
                    "message exceeds {} bytes",
                    MAX_LINE_BYTES
                )));
            }
            if self.fill(stream)? == 0 {
                return Err(TransportError::Closed);
            }
        }
    }

    /// Oldest received descriptor not yet claimed
    pub fn take_fd(&mut self) -> Option<OwnedFd> {
        self.fds.pop_front()
    }

    /// Descriptors received but not yet claimed
    pub fn pending_fds(&self) -> usize {
        self.fds.len()
    }

    fn fill(&mut self, stream: &UnixStream) -> Result<usize, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut cmsg_buf = nix::cmsg_space!([RawFd; 4]);
        let mut iov = [IoSliceMut::new(&mut chunk)];

        let (bytes, received) = loop {
            match recvmsg::<UnixAddr>(
                stream.as_raw_fd(),
                &mut iov,
                Some(&mut cmsg_buf),
                MsgFlags::MSG_CMSG_CLOEXEC,
            ) {
                Ok(msg) => {
                    let mut received = Vec::new();
                    for cmsg in msg.cmsgs()? {
                        if let ControlMessageOwned::ScmRights(fds) = cmsg {
                            received.extend(fds);
                        }
                    }
                    break (msg.bytes, received);
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => return Err(TransportError::Timeout),
                Err(e) => return Err(e.into()),
            }
        };

        for raw in received {
            // SAFETY: the kernel installed this descriptor for us in the
            // SCM_RIGHTS message above; nothing else owns it.
            self.fds.push_back(unsafe { OwnedFd::from_raw_fd(raw) });
        }
        self.buf.extend_from_slice(&chunk[..bytes]);
        Ok(bytes)
    }
}
