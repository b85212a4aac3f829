//! Signal handling for `serve` (SIGINT/SIGTERM)
//!
//! The first signal asks the server to stop: the accept loop and state
//! thread wind down, connections are closed and the socket file is
//! removed. A second signal exits at once with [`EXIT_CODE_INTERRUPTED`].

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Exit code when a second signal cuts shutdown short
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Action to take after receiving a signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    /// First signal: stop serving
    Shutdown,
    /// Second signal: exit immediately
    ImmediateExit,
    /// Third+ signal: ignore
    Ignore,
}

/// Shared shutdown state
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
    signal_count: AtomicU8,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag the server polls; set once shutdown has been requested
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.requested)
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    pub fn signal_count(&self) -> u8 {
        self.signal_count.load(Ordering::SeqCst)
    }

    /// Record one signal and decide what to do about it
    pub fn handle_signal(&self) -> SignalAction {
        match self.signal_count.fetch_add(1, Ordering::SeqCst) {
            0 => {
                self.requested.store(true, Ordering::SeqCst);
                SignalAction::Shutdown
            }
            1 => SignalAction::ImmediateExit,
            _ => SignalAction::Ignore,
        }
    }

    /// Install the process-wide handler. Must be called at most once.
    pub fn install(self: &Arc<Self>) -> Result<(), ctrlc::Error> {
        let state = Arc::clone(self);
        ctrlc::set_handler(move || match state.handle_signal() {
            SignalAction::Shutdown => {
                tracing::info!("received interrupt, shutting down");
            }
            SignalAction::ImmediateExit => {
                tracing::warn!("received second interrupt, exiting immediately");
                std::process::exit(EXIT_CODE_INTERRUPTED);
            }
            SignalAction::Ignore => {}
        })
    }
}
