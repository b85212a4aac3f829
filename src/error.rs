//! Portal error types
//!
//! These never cross the service boundary: every exposed operation runs
//! behind [`crate::mock::boundary`], which logs them and yields no result.

use portal_protocol::Method;

/// Internal fault raised while serving a portal call
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Injected fault for {method}: {message}")]
    InjectedFault { method: Method, message: String },

    #[error("Channel hand-off failed: {0}")]
    Channel(#[from] nix::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Completion scheduler is no longer running")]
    SchedulerStopped,
}
