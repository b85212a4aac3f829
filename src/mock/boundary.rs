//! Error boundary for exposed operations
//!
//! The mock outlives many bad calls from the client under test, so no
//! fault may escape an operation. Every portal method runs its body
//! through [`boundary`]: errors and panics are logged at error level and
//! the call yields no result.

use std::panic::{self, AssertUnwindSafe};

use portal_protocol::Method;

use super::scheduler::panic_message;
use crate::error::PortalError;

/// Run `f` for `method`, absorbing any error or panic
pub fn boundary<T>(method: Method, f: impl FnOnce() -> Result<T, PortalError>) -> Option<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(e)) => {
            tracing::error!(method = %method, error = %e, "portal call failed");
            None
        }
        Err(payload) => {
            tracing::error!(
                method = %method,
                panic = %panic_message(payload.as_ref()),
                "portal call panicked"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passes_values_through() {
        assert_eq!(boundary(Method::Start, || Ok(5)), Some(5));
    }

    #[test]
    fn test_absorbs_errors() {
        let result: Option<u32> = boundary(Method::Start, || Err(PortalError::SchedulerStopped));
        assert!(result.is_none());
    }

    #[test]
    fn test_absorbs_panics() {
        let result: Option<u32> = boundary(Method::NotifyTouchUp, || panic!("bad event"));
        assert!(result.is_none());
    }
}
