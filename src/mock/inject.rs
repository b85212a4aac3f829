//! Response injection
//!
//! Lets a test override, per method, what the next calls produce: a
//! different response code, a different delay, or an internal fault that
//! makes the call yield no result at all.

use std::collections::HashMap;
use std::time::Duration;

use portal_protocol::{Method, ResponseCode};

/// Override applied to calls of one method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseOverride {
    /// Response code to complete with instead of the configured one
    pub response: Option<ResponseCode>,
    /// Delay to complete after instead of the configured one
    pub delay: Option<Duration>,
    /// Raise an internal fault with this message instead of serving the call
    pub fault: Option<String>,
    /// Number of calls to apply to (None = until cleared)
    pub count: Option<u32>,
}

impl ResponseOverride {
    /// Complete with a different response code
    pub fn response(code: ResponseCode) -> Self {
        Self {
            response: Some(code),
            ..Self::default()
        }
    }

    /// Complete after a different delay
    pub fn delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    /// Fail internally; the call yields nothing
    pub fn fault(message: impl Into<String>) -> Self {
        Self {
            fault: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Apply to the next `count` calls only
    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }
}

/// Per-method override table
#[derive(Debug, Default)]
pub struct ResponseInjector {
    overrides: HashMap<Method, ResponseOverride>,
    call_counts: HashMap<Method, u32>,
}

impl ResponseInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an override, replacing any previous one for `method`
    pub fn inject(&mut self, method: Method, config: ResponseOverride) {
        self.overrides.insert(method, config);
        self.call_counts.insert(method, 0);
    }

    pub fn clear(&mut self) {
        self.overrides.clear();
        self.call_counts.clear();
    }

    pub fn clear_method(&mut self, method: Method) {
        self.overrides.remove(&method);
        self.call_counts.remove(&method);
    }

    /// Consume one application of the override for `method`, if any
    pub fn check(&mut self, method: Method) -> Option<ResponseOverride> {
        let config = self.overrides.get(&method)?;
        let count = self.call_counts.entry(method).or_insert(0);
        *count += 1;

        if let Some(limit) = config.count {
            if *count > limit {
                return None;
            }
        }

        Some(config.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_override_constructors() {
        let o = ResponseOverride::response(ResponseCode::Cancelled).with_delay(Duration::ZERO);
        assert_eq!(o.response, Some(ResponseCode::Cancelled));
        assert_eq!(o.delay, Some(Duration::ZERO));
        assert!(o.fault.is_none());

        let f = ResponseOverride::fault("broken");
        assert_eq!(f.fault.as_deref(), Some("broken"));
    }

    #[test]
    fn test_injector_basic() {
        let mut injector = ResponseInjector::new();
        assert!(injector.check(Method::Start).is_none());

        injector.inject(Method::Start, ResponseOverride::response(ResponseCode::Other));
        assert_eq!(
            injector.check(Method::Start).unwrap().response,
            Some(ResponseCode::Other)
        );
        assert!(injector.check(Method::CreateSession).is_none());
    }

    #[test]
    fn test_injector_count() {
        let mut injector = ResponseInjector::new();
        injector.inject(
            Method::CreateSession,
            ResponseOverride::response(ResponseCode::Cancelled).with_count(2),
        );

        assert!(injector.check(Method::CreateSession).is_some());
        assert!(injector.check(Method::CreateSession).is_some());
        assert!(injector.check(Method::CreateSession).is_none());
    }

    #[test]
    fn test_injector_clear() {
        let mut injector = ResponseInjector::new();
        injector.inject(Method::SelectDevices, ResponseOverride::fault("x"));
        injector.inject(Method::Start, ResponseOverride::fault("y"));

        injector.clear_method(Method::SelectDevices);
        assert!(injector.check(Method::SelectDevices).is_none());
        assert!(injector.check(Method::Start).is_some());

        injector.clear();
        assert!(injector.check(Method::Start).is_none());
    }
}
