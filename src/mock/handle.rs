//! Handle allocation
//!
//! Request and session handles are object paths of the form
//! `<prefix>/<sender>/<token>`. A caller-supplied token is honored the
//! first time it is seen; after that, or without one, a counter suffix
//! keeps every handle unique for the lifetime of the allocator.

use std::collections::HashSet;
use std::sync::Mutex;

use portal_protocol::{Options, REQUEST_PATH_PREFIX, SESSION_PATH_PREFIX};

/// Handle namespaces; each allocator serves exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Request,
    Session,
}

impl HandleKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            HandleKind::Request => REQUEST_PATH_PREFIX,
            HandleKind::Session => SESSION_PATH_PREFIX,
        }
    }

    /// Option key carrying the caller's token for this namespace
    pub fn token_option(&self) -> &'static str {
        match self {
            HandleKind::Request => "handle_token",
            HandleKind::Session => "session_handle_token",
        }
    }
}

#[derive(Debug, Default)]
struct AllocatorState {
    counter: u64,
    issued: HashSet<String>,
}

/// Mints unique handles for one namespace
#[derive(Debug)]
pub struct HandleAllocator {
    kind: HandleKind,
    state: Mutex<AllocatorState>,
}

impl HandleAllocator {
    pub fn new(kind: HandleKind) -> Self {
        Self {
            kind,
            state: Mutex::new(AllocatorState::default()),
        }
    }

    /// Mint a handle for `sender`, honoring the token option if present
    pub fn next_for(&self, sender: &str, options: &Options) -> String {
        let token = options
            .get(self.kind.token_option())
            .and_then(|v| v.as_str());
        self.next(sender, token)
    }

    /// Mint a handle never returned before by this allocator
    pub fn next(&self, sender: &str, token: Option<&str>) -> String {
        let base = format!("{}/{}", self.kind.prefix(), escape_sender(sender));
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let token = token.filter(|t| is_valid_token(t));
        if let Some(token) = token {
            let handle = format!("{}/{}", base, token);
            if state.issued.insert(handle.clone()) {
                return handle;
            }
            tracing::debug!(handle = %handle, "token already used, appending counter");
        }

        loop {
            state.counter += 1;
            let suffix = match token {
                Some(token) => format!("{}_{}", token, state.counter),
                None => format!("t{}", state.counter),
            };
            let handle = format!("{}/{}", base, suffix);
            if state.issued.insert(handle.clone()) {
                return handle;
            }
        }
    }

    /// Number of handles issued so far
    pub fn issued(&self) -> usize {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).issued.len()
    }
}

/// Turn a unique bus name like `:1.42` into the path element `1_42`
pub fn escape_sender(sender: &str) -> String {
    let escaped: String = sender
        .trim_start_matches(':')
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if escaped.is_empty() {
        "_".to_string()
    } else {
        escaped
    }
}

fn is_valid_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_escape_sender() {
        assert_eq!(escape_sender(":1.42"), "1_42");
        assert_eq!(escape_sender("org.example.App"), "org_example_App");
        assert_eq!(escape_sender(""), "_");
    }

    #[test]
    fn test_counter_handles_are_unique() {
        let alloc = HandleAllocator::new(HandleKind::Request);
        let a = alloc.next(":1.1", None);
        let b = alloc.next(":1.1", None);
        assert_ne!(a, b);
        assert_eq!(a, "/org/freedesktop/portal/desktop/request/1_1/t1");
        assert_eq!(b, "/org/freedesktop/portal/desktop/request/1_1/t2");
    }

    #[test]
    fn test_token_honored_once() {
        let alloc = HandleAllocator::new(HandleKind::Session);
        let first = alloc.next(":1.7", Some("mysession"));
        let second = alloc.next(":1.7", Some("mysession"));
        assert_eq!(first, "/org/freedesktop/portal/desktop/session/1_7/mysession");
        assert_ne!(first, second);
        assert!(second.starts_with("/org/freedesktop/portal/desktop/session/1_7/mysession_"));
    }

    #[test]
    fn test_invalid_token_falls_back_to_counter() {
        let alloc = HandleAllocator::new(HandleKind::Request);
        let handle = alloc.next(":1.1", Some("not/a-token"));
        assert!(handle.ends_with("/t1"));
    }

    #[test]
    fn test_token_cannot_shadow_counter_handle() {
        let alloc = HandleAllocator::new(HandleKind::Request);
        let counted = alloc.next(":1.1", None);
        let tokened = alloc.next(":1.1", Some("t1"));
        assert_ne!(counted, tokened);
    }

    #[test]
    fn test_next_for_reads_namespace_option() {
        let alloc = HandleAllocator::new(HandleKind::Session);
        let mut options = Options::new();
        options.insert("handle_token".to_string(), "req".into());
        options.insert("session_handle_token".to_string(), "sess".into());
        assert!(alloc.next_for(":1.3", &options).ends_with("/1_3/sess"));
    }

    #[test]
    fn test_concurrent_allocation_unique() {
        let alloc = Arc::new(HandleAllocator::new(HandleKind::Request));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let alloc = Arc::clone(&alloc);
                thread::spawn(move || {
                    (0..200)
                        .map(|_| alloc.next(&format!(":1.{}", i % 2), Some("same")))
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all = HashSet::new();
        for handle in handles {
            for h in handle.join().expect("Thread panicked") {
                assert!(all.insert(h.clone()), "Duplicate handle: {}", h);
            }
        }
        assert_eq!(all.len(), 1600);
        assert_eq!(alloc.issued(), 1600);
    }
}
