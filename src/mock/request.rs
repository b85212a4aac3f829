//! Request/response engine
//!
//! `submit` mints a request handle and returns it straight away; the
//! matching completion is delivered later by the scheduler thread, once
//! the request's delay has passed. Every accepted request resolves exactly
//! once and produces exactly one completion.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use portal_protocol::{Method, Options, ResponseCode, ResponseSignal, Results};

use super::handle::{HandleAllocator, HandleKind};
use super::scheduler::Scheduler;
use crate::error::PortalError;

/// Outcome of a resolved request
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub code: ResponseCode,
    pub results: Results,
}

/// An accepted request
#[derive(Debug, Clone)]
pub struct Request {
    pub handle: String,
    pub sender: String,
    pub method: Method,
    pub options: Options,
    pub accepted_at: DateTime<Utc>,
    /// Set exactly once, when the completion is delivered
    pub outcome: Option<Response>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Request {
    pub fn is_resolved(&self) -> bool {
        self.outcome.is_some()
    }
}

/// Completion record handed to subscribers
#[derive(Debug, Clone)]
pub struct Completion {
    pub handle: String,
    /// Owner of the request; the signal is routed to this caller
    pub sender: String,
    pub method: Method,
    pub response: ResponseCode,
    pub results: Results,
    pub accepted_at: Instant,
    pub resolved_at: Instant,
}

impl Completion {
    /// Time between accept and delivery
    pub fn elapsed(&self) -> Duration {
        self.resolved_at.duration_since(self.accepted_at)
    }

    /// Wire form of this completion
    pub fn to_signal(&self) -> ResponseSignal {
        ResponseSignal {
            handle: self.handle.clone(),
            response: self.response,
            results: self.results.clone(),
        }
    }
}

/// How a submitted request completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionPlan {
    pub response: ResponseCode,
    pub delay: Duration,
}

struct Pending {
    handle: String,
    sender: String,
    method: Method,
    response: ResponseCode,
    results: Results,
    accepted_at: Instant,
}

#[derive(Default)]
struct EngineShared {
    requests: Mutex<HashMap<String, Request>>,
    /// Callers forgotten while some of their requests were still pending
    departed: Mutex<HashSet<String>>,
    subscribers: Mutex<Vec<Sender<Completion>>>,
}

impl EngineShared {
    fn requests(&self) -> MutexGuard<'_, HashMap<String, Request>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn departed(&self) -> MutexGuard<'_, HashSet<String>> {
        self.departed.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn resolve(&self, pending: Pending) {
        {
            let mut requests = self.requests();
            match requests.get_mut(&pending.handle) {
                Some(request) if !request.is_resolved() => {
                    request.outcome = Some(Response {
                        code: pending.response,
                        results: pending.results.clone(),
                    });
                    request.resolved_at = Some(Utc::now());
                }
                Some(_) => {
                    tracing::warn!(handle = %pending.handle, "request already resolved, dropping completion");
                    return;
                }
                None => {
                    tracing::warn!(handle = %pending.handle, "completion for unknown request");
                    return;
                }
            }

            // Nobody will ask about this request again
            let mut departed = self.departed();
            if departed.contains(&pending.sender) {
                requests.remove(&pending.handle);
                if !requests.values().any(|r| r.sender == pending.sender) {
                    departed.remove(&pending.sender);
                }
            }
        }

        let completion = Completion {
            handle: pending.handle,
            sender: pending.sender,
            method: pending.method,
            response: pending.response,
            results: pending.results,
            accepted_at: pending.accepted_at,
            resolved_at: Instant::now(),
        };
        tracing::debug!(
            handle = %completion.handle,
            method = %completion.method,
            response = %completion.response,
            elapsed_ms = completion.elapsed().as_millis() as u64,
            "request completed"
        );

        let mut subscribers = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subscribers.retain(|tx| tx.send(completion.clone()).is_ok());
    }
}

/// Accepts requests and delivers their completions after a delay
pub struct RequestEngine {
    handles: HandleAllocator,
    shared: Arc<EngineShared>,
    scheduler: Scheduler<Pending>,
}

impl RequestEngine {
    /// Create an engine and start its scheduler thread
    pub fn new() -> Result<Self, PortalError> {
        let shared = Arc::new(EngineShared::default());
        let delivery = Arc::clone(&shared);
        let scheduler = Scheduler::spawn("portal-completions", move |pending| {
            delivery.resolve(pending)
        })?;
        Ok(Self {
            handles: HandleAllocator::new(HandleKind::Request),
            shared,
            scheduler,
        })
    }

    /// Accept a request and schedule its completion.
    ///
    /// `results` computes the payload of the completion. If it fails, no
    /// request is recorded and nothing will be delivered.
    pub fn submit<F>(
        &self,
        sender: &str,
        method: Method,
        options: Options,
        plan: CompletionPlan,
        results: F,
    ) -> Result<String, PortalError>
    where
        F: FnOnce() -> Result<Results, PortalError>,
    {
        let handle = self.handles.next_for(sender, &options);
        let results = results()?;
        self.shared.departed().remove(sender);
        let accepted_at = Instant::now();

        self.shared.requests().insert(
            handle.clone(),
            Request {
                handle: handle.clone(),
                sender: sender.to_string(),
                method,
                options,
                accepted_at: Utc::now(),
                outcome: None,
                resolved_at: None,
            },
        );

        let pending = Pending {
            handle: handle.clone(),
            sender: sender.to_string(),
            method,
            response: plan.response,
            results,
            accepted_at,
        };
        if let Err(e) = self.scheduler.schedule_at(accepted_at + plan.delay, pending) {
            self.shared.requests().remove(&handle);
            return Err(e);
        }

        tracing::debug!(
            handle = %handle,
            method = %method,
            delay_ms = plan.delay.as_millis() as u64,
            "request accepted"
        );
        Ok(handle)
    }

    /// Receive every completion delivered from now on
    pub fn subscribe(&self) -> Receiver<Completion> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.shared
            .subscribers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    /// Snapshot of a request
    pub fn request(&self, handle: &str) -> Option<Request> {
        self.shared.requests().get(handle).cloned()
    }

    /// Number of requests accepted but not yet resolved
    pub fn outstanding(&self) -> usize {
        self.shared
            .requests()
            .values()
            .filter(|r| !r.is_resolved())
            .count()
    }

    /// Forget resolved requests of a departed caller.
    ///
    /// Unresolved ones stay until their completion has been delivered and
    /// are dropped right after.
    pub fn forget_sender(&self, sender: &str) -> usize {
        let mut requests = self.shared.requests();
        let before = requests.len();
        requests.retain(|_, r| r.sender != sender || !r.is_resolved());
        let forgotten = before - requests.len();
        if requests.values().any(|r| r.sender == sender) {
            self.shared.departed().insert(sender.to_string());
        }
        forgotten
    }
}
