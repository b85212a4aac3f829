//! Deadline scheduler
//!
//! One background thread owns a min-heap of `(deadline, seq)` entries and
//! sleeps on its command channel until the earliest deadline. Due entries
//! are handed to the delivery callback in deadline order; entries sharing
//! a deadline keep submission order.
//!
//! A panicking delivery is logged and the thread keeps running. Entries
//! cannot be cancelled; pending entries are dropped on shutdown.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::error::PortalError;

enum Command<T> {
    Schedule { deadline: Instant, item: T },
    Shutdown,
}

struct Entry<T> {
    deadline: Instant,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the max-heap pops the earliest deadline first
impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Handle to the scheduler thread
pub struct Scheduler<T: Send + 'static> {
    tx: Sender<Command<T>>,
    worker: Option<JoinHandle<()>>,
}

impl<T: Send + 'static> Scheduler<T> {
    /// Start the scheduler thread
    pub fn spawn<F>(name: &str, deliver: F) -> io::Result<Self>
    where
        F: FnMut(T) + Send + 'static,
    {
        let (tx, rx) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(rx, deliver))?;
        Ok(Self {
            tx,
            worker: Some(worker),
        })
    }

    /// Deliver `item` once `deadline` has passed
    pub fn schedule_at(&self, deadline: Instant, item: T) -> Result<(), PortalError> {
        self.tx
            .send(Command::Schedule { deadline, item })
            .map_err(|_| PortalError::SchedulerStopped)
    }

    /// Stop the thread, dropping anything still pending
    pub fn shutdown(&mut self) {
        let _ = self.tx.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            // Dropped from inside a delivery: the thread exits on its own
            if worker.thread().id() == thread::current().id() {
                return;
            }
            if worker.join().is_err() {
                tracing::error!("completion scheduler thread panicked");
            }
        }
    }
}

impl<T: Send + 'static> Drop for Scheduler<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run<T, F>(rx: Receiver<Command<T>>, mut deliver: F)
where
    F: FnMut(T),
{
    let mut queue: BinaryHeap<Entry<T>> = BinaryHeap::new();
    let mut seq: u64 = 0;

    loop {
        let command = match queue.peek() {
            Some(next) => match rx.recv_deadline(next.deadline) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            },
        };

        match command {
            Some(Command::Schedule { deadline, item }) => {
                seq += 1;
                queue.push(Entry { deadline, seq, item });
            }
            Some(Command::Shutdown) => break,
            None => {}
        }

        let now = Instant::now();
        while queue.peek().is_some_and(|e| e.deadline <= now) {
            let Some(entry) = queue.pop() else { break };
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| deliver(entry.item)));
            if let Err(payload) = outcome {
                tracing::error!(
                    seq = entry.seq,
                    panic = %panic_message(payload.as_ref()),
                    "completion delivery panicked"
                );
            }
        }
    }

    if !queue.is_empty() {
        tracing::debug!(pending = queue.len(), "scheduler stopped with pending entries");
    }
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
