//! Bounded frontier queue and in-flight accounting
//!
//! Every task on the frontier carries an [`InFlightGuard`]. The guard is
//! taken before the task is pushed and released when it is dropped, which
//! happens when processing finishes, when a push is aborted, or when a queued
//! task is discarded. The reaper closes the frontier once the count reaches
//! zero; at that point no task exists that could admit more work.

use crate::crawler::Task;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio_util::sync::CancellationToken;

/// Counter of admitted tasks that have not yet been released
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    inner: Arc<InFlightInner>,
}

#[derive(Debug, Default)]
struct InFlightInner {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the counter and returns the guard that will decrement it
    pub fn acquire(&self) -> InFlightGuard {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Current number of unreleased tasks
    pub fn current(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    /// Waits until the counter is zero
    pub async fn wait_idle(&self) {
        loop {
            // Register before checking so a release between the check and
            // the await is not missed.
            let notified = self.inner.idle.notified();
            if self.current() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Releases one in-flight count when dropped
#[derive(Debug)]
pub struct InFlightGuard {
    inner: Arc<InFlightInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

/// A task on the frontier together with its in-flight count
#[derive(Debug)]
pub struct Admitted {
    pub task: Task,
    pub guard: InFlightGuard,
}

/// Outcome of waiting on the frontier
#[derive(Debug)]
pub enum Pop {
    Task(Admitted),
    Closed,
    Cancelled,
}

/// Why a push did not reach the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushAborted {
    Cancelled,
    Closed,
}

/// Multi-producer, multi-consumer bounded queue of admitted tasks
#[derive(Debug, Clone)]
pub struct Frontier {
    tx: mpsc::Sender<Admitted>,
    rx: Arc<Mutex<mpsc::Receiver<Admitted>>>,
    closed: CancellationToken,
}

impl Frontier {
    /// Creates a frontier holding at most `capacity` tasks
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            closed: CancellationToken::new(),
        }
    }

    /// Pushes a task, waiting for capacity
    ///
    /// On cancellation the task is dropped, which releases its in-flight
    /// count. A task is never enqueued after cancellation has been observed.
    pub async fn push(
        &self,
        admitted: Admitted,
        cancel: &CancellationToken,
    ) -> Result<(), PushAborted> {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PushAborted::Cancelled),
            permit = self.tx.reserve() => permit.map_err(|_| PushAborted::Closed)?,
        };

        permit.send(admitted);
        Ok(())
    }

    /// Waits for the next task, for closure, or for cancellation
    pub async fn pop(&self, cancel: &CancellationToken) -> Pop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Pop::Cancelled,
            _ = self.closed.cancelled() => Pop::Closed,
            next = async { self.rx.lock().await.recv().await } => match next {
                Some(admitted) => Pop::Task(admitted),
                None => Pop::Closed,
            },
        }
    }

    /// Closes the frontier; waiting and future pops return [`Pop::Closed`]
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Discards every queued task, releasing their in-flight counts
    ///
    /// Returns the number of tasks discarded.
    pub async fn discard_pending(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut discarded = 0;
        while let Ok(admitted) = rx.try_recv() {
            tracing::debug!(url = %admitted.task.url, "Discarding unprocessed task");
            discarded += 1;
        }
        discarded
    }
}
