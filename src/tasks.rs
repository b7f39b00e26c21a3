//! Task types, the bounded task queue, and the shutdown signal

use crate::error::{IndexError, Result};
use tokio::sync::watch;

/// One unit of fetch work
///
/// Tasks are tagged values so the worker loop handles every kind
/// exhaustively; there is no string dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Refresh the group list from one server
    ListGroups {
        /// Server host
        server: String,
    },
    /// Fetch one XOVER chunk of a group
    FetchRange {
        /// Server host
        server: String,
        /// Newsgroup name
        group: String,
        /// First article number, inclusive
        lo: u64,
        /// Last article number, inclusive
        hi: u64,
    },
}

impl Task {
    /// Short identifier for logs
    pub fn describe(&self) -> String {
        match self {
            Self::ListGroups { server } => format!("list-groups[{}]", server),
            Self::FetchRange {
                server,
                group,
                lo,
                hi,
            } => format!("fetch[{}/{} {}-{}]", server, group, lo, hi),
        }
    }
}

/// A task plus its retry count
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    /// The work itself
    pub task: Task,
    /// How many times this task has already failed
    pub attempt: u32,
}

/// Bounded FIFO of tasks
///
/// Enqueue blocks when the queue is full (back-pressure on the planner);
/// workers block on the other end until the queue closes.
#[derive(Clone)]
pub struct TaskQueue {
    tx: async_channel::Sender<QueuedTask>,
    rx: async_channel::Receiver<QueuedTask>,
}

impl TaskQueue {
    /// Create a queue holding at most `capacity` tasks
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Enqueue a fresh task, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Cancelled`] once the queue is closed.
    pub async fn push(&self, task: Task) -> Result<()> {
        self.push_queued(QueuedTask { task, attempt: 0 }).await
    }

    /// Re-enqueue a failed task with its bumped attempt count.
    pub async fn push_queued(&self, task: QueuedTask) -> Result<()> {
        self.tx.send(task).await.map_err(|_| IndexError::Cancelled)
    }

    /// Dequeue the next task, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<QueuedTask> {
        self.rx.recv().await.ok()
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether the queue is currently empty
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Close the queue: pending tasks can still be drained, new pushes fail.
    pub fn close(&self) {
        self.tx.close();
    }
}

/// Cooperative shutdown flag
///
/// Cloned into every loop that must observe cancellation: queue waits,
/// retry sleeps, and the facade's planning passes.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// The owning side of the shutdown flag
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

/// Create a linked shutdown handle/signal pair
pub fn shutdown_channel() -> (ShutdownHandle, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownHandle { tx }, ShutdownSignal { rx })
}

impl ShutdownHandle {
    /// Trip the flag; every observer sees it on its next check or wait
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl ShutdownSignal {
    /// Whether shutdown has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until shutdown is requested
    pub async fn cancelled(&mut self) {
        // wait_for returns immediately when the value is already true
        let _ = self.rx.wait_for(|v| *v).await;
    }

    /// Sleep that aborts early on shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::Cancelled`] when shutdown interrupts the sleep.
    pub async fn sleep(&mut self, duration: std::time::Duration) -> Result<()> {
        tokio::select! {
            _ = tokio::time::sleep(duration) => Ok(()),
            _ = self.cancelled() => Err(IndexError::Cancelled),
        }
    }
}
