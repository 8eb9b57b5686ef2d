//! Execution context for repository calls.
//!
//! # Responsibility
//! - Carry cancellation and deadline state into every repository operation.
//! - Interrupt running SQLite statements when the context fires.
//!
//! # Invariants
//! - A context that already fired never lets SQL reach the backend.
//! - The progress handler installed for a call is removed when the call returns.

use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// SQLite virtual-machine steps between two context checks.
const PROGRESS_CHECK_INTERVAL_OPS: i32 = 1_000;

/// Reason a context stopped an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    Cancelled,
    DeadlineExceeded,
}

impl Display for ContextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::DeadlineExceeded => write!(f, "operation deadline exceeded"),
        }
    }
}

impl Error for ContextError {}

/// Cancellation and deadline carrier passed to every repository call.
#[derive(Debug, Clone)]
pub struct ExecContext {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Default for ExecContext {
    fn default() -> Self {
        Self::background()
    }
}

impl ExecContext {
    /// Context that never fires unless cancelled through its handle.
    pub fn background() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: None,
        }
    }

    /// Context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Context that expires at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Some(deadline),
        }
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns a handle that cancels this context (and its clones) from any thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    /// Returns the reason this context fired, or `None` while still live.
    pub fn state(&self) -> Option<ContextError> {
        context_state(&self.cancelled, self.deadline)
    }

    /// Fails when the context already fired.
    pub fn check(&self) -> Result<(), ContextError> {
        match self.state() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Installs a progress handler on `conn` that interrupts statements once
    /// this context fires. The handler lives until the guard is dropped.
    pub(crate) fn bind<'conn>(&self, conn: &'conn Connection) -> ContextGuard<'conn> {
        let cancelled = Arc::clone(&self.cancelled);
        let deadline = self.deadline;
        conn.progress_handler(
            PROGRESS_CHECK_INTERVAL_OPS,
            Some(move || context_state(&cancelled, deadline).is_some()),
        );
        ContextGuard { conn }
    }
}

/// Cancels the context it was taken from.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Removes the context progress handler on drop.
pub(crate) struct ContextGuard<'conn> {
    conn: &'conn Connection,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        self.conn.progress_handler(0, None::<fn() -> bool>);
    }
}

fn context_state(cancelled: &AtomicBool, deadline: Option<Instant>) -> Option<ContextError> {
    if cancelled.load(Ordering::SeqCst) {
        return Some(ContextError::Cancelled);
    }
    match deadline {
        Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
        _ => None,
    }
}
