use crate::error::{Result, SessionError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Unique identifier of a submitted operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(Uuid);

impl OperationId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

const PENDING: u8 = 0;
const STARTED: u8 = 1;
const CANCELLED: u8 = 2;

/// State shared between an [`Operation`] and the work unit executing it
pub(crate) struct Shared<T> {
    outcome: Mutex<Option<Result<T>>>,
    done: watch::Sender<bool>,
    phase: AtomicU8,
    cancel_requested: Arc<AtomicBool>,
}

impl<T> Shared<T> {
    pub(crate) fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            outcome: Mutex::new(None),
            done,
            phase: AtomicU8::new(PENDING),
            cancel_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Mark the work as started. Returns `false` if a cancel request got there first.
    pub(crate) fn try_start(&self) -> bool {
        self.phase
            .compare_exchange(PENDING, STARTED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn request_cancel(&self) -> bool {
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.phase
            .compare_exchange(PENDING, CANCELLED, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub(crate) fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel_requested)
    }

    /// Write the outcome. Only the first write is kept.
    pub(crate) fn complete(&self, result: Result<T>) -> bool {
        {
            let mut slot = self.outcome.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
        }
        self.done.send_replace(true);
        true
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }
}

/// Handle to one in-flight asynchronous session action.
///
/// The handle can be awaited, waited on from synchronous code, inspected
/// without waiting, or simply dropped. Dropping it does not cancel the work.
pub struct Operation<T> {
    id: OperationId,
    name: &'static str,
    submitted_at: DateTime<Utc>,
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Operation<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            submitted_at: self.submitted_at,
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Operation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("completed", &self.is_completed())
            .finish_non_exhaustive()
    }
}

impl<T> Operation<T> {
    pub(crate) fn new(name: &'static str, shared: Arc<Shared<T>>) -> Self {
        Self {
            id: OperationId::new(),
            name,
            submitted_at: Utc::now(),
            shared,
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    /// Name of the session action this operation runs (e.g. "recognize_once")
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    pub fn is_completed(&self) -> bool {
        *self.shared.done.borrow()
    }

    /// Request cancellation.
    ///
    /// Returns `true` if the request landed before the work started, in which
    /// case the work never runs and the outcome is [`SessionError::Cancelled`].
    /// Engine calls already under way run to completion.
    pub fn cancel(&self) -> bool {
        self.shared.request_cancel()
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.shared.is_cancel_requested()
    }
}

impl<T: Clone> Operation<T> {
    /// Current outcome, or `None` while the operation is still pending
    pub fn try_outcome(&self) -> Option<Result<T>> {
        self.shared.outcome.lock().clone()
    }

    /// Wait for the operation to complete
    pub async fn wait(&self) -> Result<T> {
        let mut done = self.shared.done.subscribe();
        // The sender lives in `shared`, which we hold, so the channel cannot close.
        let _ = done.wait_for(|finished| *finished).await;

        self.try_outcome().unwrap_or(Err(SessionError::Cancelled))
    }

    /// Block the current thread until the operation completes.
    ///
    /// Must not be called from inside an async task; use [`Operation::wait`] there.
    pub fn wait_blocking(&self) -> Result<T> {
        futures::executor::block_on(self.wait())
    }
}

/// View of the operation handed to the work unit
pub struct OperationContext {
    id: OperationId,
    cancel_requested: Arc<AtomicBool>,
}

impl OperationContext {
    pub(crate) fn new(id: OperationId, cancel_requested: Arc<AtomicBool>) -> Self {
        Self {
            id,
            cancel_requested,
        }
    }

    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }
}
