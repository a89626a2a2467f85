use super::handle::{Operation, OperationContext, Shared};
use crate::error::{Result, SessionError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

/// Background executor for session work units.
///
/// Owns a dedicated tokio runtime so that work never runs on the caller's
/// thread nor on the engine's notification thread. Engine calls are blocking,
/// so every unit runs on the runtime's blocking pool.
pub struct Executor {
    runtime: Option<Runtime>,
}

impl Executor {
    /// Create an executor with `worker_threads` async workers and at most
    /// `max_blocking_threads` work units running at once
    pub fn new(worker_threads: usize, max_blocking_threads: usize) -> anyhow::Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .max_blocking_threads(max_blocking_threads.max(1))
            .thread_name("speech-session-worker")
            .enable_all()
            .build()?;

        Ok(Self {
            runtime: Some(runtime),
        })
    }

    /// Submit a unit of work and return its handle immediately
    pub fn submit<T, F>(&self, name: &'static str, work: F) -> Operation<T>
    where
        T: Send + 'static,
        F: FnOnce(&OperationContext) -> Result<T> + Send + 'static,
    {
        self.submit_with_rollback(name, work, || {})
    }

    /// Submit a unit of work, running `rollback` instead if the operation is
    /// cancelled before the work starts
    pub fn submit_with_rollback<T, F, R>(&self, name: &'static str, work: F, rollback: R) -> Operation<T>
    where
        T: Send + 'static,
        F: FnOnce(&OperationContext) -> Result<T> + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        let shared = Arc::new(Shared::new());
        let operation = Operation::new(name, Arc::clone(&shared));
        let ctx = OperationContext::new(operation.id(), shared.cancel_flag());

        let Some(runtime) = self.runtime.as_ref() else {
            shared.complete(Err(SessionError::Closed));
            return operation;
        };

        let id = operation.id();
        runtime.spawn_blocking(move || {
            if !shared.try_start() {
                debug!("Operation {} ({}) cancelled before start", name, id);
                rollback();
                shared.complete(Err(SessionError::Cancelled));
                return;
            }

            debug!("Operation {} ({}) started", name, id);
            let result = panic::catch_unwind(AssertUnwindSafe(|| work(&ctx))).unwrap_or_else(|_| {
                Err(SessionError::engine(anyhow::anyhow!("operation {} panicked", name)))
            });

            if let Err(e) = &result {
                warn!("Operation {} ({}) failed: {}", name, id, e);
            } else {
                debug!("Operation {} ({}) completed", name, id);
            }

            shared.complete(result);
        });

        operation
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        // Must not block: the last session reference can be dropped inside a work unit.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
