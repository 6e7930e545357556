use log::warn;
use parking_lot::RwLock;
use std::error::Error as StdError;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::HookError;

type HandlerFn = dyn Fn(&str, &(dyn StdError + 'static)) + Send + Sync;

/// A callback notified when a unit of work fails.
///
/// The first argument is the name of the session factory the failing session
/// came from, the second is the error that occurred.
#[derive(Clone)]
pub struct FailureHandler(Arc<HandlerFn>);

impl FailureHandler {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &(dyn StdError + 'static)) + Send + Sync + 'static,
    {
        Self(Arc::new(handler))
    }
}

impl fmt::Debug for FailureHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureHandler").finish_non_exhaustive()
    }
}

/// Registry of failure handlers shared by every unit of work built on it.
///
/// Handlers are append-only: once registered they stay for the lifetime of
/// the registry, apart from [`FailureHooks::clear_all_handlers`]. Handlers
/// only observe. A panicking handler is caught and logged, and never changes
/// the outcome of the unit of work or stops the other handlers from running.
#[derive(Default)]
pub struct FailureHooks {
    execute_or_commit: RwLock<Vec<FailureHandler>>,
    rollback: RwLock<Vec<FailureHandler>>,
}

impl FailureHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler notified when the unit of work or its commit fails.
    pub fn register_execute_or_commit_failure_handler(
        &self,
        handler: impl Into<Option<FailureHandler>>,
    ) -> Result<(), HookError> {
        let handler = handler.into().ok_or(HookError::MissingHandler)?;
        self.execute_or_commit.write().push(handler);
        Ok(())
    }

    /// Register a handler notified when rolling back after a failure fails too.
    pub fn register_rollback_failure_handler(
        &self,
        handler: impl Into<Option<FailureHandler>>,
    ) -> Result<(), HookError> {
        let handler = handler.into().ok_or(HookError::MissingHandler)?;
        self.rollback.write().push(handler);
        Ok(())
    }

    pub fn notify_execute_or_commit_failure(&self, factory: &str, error: &(dyn StdError + 'static)) {
        notify(&self.execute_or_commit, "execute-or-commit", factory, error);
    }

    pub fn notify_rollback_failure(&self, factory: &str, error: &(dyn StdError + 'static)) {
        notify(&self.rollback, "rollback", factory, error);
    }

    pub fn execute_or_commit_handler_count(&self) -> usize {
        self.execute_or_commit.read().len()
    }

    pub fn rollback_handler_count(&self) -> usize {
        self.rollback.read().len()
    }

    /// Remove every handler from both channels. Meant for test isolation.
    pub fn clear_all_handlers(&self) {
        self.execute_or_commit.write().clear();
        self.rollback.write().clear();
    }
}

impl fmt::Debug for FailureHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureHooks")
            .field("execute_or_commit", &self.execute_or_commit_handler_count())
            .field("rollback", &self.rollback_handler_count())
            .finish()
    }
}

fn notify(
    channel: &RwLock<Vec<FailureHandler>>,
    kind: &str,
    factory: &str,
    error: &(dyn StdError + 'static),
) {
    // Snapshot so handlers run without the lock held
    let handlers = channel.read().clone();
    for (index, handler) in handlers.iter().enumerate() {
        let outcome = catch_unwind(AssertUnwindSafe(|| (handler.0)(factory, error)));
        if outcome.is_err() {
            warn!("{kind} failure handler #{index} panicked for session factory {factory:?}");
        }
    }
}
