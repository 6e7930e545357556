use futures::FutureExt;
use log::{debug, error, warn};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::{
    Failure, FailureHooks, IsolationLevel, Session, SessionFactory, SessionResult, Transaction,
    UnitOfWorkError,
};

/// Runs units of work inside a managed session and transaction.
///
/// Each call to [`execute`](UnitOfWork::execute) opens one session and one
/// transaction, hands the session to the caller's work, and then commits on
/// success or rolls back on failure. The session is closed on every exit
/// path, including a panic inside the work.
///
/// The commit/rollback decision always looks at the session's *current*
/// transaction. Work that commits and begins a fresh transaction gets the
/// fresh one finalized; work that commits or rolls back by itself leaves
/// nothing for the executor to do.
///
/// Entities and session handles must not cross between a session opened here
/// and one opened elsewhere. Doing so is a usage error with no defined outcome.
pub struct UnitOfWork<F> {
    factory: Arc<F>,
    hooks: Arc<FailureHooks>,
    isolation_level: IsolationLevel,
}

impl<F> Clone for UnitOfWork<F> {
    fn clone(&self) -> Self {
        Self {
            factory: Arc::clone(&self.factory),
            hooks: Arc::clone(&self.hooks),
            isolation_level: self.isolation_level,
        }
    }
}

impl<F> fmt::Debug for UnitOfWork<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("hooks", &self.hooks)
            .field("isolation_level", &self.isolation_level)
            .finish_non_exhaustive()
    }
}

impl<F: SessionFactory> UnitOfWork<F> {
    pub fn new(factory: Arc<F>, hooks: Arc<FailureHooks>) -> Self {
        Self {
            factory,
            hooks,
            isolation_level: IsolationLevel::default(),
        }
    }

    /// Set the isolation level used by [`execute`](UnitOfWork::execute).
    pub fn with_isolation_level(mut self, isolation_level: IsolationLevel) -> Self {
        self.isolation_level = isolation_level;
        self
    }

    pub fn factory(&self) -> &Arc<F> {
        &self.factory
    }

    pub fn hooks(&self) -> &Arc<FailureHooks> {
        &self.hooks
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.isolation_level
    }

    /// Run `work` at the default isolation level.
    pub async fn execute<T, E, W, Fut>(&self, work: W) -> Result<T, UnitOfWorkError<E>>
    where
        W: FnOnce(F::Session) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: StdError + Send + Sync + 'static,
    {
        self.execute_with_isolation(self.isolation_level, work).await
    }

    /// Run `work` in a transaction at the given isolation level.
    ///
    /// If the work or the commit fails, the execute-or-commit handlers are
    /// notified and the transaction is rolled back; the original failure is
    /// returned as [`UnitOfWorkError::Failed`]. If the rollback fails as
    /// well, the rollback handlers are notified and both failures come back
    /// together as [`UnitOfWorkError::RollbackFailed`].
    pub async fn execute_with_isolation<T, E, W, Fut>(
        &self,
        isolation: IsolationLevel,
        work: W,
    ) -> Result<T, UnitOfWorkError<E>>
    where
        W: FnOnce(F::Session) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: StdError + Send + Sync + 'static,
    {
        let session = self
            .factory
            .open_session()
            .await
            .map_err(UnitOfWorkError::Session)?;

        let outcome = AssertUnwindSafe(self.run(&session, isolation, work))
            .catch_unwind()
            .await;

        match outcome {
            Ok(outcome) => {
                self.close(&session).await;
                outcome
            }
            Err(panic) => {
                error!(
                    "Unit of work on {:?} panicked, rolling back",
                    self.factory.name()
                );
                if let Err(err) = rollback_if_active(&session).await {
                    error!("Rollback after panic failed on {:?}: {err}", self.factory.name());
                }
                self.close(&session).await;
                resume_unwind(panic)
            }
        }
    }

    async fn run<T, E, W, Fut>(
        &self,
        session: &F::Session,
        isolation: IsolationLevel,
        work: W,
    ) -> Result<T, UnitOfWorkError<E>>
    where
        W: FnOnce(F::Session) -> Fut + Send,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: StdError + Send + Sync + 'static,
    {
        session
            .begin_transaction(isolation)
            .await
            .map_err(UnitOfWorkError::Session)?;

        let failure = match work(session.clone()).await {
            Ok(value) => match commit_if_active(session).await {
                Ok(()) => return Ok(value),
                Err(err) => Failure::Commit(err),
            },
            Err(err) => Failure::Work(err),
        };

        let factory = self.factory.name();
        warn!("Unit of work on {factory:?} failed: {failure}");
        self.hooks
            .notify_execute_or_commit_failure(factory, failure.cause());

        match rollback_if_active(session).await {
            Ok(()) => Err(UnitOfWorkError::Failed(failure)),
            Err(rollback) => {
                error!("Rollback on {factory:?} failed: {rollback}");
                self.hooks.notify_rollback_failure(factory, &rollback);
                Err(UnitOfWorkError::RollbackFailed {
                    original: failure,
                    rollback,
                })
            }
        }
    }

    async fn close(&self, session: &F::Session) {
        if let Err(err) = session.close().await {
            warn!("Failed to close session from {:?}: {err}", self.factory.name());
        }
    }
}

async fn commit_if_active<S: Session>(session: &S) -> SessionResult<()> {
    match session.transaction() {
        Some(tx) if tx.is_active() => {
            debug!("Committing current transaction");
            tx.commit().await
        }
        _ => Ok(()),
    }
}

async fn rollback_if_active<S: Session>(session: &S) -> SessionResult<()> {
    match session.transaction() {
        Some(tx) if tx.is_active() => {
            debug!("Rolling back current transaction");
            tx.rollback().await
        }
        _ => Ok(()),
    }
}
