use std::error::Error as StdError;

/// Boxed error used by collaborators that are not backed by sqlx.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error type for session and transaction operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session is closed")]
    Closed,

    #[error("Transaction is not active")]
    TransactionNotActive,

    #[error("{0}")]
    Backend(BoxError),
}

impl SessionError {
    /// Wraps an arbitrary collaborator failure.
    pub fn backend(err: impl Into<BoxError>) -> Self {
        SessionError::Backend(err.into())
    }
}

/// Result type for session and transaction operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Error returned when registering a failure handler
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Failure handler must not be absent")]
    MissingHandler,
}

/// The failure that ended a unit of work before any rollback was attempted.
#[derive(Debug, thiserror::Error)]
pub enum Failure<E> {
    #[error("Unit of work failed: {0}")]
    Work(E),

    #[error("Transaction commit failed: {0}")]
    Commit(SessionError),
}

impl<E> Failure<E>
where
    E: StdError + Send + Sync + 'static,
{
    /// The underlying error, as handed to failure handlers.
    pub fn cause(&self) -> &(dyn StdError + 'static) {
        match self {
            Failure::Work(err) => err,
            Failure::Commit(err) => err,
        }
    }
}

/// Error returned by [`UnitOfWork::execute`](crate::UnitOfWork::execute).
///
/// `Failed` carries the original failure untouched after a successful
/// rollback. `RollbackFailed` is the combined failure: the original failure
/// first, the rollback failure second.
#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError<E> {
    #[error("Failed to open session or begin transaction: {0}")]
    Session(SessionError),

    #[error("{0}")]
    Failed(Failure<E>),

    #[error("{original}; rollback also failed: {rollback}")]
    RollbackFailed {
        original: Failure<E>,
        rollback: SessionError,
    },
}

impl<E> UnitOfWorkError<E> {
    /// The caller's own error, if the unit of work itself failed and the
    /// rollback succeeded.
    pub fn work_error(&self) -> Option<&E> {
        match self {
            UnitOfWorkError::Failed(Failure::Work(err)) => Some(err),
            _ => None,
        }
    }

    pub fn into_work_error(self) -> Option<E> {
        match self {
            UnitOfWorkError::Failed(Failure::Work(err)) => Some(err),
            _ => None,
        }
    }

    pub fn is_rollback_failure(&self) -> bool {
        matches!(self, UnitOfWorkError::RollbackFailed { .. })
    }
}
