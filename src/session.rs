use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::{ConfigError, SessionResult};

/// Transaction isolation level requested when a transaction begins.
///
/// The value is handed to the session untouched; it is up to the session
/// implementation to apply it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "readuncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "readcommitted" => Ok(IsolationLevel::ReadCommitted),
            "repeatableread" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(ConfigError::UnknownIsolationLevel(s.to_string())),
        }
    }
}

/// Produces sessions for units of work.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: Session;

    /// Identity of this factory, reported to failure handlers.
    fn name(&self) -> &str;

    /// Open a new session.
    async fn open_session(&self) -> SessionResult<Self::Session>;
}

/// A handle to one database session.
///
/// Handles are cheap to clone and all clones refer to the same session. A
/// session has at most one active transaction at a time.
#[async_trait]
pub trait Session: Clone + Send + Sync + 'static {
    type Transaction: Transaction;

    /// Begin a transaction at the given isolation level.
    ///
    /// If a transaction is already active it is returned instead of opening
    /// a second one.
    async fn begin_transaction(&self, isolation: IsolationLevel) -> SessionResult<Self::Transaction>;

    /// The session's current transaction, if one was ever begun.
    ///
    /// This may differ from the transaction returned by an earlier
    /// `begin_transaction` call when work commits and begins again.
    fn transaction(&self) -> Option<Self::Transaction>;

    /// Release the session and its connection.
    async fn close(&self) -> SessionResult<()>;
}

/// A handle to one database transaction.
#[async_trait]
pub trait Transaction: Clone + Send + Sync + 'static {
    fn is_active(&self) -> bool;

    fn was_committed(&self) -> bool;

    fn was_rolled_back(&self) -> bool;

    async fn commit(&self) -> SessionResult<()>;

    async fn rollback(&self) -> SessionResult<()>;
}
