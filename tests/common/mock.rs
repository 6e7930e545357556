use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use unit_of_work_executor::{
    IsolationLevel, Session, SessionError, SessionFactory, SessionResult, Transaction,
};

/// Raised by a mock commit configured to fail
#[derive(Debug, thiserror::Error)]
#[error("commit blew up midway")]
pub struct MidCommitError;

/// Raised by a mock rollback configured to fail
#[derive(Debug, thiserror::Error)]
#[error("rollback failed with code {0}")]
pub struct RollbackError(pub u32);

pub const ROLLBACK_ERROR_CODE: u32 = 7;

/// Which collaborator calls should fail
#[derive(Debug, Default, Clone, Copy)]
pub struct MockBehavior {
    pub fail_open: bool,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
}

/// Calls observed across every session and transaction of one factory
#[derive(Debug, Default)]
pub struct MockLog {
    opened: AtomicUsize,
    closed: AtomicUsize,
    closed_with_active_transaction: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
    begins: Mutex<Vec<IsolationLevel>>,
}

impl MockLog {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sessions closed while their current transaction was still active
    pub fn closed_with_active_transaction(&self) -> usize {
        self.closed_with_active_transaction.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> Vec<IsolationLevel> {
        self.begins.lock().clone()
    }
}

/// In-memory SessionFactory recording every call made through it
pub struct MockSessionFactory {
    name: String,
    behavior: MockBehavior,
    log: Arc<MockLog>,
}

impl MockSessionFactory {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            name: "mock".to_string(),
            behavior,
            log: Arc::new(MockLog::default()),
        }
    }

    pub fn log(&self) -> Arc<MockLog> {
        self.log.clone()
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    type Session = MockSession;

    fn name(&self) -> &str {
        &self.name
    }

    async fn open_session(&self) -> SessionResult<MockSession> {
        if self.behavior.fail_open {
            return Err(SessionError::backend("connection refused"));
        }
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MockSession {
            inner: Arc::new(MockSessionInner {
                behavior: self.behavior,
                log: self.log.clone(),
                current: Mutex::new(None),
                next_id: AtomicUsize::new(1),
            }),
        })
    }
}

#[derive(Clone)]
pub struct MockSession {
    inner: Arc<MockSessionInner>,
}

struct MockSessionInner {
    behavior: MockBehavior,
    log: Arc<MockLog>,
    current: Mutex<Option<MockTransaction>>,
    next_id: AtomicUsize,
}

#[async_trait]
impl Session for MockSession {
    type Transaction = MockTransaction;

    async fn begin_transaction(&self, isolation: IsolationLevel) -> SessionResult<MockTransaction> {
        if self.inner.behavior.fail_begin {
            return Err(SessionError::backend("cannot begin"));
        }
        if let Some(active) = self.transaction().filter(|tx| tx.is_active()) {
            return Ok(active);
        }
        self.inner.log.begins.lock().push(isolation);
        let tx = MockTransaction {
            inner: Arc::new(MockTransactionInner {
                id: self.inner.next_id.fetch_add(1, Ordering::SeqCst),
                behavior: self.inner.behavior,
                log: self.inner.log.clone(),
                status: Mutex::new(Status::Active),
                commits: AtomicUsize::new(0),
                rollbacks: AtomicUsize::new(0),
            }),
        };
        *self.inner.current.lock() = Some(tx.clone());
        Ok(tx)
    }

    fn transaction(&self) -> Option<MockTransaction> {
        self.inner.current.lock().clone()
    }

    /// Mirrors `PgSession::close`: the connection is released and an active
    /// transaction is discarded with it, never rolled back.
    async fn close(&self) -> SessionResult<()> {
        let current = self.inner.current.lock().take();
        if current.is_some_and(|tx| tx.is_active()) {
            self.inner.log.closed_with_active_transaction.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.log.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Committed,
    RolledBack,
}

#[derive(Clone)]
pub struct MockTransaction {
    inner: Arc<MockTransactionInner>,
}

struct MockTransactionInner {
    id: usize,
    behavior: MockBehavior,
    log: Arc<MockLog>,
    status: Mutex<Status>,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl MockTransaction {
    /// Position of this transaction within its session, starting at 1
    pub fn id(&self) -> usize {
        self.inner.id
    }

    pub fn commit_count(&self) -> usize {
        self.inner.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> usize {
        self.inner.rollbacks.load(Ordering::SeqCst)
    }

    fn status(&self) -> Status {
        *self.inner.status.lock()
    }
}

#[async_trait]
impl Transaction for MockTransaction {
    fn is_active(&self) -> bool {
        self.status() == Status::Active
    }

    fn was_committed(&self) -> bool {
        self.status() == Status::Committed
    }

    fn was_rolled_back(&self) -> bool {
        self.status() == Status::RolledBack
    }

    async fn commit(&self) -> SessionResult<()> {
        self.inner.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.log.commits.fetch_add(1, Ordering::SeqCst);
        if !self.is_active() {
            return Err(SessionError::TransactionNotActive);
        }
        if self.inner.behavior.fail_commit {
            return Err(SessionError::backend(MidCommitError));
        }
        *self.inner.status.lock() = Status::Committed;
        Ok(())
    }

    async fn rollback(&self) -> SessionResult<()> {
        self.inner.rollbacks.fetch_add(1, Ordering::SeqCst);
        self.inner.log.rollbacks.fetch_add(1, Ordering::SeqCst);
        if !self.is_active() {
            return Err(SessionError::TransactionNotActive);
        }
        if self.inner.behavior.fail_rollback {
            return Err(SessionError::backend(RollbackError(ROLLBACK_ERROR_CODE)));
        }
        *self.inner.status.lock() = Status::RolledBack;
        Ok(())
    }
}
