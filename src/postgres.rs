use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::Mutex;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    DatabaseConfig, IsolationLevel, Session, SessionError, SessionFactory, SessionResult,
    SharedConnection, Transaction,
};

/// SessionFactory backed by a PostgreSQL connection pool.
#[derive(Debug, Clone)]
pub struct PgSessionFactory {
    pool: PgPool,
    name: String,
}

impl PgSessionFactory {
    /// Create a new PgSessionFactory with the given connection pool.
    pub fn new(pool: PgPool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }

    /// Build a pool from the configuration and wrap it.
    pub async fn connect(config: &DatabaseConfig) -> SessionResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await?;
        Ok(Self::new(pool, config.name.clone()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SessionFactory for PgSessionFactory {
    type Session = PgSession;

    fn name(&self) -> &str {
        &self.name
    }

    async fn open_session(&self) -> SessionResult<Self::Session> {
        let conn = self.pool.acquire().await?;
        let session = PgSession::new(SharedConnection::new(conn));
        debug!("Opened session {} from {:?}", session.id(), self.name);
        Ok(session)
    }
}

/// A session holding one pooled PostgreSQL connection.
#[derive(Debug, Clone)]
pub struct PgSession {
    id: Uuid,
    connection: SharedConnection,
    current: Arc<Mutex<Option<PgTransaction>>>,
}

impl PgSession {
    pub fn new(connection: SharedConnection) -> Self {
        Self {
            id: Uuid::new_v4(),
            connection,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The connection, for running queries inside the current transaction.
    pub fn connection(&self) -> &SharedConnection {
        &self.connection
    }
}

#[async_trait]
impl Session for PgSession {
    type Transaction = PgTransaction;

    async fn begin_transaction(&self, isolation: IsolationLevel) -> SessionResult<Self::Transaction> {
        if let Some(active) = self.transaction().filter(|tx| tx.is_active()) {
            debug!(
                "Session {} already has an active transaction at {}, reusing it",
                self.id,
                active.isolation_level()
            );
            return Ok(active);
        }

        self.connection
            .execute(&format!("BEGIN ISOLATION LEVEL {}", isolation.as_sql()))
            .await?;
        self.connection.set_in_transaction(true);

        let tx = PgTransaction::new(self.connection.clone(), isolation);
        *self.current.lock() = Some(tx.clone());
        debug!("Session {} began transaction at {}", self.id, isolation);
        Ok(tx)
    }

    fn transaction(&self) -> Option<Self::Transaction> {
        self.current.lock().clone()
    }

    /// Release the connection without issuing `ROLLBACK`.
    ///
    /// A connection whose transaction is still open is closed rather than
    /// returned to the pool, so the server discards the transaction.
    async fn close(&self) -> SessionResult<()> {
        let current = self.current.lock().take();
        if current.is_some_and(|tx| tx.is_active()) {
            warn!("Session {} closed with an active transaction, discarding its connection", self.id);
        }

        if self.connection.release().await {
            debug!("Closed session {}", self.id);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxStatus {
    Active,
    Committed,
    RolledBack,
}

/// A transaction on a [`PgSession`]'s connection.
///
/// A failed `COMMIT` or `ROLLBACK` leaves the transaction active. Two handles
/// are equal when they refer to the same transaction.
#[derive(Debug, Clone)]
pub struct PgTransaction {
    inner: Arc<PgTransactionInner>,
}

#[derive(Debug)]
struct PgTransactionInner {
    isolation: IsolationLevel,
    connection: SharedConnection,
    status: Mutex<TxStatus>,
}

impl PgTransaction {
    fn new(connection: SharedConnection, isolation: IsolationLevel) -> Self {
        Self {
            inner: Arc::new(PgTransactionInner {
                isolation,
                connection,
                status: Mutex::new(TxStatus::Active),
            }),
        }
    }

    pub fn isolation_level(&self) -> IsolationLevel {
        self.inner.isolation
    }

    fn status(&self) -> TxStatus {
        *self.inner.status.lock()
    }

    async fn finish(&self, statement: &str, outcome: TxStatus) -> SessionResult<()> {
        if !self.is_active() {
            return Err(SessionError::TransactionNotActive);
        }
        self.inner.connection.execute(statement).await?;
        *self.inner.status.lock() = outcome;
        self.inner.connection.set_in_transaction(false);
        Ok(())
    }
}

impl PartialEq for PgTransaction {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for PgTransaction {}

#[async_trait]
impl Transaction for PgTransaction {
    fn is_active(&self) -> bool {
        self.status() == TxStatus::Active
    }

    fn was_committed(&self) -> bool {
        self.status() == TxStatus::Committed
    }

    fn was_rolled_back(&self) -> bool {
        self.status() == TxStatus::RolledBack
    }

    async fn commit(&self) -> SessionResult<()> {
        self.finish("COMMIT", TxStatus::Committed).await
    }

    async fn rollback(&self) -> SessionResult<()> {
        self.finish("ROLLBACK", TxStatus::RolledBack).await
    }
}
