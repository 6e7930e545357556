use log::warn;
use sqlx::pool::PoolConnection;
use sqlx::Postgres;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::{SessionError, SessionResult};

/// SharedConnection wraps the pooled connection owned by a session.
///
/// The session, its transactions and any repositories working inside the
/// unit of work all hold clones of the same handle. Once the session is
/// closed the slot is empty and every operation fails with
/// [`SessionError::Closed`].
#[derive(Clone)]
pub struct SharedConnection {
    slot: Arc<ConnectionSlot>,
}

struct ConnectionSlot {
    conn: Mutex<Option<PoolConnection<Postgres>>>,
    in_transaction: AtomicBool,
}

impl SharedConnection {
    /// Creates a new SharedConnection from a pooled PostgreSQL connection.
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
        Self {
            slot: Arc::new(ConnectionSlot {
                conn: Mutex::new(Some(conn)),
                in_transaction: AtomicBool::new(false),
            }),
        }
    }

    /// Lock the connection for running queries.
    ///
    /// The guard holds `None` once the owning session has been closed.
    pub async fn lock(&self) -> MutexGuard<'_, Option<PoolConnection<Postgres>>> {
        self.slot.conn.lock().await
    }

    /// Whether a transaction is currently open on the connection.
    pub fn in_transaction(&self) -> bool {
        self.slot.in_transaction.load(Ordering::Acquire)
    }

    pub(crate) fn set_in_transaction(&self, open: bool) {
        self.slot.in_transaction.store(open, Ordering::Release);
    }

    /// Run a statement through the simple query protocol.
    pub(crate) async fn execute(&self, sql: &str) -> SessionResult<()> {
        let mut guard = self.slot.conn.lock().await;
        let conn = guard.as_mut().ok_or(SessionError::Closed)?;
        sqlx::Executor::execute(&mut **conn, sqlx::raw_sql(sql)).await?;
        Ok(())
    }

    /// Hand the connection back to the pool.
    ///
    /// A connection that still has a transaction open is detached from the
    /// pool and closed instead. Returns `false` if it had already been released.
    pub(crate) async fn release(&self) -> bool {
        let conn = self.slot.conn.lock().await.take();
        match conn {
            Some(conn) if self.in_transaction() => {
                warn!("Releasing connection with an open transaction, closing it");
                drop(conn.detach());
                true
            }
            Some(conn) => {
                drop(conn);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedConnection")
            .field("in_transaction", &self.in_transaction())
            .finish_non_exhaustive()
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        if !*self.in_transaction.get_mut() {
            return;
        }
        if let Some(conn) = self.conn.get_mut().take() {
            warn!("Session dropped with an open transaction, closing its connection");
            drop(conn.detach());
        }
    }
}
