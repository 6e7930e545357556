//! Unit of Work Executor
//!
//! Runs a unit of business logic inside one managed database session and
//! transaction: the session is opened and the transaction begun for you, the
//! transaction is committed on success and rolled back on failure, and
//! failures can be observed through registered failure handlers.
//!
//! The session contract lives in [`session`]; [`postgres`] implements it on
//! top of a sqlx PostgreSQL pool.

pub mod config;
pub mod connection;
pub mod error;
pub mod hooks;
pub mod postgres;
pub mod session;
pub mod unit_of_work;

pub use config::{ConfigError, DatabaseConfig};
pub use connection::SharedConnection;
pub use error::{BoxError, Failure, HookError, SessionError, SessionResult, UnitOfWorkError};
pub use hooks::{FailureHandler, FailureHooks};
pub use postgres::{PgSession, PgSessionFactory, PgTransaction};
pub use session::{IsolationLevel, Session, SessionFactory, Transaction};
pub use unit_of_work::UnitOfWork;
