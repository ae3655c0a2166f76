//! SQL gateway library.
//!
//! A bounded connection pool for SQLite, PostgreSQL and MySQL with
//! non-queueing admission control, single-statement execution, batch and
//! explicit transactions, and an ORDER BY clause builder.

pub mod adapter;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sql;

pub use adapter::Adapter;
pub use config::{Config, DatabaseConfig, DatabaseType, PoolConfig};
pub use error::{DbError, DbResult};
