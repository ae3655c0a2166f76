//! The backend capabilities the gateway is built on.
//!
//! A [`Driver`] opens raw connections, runs statements on them and hands them
//! back. The gateway never talks to a backend any other way, so tests can
//! substitute a recording driver for the real one.

use crate::error::DbResult;
use crate::models::{QueryResult, Statement};
use std::future::Future;

/// Quotes identifiers for a particular SQL dialect.
pub trait EscapeIdentifier {
    fn escape_identifier(&self, identifier: &str) -> String;
}

/// ANSI double-quote identifier quoting (PostgreSQL, SQLite).
#[derive(Debug, Clone, Copy, Default)]
pub struct AnsiQuoting;

impl EscapeIdentifier for AnsiQuoting {
    fn escape_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }
}

/// Backtick identifier quoting (MySQL).
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktickQuoting;

impl EscapeIdentifier for BacktickQuoting {
    fn escape_identifier(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }
}

/// Backend capabilities consumed by the pool gateway.
///
/// `begin`, `commit` and `rollback` default to running the plain SQL
/// keywords through [`Driver::execute`].
pub trait Driver: EscapeIdentifier + Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open (or check out) one backend connection.
    fn connect(&self) -> impl Future<Output = DbResult<Self::Connection>> + Send;

    /// Hand a connection back to the backend.
    fn release(&self, conn: Self::Connection);

    /// Give up a connection whose session state cannot be trusted, e.g. one
    /// still inside a transaction. It must not be handed out again.
    fn discard(&self, conn: Self::Connection) {
        drop(conn);
    }

    /// Run one statement on a connection.
    fn execute(
        &self,
        conn: &mut Self::Connection,
        statement: &Statement,
    ) -> impl Future<Output = DbResult<QueryResult>> + Send;

    fn begin(&self, conn: &mut Self::Connection) -> impl Future<Output = DbResult<()>> + Send {
        async move {
            self.execute(conn, &Statement::raw("BEGIN")).await?;
            Ok(())
        }
    }

    fn commit(&self, conn: &mut Self::Connection) -> impl Future<Output = DbResult<()>> + Send {
        async move {
            self.execute(conn, &Statement::raw("COMMIT")).await?;
            Ok(())
        }
    }

    fn rollback(&self, conn: &mut Self::Connection) -> impl Future<Output = DbResult<()>> + Send {
        async move {
            self.execute(conn, &Statement::raw("ROLLBACK")).await?;
            Ok(())
        }
    }

    /// Close the backend, dropping idle connections.
    fn close(&self) -> impl Future<Output = ()> + Send;
}
