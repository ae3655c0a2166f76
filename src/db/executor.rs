//! Single-statement execution.
//!
//! Each call checks out its own connection, runs one statement on it and
//! releases it before the result (or error) is handed back.

use crate::db::driver::Driver;
use crate::db::gateway::PoolGateway;
use crate::error::DbResult;
use crate::models::{QueryParam, QueryResult, Statement};
use std::sync::Arc;
use tracing::debug;

/// Query executor that runs statements on pooled connections.
pub struct QueryExecutor<D: Driver> {
    gateway: Arc<PoolGateway<D>>,
}

impl<D: Driver> QueryExecutor<D> {
    pub fn new(gateway: Arc<PoolGateway<D>>) -> Self {
        Self { gateway }
    }

    /// Run one statement.
    ///
    /// Invalid input is rejected before the pool is consulted. A full pool
    /// fails with `PoolFull` without acquiring anything.
    pub async fn execute(
        &self,
        sql: impl Into<String>,
        params: Vec<QueryParam>,
    ) -> DbResult<QueryResult> {
        self.execute_statement(Statement::new(sql, params)).await
    }

    pub async fn execute_statement(&self, statement: Statement) -> DbResult<QueryResult> {
        statement.validate()?;
        self.gateway.admit()?;

        let mut lease = self.gateway.acquire().await?;

        debug!(
            sql = %statement.sql,
            params = statement.params.len(),
            "Executing statement"
        );

        let result = lease.execute(&statement).await;
        lease.release();
        result
    }
}

impl<D: Driver> Clone for QueryExecutor<D> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}
