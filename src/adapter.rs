//! The adapter facade.
//!
//! [`Adapter`] owns one [`PoolGateway`] and exposes everything built on it:
//! single statements, batch transactions, explicit transaction handles and
//! dialect-aware ORDER BY generation.

use crate::config::{DatabaseConfig, PoolConfig};
use crate::db::driver::Driver;
use crate::db::executor::QueryExecutor;
use crate::db::gateway::{PoolGateway, PoolStats};
use crate::db::pool::SqlxDriver;
use crate::db::transaction::{Transaction, TransactionCoordinator};
use crate::error::{DbError, DbResult};
use crate::models::{Batch, QueryParam, QueryResult, Statement};
use crate::sql::order_by::{JoinDescriptor, OrderByBuilder, OrderSpec};
use std::sync::Arc;
use tracing::info;

pub struct Adapter<D: Driver> {
    gateway: Arc<PoolGateway<D>>,
    executor: QueryExecutor<D>,
    coordinator: TransactionCoordinator<D>,
}

impl<D: Driver> Clone for Adapter<D> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
            executor: self.executor.clone(),
            coordinator: self.coordinator.clone(),
        }
    }
}

impl<D: Driver> std::fmt::Debug for Adapter<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

impl Adapter<SqlxDriver> {
    /// Build an adapter over a lazily-connecting sqlx pool.
    pub fn connect(config: &DatabaseConfig) -> DbResult<Self> {
        config.pool.validate().map_err(DbError::invalid_input)?;
        let driver = SqlxDriver::new(config)?;
        Ok(Self::with_max(driver, config.pool.max))
    }
}

impl<D: Driver> Adapter<D> {
    pub fn new(driver: D, pool: &PoolConfig) -> DbResult<Self> {
        pool.validate().map_err(DbError::invalid_input)?;
        Ok(Self::with_max(driver, pool.max))
    }

    fn with_max(driver: D, max: u32) -> Self {
        let gateway = PoolGateway::new(driver, max);
        Self {
            executor: QueryExecutor::new(Arc::clone(&gateway)),
            coordinator: TransactionCoordinator::new(Arc::clone(&gateway)),
            gateway,
        }
    }

    pub fn gateway(&self) -> &Arc<PoolGateway<D>> {
        &self.gateway
    }

    pub fn stats(&self) -> PoolStats {
        self.gateway.stats()
    }

    pub fn is_at_capacity(&self) -> bool {
        self.gateway.is_at_capacity()
    }

    /// Run one statement on its own connection.
    pub async fn execute(
        &self,
        sql: impl Into<String>,
        params: Vec<QueryParam>,
    ) -> DbResult<QueryResult> {
        self.executor.execute(sql, params).await
    }

    pub async fn execute_statement(&self, statement: Statement) -> DbResult<QueryResult> {
        self.executor.execute_statement(statement).await
    }

    /// Run `batch` as a single all-or-nothing transaction.
    pub async fn run_batch(&self, batch: impl Into<Batch>) -> DbResult<Vec<QueryResult>> {
        self.coordinator.run_batch(batch).await
    }

    pub async fn begin_transaction(&self) -> DbResult<Transaction<D>> {
        self.coordinator.begin_transaction().await
    }

    /// Build an ORDER BY fragment quoted for this adapter's dialect.
    pub fn order_by(
        &self,
        table: &str,
        specs: &[OrderSpec],
        join_groups: Option<&[Vec<JoinDescriptor>]>,
    ) -> String {
        OrderByBuilder::new(self.gateway.driver()).build(table, specs, join_groups)
    }

    /// Drain the pool. Later requests fail with `PoolClosed`.
    pub async fn close(&self) {
        info!("Closing adapter");
        self.gateway.drain().await;
    }
}
