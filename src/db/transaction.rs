//! Transaction lifecycle over a single pooled connection.
//!
//! Two ways in:
//! - [`TransactionCoordinator::begin_transaction`] hands back an open
//!   [`Transaction`] for the caller to drive.
//! - [`TransactionCoordinator::run_batch`] runs an ordered [`Batch`] as one
//!   all-or-nothing unit and always finishes the transaction itself.
//!
//! In both modes the connection is released exactly once, and always before
//! the outcome is returned.

use crate::db::driver::Driver;
use crate::db::gateway::{Lease, PoolGateway};
use crate::error::{DbError, DbResult};
use crate::models::{Batch, QueryParam, QueryResult, Statement};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle state of an explicit transaction handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committing,
    RollingBack,
    Closed,
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Committing => write!(f, "committing"),
            Self::RollingBack => write!(f, "rolling back"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Runs transactions against the gateway's pool.
pub struct TransactionCoordinator<D: Driver> {
    gateway: Arc<PoolGateway<D>>,
}

impl<D: Driver> Clone for TransactionCoordinator<D> {
    fn clone(&self) -> Self {
        Self {
            gateway: Arc::clone(&self.gateway),
        }
    }
}

impl<D: Driver> TransactionCoordinator<D> {
    pub fn new(gateway: Arc<PoolGateway<D>>) -> Self {
        Self { gateway }
    }

    /// Acquire a connection and open a transaction on it.
    ///
    /// If the begin signal fails the connection is released and no handle is
    /// created.
    pub async fn begin_transaction(&self) -> DbResult<Transaction<D>> {
        self.gateway.admit()?;
        let mut lease = self.gateway.acquire().await?;

        if let Err(e) = lease.begin().await {
            lease.release();
            warn!(error = %e, "Failed to begin transaction");
            return Err(DbError::begin(e));
        }

        let id = generate_transaction_id();
        info!(transaction_id = %id, "Transaction started");

        Ok(Transaction {
            id,
            state: TransactionState::Open,
            lease: Some(lease),
        })
    }

    /// Run every statement of `batch` in order inside one transaction.
    ///
    /// Stops at the first failing statement and rolls back. Returns the
    /// results of all statements, in order, once the commit succeeds.
    pub async fn run_batch(&self, batch: impl Into<Batch>) -> DbResult<Vec<QueryResult>> {
        let batch = batch.into();
        batch.validate()?;
        self.gateway.admit()?;

        let mut lease = self.gateway.acquire().await?;
        let batch_id = generate_transaction_id();

        info!(
            batch_id = %batch_id,
            statements = batch.len(),
            "Starting batch transaction"
        );

        let outcome = run_steps(&mut lease, &batch, &batch_id).await;
        lease.release();
        outcome
    }
}

async fn run_steps<D: Driver>(
    lease: &mut Lease<D>,
    batch: &Batch,
    batch_id: &str,
) -> DbResult<Vec<QueryResult>> {
    lease.begin().await.map_err(|e| {
        warn!(batch_id = %batch_id, error = %e, "Failed to begin batch transaction");
        DbError::begin(e)
    })?;

    let mut results = Vec::with_capacity(batch.len());
    for (index, statement) in batch.into_iter().enumerate() {
        debug!(batch_id = %batch_id, index, sql = %statement.sql, "Executing batch statement");
        match lease.execute(statement).await {
            Ok(result) => results.push(result),
            Err(e) => {
                warn!(batch_id = %batch_id, index, error = %e, "Batch statement failed");
                let failure = DbError::statement(index, e);
                return Err(roll_back(lease, batch_id, failure).await);
            }
        }
    }

    info!(batch_id = %batch_id, "Committing batch transaction");
    if let Err(e) = lease.commit().await {
        error!(batch_id = %batch_id, error = %e, "Batch commit failed");
        return Err(DbError::commit(e));
    }
    info!(batch_id = %batch_id, statements = results.len(), "Batch transaction committed");

    Ok(results)
}

/// Roll back after `failure` and pick the error to report.
async fn roll_back<D: Driver>(lease: &mut Lease<D>, batch_id: &str, failure: DbError) -> DbError {
    info!(batch_id = %batch_id, "Rolling back batch transaction");
    match lease.rollback().await {
        Ok(()) => {
            info!(batch_id = %batch_id, "Batch transaction rolled back");
            failure
        }
        Err(e) => {
            error!(batch_id = %batch_id, error = %e, "Batch rollback failed");
            DbError::rollback(e, failure)
        }
    }
}

/// An open transaction bound to one pooled connection.
///
/// `commit` and `rollback` consume the handle and release the connection.
/// A handle dropped while still open is rolled back in the background.
pub struct Transaction<D: Driver> {
    id: String,
    state: TransactionState,
    lease: Option<Lease<D>>,
}

impl<D: Driver> std::fmt::Debug for Transaction<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Transaction<D> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    fn open_lease(&mut self) -> DbResult<&mut Lease<D>> {
        if self.state != TransactionState::Open {
            return Err(DbError::transaction(
                format!("Transaction is {}", self.state),
                &self.id,
            ));
        }
        self.lease
            .as_mut()
            .ok_or_else(|| DbError::transaction("Transaction is no longer active", &self.id))
    }

    /// Run a statement inside the transaction.
    pub async fn execute(
        &mut self,
        sql: impl Into<String>,
        params: Vec<QueryParam>,
    ) -> DbResult<QueryResult> {
        let statement = Statement::new(sql, params);
        statement.validate()?;

        let lease = self.open_lease()?;
        let result = lease.execute(&statement).await;

        debug!(
            transaction_id = %self.id,
            sql = %statement.sql,
            ok = result.is_ok(),
            "Executed in transaction"
        );
        result
    }

    /// Commit and release the connection.
    pub async fn commit(mut self) -> DbResult<()> {
        let mut lease = self.finish(TransactionState::Committing)?;

        info!(transaction_id = %self.id, "Committing transaction");
        let result = lease.commit().await;
        lease.release();
        self.state = TransactionState::Closed;

        match result {
            Ok(()) => {
                info!(transaction_id = %self.id, "Transaction committed");
                Ok(())
            }
            Err(e) => {
                error!(transaction_id = %self.id, error = %e, "Commit failed");
                Err(DbError::commit(e))
            }
        }
    }

    /// Roll back and release the connection.
    pub async fn rollback(mut self) -> DbResult<()> {
        let mut lease = self.finish(TransactionState::RollingBack)?;

        info!(transaction_id = %self.id, "Rolling back transaction");
        let result = lease.rollback().await;
        lease.release();
        self.state = TransactionState::Closed;

        match &result {
            Ok(()) => info!(transaction_id = %self.id, "Transaction rolled back"),
            Err(e) => error!(transaction_id = %self.id, error = %e, "Rollback failed"),
        }
        result
    }

    /// Move to a terminal-bound state and take the connection out of the handle.
    fn finish(&mut self, next: TransactionState) -> DbResult<Lease<D>> {
        self.open_lease()?;
        self.state = next;
        self.lease
            .take()
            .ok_or_else(|| DbError::transaction("Transaction is no longer active", &self.id))
    }
}

impl<D: Driver> Drop for Transaction<D> {
    fn drop(&mut self) {
        let Some(mut lease) = self.lease.take() else {
            return;
        };

        warn!(
            transaction_id = %self.id,
            "Transaction dropped while open - rolling back"
        );

        // The connection may still hold the open transaction, so it is only
        // pooled again after a successful rollback.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let id = self.id.clone();
                handle.spawn(async move {
                    match lease.rollback().await {
                        Ok(()) => lease.release(),
                        Err(e) => {
                            error!(transaction_id = %id, error = %e, "Background rollback failed");
                            lease.discard();
                        }
                    }
                });
            }
            Err(_) => {
                warn!(
                    transaction_id = %self.id,
                    "No runtime to roll back on - discarding connection"
                );
                lease.discard();
            }
        }
    }
}

/// Generate a unique transaction ID.
fn generate_transaction_id() -> String {
    format!("tx_{}", uuid::Uuid::new_v4().simple())
}
