//! Bounded connection pool with explicit admission control.
//!
//! The gateway never queues. A caller either gets a slot right now or is
//! turned away with [`DbError::PoolFull`]; that decision is synchronous and
//! made before any backend work starts.
//!
//! # Concurrency Safety
//!
//! - Slots are reserved with a compare-and-swap on `checked_out`, so two
//!   callers racing for the last slot cannot both win.
//! - A reserved slot is owned by exactly one [`Lease`] (or the in-flight
//!   acquisition that will become one) and is returned exactly once.
//! - `closed` is set before the driver is drained; reservations made after
//!   that point fail with [`DbError::PoolClosed`].

use crate::db::driver::Driver;
use crate::error::{DbError, DbResult};
use crate::models::{QueryResult, Statement};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tracing::{debug, info, warn};

/// Point-in-time pool usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub max: u32,
    pub in_use: u32,
    pub closed: bool,
}

pub struct PoolGateway<D: Driver> {
    driver: D,
    max: u32,
    checked_out: AtomicU32,
    closed: AtomicBool,
}

impl<D: Driver> std::fmt::Debug for PoolGateway<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolGateway")
            .field("max", &self.max)
            .field("checked_out", &self.checked_out.load(Ordering::Acquire))
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl<D: Driver> PoolGateway<D> {
    /// Create a gateway allowing at most `max` connections out at once.
    pub fn new(driver: D, max: u32) -> Arc<Self> {
        Arc::new(Self {
            driver,
            max,
            checked_out: AtomicU32::new(0),
            closed: AtomicBool::new(false),
        })
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Whether every slot is currently checked out.
    pub fn is_at_capacity(&self) -> bool {
        self.checked_out.load(Ordering::Acquire) >= self.max
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            max: self.max,
            in_use: self.checked_out.load(Ordering::Acquire),
            closed: self.is_closed(),
        }
    }

    /// Reject the request up front if the pool cannot serve it right now.
    pub fn admit(&self) -> DbResult<()> {
        if self.is_closed() {
            return Err(DbError::PoolClosed);
        }
        if self.is_at_capacity() {
            debug!(max = self.max, "Admission rejected: pool at capacity");
            return Err(DbError::pool_full(self.max));
        }
        Ok(())
    }

    /// Check out one connection.
    ///
    /// Fails with `PoolFull` when no slot is free and with `Connection` when
    /// the driver cannot produce a connection; neither case leaves anything
    /// to release.
    pub async fn acquire(self: &Arc<Self>) -> DbResult<Lease<D>> {
        self.reserve_slot()?;

        match self.driver.connect().await {
            Ok(conn) => {
                debug!(in_use = self.checked_out.load(Ordering::Acquire), "Connection acquired");
                Ok(Lease {
                    gateway: Arc::clone(self),
                    conn: Some(conn),
                })
            }
            Err(e) => {
                self.free_slot();
                warn!(error = %e, "Failed to acquire connection");
                Err(match e {
                    e @ (DbError::Connection { .. } | DbError::PoolClosed) => e,
                    other => DbError::connection(
                        other.to_string(),
                        "Check that the database server is running and accessible",
                    ),
                })
            }
        }
    }

    /// Close the pool. New admissions fail from this point on.
    pub async fn drain(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            debug!("Pool already drained");
            return;
        }
        let in_use = self.checked_out.load(Ordering::Acquire);
        if in_use > 0 {
            warn!(in_use, "Draining pool with connections still checked out");
        }
        self.driver.close().await;
        info!("Connection pool drained");
    }

    fn reserve_slot(&self) -> DbResult<()> {
        if self.is_closed() {
            return Err(DbError::PoolClosed);
        }
        self.checked_out
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max).then_some(n + 1)
            })
            .map(|_| ())
            .map_err(|_| DbError::pool_full(self.max))
    }

    fn free_slot(&self) {
        let result = self
            .checked_out
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if result.is_err() {
            warn!("Slot count underflow detected - extra release call");
        }
    }
}

/// A checked-out connection together with its release action.
///
/// Call [`Lease::release`] when done. A lease dropped without being released
/// still returns its connection, and logs a warning.
pub struct Lease<D: Driver> {
    gateway: Arc<PoolGateway<D>>,
    conn: Option<D::Connection>,
}

impl<D: Driver> std::fmt::Debug for Lease<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("released", &self.conn.is_none())
            .finish_non_exhaustive()
    }
}

impl<D: Driver> Lease<D> {
    fn parts(&mut self) -> DbResult<(&D, &mut D::Connection)> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| DbError::internal("Connection already released"))?;
        Ok((&self.gateway.driver, conn))
    }

    pub async fn execute(&mut self, statement: &Statement) -> DbResult<QueryResult> {
        let (driver, conn) = self.parts()?;
        driver.execute(conn, statement).await
    }

    pub async fn begin(&mut self) -> DbResult<()> {
        let (driver, conn) = self.parts()?;
        driver.begin(conn).await
    }

    pub async fn commit(&mut self) -> DbResult<()> {
        let (driver, conn) = self.parts()?;
        driver.commit(conn).await
    }

    pub async fn rollback(&mut self) -> DbResult<()> {
        let (driver, conn) = self.parts()?;
        driver.rollback(conn).await
    }

    /// Return the connection to the pool.
    pub fn release(mut self) {
        self.release_inner();
    }

    /// Close the connection instead of returning it to the pool. The slot
    /// is freed either way.
    pub fn discard(mut self) {
        if let Some(conn) = self.conn.take() {
            self.gateway.driver.discard(conn);
            self.gateway.free_slot();
            debug!(
                in_use = self.gateway.checked_out.load(Ordering::Acquire),
                "Connection discarded"
            );
        }
    }

    fn release_inner(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.gateway.driver.release(conn);
            self.gateway.free_slot();
            debug!(
                in_use = self.gateway.checked_out.load(Ordering::Acquire),
                "Connection released"
            );
        }
    }
}

impl<D: Driver> Drop for Lease<D> {
    fn drop(&mut self) {
        if self.conn.is_some() {
            warn!("Connection released via Drop - consider using explicit release()");
            self.release_inner();
        }
    }
}
