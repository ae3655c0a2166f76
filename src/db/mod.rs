//! Database access layer.
//!
//! - `driver`: the backend capabilities everything else is built on
//! - `gateway`: bounded pool with admission control
//! - `executor`: single-statement execution
//! - `transaction`: batch transactions and explicit transaction handles
//! - `pool`: the sqlx-backed driver
//! - `types`: row decoding

pub mod driver;
pub mod executor;
pub mod gateway;
pub mod pool;
pub mod transaction;
pub mod types;

pub use driver::{AnsiQuoting, BacktickQuoting, Driver, EscapeIdentifier};
pub use executor::QueryExecutor;
pub use gateway::{Lease, PoolGateway, PoolStats};
pub use pool::{DbConnection, DbPool, SqlxDriver};
pub use transaction::{Transaction, TransactionCoordinator, TransactionState};
