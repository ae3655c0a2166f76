//! Shared test helpers: a recording driver and a log capture.

#![allow(dead_code)]

use serde_json::{Map, Value as JsonValue};
use sql_gateway::config::PoolConfig;
use sql_gateway::db::{AnsiQuoting, Driver, EscapeIdentifier};
use sql_gateway::error::{DbError, DbResult};
use sql_gateway::models::{QueryResult, Statement};
use sql_gateway::Adapter;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One statement seen by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub conn: usize,
    pub sql: String,
}

/// What the spy driver observed.
#[derive(Debug, Default)]
pub struct Recorder {
    pub connects: AtomicUsize,
    pub releases: AtomicUsize,
    pub discards: AtomicUsize,
    pub open: AtomicUsize,
    pub max_open: AtomicUsize,
    pub closed: AtomicBool,
    calls: Mutex<Vec<Call>>,
}

impl Recorder {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn discards(&self) -> usize {
        self.discards.load(Ordering::SeqCst)
    }

    pub fn max_open(&self) -> usize {
        self.max_open.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sql(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.sql).collect()
    }

    pub fn count(&self, sql: &str) -> usize {
        self.calls().iter().filter(|c| c.sql == sql).count()
    }
}

pub struct SpyConn {
    pub id: usize,
}

/// A driver that records every call and fails on demand.
///
/// Statements listed in `fail_on` (matched exactly, including `BEGIN`,
/// `COMMIT` and `ROLLBACK`) return a database error.
#[derive(Clone, Default)]
pub struct SpyDriver {
    pub recorder: Arc<Recorder>,
    fail_on: Arc<HashSet<String>>,
    fail_connect: bool,
    connect_delay: Option<Duration>,
}

impl SpyDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on<I, S>(mut self, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_on = Arc::new(statements.into_iter().map(Into::into).collect());
        self
    }

    pub fn failing_connect(mut self) -> Self {
        self.fail_connect = true;
        self
    }

    pub fn with_connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }
}

impl EscapeIdentifier for SpyDriver {
    fn escape_identifier(&self, identifier: &str) -> String {
        AnsiQuoting.escape_identifier(identifier)
    }
}

impl Driver for SpyDriver {
    type Connection = SpyConn;

    async fn connect(&self) -> DbResult<SpyConn> {
        if let Some(delay) = self.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect {
            return Err(DbError::connection("connection refused", "start the server"));
        }
        let id = self.recorder.connects.fetch_add(1, Ordering::SeqCst) + 1;
        let open = self.recorder.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.recorder.max_open.fetch_max(open, Ordering::SeqCst);
        Ok(SpyConn { id })
    }

    fn release(&self, _conn: SpyConn) {
        self.recorder.releases.fetch_add(1, Ordering::SeqCst);
        self.recorder.open.fetch_sub(1, Ordering::SeqCst);
    }

    fn discard(&self, _conn: SpyConn) {
        self.recorder.discards.fetch_add(1, Ordering::SeqCst);
        self.recorder.open.fetch_sub(1, Ordering::SeqCst);
    }

    async fn execute(&self, conn: &mut SpyConn, statement: &Statement) -> DbResult<QueryResult> {
        self.recorder.calls.lock().unwrap().push(Call {
            conn: conn.id,
            sql: statement.sql.clone(),
        });

        if self.fail_on.contains(&statement.sql) {
            return Err(DbError::database(
                format!("{} failed", statement.sql),
                None,
                "check the statement",
            ));
        }

        if statement.returns_rows() {
            let mut row = Map::new();
            row.insert("sql".to_string(), JsonValue::String(statement.sql.clone()));
            row.insert("params".to_string(), JsonValue::from(statement.params.len()));
            Ok(QueryResult {
                columns: vec!["sql".to_string(), "params".to_string()],
                rows: vec![row],
                ..Default::default()
            })
        } else {
            Ok(QueryResult::write_result(1, 0))
        }
    }

    async fn close(&self) {
        self.recorder.closed.store(true, Ordering::SeqCst);
    }
}

/// Build an adapter over `driver` allowing `max` concurrent connections.
pub fn adapter(driver: SpyDriver, max: u32) -> Adapter<SpyDriver> {
    let pool = PoolConfig {
        max,
        ..Default::default()
    };
    Adapter::new(driver, &pool).unwrap()
}

/// Collects formatted log output for assertions.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Install a subscriber writing into this capture for the current thread.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let capture = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || capture.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
