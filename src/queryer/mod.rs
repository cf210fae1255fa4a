//! The `Queryer` boundary: the core engine depends on exactly this trait.
//! Its concrete adapters wire up each driver's pool/connection and
//! generalize "run an arbitrary parameterized statement" across both.

mod mysql;
mod postgres;

pub use mysql::MysqlQueryer;
pub use postgres::PostgresQueryer;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::Batch;
use crate::error::DrkError;
use crate::value::{Row, Value};
use crate::vu::Vu;

#[async_trait]
pub trait Queryer: Send + Sync {
    /// Runs a statement expected to return rows; duration is measured
    /// inside the implementation so it is present even on error.
    async fn query(&self, sql: &str, args: &[Value]) -> (Vec<Row>, Duration, Result<(), DrkError>);

    /// Runs a statement with no expected result rows.
    async fn exec(&self, sql: &str, args: &[Value]) -> (Duration, Result<(), DrkError>);

    /// Constructs and executes a multi-row `INSERT` for `rows` via the SQL
    /// dialect adapter.
    async fn load(&self, vu: &Vu, batch: &Batch, rows: &[Vec<Value>]) -> (Duration, Result<(), DrkError>);
}

/// Shared retry policy: retry up to `retries` times for driver-reported
/// transient failures. Callers see one result regardless of how many
/// attempts were made.
pub(crate) struct RetryPolicy {
    pub retries: u32,
    pub query_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            retries: 2,
            query_timeout: Duration::from_secs(5),
        }
    }
}

pub(crate) fn is_transient(message: &str) -> bool {
    let m = message.to_lowercase();
    m.contains("connection reset")
        || m.contains("broken pipe")
        || m.contains("timed out")
        || m.contains("timeout")
        || m.contains("connection closed")
}
