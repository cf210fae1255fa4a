use std::time::Duration;

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, Params, Pool, Value as MyValue};
use tokio::time::Instant;

use super::{is_transient, RetryPolicy, Queryer};
use crate::config::Batch;
use crate::dialect;
use crate::error::DrkError;
use crate::value::{Row, Value};
use crate::vu::Vu;

pub struct MysqlQueryer {
    pool: Pool,
    retry: RetryPolicy,
}

impl MysqlQueryer {
    pub fn new(url: &str) -> Result<Self, DrkError> {
        let opts = Opts::from_url(url).map_err(|e| DrkError::Config(format!("parsing mysql url: {e}")))?;
        Ok(MysqlQueryer {
            pool: Pool::new(opts),
            retry: RetryPolicy::default(),
        })
    }

    async fn conn(&self) -> Result<Conn, DrkError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| DrkError::QueryFailed(format!("acquiring mysql connection: {e}")))
    }
}

fn to_mysql_value(value: &Value) -> MyValue {
    match value {
        Value::Null => MyValue::NULL,
        Value::Bool(b) => MyValue::Int(*b as i64),
        Value::Int(i) => MyValue::Int(*i),
        Value::Float(f) => MyValue::Double(*f),
        Value::Text(s) => MyValue::Bytes(s.clone().into_bytes()),
        Value::Timestamp(t) => MyValue::Bytes(t.format("%Y-%m-%d %H:%M:%S%.f").to_string().into_bytes()),
        Value::Duration(d) => MyValue::Bytes(humantime::format_duration(*d).to_string().into_bytes()),
        Value::Point(p) => MyValue::Bytes(p.to_string().into_bytes()),
    }
}

fn from_mysql_row(row: mysql_async::Row) -> Row {
    let mut out = Row::new();
    let columns = row.columns_ref().to_vec();
    let mut row = row;
    for (i, col) in columns.iter().enumerate() {
        let value: MyValue = row.take(i).unwrap_or(MyValue::NULL);
        out.push(col.name_str().to_string(), from_mysql_value(value));
    }
    out
}

fn from_mysql_value(value: MyValue) -> Value {
    match value {
        MyValue::NULL => Value::Null,
        MyValue::Int(i) => Value::Int(i),
        MyValue::UInt(u) => Value::Int(u as i64),
        MyValue::Float(f) => Value::Float(f as f64),
        MyValue::Double(f) => Value::Float(f),
        MyValue::Bytes(b) => Value::Text(String::from_utf8_lossy(&b).to_string()),
        other => Value::Text(format!("{other:?}")),
    }
}

#[async_trait]
impl Queryer for MysqlQueryer {
    async fn query(&self, sql: &str, args: &[Value]) -> (Vec<Row>, Duration, Result<(), DrkError>) {
        let start = Instant::now();
        let params = Params::Positional(args.iter().map(to_mysql_value).collect());

        let mut attempt = 0;
        loop {
            let result: Result<Vec<mysql_async::Row>, DrkError> = async {
                let mut conn = self.conn().await?;
                tokio::time::timeout(self.retry.query_timeout, conn.exec(sql, params.clone()))
                    .await
                    .map_err(|_| DrkError::QueryFailed("query timed out".to_string()))?
                    .map_err(|e| DrkError::QueryFailed(format!("running query: {e}")))
            }
            .await;

            match result {
                Ok(rows) => {
                    let rows = rows.into_iter().map(from_mysql_row).collect();
                    return (rows, start.elapsed(), Ok(()));
                }
                Err(e) if attempt < self.retry.retries && is_transient(&e.to_string()) => {
                    attempt += 1;
                    continue;
                }
                Err(e) => return (Vec::new(), start.elapsed(), Err(e)),
            }
        }
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> (Duration, Result<(), DrkError>) {
        let start = Instant::now();
        let params = Params::Positional(args.iter().map(to_mysql_value).collect());

        let mut attempt = 0;
        loop {
            let result: Result<(), DrkError> = async {
                let mut conn = self.conn().await?;
                tokio::time::timeout(self.retry.query_timeout, conn.exec_drop(sql, params.clone()))
                    .await
                    .map_err(|_| DrkError::QueryFailed("query timed out".to_string()))?
                    .map_err(|e| DrkError::QueryFailed(format!("running exec: {e}")))
            }
            .await;

            match result {
                Ok(()) => return (start.elapsed(), Ok(())),
                Err(e) if attempt < self.retry.retries && is_transient(&e.to_string()) => {
                    attempt += 1;
                    continue;
                }
                Err(e) => return (start.elapsed(), Err(e)),
            }
        }
    }

    async fn load(&self, _vu: &Vu, batch: &Batch, rows: &[Vec<Value>]) -> (Duration, Result<(), DrkError>) {
        let placeholder = match dialect::placeholder("mysql") {
            Ok(p) => p,
            Err(e) => return (Duration::ZERO, Err(e)),
        };
        let sql = dialect::insert_statement(placeholder, batch, rows);
        let flattened: Vec<Value> = rows.iter().flat_map(|r| r.iter().cloned()).collect();
        self.exec(&sql, &flattened).await
    }
}
