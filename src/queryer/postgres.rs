use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls};

use super::{is_transient, RetryPolicy, Queryer};
use crate::config::Batch;
use crate::dialect;
use crate::error::DrkError;
use crate::value::{Row, Value};
use crate::vu::Vu;

pub struct PostgresQueryer {
    client: Client,
    retry: RetryPolicy,
}

impl PostgresQueryer {
    pub async fn new(url: &str) -> Result<Self, DrkError> {
        let (client, connection) = tokio_postgres::connect(url, NoTls)
            .await
            .map_err(|e| DrkError::Config(format!("connecting to postgres: {e}")))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("postgres connection task failed: {e}");
            }
        });

        Ok(PostgresQueryer {
            client,
            retry: RetryPolicy::default(),
        })
    }
}

fn to_sql_param(value: &Value) -> Box<dyn ToSql + Sync + Send> {
    match value {
        Value::Null => Box::new(Option::<String>::None),
        Value::Bool(b) => Box::new(*b),
        Value::Int(i) => Box::new(*i),
        Value::Float(f) => Box::new(*f),
        Value::Text(s) => Box::new(s.clone()),
        Value::Timestamp(t) => Box::new(*t),
        Value::Duration(d) => Box::new(humantime::format_duration(*d).to_string()),
        Value::Point(p) => Box::new(p.to_string()),
    }
}

fn from_pg_row(row: &tokio_postgres::Row) -> Row {
    let mut out = Row::new();
    for (i, column) in row.columns().iter().enumerate() {
        out.push(column.name().to_string(), from_pg_column(row, i, column.type_()));
    }
    out
}

fn from_pg_column(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Value {
    match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx).ok().flatten().map(Value::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(idx).ok().flatten().map(|v| Value::Int(v as i64)),
        Type::INT4 => row.try_get::<_, Option<i32>>(idx).ok().flatten().map(|v| Value::Int(v as i64)),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx).ok().flatten().map(Value::Int),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(idx).ok().flatten().map(|v| Value::Float(v as f64)),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx).ok().flatten().map(Value::Float),
        Type::TIMESTAMP => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .ok()
            .flatten()
            .map(Value::Timestamp),
        _ => row.try_get::<_, Option<String>>(idx).ok().flatten().map(Value::Text),
    }
    .unwrap_or(Value::Null)
}

#[async_trait]
impl Queryer for PostgresQueryer {
    async fn query(&self, sql: &str, args: &[Value]) -> (Vec<Row>, Duration, Result<(), DrkError>) {
        let start = Instant::now();
        let params: Vec<Box<dyn ToSql + Sync + Send>> = args.iter().map(to_sql_param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let mut attempt = 0;
        loop {
            let outcome = tokio::time::timeout(self.retry.query_timeout, self.client.query(sql, &refs)).await;

            match outcome {
                Ok(Ok(rows)) => {
                    let rows = rows.iter().map(from_pg_row).collect();
                    return (rows, start.elapsed(), Ok(()));
                }
                Ok(Err(e)) if attempt < self.retry.retries && is_transient(&e.to_string()) => {
                    attempt += 1;
                    continue;
                }
                Ok(Err(e)) => return (Vec::new(), start.elapsed(), Err(DrkError::QueryFailed(format!("running query: {e}")))),
                Err(_) => return (Vec::new(), start.elapsed(), Err(DrkError::QueryFailed("query timed out".to_string()))),
            }
        }
    }

    async fn exec(&self, sql: &str, args: &[Value]) -> (Duration, Result<(), DrkError>) {
        let start = Instant::now();
        let params: Vec<Box<dyn ToSql + Sync + Send>> = args.iter().map(to_sql_param).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| p.as_ref() as &(dyn ToSql + Sync)).collect();

        let mut attempt = 0;
        loop {
            let outcome = tokio::time::timeout(self.retry.query_timeout, self.client.execute(sql, &refs)).await;

            match outcome {
                Ok(Ok(_)) => return (start.elapsed(), Ok(())),
                Ok(Err(e)) if attempt < self.retry.retries && is_transient(&e.to_string()) => {
                    attempt += 1;
                    continue;
                }
                Ok(Err(e)) => return (start.elapsed(), Err(DrkError::QueryFailed(format!("running exec: {e}")))),
                Err(_) => return (start.elapsed(), Err(DrkError::QueryFailed("query timed out".to_string()))),
            }
        }
    }

    async fn load(&self, _vu: &Vu, batch: &Batch, rows: &[Vec<Value>]) -> (Duration, Result<(), DrkError>) {
        let placeholder = match dialect::placeholder("postgres") {
            Ok(p) => p,
            Err(e) => return (Duration::ZERO, Err(e)),
        };
        let sql = dialect::insert_statement(placeholder, batch, rows);
        let flattened: Vec<Value> = rows.iter().flat_map(|r| r.iter().cloned()).collect();
        self.exec(&sql, &flattened).await
    }
}
