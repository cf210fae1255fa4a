//! Per-virtual-user mutable store. Holds an env-mapper and a globals
//! reader rather than a back-pointer to the `Runner`, to avoid a cyclic
//! aggregate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::RwLock;

use crate::args::Arg;
use crate::config::WorkflowQuery;
use crate::error::DrkError;
use crate::value::{Row, Value};

/// Resolves `(env_name, current_os_value) -> mapped_value` using the
/// config's `arg_mappings` table. Immutable after construction, so no lock
/// is needed.
#[derive(Clone)]
pub struct EnvMapper(Arc<HashMap<String, HashMap<String, String>>>);

impl EnvMapper {
    pub fn new(mappings: HashMap<String, HashMap<String, String>>) -> Self {
        EnvMapper(Arc::new(mappings))
    }

    pub fn map(&self, env: &str, current_value: &str) -> Option<String> {
        self.0.get(env)?.get(current_value).cloned()
    }
}

/// Process-wide `global` args table, guarded by its own lock, readable by
/// all VUs.
#[derive(Clone)]
pub struct Globals(Arc<RwLock<HashMap<String, Value>>>);

impl Globals {
    pub fn new(initial: HashMap<String, Value>) -> Self {
        Globals(Arc::new(RwLock::new(initial)))
    }

    pub async fn get(&self, name: &str) -> Option<Value> {
        self.0.read().await.get(name).cloned()
    }

    pub async fn set(&self, name: impl Into<String>, value: Value) {
        self.0.write().await.insert(name.into(), value);
    }
}

pub struct Vu {
    data: RwLock<HashMap<String, Vec<Row>>>,
    pub env_mapper: EnvMapper,
    pub globals: Globals,
}

impl Vu {
    pub fn new(env_mapper: EnvMapper, globals: Globals) -> Self {
        Vu {
            data: RwLock::new(HashMap::new()),
            env_mapper,
            globals,
        }
    }

    /// Replaces (not appends) the captured rows for `activity` — the
    /// latest invocation wins.
    pub async fn apply(&self, activity: &str, rows: Vec<Row>) {
        self.data.write().await.insert(activity.to_string(), rows);
    }

    pub async fn rows_for(&self, activity: &str) -> Option<Vec<Row>> {
        self.data.read().await.get(activity).cloned()
    }

    pub async fn has_rows(&self, activity: &str) -> bool {
        self.data
            .read()
            .await
            .get(activity)
            .map(|rows| !rows.is_empty())
            .unwrap_or(false)
    }

    pub async fn dependency_has_column(&self, activity: &str, column: &str) -> bool {
        match self.data.read().await.get(activity) {
            Some(rows) => rows.first().map(|r| r.get(column).is_some()).unwrap_or(false),
            None => false,
        }
    }

    /// Walks `args` in order, returning the first error encountered.
    pub async fn generate_args(&self, args: &[Arg]) -> Result<Vec<Value>, DrkError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(arg.generate(self).await?);
        }
        Ok(values)
    }

    /// Sleeps a uniform random duration in `[0, max_tick)` where
    /// `max_tick` is the largest tick period among `queries`, to
    /// desynchronize VUs' first ticks.
    pub async fn stagger(&self, queries: &[WorkflowQuery]) {
        let max_tick = queries
            .iter()
            .map(|q| q.rate.tick)
            .max()
            .unwrap_or(Duration::ZERO);

        if max_tick.is_zero() {
            return;
        }

        let nanos = rand::thread_rng().gen_range(0..max_tick.as_nanos().max(1) as u64);
        tokio::time::sleep(Duration::from_nanos(nanos)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vu() -> Vu {
        Vu::new(EnvMapper::new(HashMap::new()), Globals::new(HashMap::new()))
    }

    #[tokio::test]
    async fn apply_replaces_rather_than_appends() {
        let vu = vu();
        let mut row = Row::new();
        row.push("id", Value::Int(1));
        vu.apply("a", vec![row.clone()]).await;
        vu.apply("a", vec![row]).await;
        assert_eq!(vu.rows_for("a").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dependency_checks_case_insensitive_column() {
        let vu = vu();
        let mut row = Row::new();
        row.push("ID", Value::Int(1));
        vu.apply("a", vec![row]).await;
        assert!(vu.dependency_has_column("a", "id").await);
        assert!(!vu.dependency_has_column("a", "missing").await);
    }

    #[tokio::test]
    async fn dependency_false_until_rows_applied() {
        let vu = vu();
        assert!(!vu.has_rows("a").await);
        vu.apply("a", vec![Row::new()]).await;
        assert!(!vu.has_rows("a").await, "empty row vec still counts as no data");
    }

    #[tokio::test]
    async fn globals_round_trip() {
        let g = Globals::new(HashMap::new());
        g.set("region", Value::Text("us-east-1".into())).await;
        assert_eq!(g.get("region").await, Some(Value::Text("us-east-1".into())));
    }

    #[tokio::test]
    async fn env_mapper_returns_none_when_unmapped() {
        let m = EnvMapper::new(HashMap::new());
        assert_eq!(m.map("FLY_REGION", "iad"), None);
    }
}
