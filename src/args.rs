//! The argument generator algebra: a tagged sum type rather than a
//! closures-over-a-hashmap scheme. Each variant implements
//! `generate`/`depends_met` as methods.

use std::time::Duration;

use chrono::NaiveDateTime;
use rand::Rng;
use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer};

use crate::error::DrkError;
use crate::random;
use crate::replacements::REPLACEMENTS;
use crate::value::{from_yaml, Value};
use crate::vu::Vu;

pub enum Arg {
    Gen {
        value: String,
        null_percentage: u8,
        format: Option<String>,
    },
    ScalarInt {
        min: i64,
        max: i64,
    },
    ScalarFloat {
        min: f64,
        max: f64,
    },
    ScalarTimestamp {
        min: NaiveDateTime,
        max: NaiveDateTime,
    },
    ScalarDuration {
        min: Duration,
        max: Duration,
    },
    Point {
        lat: f64,
        lon: f64,
        distance_km: f64,
    },
    Set(WeightedItems),
    Ref {
        query: String,
        column: String,
    },
    Const(Value),
    Env {
        name: String,
        raw_value: String,
    },
    Expr {
        compiled: evalexpr::Node,
    },
    Global {
        name: String,
    },
}

impl std::fmt::Debug for Arg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Arg::Gen { .. } => "Gen",
            Arg::ScalarInt { .. } => "ScalarInt",
            Arg::ScalarFloat { .. } => "ScalarFloat",
            Arg::ScalarTimestamp { .. } => "ScalarTimestamp",
            Arg::ScalarDuration { .. } => "ScalarDuration",
            Arg::Point { .. } => "Point",
            Arg::Set(_) => "Set",
            Arg::Ref { .. } => "Ref",
            Arg::Const(_) => "Const",
            Arg::Env { .. } => "Env",
            Arg::Expr { .. } => "Expr",
            Arg::Global { .. } => "Global",
        };
        write!(f, "Arg::{name}")
    }
}

impl Arg {
    pub async fn generate(&self, vu: &Vu) -> Result<Value, DrkError> {
        match self {
            Arg::Gen { value, null_percentage, format } => {
                Ok(Value::Text(generate_gen_value(value, *null_percentage, format.as_deref())))
            }

            Arg::ScalarInt { min, max } => Ok(Value::Int(random::int(*min, *max))),

            Arg::ScalarFloat { min, max } => Ok(Value::Float(random::float(*min, *max))),

            Arg::ScalarTimestamp { min, max } => Ok(Value::Timestamp(random::timestamp(*min, *max))),

            Arg::ScalarDuration { min, max } => Ok(Value::Duration(random::interval(*min, *max))),

            Arg::Point { lat, lon, distance_km } => Ok(Value::Point(random::point(*lat, *lon, *distance_km))),

            Arg::Set(items) => Ok(items.choose()),

            Arg::Ref { query, column } => {
                let rows = vu
                    .rows_for(query)
                    .await
                    .ok_or_else(|| DrkError::ArgGeneration(format!("missing query: {query:?}")))?;

                if rows.is_empty() {
                    return Err(DrkError::ArgGeneration(format!(
                        "no data found for {query} - {column}"
                    )));
                }

                let idx = rand::thread_rng().gen_range(0..rows.len());
                rows[idx]
                    .get(column)
                    .cloned()
                    .ok_or_else(|| DrkError::ArgGeneration(format!("missing column: {column:?}")))
            }

            Arg::Const(value) => Ok(value.clone()),

            Arg::Env { name, raw_value } => match vu.env_mapper.map(name, raw_value) {
                Some(mapped) => Ok(Value::Text(mapped)),
                None => Ok(Value::Text(raw_value.clone())),
            },

            Arg::Expr { compiled } => evaluate_expr(compiled),

            Arg::Global { name } => vu
                .globals
                .get(name)
                .await
                .ok_or_else(|| DrkError::ArgGeneration(format!("missing global: {name:?}"))),
        }
    }

    pub async fn depends_met(&self, vu: &Vu) -> bool {
        match self {
            Arg::Ref { query, column } => vu.dependency_has_column(query, column).await,
            _ => true,
        }
    }
}

fn generate_gen_value(pattern: &str, null_percentage: u8, format: Option<&str>) -> String {
    if null_percentage > 0 {
        let roll = rand::thread_rng().gen_range(0..100);
        if roll < null_percentage {
            return String::new();
        }
    }

    if let Some(generator) = REPLACEMENTS.get(pattern) {
        return format_gen_value(generator(), format);
    }

    let mut s = pattern.to_string();
    for (key, generator) in REPLACEMENTS.iter() {
        if s.contains(key) {
            let rendered = format_gen_value(generator(), format);
            s = s.replace(key, &rendered);
        }
    }
    s
}

fn format_gen_value(value: String, format: Option<&str>) -> String {
    match format {
        None => value,
        Some("" | "%s" | "%v") => value,
        Some(spec) => apply_printf_format(&value, spec).unwrap_or(value),
    }
}

/// Supports the one numeric verb a `gen` row can meaningfully ask for:
/// `%.Nf`, fixed-point with `N` decimals. Any other verb, or a value that
/// doesn't parse as a float, falls back to the value unchanged.
fn apply_printf_format(value: &str, spec: &str) -> Option<String> {
    let precision: usize = spec.strip_prefix("%.")?.strip_suffix('f')?.parse().ok()?;
    let parsed: f64 = value.parse().ok()?;
    Some(format!("{parsed:.precision$}"))
}

fn evaluate_expr(compiled: &evalexpr::Node) -> Result<Value, DrkError> {
    use evalexpr::{Context, ContextWithMutableFunctions, Function, HashMapContext, Value as EvalValue};

    let mut context = HashMapContext::new();
    context
        .set_function(
            "env".into(),
            Function::new(|argument| {
                let name = argument.as_string()?;
                Ok(EvalValue::String(std::env::var(&name).unwrap_or_default()))
            }),
        )
        .map_err(|e| DrkError::ArgGeneration(format!("registering env() helper: {e}")))?;

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        compiled.eval_with_context(&context)
    }))
    .map_err(|_| DrkError::QueryFailed("expression evaluation panicked".to_string()))?
    .map_err(|e| DrkError::ArgGeneration(format!("evaluating expression: {e}")))?;

    Ok(match result {
        EvalValue::String(s) => Value::Text(s),
        EvalValue::Int(i) => Value::Int(i),
        EvalValue::Float(f) => Value::Float(f),
        EvalValue::Boolean(b) => Value::Bool(b),
        EvalValue::Empty => Value::Null,
        other => Value::Text(other.to_string()),
    })
}

/// A weighted-choice `set` generator. Weights missing entirely default to
/// an even-ish split summing to 100, with the remainder distributed
/// one-each to the leading items.
#[derive(Debug)]
pub struct WeightedItems {
    items: Vec<(Value, i64)>,
    total_weight: i64,
}

impl WeightedItems {
    pub fn new(values: Vec<Value>, weights: Option<Vec<i64>>) -> Result<Self, DrkError> {
        let weights = match weights {
            Some(w) => w,
            None => default_weights(values.len()),
        };

        if values.len() != weights.len() {
            return Err(DrkError::Config(
                "set values and weights need to be the same length".to_string(),
            ));
        }

        if weights.iter().any(|w| *w < 0) {
            return Err(DrkError::Config("set weights must not be negative".to_string()));
        }

        let total_weight = weights.iter().sum();
        let items = values.into_iter().zip(weights).collect();

        Ok(WeightedItems { items, total_weight })
    }

    pub fn choose(&self) -> Value {
        if self.total_weight <= 0 {
            return self.items.first().map(|(v, _)| v.clone()).unwrap_or(Value::Null);
        }

        let mut r = rand::thread_rng().gen_range(1..=self.total_weight);
        for (value, weight) in &self.items {
            r -= weight;
            if r <= 0 {
                return value.clone();
            }
        }

        self.items.last().map(|(v, _)| v.clone()).unwrap_or(Value::Null)
    }
}

/// Exactly `n` items: `100/n` each, with the `100 % n` remainder given
/// one-each to the leading items.
fn default_weights(n: usize) -> Vec<i64> {
    if n == 0 {
        return Vec::new();
    }
    let base = 100 / n as i64;
    let remainder = 100 % n as i64;
    (0..n as i64).map(|i| base + if i < remainder { 1 } else { 0 }).collect()
}

// --- Deserialization -------------------------------------------------

impl<'de> Deserialize<'de> for Arg {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_yaml::Value::deserialize(deserializer)?;
        let map = raw
            .as_mapping()
            .ok_or_else(|| SerdeError::custom("arg must be a mapping"))?;

        let arg_type = field_str(map, "type").map_err(SerdeError::custom)?;

        let arg = match arg_type.as_str() {
            "gen" => {
                let value = field_str(map, "value").map_err(SerdeError::custom)?;
                let null_percentage = field_u8_opt(map, "null_percentage").unwrap_or(0);
                let format = field_str_opt(map, "format");
                Arg::Gen { value, null_percentage, format }
            }

            "set" => {
                let raw_values = field_vec(map, "values").map_err(SerdeError::custom)?;
                let values: Vec<Value> = raw_values.iter().map(from_yaml).collect();
                let weights = field_vec_i64_opt(map, "weights");
                WeightedItems::new(values, weights)
                    .map(Arg::Set)
                    .map_err(SerdeError::custom)?
            }

            "ref" => {
                let query = field_str(map, "query").map_err(SerdeError::custom)?;
                let column = field_str(map, "column").map_err(SerdeError::custom)?;
                Arg::Ref { query, column }
            }

            "const" => {
                let raw = map
                    .get(serde_yaml::Value::String("value".into()))
                    .ok_or_else(|| SerdeError::custom("missing value"))?;
                Arg::Const(from_yaml(raw))
            }

            "env" => {
                let name = field_str(map, "name").map_err(SerdeError::custom)?;
                let raw_value = std::env::var(&name)
                    .map_err(|_| SerdeError::custom(format!("missing env var: {name}")))?;
                Arg::Env { name, raw_value }
            }

            "expr" => {
                let value = field_str(map, "value").map_err(SerdeError::custom)?;
                let compiled = evalexpr::build_operator_tree(&value)
                    .map_err(|e| SerdeError::custom(format!("compiling expression: {e}")))?;
                Arg::Expr { compiled }
            }

            "global" => {
                let name = field_str(map, "name").map_err(SerdeError::custom)?;
                Arg::Global { name }
            }

            scalar => parse_scalar(scalar, map).map_err(SerdeError::custom)?,
        };

        Ok(arg)
    }
}

fn parse_scalar(kind: &str, map: &serde_yaml::Mapping) -> Result<Arg, DrkError> {
    match kind.to_lowercase().as_str() {
        "int" => Ok(Arg::ScalarInt {
            min: field_i64(map, "min")?,
            max: field_i64(map, "max")?,
        }),

        "float" => Ok(Arg::ScalarFloat {
            min: field_f64(map, "min")?,
            max: field_f64(map, "max")?,
        }),

        "timestamp" => {
            let fmt = field_str_opt(map, "fmt");
            let fmt = fmt.as_deref().unwrap_or("%+");
            let min_str = field_str(map, "min")?;
            let max_str = field_str(map, "max")?;
            let min = parse_timestamp(&min_str, fmt)?;
            let max = parse_timestamp(&max_str, fmt)?;
            Ok(Arg::ScalarTimestamp { min, max })
        }

        "interval" | "duration" => {
            let min_str = field_str(map, "min")?;
            let max_str = field_str(map, "max")?;
            let min = humantime::parse_duration(&min_str)
                .map_err(|e| DrkError::Config(format!("parsing min duration: {e}")))?;
            let max = humantime::parse_duration(&max_str)
                .map_err(|e| DrkError::Config(format!("parsing max duration: {e}")))?;
            Ok(Arg::ScalarDuration { min, max })
        }

        "location" | "point" => Ok(Arg::Point {
            lat: field_f64(map, "lat")?,
            lon: field_f64(map, "lon")?,
            distance_km: field_f64(map, "distance_km")?,
        }),

        other => Err(DrkError::Config(format!("invalid scalar generator: {other:?}"))),
    }
}

fn parse_timestamp(raw: &str, fmt: &str) -> Result<NaiveDateTime, DrkError> {
    if fmt == "%+" {
        chrono::DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.naive_utc())
            .map_err(|e| DrkError::Config(format!("parsing timestamp {raw:?}: {e}")))
    } else {
        NaiveDateTime::parse_from_str(raw, fmt)
            .map_err(|e| DrkError::Config(format!("parsing timestamp {raw:?} with {fmt:?}: {e}")))
    }
}

fn field_str(map: &serde_yaml::Mapping, key: &str) -> Result<String, DrkError> {
    field_str_opt(map, key).ok_or_else(|| DrkError::Config(format!("{key:?} field is missing")))
}

fn field_str_opt(map: &serde_yaml::Mapping, key: &str) -> Option<String> {
    map.get(serde_yaml::Value::String(key.into()))
        .and_then(|v| v.as_str().map(|s| s.to_string()))
}

fn field_u8_opt(map: &serde_yaml::Mapping, key: &str) -> Option<u8> {
    map.get(serde_yaml::Value::String(key.into()))
        .and_then(|v| v.as_u64())
        .map(|v| v as u8)
}

fn field_i64(map: &serde_yaml::Mapping, key: &str) -> Result<i64, DrkError> {
    map.get(serde_yaml::Value::String(key.into()))
        .and_then(|v| v.as_i64())
        .ok_or_else(|| DrkError::Config(format!("{key:?} field is missing or not an integer")))
}

fn field_f64(map: &serde_yaml::Mapping, key: &str) -> Result<f64, DrkError> {
    map.get(serde_yaml::Value::String(key.into()))
        .and_then(|v| v.as_f64())
        .ok_or_else(|| DrkError::Config(format!("{key:?} field is missing or not a number")))
}

fn field_vec(map: &serde_yaml::Mapping, key: &str) -> Result<Vec<serde_yaml::Value>, DrkError> {
    map.get(serde_yaml::Value::String(key.into()))
        .and_then(|v| v.as_sequence())
        .cloned()
        .ok_or_else(|| DrkError::Config(format!("{key:?} field is missing or not a list")))
}

fn field_vec_i64_opt(map: &serde_yaml::Mapping, key: &str) -> Option<Vec<i64>> {
    map.get(serde_yaml::Value::String(key.into()))
        .and_then(|v| v.as_sequence())
        .map(|seq| seq.iter().filter_map(|v| v.as_i64()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_100_exactly_n_items() {
        for n in 1..10 {
            let w = default_weights(n);
            assert_eq!(w.len(), n);
            assert_eq!(w.iter().sum::<i64>(), 100);
        }
    }

    #[test]
    fn weighted_choose_with_all_weight_on_one_item() {
        let items = WeightedItems::new(
            vec![Value::Text("a".into()), Value::Text("b".into()), Value::Text("c".into())],
            Some(vec![100, 0, 0]),
        )
        .unwrap();

        for _ in 0..20 {
            assert_eq!(items.choose(), Value::Text("a".into()));
        }
    }

    #[test]
    fn weighted_choose_middle_item_with_zero_surrounding_weights() {
        let items = WeightedItems::new(
            vec![Value::Text("a".into()), Value::Text("b".into()), Value::Text("c".into())],
            Some(vec![0, 5, 0]),
        )
        .unwrap();

        for _ in 0..20 {
            assert_eq!(items.choose(), Value::Text("b".into()));
        }
    }

    #[test]
    fn mismatched_values_and_weights_lengths_rejected() {
        let err = WeightedItems::new(
            vec![Value::Text("a".into())],
            Some(vec![50, 50]),
        );
        assert!(err.is_err());
    }

    #[test]
    fn negative_weight_rejected_at_parse_time() {
        let err = WeightedItems::new(vec![Value::Text("a".into())], Some(vec![-1]));
        assert!(err.is_err());
    }

    #[test]
    fn gen_single_key_pattern_returns_registry_value() {
        let v = generate_gen_value("${uuid}", 0, None);
        assert_eq!(v.len(), 36);
    }

    #[test]
    fn gen_null_percentage_100_always_empty() {
        let v = generate_gen_value("${uuid}", 100, None);
        assert_eq!(v, "");
    }

    #[test]
    fn format_applies_fixed_point_precision() {
        assert_eq!(format_gen_value("3.14159".to_string(), Some("%.2f")), "3.14");
        assert_eq!(format_gen_value("3".to_string(), Some("%.1f")), "3.0");
    }

    #[test]
    fn format_passthrough_for_s_and_v_and_none() {
        assert_eq!(format_gen_value("x".to_string(), None), "x");
        assert_eq!(format_gen_value("x".to_string(), Some("%s")), "x");
        assert_eq!(format_gen_value("x".to_string(), Some("%v")), "x");
    }

    #[test]
    fn format_falls_back_unchanged_when_value_is_not_numeric() {
        assert_eq!(format_gen_value("not-a-number".to_string(), Some("%.2f")), "not-a-number");
    }

    #[tokio::test]
    async fn ref_depends_met_false_until_row_with_column_applied() {
        let vu = Vu::new(crate::vu::EnvMapper::new(Default::default()), crate::vu::Globals::new(Default::default()));
        let arg = Arg::Ref { query: "A".into(), column: "id".into() };
        assert!(!arg.depends_met(&vu).await);

        let mut row = crate::value::Row::new();
        row.push("id", Value::Text("x".into()));
        vu.apply("A", vec![row]).await;
        assert!(arg.depends_met(&vu).await);
    }

    #[tokio::test]
    async fn const_arg_returns_verbatim() {
        let vu = Vu::new(crate::vu::EnvMapper::new(Default::default()), crate::vu::Globals::new(Default::default()));
        let arg = Arg::Const(Value::Int(42));
        assert_eq!(arg.generate(&vu).await.unwrap(), Value::Int(42));
    }

    #[tokio::test]
    async fn env_arg_uses_mapping_when_present() {
        let mut mappings = std::collections::HashMap::new();
        let mut inner = std::collections::HashMap::new();
        inner.insert("iad".to_string(), "us-east-1".to_string());
        mappings.insert("FLY_REGION".to_string(), inner);

        let vu = Vu::new(crate::vu::EnvMapper::new(mappings), crate::vu::Globals::new(Default::default()));
        let arg = Arg::Env { name: "FLY_REGION".into(), raw_value: "iad".into() };
        assert_eq!(arg.generate(&vu).await.unwrap(), Value::Text("us-east-1".into()));
    }

    #[tokio::test]
    async fn global_arg_fails_when_missing() {
        let vu = Vu::new(crate::vu::EnvMapper::new(Default::default()), crate::vu::Globals::new(Default::default()));
        let arg = Arg::Global { name: "missing".into() };
        assert!(arg.generate(&vu).await.is_err());
    }
}
