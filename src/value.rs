use std::fmt;

use chrono::NaiveDateTime;

/// A bind value flowing between generators, captured rows and the SQL
/// dialect adapter. Kept small and concrete (rather than `serde_json::Value`)
/// because every variant needs a direct mapping onto both `mysql_async::Value`
/// and `tokio_postgres`'s `ToSql`.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
    Duration(std::time::Duration),
    Point(LatLon),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Timestamp(t) => write!(f, "{}", t.format("%+")),
            Value::Duration(d) => write!(f, "{}", humantime::format_duration(*d)),
            Value::Point(p) => write!(f, "{p}"),
        }
    }
}

/// A map coordinate produced by the `Point` random primitive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl fmt::Display for LatLon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point({} {})", self.lon, self.lat)
    }
}

/// A capability implemented by values that know how to render themselves
/// under a driver-supplied format tag, consulted by the `gen` arg type
/// before falling back to a plain `Display` rendering.
pub trait Formattable {
    fn format(&self, spec: &str) -> String;
}

impl Formattable for LatLon {
    fn format(&self, spec: &str) -> String {
        // The only format spec the registry's point values are ever asked
        // for is the well-known-text rendering; anything else falls back
        // to the default Display form.
        if spec == "wkt" {
            format!("POINT({} {})", self.lon, self.lat)
        } else {
            self.to_string()
        }
    }
}

/// An ordered, case-normalized (lower-cased keys) column capture, as
/// produced by a `query` activity or a batch load's `RETURNING` projection.
/// A `Vec` rather than a `HashMap` so that `extract_returning`'s
/// "preserve per-row column order" invariant is representable directly.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Row(pub Vec<(String, Value)>);

impl Row {
    pub fn new() -> Self {
        Row(Vec::new())
    }

    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.0.push((column.into().to_lowercase(), value));
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        let column = column.to_lowercase();
        self.0.iter().find(|(c, _)| *c == column).map(|(_, v)| v)
    }
}

/// Convert a `serde_yaml::Value` scalar (as found in `const`/`set` args) into
/// our bind-value representation.
pub fn from_yaml(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else {
                Value::Float(n.as_f64().unwrap_or_default())
            }
        }
        serde_yaml::Value::String(s) => Value::Text(s.clone()),
        other => Value::Text(serde_yaml::to_string(other).unwrap_or_default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_lookup_is_case_insensitive() {
        let mut row = Row::new();
        row.push("ID", Value::Int(1));
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("ID"), Some(&Value::Int(1)));
    }

    #[test]
    fn row_preserves_insertion_order() {
        let mut row = Row::new();
        row.push("b", Value::Int(2));
        row.push("a", Value::Int(1));
        let cols: Vec<&str> = row.0.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(cols, vec!["b", "a"]);
    }
}
