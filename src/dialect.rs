//! Per-driver placeholder sequencing and multi-row `INSERT` synthesis used
//! by batch loads.

use crate::config::Batch;
use crate::error::DrkError;
use crate::value::Value;

/// Returns a monotonic placeholder generator for `driver`. Any driver other
/// than mysql/postgres/pgx/oracle is a fatal `UnsupportedDriver` error.
pub fn placeholder(driver: &str) -> Result<Box<dyn FnMut() -> String + Send>, DrkError> {
    match driver.to_lowercase().as_str() {
        "mysql" => Ok(Box::new(|| "?".to_string())),
        "postgres" | "pgx" => {
            let mut index = 0usize;
            Ok(Box::new(move || {
                index += 1;
                format!("${index}")
            }))
        }
        "oracle" => {
            let mut index = 0usize;
            Ok(Box::new(move || {
                index += 1;
                format!(":a_{index}")
            }))
        }
        other => Err(DrkError::UnsupportedDriver(other.to_string())),
    }
}

/// Builds `INSERT INTO <table> (<cols>) VALUES (<p>,...),(<p>,...)`.
/// Placeholders are requested left-to-right, row-by-row, so postgres/oracle
/// indices run from 1 to `columns.len() * rows.len()`.
pub fn insert_statement(
    mut next_placeholder: impl FnMut() -> String,
    batch: &Batch,
    rows: &[Vec<Value>],
) -> String {
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        batch.table,
        batch.columns.join(",")
    );

    for (i, row) in rows.iter().enumerate() {
        let placeholders: Vec<String> = (0..row.len()).map(|_| next_placeholder()).collect();
        sql.push('(');
        sql.push_str(&placeholders.join(","));
        sql.push(')');
        if i < rows.len() - 1 {
            sql.push(',');
        }
    }

    sql
}

/// Projects each row down to the `returning` columns, preserving per-row
/// column order. A `returning` name missing from `columns` is silently
/// omitted.
pub fn extract_returning(
    columns: &[String],
    returning: &[String],
    rows: &[Vec<Value>],
) -> Vec<crate::value::Row> {
    let mut output = Vec::with_capacity(rows.len());

    for row in rows {
        let mut projected = crate::value::Row::new();
        for ret_col in returning {
            if let Some(pos) = columns.iter().position(|c| c == ret_col) {
                if let Some(value) = row.get(pos) {
                    projected.push(ret_col.clone(), value.clone());
                }
            }
        }
        output.push(projected);
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(table: &str, columns: &[&str]) -> Batch {
        Batch {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            returning: vec![],
            size: 1,
            total: 1,
        }
    }

    #[test]
    fn pgx_placeholders_are_monotonic() {
        let mut p = placeholder("pgx").unwrap();
        let got: Vec<String> = (0..5).map(|_| p()).collect();
        assert_eq!(got, vec!["$1", "$2", "$3", "$4", "$5"]);
    }

    #[test]
    fn mysql_placeholders_are_constant() {
        let mut p = placeholder("mysql").unwrap();
        let got: Vec<String> = (0..3).map(|_| p()).collect();
        assert_eq!(got, vec!["?", "?", "?"]);
    }

    #[test]
    fn oracle_placeholders_are_named_and_monotonic() {
        let mut p = placeholder("oracle").unwrap();
        assert_eq!(p(), ":a_1");
        assert_eq!(p(), ":a_2");
    }

    #[test]
    fn unsupported_driver_is_fatal() {
        assert!(placeholder("sqlite").is_err());
    }

    #[test]
    fn insert_statement_matches_scenario() {
        let b = batch("t", &["a", "b", "c"]);
        let rows = vec![
            vec![Value::Int(1), Value::Int(2), Value::Int(3)],
            vec![Value::Int(4), Value::Int(5), Value::Int(6)],
            vec![Value::Int(7), Value::Int(8), Value::Int(9)],
        ];
        let p = placeholder("pgx").unwrap();
        let sql = insert_statement(p, &b, &rows);
        assert_eq!(
            sql,
            "INSERT INTO t (a,b,c) VALUES ($1,$2,$3),($4,$5,$6),($7,$8,$9)"
        );

        let p = placeholder("mysql").unwrap();
        let sql = insert_statement(p, &b, &rows);
        assert_eq!(
            sql,
            "INSERT INTO t (a,b,c) VALUES (?,?,?),(?,?,?),(?,?,?)"
        );
    }

    #[test]
    fn insert_statement_has_no_trailing_comma() {
        let b = batch("t", &["a"]);
        let rows = vec![vec![Value::Int(1)]];
        let p = placeholder("mysql").unwrap();
        let sql = insert_statement(p, &b, &rows);
        assert!(!sql.ends_with(','));
    }

    #[test]
    fn insert_statement_placeholder_count_matches_cols_times_rows() {
        let b = batch("t", &["a", "b"]);
        let rows = vec![vec![Value::Int(1), Value::Int(2)]; 4];
        let p = placeholder("mysql").unwrap();
        let sql = insert_statement(p, &b, &rows);
        assert_eq!(sql.matches('?').count(), 8);
    }

    #[test]
    fn extract_returning_round_trips_when_returning_equals_columns() {
        let columns = vec!["a".to_string(), "b".to_string()];
        let rows = vec![vec![Value::Int(1), Value::Int(2)]];
        let out = extract_returning(&columns, &columns, &rows);
        assert_eq!(out[0].get("a"), Some(&Value::Int(1)));
        assert_eq!(out[0].get("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn extract_returning_omits_missing_names_silently() {
        let columns = vec!["a".to_string()];
        let returning = vec!["a".to_string(), "ghost".to_string()];
        let rows = vec![vec![Value::Int(1)]];
        let out = extract_returning(&columns, &returning, &rows);
        assert_eq!(out[0].0.len(), 1);
    }
}
