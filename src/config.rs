//! The declarative workload data model and its YAML deserialization.
//! Plain structs decoded via `serde` + `serde_yaml`.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::args::Arg;
use crate::error::DrkError;

/// Top-level config: `arg_mappings`, `workflows`, `activities`.
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(rename = "arg_mappings", default)]
    pub env_mappings: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    pub workflows: HashMap<String, Workflow>,
    #[serde(default)]
    pub activities: HashMap<String, Activity>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Workflow {
    pub vus: u32,
    #[serde(default)]
    pub setup_queries: Vec<String>,
    #[serde(default)]
    pub queries: Vec<WorkflowQuery>,
    #[serde(default, with = "option_duration")]
    pub run_after: Option<Duration>,
    #[serde(default, with = "option_duration")]
    pub run_for: Option<Duration>,
    #[serde(default, with = "option_duration")]
    pub ramp_for: Option<Duration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowQuery {
    pub name: String,
    pub rate: Rate,
}

/// A `times/interval` pair that induces a tick period `interval/times`,
/// parsed from the wire form `"N/duration"` (e.g. `"10/1s"`).
#[derive(Debug, Clone, Copy)]
pub struct Rate {
    pub times: u32,
    pub interval: Duration,
    pub tick: Duration,
}

impl<'de> Deserialize<'de> for Rate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Rate::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Rate {
    pub fn parse(raw: &str) -> Result<Self, DrkError> {
        let (times_str, interval_str) = raw
            .split_once('/')
            .ok_or_else(|| DrkError::Config(format!("invalid rate {raw:?}, expected N/duration")))?;

        let times: u32 = times_str
            .parse()
            .map_err(|e| DrkError::Config(format!("parsing rate times: {e}")))?;
        if times == 0 {
            return Err(DrkError::Config("rate times must be > 0".to_string()));
        }

        let interval = humantime::parse_duration(interval_str)
            .map_err(|e| DrkError::Config(format!("parsing rate interval: {e}")))?;
        if interval.is_zero() {
            return Err(DrkError::Config("rate interval must be > 0".to_string()));
        }

        let tick = interval / times;
        if tick.is_zero() {
            return Err(DrkError::Config("rate tick resolves to zero".to_string()));
        }

        Ok(Rate { times, interval, tick })
    }
}

impl std::fmt::Display for Rate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.times, humantime::format_duration(self.interval))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityType {
    Query,
    Exec,
}

#[derive(Debug, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityType,
    #[serde(rename = "query")]
    pub statement: String,
    #[serde(default)]
    pub args: Vec<Arg>,
    #[serde(default)]
    pub batch: Option<Batch>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Batch {
    pub table: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub returning: Vec<String>,
    pub size: u64,
    pub total: u64,
}

pub fn load_config(path: &Path) -> Result<Config, DrkError> {
    let file = File::open(path)
        .map_err(|e| DrkError::Config(format!("opening {}: {e}", path.display())))?;
    serde_yaml::from_reader(file).map_err(|e| DrkError::Config(format!("parsing config: {e}")))
}

mod option_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => humantime::parse_duration(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_parses_times_and_interval() {
        let r = Rate::parse("10/1s").unwrap();
        assert_eq!(r.times, 10);
        assert_eq!(r.interval, Duration::from_secs(1));
        assert_eq!(r.tick, Duration::from_millis(100));
    }

    #[test]
    fn rate_rejects_zero_times() {
        assert!(Rate::parse("0/1s").is_err());
    }

    #[test]
    fn rate_rejects_zero_interval() {
        assert!(Rate::parse("10/0s").is_err());
    }

    #[test]
    fn config_deserializes_minimal_workflow() {
        let yaml = r#"
workflows:
  init:
    vus: 1
    setup_queries: ["seed"]
    queries: []
activities:
  seed:
    type: exec
    query: "insert into t values (1)"
    args: []
"#;
        let cfg: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.workflows["init"].vus, 1);
        assert_eq!(cfg.activities["seed"].statement, "insert into t values (1)");
    }
}
