use thiserror::Error;

/// Error kinds surfaced by the workload engine. Unmet dependencies have
/// no variant here: they are a silent per-tick skip, never an error.
#[derive(Error, Debug)]
pub enum DrkError {
    #[error("config error: {0}")]
    Config(String),

    #[error("missing activity: {0}")]
    MissingActivity(String),

    #[error("generating arg: {0}")]
    ArgGeneration(String),

    #[error("query failed: {0}")]
    QueryFailed(String),

    #[error("setup failed for activity {activity}: {source}")]
    SetupFailed {
        activity: String,
        #[source]
        source: Box<DrkError>,
    },

    #[error("unsupported database driver: {0}")]
    UnsupportedDriver(String),
}
