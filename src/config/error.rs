use std::path::PathBuf;

/// Errors that may occur while loading the shipper configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("environment variable `{0}` must be set")]
    MissingVariable(&'static str),
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidValue { key: &'static str, value: String },
    #[error("`{key}` entry `{entry}` is not of the form `{expected}`")]
    InvalidEntry {
        key: &'static str,
        entry: String,
        expected: &'static str,
    },
    #[error("`{present}` is set but `{missing}` is not")]
    IncompleteLabel {
        present: &'static str,
        missing: &'static str,
    },
    #[error("failed to read config file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
