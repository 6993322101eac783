use std::path::PathBuf;

use thiserror::Error;

/// Errors from the I/O and configuration edges of the crate.
///
/// The extraction, aggregation and matching algorithms never return these;
/// their failures are represented as data.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config {path}: week_key_format {format:?} cannot render a date")]
    WeekKeyFormat { path: PathBuf, format: String },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("invalid glob pattern: {0}")]
    Glob(#[from] globset::Error),
}

/// Record-level faults raised while deriving one stream item.
///
/// These never escape the extractor: the offending container is logged and
/// skipped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("container has no stream item id")]
    MissingId,

    #[error("duplicate stream item id {0}")]
    DuplicateId(String),
}

pub type Result<T> = std::result::Result<T, Error>;
