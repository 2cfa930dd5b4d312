// ABOUTME: Error types with structured exit codes for CLI
// ABOUTME: Separates transient transport failures from fatal config and content errors

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing transfer option: {0}")]
    MissingOption(&'static str),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status} on {endpoint}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Required field `{field}` is missing")]
    MissingField { field: String },

    #[error("Field `{field}` must be {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    #[error("{0} already exists and overwrite is disabled")]
    AlreadyExists(String),

    #[error("Git error: {0}")]
    Git(String),

    #[error("Summarization error: {0}")]
    Summarization(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) | Error::MissingOption(_) => 1,
            Error::Auth(_) => 2,
            Error::Network(_) => 3,
            Error::Api { .. } => 4,
            Error::Parse(_) | Error::Yaml(_) => 5,
            Error::Filesystem(_) | Error::AlreadyExists(_) => 6,
            Error::Summarization(_) => 7,
            Error::MissingField { .. } | Error::InvalidField { .. } => 8,
            Error::Git(_) => 9,
            Error::Task(_) => 10,
        }
    }

    /// Whether retrying the same call may succeed. Only transport hiccups
    /// qualify; config and content errors never resolve on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network(e) => !e.is_builder() && !e.is_decode(),
            Error::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn missing_field(field: impl Into<String>) -> Self {
        Error::MissingField {
            field: field.into(),
        }
    }

    pub(crate) fn already_exists_path(path: &Path) -> Self {
        Error::AlreadyExists(format!("file {}", path.display()))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
