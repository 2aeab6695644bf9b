//! Error type shared by every layer below the CLI.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnooError {
    /// The API answered with a non-2xx status
    #[error("API error on {endpoint}: HTTP {status}: {body}")]
    Api {
        endpoint: String,
        status: u16,
        body: String,
    },

    /// No HTTP response was received at all
    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: String, message: String },

    /// A 2xx response whose body was not the JSON we expected
    #[error("invalid response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("credentials: {0}")]
    Credentials(String),

    #[error("config file {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },

    #[error("cannot write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An API value that could not be interpreted
    #[error("unexpected {field} value {value:?}")]
    Format { field: &'static str, value: String },
}

impl SnooError {
    pub fn format(field: &'static str, value: impl Into<String>) -> Self {
        SnooError::Format {
            field,
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SnooError>;
