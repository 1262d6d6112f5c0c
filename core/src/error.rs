use std::path::PathBuf;

use thiserror::Error;

/// Failures reported at the service boundary.
///
/// Every variant carries a message suitable for showing to the user as-is.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid number for {field}{}. Please enter a valid number.", in_context(.context))]
    InvalidNumber { field: String, context: String },

    #[error("Negative value not allowed for {field}{}. Please enter a non-negative number.", in_context(.context))]
    NegativeValue { field: String, context: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),

    #[error("Failed to save configuration: {0}")]
    Config(String),
}

impl TrackerError {
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TrackerError::InvalidNumber { .. }
                | TrackerError::NegativeValue { .. }
                | TrackerError::InvalidInput(_)
        )
    }
}

impl From<rusqlite::Error> for TrackerError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Storage(value.into())
    }
}

fn in_context(context: &str) -> String {
    if context.is_empty() {
        String::new()
    } else {
        format!(" in {context}")
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
