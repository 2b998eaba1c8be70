use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Serialize, Deserialize)]
pub enum CoreError {
    NotFound(String),
    ValidationError(String),
    StorageError(String),
    SerializationError(String),
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CoreError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CoreError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            CoreError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            CoreError::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

// Implement std::error::Error so callers can box/propagate the error
impl std::error::Error for CoreError {}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::StorageError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
