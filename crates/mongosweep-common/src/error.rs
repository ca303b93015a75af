//! Error types for mongosweep

use thiserror::Error;

/// Result type alias for mongosweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Unified error type for all mongosweep operations
///
/// Driver failures are passed through with their message intact; the only
/// locally-introduced failure modes are input validation and a missing
/// update-key field.
#[derive(Error, Debug, Clone)]
pub enum SweepError {
    #[error("MongoDB error: {0}")]
    MongoDB(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Missing key field: {0}")]
    MissingKey(String),
}

impl From<mongodb::error::Error> for SweepError {
    fn from(err: mongodb::error::Error) -> Self {
        SweepError::MongoDB(err.to_string())
    }
}

impl From<bson::ser::Error> for SweepError {
    fn from(err: bson::ser::Error) -> Self {
        SweepError::Serialization(format!("BSON serialization error: {}", err))
    }
}

impl From<bson::de::Error> for SweepError {
    fn from(err: bson::de::Error) -> Self {
        SweepError::Serialization(format!("BSON deserialization error: {}", err))
    }
}

impl From<bson::document::ValueAccessError> for SweepError {
    fn from(err: bson::document::ValueAccessError) -> Self {
        SweepError::Serialization(format!("BSON value access error: {}", err))
    }
}
