//! Error types for the tripcast pipeline

use thiserror::Error;

/// Result type alias for tripcast operations
pub type Result<T> = std::result::Result<T, TripcastError>;

/// Main error type for the training pipeline and prediction service
#[derive(Error, Debug)]
pub enum TripcastError {
    /// Malformed raw input: unparseable timestamp, non-finite coordinate,
    /// missing field required by the feature schema.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Missing dataset column or nothing left to train on.
    #[error("Data error: {0}")]
    Data(String),

    /// A feature record disagrees with the normalizer or artifact it is applied to.
    #[error("Schema mismatch: expected {expected}, got {actual}")]
    SchemaMismatch { expected: String, actual: String },

    /// A specific model failed to fit or evaluate.
    #[error("Training error in model '{model}': {reason}")]
    Training { model: String, reason: String },

    /// Artifact store key or run absent at load time.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Training run aborted")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    Shape { expected: String, actual: String },
}

impl TripcastError {
    /// Shorthand for a named model failure.
    pub fn training(model: impl Into<String>, reason: impl Into<String>) -> Self {
        TripcastError::Training {
            model: model.into(),
            reason: reason.into(),
        }
    }

    /// Whether the error was caused by the caller's input rather than by the
    /// deployment or the process.
    pub fn is_client_error(&self) -> bool {
        matches!(self, TripcastError::Validation(_))
    }
}

impl From<polars::error::PolarsError> for TripcastError {
    fn from(err: polars::error::PolarsError) -> Self {
        TripcastError::Data(err.to_string())
    }
}

impl From<serde_json::Error> for TripcastError {
    fn from(err: serde_json::Error) -> Self {
        TripcastError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for TripcastError {
    fn from(err: ndarray::ShapeError) -> Self {
        TripcastError::Shape {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TripcastError::Data("test error".to_string());
        assert_eq!(err.to_string(), "Data error: test error");

        let err = TripcastError::training("knn", "k must be positive");
        assert_eq!(err.to_string(), "Training error in model 'knn': k must be positive");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TripcastError = io_err.into();
        assert!(matches!(err, TripcastError::Io(_)));
    }

    #[test]
    fn test_client_error_classification() {
        assert!(TripcastError::Validation("bad".into()).is_client_error());
        assert!(!TripcastError::NotFound("model/knn".into()).is_client_error());
        assert!(!TripcastError::SchemaMismatch {
            expected: "a".into(),
            actual: "b".into()
        }
        .is_client_error());
    }
}
