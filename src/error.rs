//! Error types for the mixture composition engine
//!
//! Only two kinds of failure are errors here: malformed input that prevents a
//! run from starting, and impossible internal states. Statistical
//! degeneracies (empty class, zero density individual, ...) are not errors;
//! they travel as non-empty warning strings and trigger a restart of the
//! current SEM try.

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, MixtError>;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum MixtError {
    #[error("Parse error in variable {variable}, individual {row}: unable to read \"{literal}\"")]
    Parse {
        variable: String,
        row: usize,
        literal: String,
    },

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Missing payload \"{name}\" at path {path}")]
    MissingPayload { path: String, name: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl MixtError {
    pub fn parse(variable: &str, row: usize, literal: &str) -> Self {
        MixtError::Parse {
            variable: variable.to_string(),
            row,
            literal: literal.to_string(),
        }
    }
}

impl From<ndarray::ShapeError> for MixtError {
    fn from(err: ndarray::ShapeError) -> Self {
        MixtError::Data(format!("invalid shape: {}", err))
    }
}

impl From<rayon::ThreadPoolBuildError> for MixtError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        MixtError::ThreadPool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MixtError::parse("x1", 4, "[3:");
        assert_eq!(
            err.to_string(),
            "Parse error in variable x1, individual 4: unable to read \"[3:\""
        );
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: MixtError = json_err.into();
        assert!(matches!(err, MixtError::Serialization(_)));
    }
}
