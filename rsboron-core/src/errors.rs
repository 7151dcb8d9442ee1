use thiserror::Error;

/// Error type for invalid operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BoronError {
    /// The inputs produce a mathematically undefined result
    #[error("Domain error in {quantity}: {details}")]
    Domain { quantity: String, details: String },
    #[error("Sample {sample} has no value for {category}/{field}")]
    MissingField {
        sample: String,
        category: String,
        field: String,
    },
    #[error("No samples match experiment={experiment}, phase={phase}")]
    EmptySelection { experiment: String, phase: String },
    #[error("Shape mismatch for {quantity}. Expected length {expected}, got {actual}")]
    Shape {
        quantity: String,
        expected: usize,
        actual: usize,
    },
    #[error("The {variant} model takes {expected} parameters, got {actual}")]
    InvalidParameterCount {
        variant: String,
        expected: usize,
        actual: usize,
    },
}

impl BoronError {
    pub(crate) fn domain(quantity: &str, details: impl Into<String>) -> Self {
        BoronError::Domain {
            quantity: quantity.to_string(),
            details: details.into(),
        }
    }

    pub(crate) fn shape(quantity: &str, expected: usize, actual: usize) -> Self {
        BoronError::Shape {
            quantity: quantity.to_string(),
            expected,
            actual,
        }
    }
}

/// Convenience type for `Result<T, BoronError>`.
pub type BoronResult<T> = Result<T, BoronError>;
