use rsboron_core::errors::BoronError;
use thiserror::Error;

/// Errors raised while configuring or running a fit.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] BoronError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse {what}: {details}")]
    Parse { what: String, details: String },
    #[error("Optimization failed: {0}")]
    Optimization(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Parse {
            what: "TOML".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Parse {
            what: "JSON".to_string(),
            details: err.to_string(),
        }
    }
}

/// Convenience type for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
