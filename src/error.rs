use thiserror::Error;

#[derive(Error, Debug)]
pub enum SquallError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unsupported thread backend: {kind}")]
    UnsupportedBackend { kind: String },

    #[error("Client operation '{operation}' failed: {details}")]
    ClientError { operation: String, details: String },

    #[error("Process {process} failed: {message}")]
    ProcessFailed { process: u64, message: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

pub type SquallResult<T> = std::result::Result<T, SquallError>;

impl SquallError {
    /// Shorthand for the configuration-error variant, the most common
    /// fail-fast surface in this crate.
    pub fn config(message: impl Into<String>) -> Self {
        SquallError::Configuration {
            message: message.into(),
        }
    }
}
