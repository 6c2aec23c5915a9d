//! Stateless payload converters for the tabular, markdown, and document
//! endpoints. Each converter takes an owned input and returns the converted
//! output without touching the network.

pub mod dbf;
pub mod document;
pub mod markdown;
pub mod tabular;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid input: {reason}")]
    Input { reason: String },
    #[error("csv parse failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("json parse failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dbf read failed: {0}")]
    Dbf(#[from] dbase::Error),
    #[error("document composition failed: {0}")]
    Compose(String),
}

impl ConvertError {
    pub fn input(reason: impl Into<String>) -> Self {
        Self::Input {
            reason: reason.into(),
        }
    }

    pub fn compose(message: impl Into<String>) -> Self {
        Self::Compose(message.into())
    }

    /// Whether the failure is attributable to the submitted payload rather
    /// than the service itself.
    pub fn is_input_fault(&self) -> bool {
        matches!(
            self,
            ConvertError::Input { .. }
                | ConvertError::Csv(_)
                | ConvertError::Json(_)
                | ConvertError::Dbf(_)
        )
    }
}
