//! Provider errors and diagnostics

use thiserror::Error;

/// Result type alias using ProviderError
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Provider error types
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("Unknown data source type: {0}")]
    UnknownDataSourceType(String),

    #[error("Provider is not configured")]
    NotConfigured,

    #[error("Invalid dynamic value: {0}")]
    InvalidValue(String),

    #[error(transparent)]
    Client(#[from] grafana_client::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<ProviderError> for tonic::Status {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::UnknownResourceType(_) | ProviderError::UnknownDataSourceType(_) => {
                tonic::Status::not_found(e.to_string())
            }
            ProviderError::NotConfigured => tonic::Status::failed_precondition(e.to_string()),
            ProviderError::InvalidValue(msg) => tonic::Status::invalid_argument(msg),
            _ => tonic::Status::internal(e.to_string()),
        }
    }
}

/// Error reported back to Terraform, optionally pinned to an attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub summary: String,
    pub detail: String,
    /// Top-level attribute the diagnostic refers to
    pub attribute: Option<String>,
}

impl Diagnostic {
    pub fn error(summary: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            detail: detail.into(),
            attribute: None,
        }
    }

    pub fn at(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

/// True when validation reported anything
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    !diagnostics.is_empty()
}
