use thiserror::Error;

use crate::workflow::WorkflowError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("request `{0}` was not found")]
    NotFound(String),
    #[error("request `{request_id}` changed concurrently (expected state `{expected}`)")]
    Conflict { request_id: String, expected: String },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        Self::Domain(DomainError::Workflow(value))
    }
}

/// Caller-facing classification of an [`ApplicationError`], carrying a
/// user-safe hint next to the detailed message.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "The request cannot be processed in its current state.",
            Self::Forbidden(_) => "You are not allowed to perform this action on the request.",
            Self::NotFound(_) => "The request could not be found.",
            Self::Conflict(_) => "The request was changed by someone else. Reload it and try again.",
            Self::ServiceUnavailable(_) => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal(_) => "An unexpected internal error occurred.",
        }
    }
}

impl From<&ApplicationError> for InterfaceError {
    fn from(value: &ApplicationError) -> Self {
        let message = value.to_string();
        match value {
            ApplicationError::Domain(DomainError::Workflow(WorkflowError::PermissionDenied {
                ..
            })) => Self::Forbidden(message),
            ApplicationError::Domain(_) => Self::BadRequest(message),
            ApplicationError::NotFound(_) => Self::NotFound(message),
            ApplicationError::Conflict { .. } => Self::Conflict(message),
            ApplicationError::Persistence(_) => Self::ServiceUnavailable(message),
            ApplicationError::Configuration(_) => Self::Internal(message),
        }
    }
}
