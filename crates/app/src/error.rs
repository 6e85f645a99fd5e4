//! Service error boundary.
//!
//! Domain errors pass through with their kind and message. Everything else collapses into
//! an opaque `Internal`; the detail goes to the log only.

use thiserror::Error;
use tracing::error;

use ajo_core::DomainError;
use ajo_infra::DispatchError;
use ajo_infra::projections::ReadModelError;

use crate::collaborators::CollaboratorError;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("internal error")]
    Internal,
}

impl ServiceError {
    /// Stable machine-readable kind; `"internal"` for anything not caused by the request.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Domain(e) => e.kind(),
            ServiceError::Internal => "internal",
        }
    }

    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            ServiceError::Domain(e) => Some(e),
            ServiceError::Internal => None,
        }
    }

    pub(crate) fn internal(context: &'static str, detail: impl core::fmt::Display) -> Self {
        error!(context, error = %detail, "internal failure");
        ServiceError::Internal
    }
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => ServiceError::Domain(e),
            other => ServiceError::internal("dispatch", other),
        }
    }
}

impl From<ReadModelError> for ServiceError {
    fn from(value: ReadModelError) -> Self {
        ServiceError::internal("read_model", value)
    }
}

impl From<CollaboratorError> for ServiceError {
    fn from(value: CollaboratorError) -> Self {
        match value {
            CollaboratorError::Rejected(msg) => ServiceError::Domain(DomainError::validation(msg)),
            other => ServiceError::internal("processor", other),
        }
    }
}
