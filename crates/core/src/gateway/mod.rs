//! Boundary to the remote task server.

mod http;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{RemoteSnapshot, TaskDraft};
use crate::patch::PartialTask;

pub use http::HttpGateway;
pub use memory::MemoryGateway;

#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn fetch_all(&self) -> Result<RemoteSnapshot, GatewayError>;

    /// One call per flush; every patch carries at least an identifier.
    async fn apply_patches(&self, patches: &[PartialTask]) -> Result<(), GatewayError>;

    async fn create_task(&self, draft: &TaskDraft) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("the server rejected the credentials")]
    Forbidden,
    #[error("network error: {0}")]
    Network(String),
    #[error("could not decode server response: {0}")]
    Decode(String),
    #[error("server responded with status {status}")]
    Status { status: u16, body: String },
    #[error("invalid endpoint '{0}': it must start with http:// or https://")]
    InvalidEndpoint(String),
    #[error("request did not complete: {0}")]
    Interrupted(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    TransientNetwork,
    DecodeValidation,
    AuthorizationForbidden,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Forbidden => ErrorKind::AuthorizationForbidden,
            GatewayError::Network(_)
            | GatewayError::Status { .. }
            | GatewayError::Interrupted(_) => ErrorKind::TransientNetwork,
            GatewayError::Decode(_) | GatewayError::InvalidEndpoint(_) => {
                ErrorKind::DecodeValidation
            }
        }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, GatewayError::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors_into_taxonomy() {
        assert_eq!(GatewayError::Forbidden.kind(), ErrorKind::AuthorizationForbidden);
        assert_eq!(
            GatewayError::Network("timed out".into()).kind(),
            ErrorKind::TransientNetwork
        );
        assert_eq!(
            GatewayError::Status {
                status: 502,
                body: String::new()
            }
            .kind(),
            ErrorKind::TransientNetwork
        );
        assert_eq!(
            GatewayError::Interrupted("task panicked".into()).kind(),
            ErrorKind::TransientNetwork
        );
        assert_eq!(
            GatewayError::Decode("missing field".into()).kind(),
            ErrorKind::DecodeValidation
        );
    }
}
