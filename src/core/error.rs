use thiserror::Error;

use crate::core::transport::TransportError;

pub type SwitchboardResult<T> = std::result::Result<T, SwitchboardError>;

#[derive(Debug, Error)]
pub enum SwitchboardError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    ConnectionFailure(String),

    #[error("{0}")]
    DispatchFailure(String),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SwitchboardError {
    pub fn server_not_found(id: i64) -> Self {
        SwitchboardError::NotFound {
            entity: "Server",
            id,
        }
    }

    pub fn task_not_found(id: i64) -> Self {
        SwitchboardError::NotFound { entity: "Task", id }
    }

    pub fn not_connected() -> Self {
        SwitchboardError::InvalidState("Server is not connected".to_string())
    }

    /// Only transport-level failures go through the reconnect-and-retry cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwitchboardError::ConnectionFailure(_) | SwitchboardError::DispatchFailure(_)
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SwitchboardError::NotFound { .. } => "not_found",
            SwitchboardError::InvalidState(_) => "invalid_state",
            SwitchboardError::ConnectionFailure(_) => "connection_failure",
            SwitchboardError::DispatchFailure(_) => "dispatch_failure",
            SwitchboardError::Storage(_) => "storage",
        }
    }
}

impl From<rusqlite::Error> for SwitchboardError {
    fn from(e: rusqlite::Error) -> Self {
        SwitchboardError::Storage(e.into())
    }
}

impl From<TransportError> for SwitchboardError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Command(reason) => SwitchboardError::DispatchFailure(reason),
            TransportError::Connect(reason) => SwitchboardError::ConnectionFailure(reason),
            TransportError::Closed => SwitchboardError::ConnectionFailure(e.to_string()),
        }
    }
}
