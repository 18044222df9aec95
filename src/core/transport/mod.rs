mod simulated;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::store::Server;
pub use simulated::SimulatedTransport;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0}")]
    Connect(String),
    #[error("{0}")]
    Command(String),
    #[error("session closed")]
    Closed,
}

/// The wire to a managed server. Sessions are identified by the token `open` hands back.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, server: &Server) -> Result<String, TransportError>;

    async fn close(&self, server: &Server, connection_id: &str) -> Result<(), TransportError>;

    async fn execute(
        &self,
        server: &Server,
        connection_id: &str,
        command: &str,
    ) -> Result<String, TransportError>;

    /// Cheap liveness check used before a metrics sample is taken.
    async fn probe(&self, server: &Server, connection_id: &str) -> Result<(), TransportError>;
}
