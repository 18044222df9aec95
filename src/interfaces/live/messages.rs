use serde::{Deserialize, Serialize};

use crate::core::store::{MetricsSnapshot, Server};

/// Control messages a live client may send.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    ConnectServer {
        server_id: i64,
    },
    DisconnectServer {
        server_id: i64,
        #[serde(default)]
        force: bool,
    },
    ExecuteCommand {
        server_id: i64,
        command: String,
    },
    GetServerList,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerSummary {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub server_type: String,
    pub connected: bool,
}

impl From<&Server> for ServerSummary {
    fn from(s: &Server) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            host: s.host.clone(),
            port: s.port,
            server_type: s.server_type.clone(),
            connected: s.connected,
        }
    }
}

/// Everything pushed to a live client. `status` on a status update is the
/// server's connected flag after the operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    ServerList {
        servers: Vec<ServerSummary>,
    },
    ServerStatusUpdate {
        server_id: i64,
        status: bool,
        message: String,
    },
    CommandResult {
        server_id: i64,
        success: bool,
        message: String,
        output: String,
    },
    ServerMetrics {
        server_id: i64,
        metrics: MetricsSnapshot,
    },
}
