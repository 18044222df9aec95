use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sample of a server's health, as pushed on the live channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub network_in: f64,
    pub network_out: f64,
    pub uptime: i64,
    pub connections: u32,
    pub processes: u32,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reconnected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Server {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub server_type: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub connected: bool,
    pub connection_id: Option<String>,
    pub connection_error_count: i64,
    pub command_error_count: i64,
    pub last_connected: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_metrics: Option<MetricsSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewServer {
    pub name: String,
    pub host: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub server_type: String,
    #[serde(default, alias = "apiKey")]
    pub api_key: Option<String>,
}

/// Client-editable server fields. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerUpdate {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    #[serde(rename = "type")]
    pub server_type: Option<String>,
    #[serde(alias = "apiKey")]
    pub api_key: Option<String>,
}

impl ServerUpdate {
    pub fn into_patch(self) -> ServerPatch {
        ServerPatch {
            name: self.name,
            host: self.host,
            port: self.port,
            server_type: self.server_type,
            api_key: self.api_key.map(Some),
            ..ServerPatch::default()
        }
    }
}

impl From<&NewServer> for ServerUpdate {
    fn from(s: &NewServer) -> Self {
        ServerUpdate {
            name: Some(s.name.clone()),
            host: Some(s.host.clone()),
            port: Some(s.port),
            server_type: Some(s.server_type.clone()),
            api_key: s.api_key.clone(),
        }
    }
}

/// Partial update of a server row. `Some(None)` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerPatch {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub server_type: Option<String>,
    pub api_key: Option<Option<String>>,
    pub connected: Option<bool>,
    pub connection_id: Option<Option<String>>,
    pub connection_error_count: Option<i64>,
    pub command_error_count: Option<i64>,
    pub last_connected: Option<Option<DateTime<Utc>>>,
    pub last_error: Option<Option<String>>,
    pub last_metrics: Option<Option<MetricsSnapshot>>,
}

impl ServerPatch {
    pub fn is_empty(&self) -> bool {
        *self == ServerPatch::default()
    }

    /// Marks the server connected with `connection_id`; both fields always move together.
    pub fn connected(connection_id: &str, at: DateTime<Utc>) -> Self {
        ServerPatch {
            connected: Some(true),
            connection_id: Some(Some(connection_id.to_string())),
            connection_error_count: Some(0),
            last_connected: Some(Some(at)),
            last_error: Some(None),
            ..ServerPatch::default()
        }
    }

    pub fn disconnected() -> Self {
        ServerPatch {
            connected: Some(false),
            connection_id: Some(None),
            ..ServerPatch::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "completed" => Some(TaskStatus::Completed),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn can_transition(self, to: TaskStatus) -> bool {
        match self {
            TaskStatus::Pending => to == TaskStatus::Running,
            TaskStatus::Running => matches!(to, TaskStatus::Completed | TaskStatus::Failed),
            TaskStatus::Completed | TaskStatus::Failed => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: i64,
    pub name: String,
    pub command: String,
    pub server_id: i64,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub command: String,
    pub server_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub name: Option<String>,
    pub command: Option<String>,
    pub server_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskFilter {
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_page_limit")]
    pub limit: usize,
    pub server_id: Option<i64>,
}

fn default_page_limit() -> usize {
    100
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self {
            offset: 0,
            limit: default_page_limit(),
            server_id: None,
        }
    }
}
