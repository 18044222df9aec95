use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommandLogEntry {
    pub timestamp: DateTime<Utc>,
    pub command: String,
    pub output: String,
    pub success: bool,
    pub reconnected: bool,
}

impl CommandLogEntry {
    pub fn new(command: &str, output: impl Into<String>, success: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            command: command.to_string(),
            output: output.into(),
            success,
            reconnected: false,
        }
    }

    pub fn reconnected(mut self) -> Self {
        self.reconnected = true;
        self
    }
}

/// Fixed-capacity ring of the most recent entries for one server.
#[derive(Debug)]
struct CommandLog {
    entries: VecDeque<CommandLogEntry>,
    capacity: usize,
}

impl CommandLog {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    fn push(&mut self, entry: CommandLogEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }
}

/// Per-server command history, oldest entries evicted first.
pub struct CommandLogBook {
    logs: Mutex<HashMap<i64, CommandLog>>,
    capacity: usize,
}

impl CommandLogBook {
    pub fn new(capacity: usize) -> Self {
        Self {
            logs: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub async fn append(&self, server_id: i64, entry: CommandLogEntry) {
        let mut logs = self.logs.lock().await;
        logs.entry(server_id)
            .or_insert_with(|| CommandLog::new(self.capacity))
            .push(entry);
    }

    pub async fn entries(&self, server_id: i64) -> Vec<CommandLogEntry> {
        let logs = self.logs.lock().await;
        logs.get(&server_id)
            .map(|log| log.entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn forget(&self, server_id: i64) {
        self.logs.lock().await.remove(&server_id);
    }
}
