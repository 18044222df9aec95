mod servers;
mod tasks;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::platform::{NativePlatform, Platform};
pub use types::{
    MetricsSnapshot, NewServer, NewTask, Server, ServerPatch, ServerUpdate, Task, TaskFilter,
    TaskStatus, TaskUpdate,
};

/// Durable CRUD over server and task records. Every call commits on its own.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn get_server(&self, id: i64) -> Result<Option<Server>>;
    async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>>;
    async fn list_servers(&self, offset: usize, limit: Option<usize>) -> Result<Vec<Server>>;
    async fn create_server(&self, server: &NewServer) -> Result<Server>;
    async fn update_server(&self, id: i64, patch: &ServerPatch) -> Result<Option<Server>>;
    async fn delete_server(&self, id: i64) -> Result<bool>;
    /// Clears every persisted live-status flag. Connections never survive a restart.
    async fn reset_connection_state(&self) -> Result<usize>;

    async fn get_task(&self, id: i64) -> Result<Option<Task>>;
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;
    async fn create_task(&self, task: &NewTask) -> Result<Task>;
    async fn update_task(&self, id: i64, update: &TaskUpdate) -> Result<Option<Task>>;
    async fn delete_task(&self, id: i64) -> Result<bool>;
    /// Claims a pending task. `None` when the task is gone or no longer pending.
    async fn mark_task_running(&self, id: i64) -> Result<Option<Task>>;
    /// `result: None` leaves any previously captured result in place.
    async fn update_task_status(
        &self,
        id: i64,
        status: TaskStatus,
        result: Option<&str>,
    ) -> Result<Option<Task>>;
}

pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await?;
            NativePlatform::restrict_dir_permissions(parent);
        }
        let db = Connection::open(path)?;
        NativePlatform::restrict_file_permissions(path);
        Self::init_schema(&db)?;
        info!("Opened server store at {:?}", path);
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        Self::init_schema(&db)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch("PRAGMA foreign_keys = ON;")?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS servers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                server_type TEXT NOT NULL,
                api_key TEXT,
                connected INTEGER NOT NULL DEFAULT 0,
                connection_id TEXT,
                connection_error_count INTEGER NOT NULL DEFAULT 0,
                command_error_count INTEGER NOT NULL DEFAULT 0,
                last_connected TEXT,
                last_error TEXT,
                last_metrics TEXT
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                command TEXT NOT NULL,
                server_id INTEGER NOT NULL REFERENCES servers(id) ON DELETE CASCADE,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                last_run TEXT,
                result TEXT
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_server ON tasks(server_id)",
            [],
        )?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceGateway for SqliteStore {
    async fn get_server(&self, id: i64) -> Result<Option<Server>> {
        let db = self.db.lock().await;
        servers::get(&db, id)
    }

    async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>> {
        let db = self.db.lock().await;
        servers::get_by_name(&db, name)
    }

    async fn list_servers(&self, offset: usize, limit: Option<usize>) -> Result<Vec<Server>> {
        let db = self.db.lock().await;
        servers::list(&db, offset, limit)
    }

    async fn create_server(&self, server: &NewServer) -> Result<Server> {
        let db = self.db.lock().await;
        servers::insert(&db, server)
    }

    async fn update_server(&self, id: i64, patch: &ServerPatch) -> Result<Option<Server>> {
        let db = self.db.lock().await;
        servers::update(&db, id, patch)
    }

    async fn delete_server(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        servers::delete(&db, id)
    }

    async fn reset_connection_state(&self) -> Result<usize> {
        let db = self.db.lock().await;
        servers::reset_connection_state(&db)
    }

    async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        let db = self.db.lock().await;
        tasks::get(&db, id)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let db = self.db.lock().await;
        tasks::list(&db, filter)
    }

    async fn create_task(&self, task: &NewTask) -> Result<Task> {
        let db = self.db.lock().await;
        tasks::insert(&db, task)
    }

    async fn update_task(&self, id: i64, update: &TaskUpdate) -> Result<Option<Task>> {
        let db = self.db.lock().await;
        tasks::update(&db, id, update)
    }

    async fn delete_task(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        tasks::delete(&db, id)
    }

    async fn mark_task_running(&self, id: i64) -> Result<Option<Task>> {
        let db = self.db.lock().await;
        tasks::mark_running(&db, id)
    }

    async fn update_task_status(
        &self,
        id: i64,
        status: TaskStatus,
        result: Option<&str>,
    ) -> Result<Option<Task>> {
        let db = self.db.lock().await;
        tasks::update_status(&db, id, status, result)
    }
}

fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339()
}

fn decode_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|ts| ts.with_timezone(&Utc))
}

/// SQLite takes `-1` as "no limit".
fn sql_limit(limit: Option<usize>) -> i64 {
    limit
        .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
        .unwrap_or(-1)
}
