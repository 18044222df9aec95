use anyhow::{Result, anyhow};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ScriptedTransport, add_server, assert_token_invariant, harness};
use crate::core::error::SwitchboardError;
use crate::core::registry::ConnectionRegistry;
use crate::core::store::{
    NewServer, NewTask, PersistenceGateway, Server, ServerPatch, SqliteStore, Task, TaskFilter,
    TaskStatus, TaskUpdate,
};

#[tokio::test]
async fn connect_twice_opens_one_session() {
    let h = harness();
    let db = add_server(&h.fleet, "db1", "database").await;

    let first = h.fleet.registry.connect(db.id).await.unwrap();
    assert!(!first.already_connected);
    assert_eq!(first.message, "Connected to db1");
    assert_token_invariant(&h.fleet).await;

    let second = h.fleet.registry.connect(db.id).await.unwrap();
    assert!(second.already_connected);
    assert_eq!(second.message, "Already connected to db1");
    assert_eq!(second.connection_id, first.connection_id);

    assert_eq!(h.transport.opens(), 1);
    let server = h.fleet.get_server(db.id).await.unwrap();
    assert!(server.connected);
    assert_eq!(server.connection_id.as_deref(), Some(first.connection_id.as_str()));
    assert_eq!(server.connection_error_count, 0);
    assert!(server.last_connected.is_some());
}

#[tokio::test]
async fn concurrent_connects_are_serialised_per_server() {
    let h = harness();
    let db = add_server(&h.fleet, "db1", "database").await;

    let attempts = (0..8).map(|_| h.fleet.registry.connect(db.id));
    let outcomes = join_all(attempts).await;

    assert!(outcomes.iter().all(|o| o.is_ok()));
    assert_eq!(h.transport.opens(), 1);
    let fresh = outcomes
        .iter()
        .filter(|o| o.as_ref().is_ok_and(|o| !o.already_connected))
        .count();
    assert_eq!(fresh, 1);
    assert_token_invariant(&h.fleet).await;
}

#[tokio::test]
async fn failed_connect_counts_the_error_and_stays_disconnected() {
    let h = harness();
    let db = add_server(&h.fleet, "db1", "database").await;
    h.transport.fail_next_opens(1);

    let err = h.fleet.registry.connect(db.id).await.unwrap_err();
    assert!(matches!(err, SwitchboardError::ConnectionFailure(_)));
    assert!(err.to_string().starts_with("Connection failed:"));

    let server = h.fleet.get_server(db.id).await.unwrap();
    assert!(!server.connected);
    assert_eq!(server.connection_error_count, 1);
    assert!(server.last_error.as_deref().unwrap().contains("refused"));
    assert_token_invariant(&h.fleet).await;

    let logs = h.fleet.registry.logs(db.id).await;
    assert_eq!(logs.len(), 1);
    assert!(!logs[0].success);

    // A later success clears the error trail.
    h.fleet.registry.connect(db.id).await.unwrap();
    let server = h.fleet.get_server(db.id).await.unwrap();
    assert_eq!(server.connection_error_count, 0);
    assert!(server.last_error.is_none());
}

#[tokio::test]
async fn disconnect_of_idle_server_is_a_no_op() {
    let h = harness();
    let db = add_server(&h.fleet, "db1", "database").await;

    let outcome = h.fleet.registry.disconnect(db.id, false).await.unwrap();
    assert_eq!(outcome.message, "Already disconnected from db1");
    assert_eq!(h.transport.closes(), 0);
    assert!(h.fleet.registry.logs(db.id).await.is_empty());
}

#[tokio::test]
async fn unforced_disconnect_error_keeps_the_session() {
    let h = harness();
    let db = add_server(&h.fleet, "db1", "database").await;
    let connected = h.fleet.registry.connect(db.id).await.unwrap();
    h.transport.fail_next_closes(1);

    let err = h.fleet.registry.disconnect(db.id, false).await.unwrap_err();
    assert!(err.to_string().starts_with("Disconnection failed:"));

    let server = h.fleet.get_server(db.id).await.unwrap();
    assert!(server.connected);
    assert_eq!(server.connection_id.as_deref(), Some(connected.connection_id.as_str()));
    assert!(server.last_error.is_some());
    assert_token_invariant(&h.fleet).await;
}

#[tokio::test]
async fn forced_disconnect_clears_state_despite_errors() {
    let h = harness();
    let db = add_server(&h.fleet, "db1", "database").await;
    h.fleet.registry.connect(db.id).await.unwrap();
    h.transport.fail_next_closes(1);

    let outcome = h.fleet.registry.disconnect(db.id, true).await.unwrap();
    assert!(outcome.message.starts_with("Force disconnected from db1"));
    assert!(outcome.warning.is_some());

    let server = h.fleet.get_server(db.id).await.unwrap();
    assert!(!server.connected);
    assert!(server.connection_id.is_none());
    assert!(!h.fleet.registry.is_connected(db.id).await.unwrap());
    assert_token_invariant(&h.fleet).await;
}

#[tokio::test]
async fn unknown_server_is_not_found() {
    let h = harness();
    assert!(matches!(
        h.fleet.registry.connect(404).await,
        Err(SwitchboardError::NotFound { .. })
    ));
    assert!(matches!(
        h.fleet.registry.disconnect(404, true).await,
        Err(SwitchboardError::NotFound { .. })
    ));
    assert_eq!(h.transport.opens(), 0);
}

#[tokio::test]
async fn connected_server_cannot_be_deleted() {
    let h = harness();
    let db = add_server(&h.fleet, "db1", "database").await;
    h.fleet.registry.connect(db.id).await.unwrap();

    assert!(matches!(
        h.fleet.delete_server(db.id).await,
        Err(SwitchboardError::InvalidState(_))
    ));

    h.fleet.registry.disconnect(db.id, false).await.unwrap();
    h.fleet.delete_server(db.id).await.unwrap();
    assert!(h.fleet.registry.logs(db.id).await.is_empty());
    assert!(matches!(
        h.fleet.get_server(db.id).await,
        Err(SwitchboardError::NotFound { .. })
    ));
}

/// SQLite store whose server writes can be switched off.
struct FlakyStore {
    inner: SqliteStore,
    reject_server_writes: AtomicBool,
}

#[async_trait]
impl PersistenceGateway for FlakyStore {
    async fn get_server(&self, id: i64) -> Result<Option<Server>> {
        self.inner.get_server(id).await
    }
    async fn get_server_by_name(&self, name: &str) -> Result<Option<Server>> {
        self.inner.get_server_by_name(name).await
    }
    async fn list_servers(&self, offset: usize, limit: Option<usize>) -> Result<Vec<Server>> {
        self.inner.list_servers(offset, limit).await
    }
    async fn create_server(&self, server: &NewServer) -> Result<Server> {
        self.inner.create_server(server).await
    }
    async fn update_server(&self, id: i64, patch: &ServerPatch) -> Result<Option<Server>> {
        if self.reject_server_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("disk I/O error"));
        }
        self.inner.update_server(id, patch).await
    }
    async fn delete_server(&self, id: i64) -> Result<bool> {
        self.inner.delete_server(id).await
    }
    async fn reset_connection_state(&self) -> Result<usize> {
        self.inner.reset_connection_state().await
    }
    async fn get_task(&self, id: i64) -> Result<Option<Task>> {
        self.inner.get_task(id).await
    }
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.inner.list_tasks(filter).await
    }
    async fn create_task(&self, task: &NewTask) -> Result<Task> {
        self.inner.create_task(task).await
    }
    async fn update_task(&self, id: i64, update: &TaskUpdate) -> Result<Option<Task>> {
        self.inner.update_task(id, update).await
    }
    async fn delete_task(&self, id: i64) -> Result<bool> {
        self.inner.delete_task(id).await
    }
    async fn mark_task_running(&self, id: i64) -> Result<Option<Task>> {
        self.inner.mark_task_running(id).await
    }
    async fn update_task_status(
        &self,
        id: i64,
        status: TaskStatus,
        result: Option<&str>,
    ) -> Result<Option<Task>> {
        self.inner.update_task_status(id, status, result).await
    }
}

#[tokio::test]
async fn failed_status_write_rolls_back_the_new_session() {
    let store = Arc::new(FlakyStore {
        inner: SqliteStore::open_in_memory().unwrap(),
        reject_server_writes: AtomicBool::new(false),
    });
    let server = store
        .create_server(&NewServer {
            name: "db1".to_string(),
            host: "10.0.0.1".to_string(),
            port: 5432,
            server_type: "database".to_string(),
            api_key: None,
        })
        .await
        .unwrap();
    let transport = Arc::new(ScriptedTransport::default());
    let registry = ConnectionRegistry::new(store.clone(), transport.clone(), 100);

    store.reject_server_writes.store(true, Ordering::SeqCst);
    let err = registry.connect(server.id).await.unwrap_err();
    assert!(matches!(err, SwitchboardError::Storage(_)));
    assert_eq!(transport.opens(), 1);
    assert_eq!(transport.closes(), 1);

    // A rollback close that also fails still surfaces the storage error.
    transport.fail_next_closes(1);
    let err = registry.connect(server.id).await.unwrap_err();
    assert!(matches!(err, SwitchboardError::Storage(_)));
    assert_eq!(transport.opens(), 2);

    store.reject_server_writes.store(false, Ordering::SeqCst);
    assert!(!registry.is_connected(server.id).await.unwrap());
    let outcome = registry.connect(server.id).await.unwrap();
    assert!(!outcome.already_connected);
    assert!(registry.is_connected(server.id).await.unwrap());
}
