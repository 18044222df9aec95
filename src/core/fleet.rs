use std::sync::Arc;
use tracing::info;

use crate::core::dispatcher::CommandDispatcher;
use crate::core::error::{SwitchboardError, SwitchboardResult};
use crate::core::metrics::MetricsSampler;
use crate::core::registry::{CommandLogEntry, ConnectionRegistry};
use crate::core::store::{NewServer, PersistenceGateway, Server, ServerUpdate};
use crate::core::tasks::{TaskRunner, TaskService};
use crate::core::transport::Transport;

/// The services behind every client surface, wired once per process.
#[derive(Clone)]
pub struct Fleet {
    pub store: Arc<dyn PersistenceGateway>,
    pub registry: Arc<ConnectionRegistry>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub sampler: Arc<MetricsSampler>,
    pub tasks: Arc<TaskService>,
}

impl Fleet {
    /// Returns the bundle plus the not-yet-started task runner that drains its queue.
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        transport: Arc<dyn Transport>,
        command_log_capacity: usize,
        task_queue_capacity: usize,
    ) -> (Self, TaskRunner) {
        let registry = Arc::new(ConnectionRegistry::new(
            store.clone(),
            transport,
            command_log_capacity,
        ));
        let dispatcher = Arc::new(CommandDispatcher::new(registry.clone()));
        let sampler = Arc::new(MetricsSampler::new(registry.clone()));
        let (runner, queue) = TaskRunner::new(store.clone(), dispatcher.clone(), task_queue_capacity);
        let tasks = Arc::new(TaskService::new(store.clone(), queue));

        let fleet = Self {
            store,
            registry,
            dispatcher,
            sampler,
            tasks,
        };
        (fleet, runner)
    }

    pub async fn list_servers(
        &self,
        offset: usize,
        limit: Option<usize>,
    ) -> SwitchboardResult<Vec<Server>> {
        Ok(self.store.list_servers(offset, limit).await?)
    }

    pub async fn get_server(&self, server_id: i64) -> SwitchboardResult<Server> {
        self.registry.load_server(server_id).await
    }

    pub async fn connected_servers(&self) -> SwitchboardResult<Vec<Server>> {
        let servers = self.store.list_servers(0, None).await?;
        Ok(servers.into_iter().filter(|s| s.connected).collect())
    }

    pub async fn create_server(&self, server: &NewServer) -> SwitchboardResult<Server> {
        if self.store.get_server_by_name(&server.name).await?.is_some() {
            return Err(SwitchboardError::InvalidState(format!(
                "Server name '{}' is already registered",
                server.name
            )));
        }
        let created = self.store.create_server(server).await?;
        info!(server_id = created.id, "Registered server {}", created.name);
        Ok(created)
    }

    pub async fn update_server(
        &self,
        server_id: i64,
        update: ServerUpdate,
    ) -> SwitchboardResult<Server> {
        let _slot = self.registry.lock(server_id).await;
        self.registry.load_server(server_id).await?;
        if let Some(name) = &update.name
            && let Some(existing) = self.store.get_server_by_name(name).await?
            && existing.id != server_id
        {
            return Err(SwitchboardError::InvalidState(format!(
                "Server name '{name}' is already registered"
            )));
        }
        self.store
            .update_server(server_id, &update.into_patch())
            .await?
            .ok_or_else(|| SwitchboardError::server_not_found(server_id))
    }

    /// Connected servers must be disconnected first.
    pub async fn delete_server(&self, server_id: i64) -> SwitchboardResult<()> {
        {
            let _slot = self.registry.lock(server_id).await;
            let server = self.registry.load_server(server_id).await?;
            if server.connected {
                return Err(SwitchboardError::InvalidState(
                    "Cannot delete a connected server; disconnect it first".to_string(),
                ));
            }
            self.store.delete_server(server_id).await?;
            info!(server_id, "Removed server {}", server.name);
        }
        self.registry.forget(server_id).await;
        Ok(())
    }

    pub async fn server_logs(&self, server_id: i64) -> SwitchboardResult<Vec<CommandLogEntry>> {
        self.registry.load_server(server_id).await?;
        Ok(self.registry.logs(server_id).await)
    }
}
