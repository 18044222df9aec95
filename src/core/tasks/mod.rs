mod runner;

use std::sync::Arc;
use tracing::info;

use crate::core::error::{SwitchboardError, SwitchboardResult};
use crate::core::store::{NewTask, PersistenceGateway, Task, TaskFilter, TaskStatus, TaskUpdate};
pub use runner::{QueuedTask, TaskQueue, TaskRunner};

pub struct TaskService {
    store: Arc<dyn PersistenceGateway>,
    queue: TaskQueue,
}

impl TaskService {
    pub fn new(store: Arc<dyn PersistenceGateway>, queue: TaskQueue) -> Self {
        Self { store, queue }
    }

    async fn require_server(&self, server_id: i64) -> SwitchboardResult<()> {
        match self.store.get_server(server_id).await? {
            Some(_) => Ok(()),
            None => Err(SwitchboardError::server_not_found(server_id)),
        }
    }

    pub async fn create(&self, task: &NewTask) -> SwitchboardResult<Task> {
        self.require_server(task.server_id).await?;
        let task = self.store.create_task(task).await?;
        info!(task_id = task.id, server_id = task.server_id, "Created task {}", task.name);
        Ok(task)
    }

    pub async fn get(&self, task_id: i64) -> SwitchboardResult<Task> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| SwitchboardError::task_not_found(task_id))
    }

    pub async fn list(&self, filter: &TaskFilter) -> SwitchboardResult<Vec<Task>> {
        Ok(self.store.list_tasks(filter).await?)
    }

    pub async fn update(&self, task_id: i64, update: &TaskUpdate) -> SwitchboardResult<Task> {
        self.get(task_id).await?;
        if let Some(server_id) = update.server_id {
            self.require_server(server_id).await?;
        }
        self.store
            .update_task(task_id, update)
            .await?
            .ok_or_else(|| SwitchboardError::task_not_found(task_id))
    }

    pub async fn delete(&self, task_id: i64) -> SwitchboardResult<()> {
        if self.store.delete_task(task_id).await? {
            Ok(())
        } else {
            Err(SwitchboardError::task_not_found(task_id))
        }
    }

    /// Marks a pending task running and hands it to the runner. Refused while
    /// the owning server is disconnected, before anything is written.
    pub async fn run(&self, task_id: i64) -> SwitchboardResult<Task> {
        let task = self.get(task_id).await?;
        let server = self
            .store
            .get_server(task.server_id)
            .await?
            .ok_or_else(|| SwitchboardError::server_not_found(task.server_id))?;
        if !server.connected {
            return Err(SwitchboardError::not_connected());
        }
        if !task.status.can_transition(TaskStatus::Running) {
            return Err(SwitchboardError::InvalidState(format!(
                "Task {} is already {}",
                task_id,
                task.status.as_str()
            )));
        }

        // Another caller may have claimed the task since it was read.
        let Some(running) = self.store.mark_task_running(task_id).await? else {
            let current = self.get(task_id).await?;
            return Err(SwitchboardError::InvalidState(format!(
                "Task {} is already {}",
                task_id,
                current.status.as_str()
            )));
        };

        if let Err(e) = self.queue.enqueue(task_id, task.server_id, &task.command) {
            self.store
                .update_task_status(task_id, TaskStatus::Failed, Some(&e.to_string()))
                .await?;
            return Err(e);
        }
        info!(task_id, server_id = task.server_id, "Queued task {}", task.name);
        Ok(running)
    }
}
