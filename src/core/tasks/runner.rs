use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::core::dispatcher::CommandDispatcher;
use crate::core::error::{SwitchboardError, SwitchboardResult};
use crate::core::lifecycle::LifecycleComponent;
use crate::core::store::{PersistenceGateway, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub task_id: i64,
    pub server_id: i64,
    pub command: String,
}

/// Producer side of the task queue. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    tx: mpsc::Sender<QueuedTask>,
}

impl TaskQueue {
    pub fn enqueue(&self, task_id: i64, server_id: i64, command: &str) -> SwitchboardResult<()> {
        let job = QueuedTask {
            task_id,
            server_id,
            command: command.to_string(),
        };
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                SwitchboardError::InvalidState("Task queue is full".to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                SwitchboardError::InvalidState("Task runner is not running".to_string())
            }
        })
    }
}

/// Single consumer that drains the queue strictly in order, one task at a time.
pub struct TaskRunner {
    store: Arc<dyn PersistenceGateway>,
    dispatcher: Arc<CommandDispatcher>,
    rx: Option<mpsc::Receiver<QueuedTask>>,
    handle: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        dispatcher: Arc<CommandDispatcher>,
        capacity: usize,
    ) -> (Self, TaskQueue) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let runner = Self {
            store,
            dispatcher,
            rx: Some(rx),
            handle: None,
            shutdown: CancellationToken::new(),
        };
        (runner, TaskQueue { tx })
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawns the drain loop. Later calls are no-ops; the receiver is consumed once.
    pub fn start(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        let store = self.store.clone();
        let dispatcher = self.dispatcher.clone();
        let shutdown = self.shutdown.clone();
        self.handle = Some(tokio::spawn(drain(rx, store, dispatcher, shutdown)));
        info!("Task runner started");
    }

    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            warn!("Task runner ended abnormally: {}", e);
        }
    }
}

async fn drain(
    mut rx: mpsc::Receiver<QueuedTask>,
    store: Arc<dyn PersistenceGateway>,
    dispatcher: Arc<CommandDispatcher>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };
        process(store.as_ref(), &dispatcher, job).await;
    }
    info!("Task runner stopped");
}

async fn process(store: &dyn PersistenceGateway, dispatcher: &CommandDispatcher, job: QueuedTask) {
    let task_id = job.task_id;
    let task = match store.get_task(task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(task_id, "Queued task no longer exists; skipping");
            return;
        }
        Err(e) => {
            error!(task_id, "Failed to load queued task: {}", e);
            return;
        }
    };

    if task.status.is_terminal() {
        warn!(task_id, status = task.status.as_str(), "Task already finished; skipping");
        return;
    }
    if task.status == TaskStatus::Pending
        && let Err(e) = store.mark_task_running(task_id).await
    {
        error!(task_id, "Failed to mark task running: {}", e);
        return;
    }

    let (status, result) = match dispatcher.execute(job.server_id, &job.command, true).await {
        Ok(outcome) => (TaskStatus::Completed, outcome.output),
        Err(e) => (TaskStatus::Failed, e.to_string()),
    };

    match store
        .update_task_status(task_id, status, Some(&result))
        .await
    {
        Ok(_) => info!(task_id, status = status.as_str(), "Task finished"),
        Err(e) => error!(task_id, "Failed to persist task result: {}", e),
    }
}

#[async_trait]
impl LifecycleComponent for TaskRunner {
    async fn on_start(&mut self) -> Result<()> {
        self.start();
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("Task runner shutting down...");
        self.stop().await;
        Ok(())
    }
}
