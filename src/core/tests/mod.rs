mod connection_lifecycle;
mod live_session;

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::core::fleet::Fleet;
use crate::core::store::{NewServer, PersistenceGateway, Server, SqliteStore};
use crate::core::tasks::TaskRunner;
use crate::core::transport::{Transport, TransportError};

/// Transport double that counts sessions and fails on demand.
#[derive(Default)]
pub(super) struct ScriptedTransport {
    opens: AtomicUsize,
    closes: AtomicUsize,
    failing_opens: AtomicUsize,
    failing_closes: AtomicUsize,
    failing_executes: AtomicUsize,
    failing_probes: AtomicUsize,
    broken_commands: std::sync::Mutex<HashSet<String>>,
    executed: std::sync::Mutex<Vec<String>>,
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl ScriptedTransport {
    pub(super) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub(super) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub(super) fn fail_next_opens(&self, n: usize) {
        self.failing_opens.store(n, Ordering::SeqCst);
    }

    pub(super) fn fail_next_closes(&self, n: usize) {
        self.failing_closes.store(n, Ordering::SeqCst);
    }

    pub(super) fn fail_next_executes(&self, n: usize) {
        self.failing_executes.store(n, Ordering::SeqCst);
    }

    pub(super) fn fail_next_probes(&self, n: usize) {
        self.failing_probes.store(n, Ordering::SeqCst);
    }

    /// `command` fails on every attempt.
    pub(super) fn break_command(&self, command: &str) {
        self.broken_commands
            .lock()
            .unwrap()
            .insert(command.to_string());
    }

    /// Every command that reached `execute`, in call order.
    pub(super) fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, server: &Server) -> Result<String, TransportError> {
        if take_one(&self.failing_opens) {
            return Err(TransportError::Connect(format!(
                "{}:{} refused the connection",
                server.host, server.port
            )));
        }
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("session-{}-{}", server.id, n))
    }

    async fn close(&self, _server: &Server, _connection_id: &str) -> Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_closes) {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn execute(
        &self,
        _server: &Server,
        _connection_id: &str,
        command: &str,
    ) -> Result<String, TransportError> {
        self.executed.lock().unwrap().push(command.to_string());
        if self.broken_commands.lock().unwrap().contains(command) || take_one(&self.failing_executes)
        {
            return Err(TransportError::Command(format!("{command}: broken pipe")));
        }
        Ok(format!("ran {command}"))
    }

    async fn probe(&self, _server: &Server, _connection_id: &str) -> Result<(), TransportError> {
        if take_one(&self.failing_probes) {
            return Err(TransportError::Connect("probe timed out".to_string()));
        }
        Ok(())
    }
}

pub(super) struct Harness {
    pub fleet: Fleet,
    pub runner: TaskRunner,
    pub transport: Arc<ScriptedTransport>,
}

pub(super) fn harness() -> Harness {
    harness_with_queue(64)
}

pub(super) fn harness_with_queue(queue_capacity: usize) -> Harness {
    let store: Arc<dyn PersistenceGateway> =
        Arc::new(SqliteStore::open_in_memory().expect("in-memory store"));
    let transport = Arc::new(ScriptedTransport::default());
    let (fleet, runner) = Fleet::new(store, transport.clone(), 100, queue_capacity);
    Harness {
        fleet,
        runner,
        transport,
    }
}

pub(super) async fn add_server(fleet: &Fleet, name: &str, server_type: &str) -> Server {
    fleet
        .create_server(&NewServer {
            name: name.to_string(),
            host: "10.0.0.1".to_string(),
            port: 5432,
            server_type: server_type.to_string(),
            api_key: None,
        })
        .await
        .expect("create server")
}

/// `connected` and `connection_id` must agree on every record.
pub(super) async fn assert_token_invariant(fleet: &Fleet) {
    for server in fleet.list_servers(0, None).await.expect("list servers") {
        assert_eq!(
            server.connected,
            server.connection_id.is_some(),
            "server {} has connected={} but connection_id={:?}",
            server.name,
            server.connected,
            server.connection_id
        );
    }
}
