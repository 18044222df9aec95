mod command_log;

use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::core::error::{SwitchboardError, SwitchboardResult};
use crate::core::store::{PersistenceGateway, Server, ServerPatch};
use crate::core::transport::Transport;
pub use command_log::{CommandLogBook, CommandLogEntry};

/// Runtime half of a connected server. Never persisted.
#[derive(Debug, Clone)]
pub struct Connection {
    pub connection_id: String,
    pub last_error: Option<String>,
    pub retry_count: u32,
}

#[derive(Debug, Default)]
pub struct ConnectionSlot {
    connection: Option<Connection>,
}

impl ConnectionSlot {
    pub fn connection_mut(&mut self) -> Option<&mut Connection> {
        self.connection.as_mut()
    }
}

/// Exclusive hold on one server's entry. Everything that mutates a server's
/// live status does so while holding this.
pub type SlotGuard = OwnedMutexGuard<ConnectionSlot>;

fn session_token(slot: &ConnectionSlot, server: &Server) -> Option<String> {
    slot.connection
        .as_ref()
        .map(|c| c.connection_id.clone())
        .or_else(|| server.connection_id.clone())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectOutcome {
    pub message: String,
    pub connection_id: String,
    pub already_connected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisconnectOutcome {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCounter {
    Connection,
    Command,
}

pub struct ConnectionRegistry {
    store: Arc<dyn PersistenceGateway>,
    transport: Arc<dyn Transport>,
    slots: Mutex<HashMap<i64, Arc<Mutex<ConnectionSlot>>>>,
    logs: CommandLogBook,
}

impl ConnectionRegistry {
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        transport: Arc<dyn Transport>,
        log_capacity: usize,
    ) -> Self {
        Self {
            store,
            transport,
            slots: Mutex::new(HashMap::new()),
            logs: CommandLogBook::new(log_capacity),
        }
    }

    pub fn store(&self) -> &Arc<dyn PersistenceGateway> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Waits for exclusive access to `server_id`'s entry.
    pub async fn lock(&self, server_id: i64) -> SlotGuard {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(server_id).or_default().clone()
        };
        slot.lock_owned().await
    }

    pub async fn load_server(&self, server_id: i64) -> SwitchboardResult<Server> {
        self.store
            .get_server(server_id)
            .await?
            .ok_or_else(|| SwitchboardError::server_not_found(server_id))
    }

    pub async fn is_connected(&self, server_id: i64) -> SwitchboardResult<bool> {
        Ok(self.load_server(server_id).await?.connected)
    }

    pub async fn connect(&self, server_id: i64) -> SwitchboardResult<ConnectOutcome> {
        let mut slot = self.lock(server_id).await;
        self.connect_locked(&mut slot, server_id).await
    }

    pub async fn disconnect(
        &self,
        server_id: i64,
        force: bool,
    ) -> SwitchboardResult<DisconnectOutcome> {
        let mut slot = self.lock(server_id).await;
        self.disconnect_locked(&mut slot, server_id, force).await
    }

    pub async fn connect_locked(
        &self,
        slot: &mut SlotGuard,
        server_id: i64,
    ) -> SwitchboardResult<ConnectOutcome> {
        let server = self.load_server(server_id).await?;

        if server.connected
            && let Some(existing) = server.connection_id.clone()
        {
            if slot.connection.is_none() {
                slot.connection = Some(Connection {
                    connection_id: existing.clone(),
                    last_error: None,
                    retry_count: 0,
                });
            }
            return Ok(ConnectOutcome {
                message: format!("Already connected to {}", server.name),
                connection_id: existing,
                already_connected: true,
            });
        }

        let connection_id = match self.transport.open(&server).await {
            Ok(token) => token,
            Err(e) => {
                let reason = e.to_string();
                warn!(server_id, "Connection to {} failed: {}", server.name, reason);
                self.record_error(&server, ErrorCounter::Connection, &reason)
                    .await?;
                self.logs
                    .append(server_id, CommandLogEntry::new("connect", &reason, false))
                    .await;
                return Err(SwitchboardError::ConnectionFailure(format!(
                    "Connection failed: {reason}"
                )));
            }
        };

        let patch = ServerPatch::connected(&connection_id, Utc::now());
        if let Err(e) = self.store.update_server(server_id, &patch).await {
            if let Err(close_err) = self.transport.close(&server, &connection_id).await {
                warn!(
                    server_id,
                    connection_id = %connection_id,
                    "Could not close session to {} after a failed status write: {}",
                    server.name,
                    close_err
                );
            }
            return Err(e.into());
        }

        slot.connection = Some(Connection {
            connection_id: connection_id.clone(),
            last_error: None,
            retry_count: 0,
        });

        let message = format!("Connected to {}", server.name);
        self.logs
            .append(server_id, CommandLogEntry::new("connect", &message, true))
            .await;
        info!(server_id, "{}", message);

        Ok(ConnectOutcome {
            message,
            connection_id,
            already_connected: false,
        })
    }

    pub async fn disconnect_locked(
        &self,
        slot: &mut SlotGuard,
        server_id: i64,
        force: bool,
    ) -> SwitchboardResult<DisconnectOutcome> {
        let server = self.load_server(server_id).await?;

        if !server.connected && !force {
            return Ok(DisconnectOutcome {
                message: format!("Already disconnected from {}", server.name),
                warning: None,
            });
        }

        let previous = slot.connection.take();
        let token = previous
            .as_ref()
            .map(|c| c.connection_id.clone())
            .or_else(|| server.connection_id.clone());

        let closed = match &token {
            Some(token) => self.transport.close(&server, token).await,
            None => Ok(()),
        };

        match closed {
            Ok(()) => {
                self.store
                    .update_server(server_id, &ServerPatch::disconnected())
                    .await?;
                let message = format!("Disconnected from {}", server.name);
                self.logs
                    .append(server_id, CommandLogEntry::new("disconnect", &message, true))
                    .await;
                info!(server_id, "{}", message);
                Ok(DisconnectOutcome {
                    message,
                    warning: None,
                })
            }
            Err(e) if force => {
                let reason = e.to_string();
                self.store
                    .update_server(
                        server_id,
                        &ServerPatch {
                            last_error: Some(Some(reason.clone())),
                            ..ServerPatch::disconnected()
                        },
                    )
                    .await?;
                let message = format!(
                    "Force disconnected from {} (with errors: {})",
                    server.name, reason
                );
                self.logs
                    .append(server_id, CommandLogEntry::new("disconnect", &message, true))
                    .await;
                warn!(server_id, "{}", message);
                Ok(DisconnectOutcome {
                    message,
                    warning: Some(reason),
                })
            }
            Err(e) => {
                let reason = e.to_string();
                slot.connection = previous.map(|mut c| {
                    c.last_error = Some(reason.clone());
                    c
                });
                self.store
                    .update_server(
                        server_id,
                        &ServerPatch {
                            last_error: Some(Some(reason.clone())),
                            ..ServerPatch::default()
                        },
                    )
                    .await?;
                self.logs
                    .append(server_id, CommandLogEntry::new("disconnect", &reason, false))
                    .await;
                Err(SwitchboardError::ConnectionFailure(format!(
                    "Disconnection failed: {reason}"
                )))
            }
        }
    }

    /// Resolves a live session for `server_id`, connecting first when allowed.
    pub async fn ensure_connected_locked(
        &self,
        slot: &mut SlotGuard,
        server_id: i64,
        auto_reconnect: bool,
    ) -> SwitchboardResult<(Server, String)> {
        let server = self.load_server(server_id).await?;
        if server.connected
            && let Some(token) = session_token(slot, &server)
        {
            return Ok((server, token));
        }
        if !auto_reconnect {
            return Err(SwitchboardError::not_connected());
        }

        let outcome = self
            .connect_locked(slot, server_id)
            .await
            .map_err(|e| match e {
                SwitchboardError::ConnectionFailure(reason) => SwitchboardError::ConnectionFailure(
                    format!("Server is not connected and auto-reconnect failed: {reason}"),
                ),
                other => other,
            })?;
        let server = self.load_server(server_id).await?;
        Ok((server, outcome.connection_id))
    }

    /// The single forced disconnect and reconnect that precedes a retry.
    pub async fn reconnect_locked(
        &self,
        slot: &mut SlotGuard,
        server_id: i64,
    ) -> SwitchboardResult<(Server, String)> {
        self.disconnect_locked(slot, server_id, true).await?;
        let outcome = self.connect_locked(slot, server_id).await?;
        if let Some(connection) = slot.connection_mut() {
            connection.retry_count += 1;
        }
        let server = self.load_server(server_id).await?;
        Ok((server, outcome.connection_id))
    }

    /// Bumps the matching counter and records `message` as the server's last error.
    pub async fn record_error(
        &self,
        server: &Server,
        counter: ErrorCounter,
        message: &str,
    ) -> SwitchboardResult<()> {
        let current = self.load_server(server.id).await.unwrap_or_else(|_| server.clone());
        let mut patch = ServerPatch {
            last_error: Some(Some(message.to_string())),
            ..ServerPatch::default()
        };
        match counter {
            ErrorCounter::Connection => {
                patch.connection_error_count = Some(current.connection_error_count + 1)
            }
            ErrorCounter::Command => {
                patch.command_error_count = Some(current.command_error_count + 1)
            }
        }
        self.store.update_server(server.id, &patch).await?;
        Ok(())
    }

    pub async fn reset_command_errors(&self, server_id: i64) -> SwitchboardResult<()> {
        self.store
            .update_server(
                server_id,
                &ServerPatch {
                    command_error_count: Some(0),
                    ..ServerPatch::default()
                },
            )
            .await?;
        Ok(())
    }

    pub async fn append_log(&self, server_id: i64, entry: CommandLogEntry) {
        self.logs.append(server_id, entry).await;
    }

    pub async fn logs(&self, server_id: i64) -> Vec<CommandLogEntry> {
        self.logs.entries(server_id).await
    }

    /// Drops the runtime entry and history of a server that no longer exists.
    pub async fn forget(&self, server_id: i64) {
        self.slots.lock().await.remove(&server_id);
        self.logs.forget(server_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::{NewServer, SqliteStore};
    use crate::core::transport::SimulatedTransport;

    async fn registry_with_server() -> (ConnectionRegistry, i64) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let server = store
            .create_server(&NewServer {
                name: "db1".into(),
                host: "10.0.0.1".into(),
                port: 5432,
                server_type: "database".into(),
                api_key: None,
            })
            .await
            .unwrap();
        let registry = ConnectionRegistry::new(store, Arc::new(SimulatedTransport::new()), 100);
        (registry, server.id)
    }

    #[tokio::test]
    async fn connect_then_disconnect_keeps_flag_and_token_paired() {
        let (registry, id) = registry_with_server().await;

        let outcome = registry.connect(id).await.unwrap();
        let server = registry.load_server(id).await.unwrap();
        assert!(server.connected);
        assert_eq!(server.connection_id.as_deref(), Some(outcome.connection_id.as_str()));
        assert!(server.last_connected.is_some());

        let outcome = registry.disconnect(id, false).await.unwrap();
        assert_eq!(outcome.message, "Disconnected from db1");
        let server = registry.load_server(id).await.unwrap();
        assert!(!server.connected);
        assert!(server.connection_id.is_none());
    }

    #[tokio::test]
    async fn disconnect_when_already_disconnected_is_a_noop() {
        let (registry, id) = registry_with_server().await;
        let outcome = registry.disconnect(id, false).await.unwrap();
        assert_eq!(outcome.message, "Already disconnected from db1");
        assert!(registry.logs(id).await.is_empty());
    }

    #[tokio::test]
    async fn forced_disconnect_of_idle_server_still_logs() {
        let (registry, id) = registry_with_server().await;
        let outcome = registry.disconnect(id, true).await.unwrap();
        assert_eq!(outcome.message, "Disconnected from db1");
        assert_eq!(registry.logs(id).await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_server_is_not_found() {
        let (registry, _) = registry_with_server().await;
        let err = registry.connect(404).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::NotFound { id: 404, .. }));
        let err = registry.disconnect(404, true).await.unwrap_err();
        assert!(matches!(err, SwitchboardError::NotFound { .. }));
    }

    #[tokio::test]
    async fn connect_and_disconnect_are_logged() {
        let (registry, id) = registry_with_server().await;
        registry.connect(id).await.unwrap();
        registry.disconnect(id, false).await.unwrap();
        let commands: Vec<String> = registry
            .logs(id)
            .await
            .into_iter()
            .map(|e| e.command)
            .collect();
        assert_eq!(commands, vec!["connect", "disconnect"]);
    }
}
