use futures_util::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{InboundMessage, OutboundEvent, ServerSummary};
use crate::core::dispatcher::CommandResult;
use crate::core::fleet::Fleet;

/// What the transport adapter hands the session loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    Text(String),
    Closed,
}

struct ActiveClient {
    session: u64,
    evicted: CancellationToken,
}

/// Active live clients by id. A reconnecting id evicts the older session.
#[derive(Default)]
pub struct ClientRegistry {
    clients: Mutex<HashMap<String, ActiveClient>>,
    next_session: AtomicU64,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn register(&self, client_id: &str) -> (u64, CancellationToken) {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        let evicted = CancellationToken::new();
        let previous = self.clients.lock().await.insert(
            client_id.to_string(),
            ActiveClient {
                session,
                evicted: evicted.clone(),
            },
        );
        if let Some(previous) = previous {
            info!(client_id, "Live client reconnected; closing the older session");
            previous.evicted.cancel();
        }
        (session, evicted)
    }

    /// Removes the entry only if it still belongs to `session`.
    async fn release(&self, client_id: &str, session: u64) {
        let mut clients = self.clients.lock().await;
        if clients.get(client_id).is_some_and(|c| c.session == session) {
            clients.remove(client_id);
        }
    }

    pub async fn count(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn contains(&self, client_id: &str) -> bool {
        self.clients.lock().await.contains_key(client_id)
    }
}

pub async fn server_list(fleet: &Fleet) -> OutboundEvent {
    let servers = match fleet.list_servers(0, None).await {
        Ok(servers) => servers.iter().map(ServerSummary::from).collect(),
        Err(e) => {
            warn!("Failed to list servers for live client: {}", e);
            Vec::new()
        }
    };
    OutboundEvent::ServerList { servers }
}

async fn connected_after(fleet: &Fleet, server_id: i64) -> bool {
    fleet.registry.is_connected(server_id).await.unwrap_or(false)
}

/// Runs one control message and produces its single reply.
pub async fn handle_message(fleet: &Fleet, message: InboundMessage) -> OutboundEvent {
    match message {
        InboundMessage::ConnectServer { server_id } => {
            let message = match fleet.registry.connect(server_id).await {
                Ok(outcome) => outcome.message,
                Err(e) => e.to_string(),
            };
            OutboundEvent::ServerStatusUpdate {
                server_id,
                status: connected_after(fleet, server_id).await,
                message,
            }
        }
        InboundMessage::DisconnectServer { server_id, force } => {
            let message = match fleet.registry.disconnect(server_id, force).await {
                Ok(outcome) => outcome.message,
                Err(e) => e.to_string(),
            };
            OutboundEvent::ServerStatusUpdate {
                server_id,
                status: connected_after(fleet, server_id).await,
                message,
            }
        }
        InboundMessage::ExecuteCommand { server_id, command } => {
            let result = CommandResult::from(fleet.dispatcher.execute(server_id, &command, true).await);
            OutboundEvent::CommandResult {
                server_id,
                success: result.success,
                message: result.message,
                output: result.output.unwrap_or_default(),
            }
        }
        InboundMessage::GetServerList => server_list(fleet).await,
    }
}

/// Pushes a metrics event for every connected server once per `period`, first
/// one `period` after the client opened, until cancelled. Cancellation also
/// interrupts a sample or a send to a client that has stopped reading.
async fn metrics_loop(
    fleet: Fleet,
    outbound: mpsc::Sender<OutboundEvent>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        let servers = match fleet.connected_servers().await {
            Ok(servers) => servers,
            Err(e) => {
                warn!("Metrics loop could not list servers: {}", e);
                continue;
            }
        };

        for server in servers {
            let sampled = tokio::select! {
                _ = cancel.cancelled() => return,
                sampled = fleet.sampler.sample_if_connected(server.id) => sampled,
            };
            match sampled {
                Ok(Some(outcome)) => {
                    let event = OutboundEvent::ServerMetrics {
                        server_id: server.id,
                        metrics: outcome.metrics,
                    };
                    if !send_or_cancel(&outbound, event, &cancel).await {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!(server_id = server.id, "Skipping metrics: {}", e),
            }
        }
    }
}

/// False when the channel is closed or `cancel` fires before there is room.
async fn send_or_cancel(
    outbound: &mpsc::Sender<OutboundEvent>,
    event: OutboundEvent,
    cancel: &CancellationToken,
) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        sent = outbound.send(event) => sent.is_ok(),
    }
}

/// Drives one live client from open to teardown. All outbound traffic goes
/// through `outbound`, whose single consumer owns the socket.
pub async fn run_client_session<S>(
    fleet: Fleet,
    clients: Arc<ClientRegistry>,
    client_id: String,
    mut inbound: S,
    outbound: mpsc::Sender<OutboundEvent>,
    metrics_interval: Duration,
) where
    S: Stream<Item = ClientFrame> + Send + Unpin,
{
    let (session, evicted) = clients.register(&client_id).await;
    info!(client_id = %client_id, "Live client connected");

    if !send_or_cancel(&outbound, server_list(&fleet).await, &evicted).await {
        clients.release(&client_id, session).await;
        return;
    }

    let cancel = CancellationToken::new();
    let metrics = tokio::spawn(metrics_loop(
        fleet.clone(),
        outbound.clone(),
        metrics_interval,
        cancel.clone(),
    ));

    loop {
        let frame = tokio::select! {
            _ = evicted.cancelled() => break,
            frame = inbound.next() => frame,
        };
        let text = match frame {
            Some(ClientFrame::Text(text)) => text,
            Some(ClientFrame::Closed) | None => break,
        };
        let message = match serde_json::from_str::<InboundMessage>(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!(client_id = %client_id, "Malformed live message, closing client: {}", e);
                break;
            }
        };
        let reply = handle_message(&fleet, message).await;
        if !send_or_cancel(&outbound, reply, &evicted).await {
            break;
        }
    }

    cancel.cancel();
    if let Err(e) = metrics.await {
        warn!(client_id = %client_id, "Metrics loop ended abnormally: {}", e);
    }
    clients.release(&client_id, session).await;
    info!(client_id = %client_id, "Live client disconnected");
}
