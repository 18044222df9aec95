mod error;
mod handlers;
mod router;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::core::fleet::Fleet;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::settings::Settings;
use crate::interfaces::live::ClientRegistry;

pub(crate) use router::build_api_router;

/// How long open connections get to finish once shutdown starts.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) fleet: Fleet,
    pub(crate) clients: Arc<ClientRegistry>,
    pub(crate) log_tx: broadcast::Sender<String>,
    pub(crate) settings: Arc<Settings>,
}

impl AppState {
    pub(crate) fn new(fleet: Fleet, log_tx: broadcast::Sender<String>, settings: Settings) -> Self {
        Self {
            fleet,
            clients: Arc::new(ClientRegistry::new()),
            log_tx,
            settings: Arc::new(settings),
        }
    }
}

/// HTTP + live-channel listener, run as a lifecycle component.
pub struct ApiServer {
    state: AppState,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl ApiServer {
    pub(crate) fn new(state: AppState) -> Self {
        Self {
            state,
            shutdown: CancellationToken::new(),
            handle: None,
            local_addr: None,
        }
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

async fn sse_logs_endpoint(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("Log stream lagged")),
    });

    Sse::new(stream)
}

#[async_trait]
impl LifecycleComponent for ApiServer {
    async fn on_init(&mut self) -> Result<()> {
        info!("API Server Interface initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        let addr = self.state.settings.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("binding API server to {addr}"))?;
        self.local_addr = listener.local_addr().ok();

        let app = build_api_router(self.state.clone());
        let shutdown = self.shutdown.clone();
        info!("API Server running at http://{addr}");

        self.handle = Some(tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await;
            if let Err(e) = served {
                tracing::error!("API Server crashed: {}", e);
            }
        }));
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("API Server Interface shutting down...");
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take()
            && tokio::time::timeout(SHUTDOWN_GRACE, handle).await.is_err()
        {
            tracing::warn!("API Server did not drain within {:?}", SHUTDOWN_GRACE);
        }
        Ok(())
    }
}
