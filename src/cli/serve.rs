use anyhow::Result;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tracing::info;

use crate::core::fleet::Fleet;
use crate::core::fleet_config::{FleetConfig, sync_fleet};
use crate::core::lifecycle::LifecycleManager;
use crate::core::settings::Settings;
use crate::core::store::{PersistenceGateway, SqliteStore};
use crate::core::terminal::{print_banner, print_goodbye, print_info, print_link, print_status};
use crate::core::transport::SimulatedTransport;
use crate::interfaces::web::{ApiServer, AppState};
use crate::logging::{self, LOG_CHANNEL_CAPACITY};

pub async fn run_serve(settings: Settings) -> Result<()> {
    let (log_tx, _) = broadcast::channel(LOG_CHANNEL_CAPACITY);
    logging::init(settings.log_level, log_tx.clone());
    print_banner();

    let store = SqliteStore::open(settings.database_path()).await?;

    // Live connection state never survives a restart.
    let reset = store.reset_connection_state().await?;
    if reset > 0 {
        info!("Marked {} server(s) disconnected after restart", reset);
    }

    let config_path = settings.fleet_config_path();
    let config = FleetConfig::load(&config_path).await?;
    sync_fleet(&store, &config).await?;

    let store: Arc<dyn PersistenceGateway> = Arc::new(store);
    let (fleet, runner) = Fleet::new(
        store,
        Arc::new(SimulatedTransport::new()),
        settings.command_log_capacity,
        settings.task_queue_capacity,
    );

    let url = format!("http://{}", settings.bind_addr());
    let state = AppState::new(fleet, log_tx, settings.clone());

    let mut lifecycle = LifecycleManager::new();
    lifecycle.attach(Arc::new(Mutex::new(runner)));
    let api = Arc::new(Mutex::new(ApiServer::new(state)));
    lifecycle.attach(api.clone());
    lifecycle.start().await?;

    let url = match api.lock().await.local_addr() {
        Some(addr) => format!("http://{addr}"),
        None => url,
    };
    print_status("Data", &settings.data_dir.display().to_string());
    print_link("API", &format!("{url}/api"));
    print_link("Live channel", &format!("{}/ws/<client_id>", url.replacen("http", "ws", 1)));
    print_info("Press Ctrl+C to stop.");

    tokio::signal::ctrl_c().await?;
    lifecycle.shutdown().await?;
    print_goodbye();
    Ok(())
}
