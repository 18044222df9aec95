use anyhow::Result;

use crate::core::settings::Settings;
use crate::core::store::{PersistenceGateway, SqliteStore};
use crate::core::terminal::{print_info, print_server_row};

pub async fn run_list(settings: &Settings) -> Result<()> {
    let store = SqliteStore::open(settings.database_path()).await?;
    let servers = store.list_servers(0, None).await?;

    if servers.is_empty() {
        print_info("No servers registered. Add some to the fleet config and run 'switchboard sync'.");
        return Ok(());
    }
    for server in &servers {
        print_server_row(server);
    }
    Ok(())
}
