use anyhow::Result;

use crate::core::fleet_config::{FleetConfig, sync_fleet};
use crate::core::settings::Settings;
use crate::core::store::SqliteStore;
use crate::core::terminal::{print_status, print_success};

pub async fn run_sync(settings: &Settings) -> Result<()> {
    let config_path = settings.fleet_config_path();
    let store = SqliteStore::open(settings.database_path()).await?;
    let config = FleetConfig::load(&config_path).await?;
    let report = sync_fleet(&store, &config).await?;

    print_status("Config", &config_path.display().to_string());
    print_status("Created", &report.created.to_string());
    print_status("Updated", &report.updated.to_string());
    print_success("Fleet config synchronised.");
    Ok(())
}
