use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::core::store::{NewServer, PersistenceGateway, ServerUpdate};

/// On-disk fleet document: `{"servers": [{id?, name, host, port, type, apiKey?}]}`.
#[derive(Debug, Default, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub servers: Vec<FleetEntry>,
}

#[derive(Debug, Deserialize)]
pub struct FleetEntry {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(flatten)]
    pub server: NewServer,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
}

impl FleetConfig {
    /// A missing file is an empty fleet.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Fleet config {:?} not found; nothing to sync", path);
            return Ok(Self::default());
        }
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading fleet config {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing fleet config {}", path.display()))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// One-way reconciliation: each entry updates the record with its id, else the
/// record with its name, else becomes a new record. Nothing is deleted.
pub async fn sync_fleet(store: &dyn PersistenceGateway, config: &FleetConfig) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    for entry in &config.servers {
        let existing = match entry.id {
            Some(id) => match store.get_server(id).await? {
                Some(server) => Some(server),
                None => store.get_server_by_name(&entry.server.name).await?,
            },
            None => store.get_server_by_name(&entry.server.name).await?,
        };

        match existing {
            Some(server) => {
                let patch = ServerUpdate::from(&entry.server).into_patch();
                store
                    .update_server(server.id, &patch)
                    .await
                    .with_context(|| format!("updating server '{}'", entry.server.name))?;
                report.updated += 1;
            }
            None => {
                store
                    .create_server(&entry.server)
                    .await
                    .with_context(|| format!("creating server '{}'", entry.server.name))?;
                report.created += 1;
            }
        }
    }

    info!(
        created = report.created,
        updated = report.updated,
        "Fleet config synchronized"
    );
    Ok(report)
}
