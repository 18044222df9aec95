use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::error::{SwitchboardError, SwitchboardResult};
use crate::core::registry::{ConnectionRegistry, ErrorCounter, SlotGuard};
use crate::core::store::{MetricsSnapshot, Server, ServerPatch};

/// Centre and spread for one metric.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    pub centre: f64,
    pub spread: f64,
}

const fn baseline(centre: f64, spread: f64) -> Baseline {
    Baseline { centre, spread }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsProfile {
    pub cpu: Baseline,
    pub memory: Baseline,
    pub disk: Baseline,
    pub network_in: Baseline,
    pub network_out: Baseline,
}

impl MetricsProfile {
    pub const DATABASE: MetricsProfile = MetricsProfile {
        cpu: baseline(35.5, 8.0),
        memory: baseline(1024.3, 100.0),
        disk: baseline(2048.7, 200.0),
        network_in: baseline(128.2, 20.0),
        network_out: baseline(64.9, 10.0),
    };

    pub const WEB: MetricsProfile = MetricsProfile {
        cpu: baseline(25.5, 5.0),
        memory: baseline(512.3, 50.0),
        disk: baseline(1024.7, 100.0),
        network_in: baseline(512.2, 50.0),
        network_out: baseline(256.9, 25.0),
    };

    pub const DEFAULT: MetricsProfile = MetricsProfile {
        cpu: baseline(25.5, 5.0),
        memory: baseline(512.3, 50.0),
        disk: baseline(1024.7, 100.0),
        network_in: baseline(256.2, 25.0),
        network_out: baseline(128.9, 12.0),
    };

    /// Picks a profile by substring of the server's type tag.
    pub fn for_type(server_type: &str) -> MetricsProfile {
        let tag = server_type.to_lowercase();
        if tag.contains("database") {
            Self::DATABASE
        } else if tag.contains("web") {
            Self::WEB
        } else {
            Self::DEFAULT
        }
    }
}

fn jitter<R: Rng>(rng: &mut R, b: Baseline) -> f64 {
    b.centre + rng.gen_range(-b.spread..=b.spread)
}

/// Builds a bounded snapshot for `server`: cpu in [0, 100], everything else non-negative.
pub fn synthesize<R: Rng>(rng: &mut R, server: &Server, reconnected: bool) -> MetricsSnapshot {
    let profile = MetricsProfile::for_type(&server.server_type);
    let now = Utc::now();
    let uptime = server
        .last_connected
        .map(|since| (now - since).num_seconds().max(0))
        .unwrap_or(0);

    MetricsSnapshot {
        cpu_usage: jitter(rng, profile.cpu).clamp(0.0, 100.0),
        memory_usage: jitter(rng, profile.memory).max(0.0),
        disk_usage: jitter(rng, profile.disk).max(0.0),
        network_in: jitter(rng, profile.network_in).max(0.0),
        network_out: jitter(rng, profile.network_out).max(0.0),
        uptime,
        connections: rng.gen_range(5..=50),
        processes: rng.gen_range(3..=15),
        timestamp: now.timestamp(),
        reconnected,
    }
}

fn snapshot_for(server: &Server, reconnected: bool) -> MetricsSnapshot {
    let mut rng = rand::thread_rng();
    synthesize(&mut rng, server, reconnected)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsOutcome {
    pub metrics: MetricsSnapshot,
    pub reconnected: bool,
    pub recovered_error: Option<String>,
}

pub struct MetricsSampler {
    registry: Arc<ConnectionRegistry>,
}

impl MetricsSampler {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Samples one server and stores the snapshot as its `last_metrics`.
    /// A failed probe is retried once after a forced reconnect.
    pub async fn sample(
        &self,
        server_id: i64,
        auto_reconnect: bool,
    ) -> SwitchboardResult<MetricsOutcome> {
        let mut slot = self.registry.lock(server_id).await;
        let (server, token) = self
            .registry
            .ensure_connected_locked(&mut slot, server_id, auto_reconnect)
            .await?;
        self.probe_and_record(&mut slot, server, token, auto_reconnect)
            .await
    }

    /// Periodic variant: skips servers that went idle since the caller listed
    /// them instead of reconnecting them behind the user's back.
    pub async fn sample_if_connected(
        &self,
        server_id: i64,
    ) -> SwitchboardResult<Option<MetricsOutcome>> {
        let mut slot = self.registry.lock(server_id).await;
        let (server, token) = match self
            .registry
            .ensure_connected_locked(&mut slot, server_id, false)
            .await
        {
            Ok(session) => session,
            Err(SwitchboardError::InvalidState(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        self.probe_and_record(&mut slot, server, token, true)
            .await
            .map(Some)
    }

    async fn probe_and_record(
        &self,
        slot: &mut SlotGuard,
        server: Server,
        token: String,
        auto_reconnect: bool,
    ) -> SwitchboardResult<MetricsOutcome> {
        let registry = &self.registry;
        let server_id = server.id;

        let first_error = match registry.transport().probe(&server, &token).await {
            Ok(()) => {
                let metrics = snapshot_for(&server, false);
                self.persist(server_id, &metrics).await?;
                debug!(server_id, "Sampled metrics for {}", server.name);
                return Ok(MetricsOutcome {
                    metrics,
                    reconnected: false,
                    recovered_error: None,
                });
            }
            Err(e) => SwitchboardError::from(e),
        };

        let reason = first_error.to_string();
        warn!(server_id, "Metrics probe failed on {}: {}", server.name, reason);
        registry
            .record_error(&server, ErrorCounter::Connection, &reason)
            .await?;

        if !auto_reconnect {
            return Err(SwitchboardError::ConnectionFailure(format!(
                "Failed to get metrics: {reason}"
            )));
        }

        let (server, token) = registry
            .reconnect_locked(slot, server_id)
            .await
            .map_err(|e| {
                SwitchboardError::ConnectionFailure(format!(
                    "Failed to get metrics and reconnection failed: {e}"
                ))
            })?;

        match registry.transport().probe(&server, &token).await {
            Ok(()) => {
                let metrics = snapshot_for(&server, true);
                self.persist(server_id, &metrics).await?;
                Ok(MetricsOutcome {
                    metrics,
                    reconnected: true,
                    recovered_error: Some(reason),
                })
            }
            Err(e) => {
                let retry_reason = e.to_string();
                registry
                    .record_error(&server, ErrorCounter::Connection, &retry_reason)
                    .await?;
                Err(SwitchboardError::ConnectionFailure(format!(
                    "Failed to get metrics after reconnection: {retry_reason} (first attempt: {reason})"
                )))
            }
        }
    }

    async fn persist(&self, server_id: i64, metrics: &MetricsSnapshot) -> SwitchboardResult<()> {
        let patch = ServerPatch {
            last_metrics: Some(Some(metrics.clone())),
            ..ServerPatch::default()
        };
        self.registry.store().update_server(server_id, &patch).await?;
        Ok(())
    }
}
