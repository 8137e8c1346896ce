// Copyright (c) 2025 SOLARE S.R.O.
//
// This file is part of FluxION.
//
// Licensed under the Creative Commons Attribution-NonCommercial-NoDerivatives 4.0 International
// (CC BY-NC-ND 4.0). You may use and share this file for non-commercial purposes only and you may not
// create derivatives. See <https://creativecommons.org/licenses/by-nc-nd/4.0/>.
//
// This software is provided "AS IS", without warranty of any kind.
//
// For commercial licensing, please contact: info@solare.cz

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use fluxion_fleet_core::{LivenessOracle, TelemetryLog, TreeStore};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const SECS_PER_DAY: i64 = 86_400;

/// Flip optimizers flagged online whose telemetry fell out of the window.
///
/// Returns the ids marked offline.
pub async fn sweep_offline(
    store: &dyn TreeStore,
    oracle: &LivenessOracle,
    now: i64,
) -> Result<Vec<String>> {
    let mut offline = Vec::new();
    for id in store.online_optimizers().await? {
        if oracle.is_live(&id, now).await? {
            continue;
        }
        store.set_online(&id, false).await?;
        warn!(optimizer = %id, "Optimizer marked offline: no telemetry within window");
        offline.push(id);
    }
    Ok(offline)
}

pub fn spawn_monitor(
    store: Arc<dyn TreeStore>,
    oracle: LivenessOracle,
    sweep_interval_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sweep_interval_secs));
        info!(
            sweep_interval_secs,
            window_secs = oracle.window_secs(),
            "Liveness monitor started"
        );

        loop {
            interval.tick().await;
            match sweep_offline(store.as_ref(), &oracle, Utc::now().timestamp()).await {
                Ok(offline) if !offline.is_empty() => {
                    info!(count = offline.len(), "Liveness sweep marked optimizers offline");
                }
                Err(e) => error!(error = %e, "Liveness sweep failed"),
                Ok(_) => {}
            }
        }
    })
}

/// Delete telemetry older than the retention period once a day
pub fn spawn_retention(telemetry: Arc<dyn TelemetryLog>, retention_days: u32) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(86_400));
        loop {
            interval.tick().await;
            let cutoff = Utc::now().timestamp() - i64::from(retention_days) * SECS_PER_DAY;
            match telemetry.prune_before(cutoff).await {
                Ok(deleted) if deleted > 0 => {
                    info!(deleted, "Cleaned up old telemetry records");
                }
                Err(e) => error!(error = %e, "Failed to clean up old telemetry"),
                Ok(_) => {}
            }
        }
    })
}
