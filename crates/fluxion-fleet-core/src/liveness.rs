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

//! Liveness Oracle.
//!
//! A device is live when it reported telemetry within the trailing window.
//! Timestamps are integer unix seconds and compare numerically. Queries that
//! outlast the command deadline fail with `Timeout`.

use futures_util::future::try_join_all;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::Result;
use crate::fanout::within;
use crate::traits::TelemetryLog;

#[derive(Clone)]
pub struct LivenessOracle {
    telemetry: Arc<dyn TelemetryLog>,
    window_secs: i64,
    deadline: Duration,
}

impl std::fmt::Debug for LivenessOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessOracle")
            .field("telemetry", &self.telemetry.name())
            .field("window_secs", &self.window_secs)
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl LivenessOracle {
    pub fn new(telemetry: Arc<dyn TelemetryLog>, window_secs: u64, deadline: Duration) -> Self {
        Self {
            telemetry,
            window_secs: i64::try_from(window_secs).unwrap_or(i64::MAX),
            deadline,
        }
    }

    pub fn window_secs(&self) -> i64 {
        self.window_secs
    }

    /// Whether `device_id` reported within the configured window ending at `now`
    pub async fn is_live(&self, device_id: &str, now: i64) -> Result<bool> {
        self.is_live_within(device_id, now, self.window_secs).await
    }

    /// Whether `device_id` has a record in `[now - window, now]`
    pub async fn is_live_within(&self, device_id: &str, now: i64, window: i64) -> Result<bool> {
        let expires_at = Instant::now() + self.deadline;
        within(expires_at, self.deadline, self.query(device_id, now, window)).await
    }

    async fn query(&self, device_id: &str, now: i64, window: i64) -> Result<bool> {
        let from = now.saturating_sub(window);
        Ok(self.telemetry.has_record_between(device_id, from, now).await?)
    }

    /// Subset of `devices` that are live at `now`, all checked under one deadline
    pub async fn live_subset(&self, devices: &BTreeSet<String>, now: i64) -> Result<BTreeSet<String>> {
        let expires_at = Instant::now() + self.deadline;
        let checks = within(
            expires_at,
            self.deadline,
            try_join_all(devices.iter().map(|id| async move {
                self.query(id, now, self.window_secs)
                    .await
                    .map(|live| (id, live))
            })),
        )
        .await?;

        Ok(checks
            .into_iter()
            .filter(|(_, live)| *live)
            .map(|(id, _)| id.clone())
            .collect())
    }
}
