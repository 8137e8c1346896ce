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

//! Telemetry ingest.
//!
//! A gateway's periodic report refreshes the online flags of its optimizers
//! and appends the liveness records the gate relies on. The gateway's own
//! meter readings are logged alongside.

use fluxion_fleet_types::{GatewayLogRecord, GatewayReport, NodeRef, TelemetryRecord};
use futures_util::future::try_join_all;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{FleetError, Result};
use crate::traits::{TelemetryLog, TreeStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub gateway_id: String,
    pub timestamp: i64,
    pub online: Vec<String>,
    pub offline: Vec<String>,
    /// Reported ids that are not assigned to this gateway
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown: Vec<String>,
}

#[derive(Clone)]
pub struct TelemetryIngest {
    store: Arc<dyn TreeStore>,
    telemetry: Arc<dyn TelemetryLog>,
}

impl std::fmt::Debug for TelemetryIngest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryIngest")
            .field("store", &self.store.name())
            .field("telemetry", &self.telemetry.name())
            .finish()
    }
}

impl TelemetryIngest {
    pub fn new(store: Arc<dyn TreeStore>, telemetry: Arc<dyn TelemetryLog>) -> Self {
        Self { store, telemetry }
    }

    /// Apply one gateway report.
    ///
    /// Assigned optimizers missing from the report are marked offline and get
    /// no record; ids not assigned to the gateway are skipped.
    pub async fn ingest(&self, report: &GatewayReport) -> Result<IngestSummary> {
        let node = NodeRef::gateway(report.gateway_id.trim());
        let assigned: BTreeSet<String> = self
            .store
            .children(&node)
            .await?
            .ok_or_else(|| FleetError::not_found(&node))?
            .into_iter()
            .collect();

        let mut records = Vec::new();
        let mut reported = BTreeSet::new();
        let mut unknown = Vec::new();
        for reading in &report.optimizers {
            let record = TelemetryRecord::from_reading(&node.id, report.timestamp, reading);
            if !assigned.contains(&record.device_id) {
                warn!(
                    gateway = %node.id,
                    optimizer = %record.device_id,
                    "Reported optimizer is not assigned to this gateway"
                );
                unknown.push(record.device_id);
                continue;
            }
            if reported.insert(record.device_id.clone()) {
                records.push(record);
            }
        }

        try_join_all(assigned.iter().map(|id| {
            let online = reported.contains(id);
            async move { self.store.set_online(id, online).await }
        }))
        .await?;
        self.telemetry.append(&records).await?;
        self.telemetry
            .append_gateway_log(&GatewayLogRecord::from_report(&node.id, report))
            .await?;

        let offline: Vec<String> = assigned.difference(&reported).cloned().collect();
        debug!(
            gateway = %node.id,
            timestamp = report.timestamp,
            online = reported.len(),
            offline = offline.len(),
            "Telemetry report ingested"
        );

        Ok(IngestSummary {
            gateway_id: node.id,
            timestamp: report.timestamp,
            online: reported.into_iter().collect(),
            offline,
            unknown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryFleet;
    use fluxion_fleet_types::{Gateway, Optimizer};

    fn report(json: serde_json::Value) -> GatewayReport {
        serde_json::from_value(json).unwrap()
    }

    fn fleet() -> Arc<InMemoryFleet> {
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.add_gateway(Gateway::new("gw-1", "loc-1"));
        for id in ["opt-1", "opt-2", "opt-3"] {
            let mut optimizer = Optimizer::new(id, "gw-1");
            optimizer.online = true;
            fleet.add_optimizer(optimizer);
        }
        fleet
    }

    #[tokio::test]
    async fn test_report_refreshes_online_flags() {
        let fleet = fleet();
        let ingest = TelemetryIngest::new(fleet.clone(), fleet.clone());

        let summary = ingest
            .ingest(&report(serde_json::json!({
                "GatewayID": "gw-1",
                "TimeStamp": "1700000000",
                "Phases": {},
                "KVAH": "nan",
                "KWH": 1.5,
                "PF": 0.9,
                "OptimizerDetails": [
                    {"OptimizerID": "opt-1", "RoomTemperature": 24.5, "Humidity": 40,
                     "CoilTemperature": 12, "OptimizerMode": "OPTIMIZATION"},
                    {"OptimizerID": "opt-3 ", "RoomTemperature": 25, "Humidity": 41,
                     "CoilTemperature": 11, "OptimizerMode": "NO_OPTIMIZATION"},
                    {"OptimizerID": "opt-9", "RoomTemperature": 0, "Humidity": 0,
                     "CoilTemperature": 0, "OptimizerMode": "N/A"}
                ]
            })))
            .await
            .unwrap();

        assert_eq!(summary.online, ["opt-1", "opt-3"]);
        assert_eq!(summary.offline, ["opt-2"]);
        assert_eq!(summary.unknown, ["opt-9"]);
        assert!(!fleet.optimizer_snapshot("opt-2").unwrap().online);
        assert!(fleet.optimizer_snapshot("opt-3").unwrap().online);
        assert_eq!(fleet.telemetry_len(), 2);
        assert!(fleet
            .has_record_between("opt-3", 1_700_000_000, 1_700_000_000)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_meter_readings_logged_with_nan_as_zero() {
        let fleet = fleet();
        let ingest = TelemetryIngest::new(fleet.clone(), fleet.clone());

        ingest
            .ingest(&report(serde_json::json!({
                "GatewayID": " gw-1",
                "TimeStamp": 1_700_000_060,
                "Phases": {
                    "Ph1": {"Voltage": "nan", "Current": "NaN", "ActivePower": 812.5,
                            "PowerFactor": "inf", "ApparentPower": 900}
                },
                "KVAH": "nan",
                "KWH": "12.5",
                "PF": "nan",
                "OptimizerDetails": []
            })))
            .await
            .unwrap();

        let logs = fleet.gateway_logs();
        assert_eq!(logs.len(), 1);
        let log = &logs[0];
        assert_eq!(log.gateway_id, "gw-1");
        assert_eq!(log.timestamp, 1_700_000_060);
        assert_eq!(log.kvah, 0.0);
        assert_eq!(log.kwh, 12.5);
        assert_eq!(log.power_factor, 0.0);
        let phase = &log.phases["Ph1"];
        assert_eq!(phase.voltage, 0.0);
        assert_eq!(phase.current, 0.0);
        assert_eq!(phase.power_factor, 0.0);
        assert_eq!(phase.active_power, 812.5);
        assert_eq!(phase.apparent_power, 900.0);

        // Meter logs age out with the rest of the telemetry
        assert_eq!(fleet.prune_before(1_700_000_061).await.unwrap(), 1);
        assert!(fleet.gateway_logs().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_gateway_is_rejected() {
        let fleet = fleet();
        let ingest = TelemetryIngest::new(fleet.clone(), fleet);
        let err = ingest
            .ingest(&report(serde_json::json!({
                "GatewayID": "gw-404",
                "TimeStamp": 1,
                "Phases": {},
                "KVAH": 0, "KWH": 0, "PF": 0,
                "OptimizerDetails": []
            })))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::NotFound { .. }));
    }
}
