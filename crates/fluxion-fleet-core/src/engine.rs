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

//! Engine facade wiring every component to the injected collaborators.

use chrono::{DateTime, Utc};
use fluxion_fleet_types::{
    Ack, EffectiveStatus, GatewayConfigView, GatewayReport, NodeRef, SettingsAction,
    SettingsPayload,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::aggregator::{AckAggregator, AckReport, Reconciliation};
use crate::dispatcher::{CommandDispatcher, DispatchReport};
use crate::error::{FleetError, Result};
use crate::gate::{Admission, CommandKind, DispatchGate};
use crate::ingest::{IngestSummary, TelemetryIngest};
use crate::liveness::LivenessOracle;
use crate::provisioning::GatewayProvisioning;
use crate::resolver::{HierarchyResolver, Subtree};
use crate::status::StatusReader;
use crate::traits::{DefaultSettingsSource, DeviceTransport, TelemetryLog, TreeStore};

fn default_liveness_window() -> u64 {
    60
}

fn default_command_deadline() -> u64 {
    30
}

/// Engine tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trailing telemetry window that counts a device as live
    #[serde(default = "default_liveness_window")]
    pub liveness_window_secs: u64,

    /// Deadline shared by every item of one fan-out
    #[serde(default = "default_command_deadline")]
    pub command_deadline_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            liveness_window_secs: default_liveness_window(),
            command_deadline_secs: default_command_deadline(),
        }
    }
}

/// What the requested command touched
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub target: NodeRef,
    pub leaves: usize,
    pub report: DispatchReport,
}

pub struct FleetEngine {
    resolver: HierarchyResolver,
    oracle: LivenessOracle,
    gate: DispatchGate,
    dispatcher: CommandDispatcher,
    aggregator: AckAggregator,
    status: StatusReader,
    provisioning: GatewayProvisioning,
    ingest: TelemetryIngest,
    defaults: Arc<dyn DefaultSettingsSource>,
    config: EngineConfig,
}

impl std::fmt::Debug for FleetEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FleetEngine")
            .field("resolver", &self.resolver)
            .field("oracle", &self.oracle)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FleetEngine {
    pub fn new(
        store: Arc<dyn TreeStore>,
        telemetry: Arc<dyn TelemetryLog>,
        transport: Arc<dyn DeviceTransport>,
        defaults: Arc<dyn DefaultSettingsSource>,
        config: EngineConfig,
    ) -> Self {
        let deadline = Duration::from_secs(config.command_deadline_secs);
        let resolver = HierarchyResolver::new(store.clone(), deadline);
        let oracle = LivenessOracle::new(telemetry.clone(), config.liveness_window_secs, deadline);

        info!(
            store = store.name(),
            telemetry = telemetry.name(),
            transport = transport.name(),
            liveness_window_secs = config.liveness_window_secs,
            command_deadline_secs = config.command_deadline_secs,
            "Fleet engine initialized"
        );

        Self {
            gate: DispatchGate::new(resolver.clone(), oracle.clone()),
            dispatcher: CommandDispatcher::new(store.clone(), transport, deadline),
            aggregator: AckAggregator::new(store.clone(), deadline),
            status: StatusReader::new(store.clone()),
            provisioning: GatewayProvisioning::new(store.clone()),
            ingest: TelemetryIngest::new(store, telemetry),
            resolver,
            oracle,
            defaults,
            config,
        }
    }

    pub fn liveness(&self) -> &LivenessOracle {
        &self.oracle
    }

    pub fn provisioning(&self) -> &GatewayProvisioning {
        &self.provisioning
    }

    // ============= Resolution & gating =============

    pub async fn resolve_leaves(&self, target: &NodeRef) -> Result<BTreeSet<String>> {
        self.resolver.resolve_leaves(target).await
    }

    pub async fn resolve_subtree(&self, target: &NodeRef) -> Result<Subtree> {
        self.resolver.resolve_subtree(target).await
    }

    pub async fn admit(&self, target: &NodeRef, kind: CommandKind, now: DateTime<Utc>) -> Result<Admission> {
        self.gate.admit(target, kind, now.timestamp()).await
    }

    // ============= Commands =============

    /// Gate on full liveness, then push `payload` to every leaf under `target`
    pub async fn apply_settings(
        &self,
        target: &NodeRef,
        payload: &SettingsPayload,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome> {
        self.dispatch_settings(target, SettingsAction::Set, payload, now)
            .await
    }

    /// Same as `apply_settings` with the default record, flagged as a reset
    pub async fn reset_settings(&self, target: &NodeRef, now: DateTime<Utc>) -> Result<CommandOutcome> {
        let defaults = self
            .defaults
            .defaults()
            .await?
            .ok_or(FleetError::MissingDefaults)?;
        self.dispatch_settings(target, SettingsAction::Reset, &defaults, now)
            .await
    }

    async fn dispatch_settings(
        &self,
        target: &NodeRef,
        action: SettingsAction,
        payload: &SettingsPayload,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome> {
        let leaves = self
            .admit(target, CommandKind::Settings(action), now)
            .await?
            .into_result()?
            .into_leaves();
        let report = self
            .dispatcher
            .dispatch_settings(&leaves, action, payload)
            .await;
        Ok(CommandOutcome {
            target: target.clone(),
            leaves: leaves.len(),
            report,
        })
    }

    /// Queue a bypass change under `target`. Never refused for liveness.
    pub async fn bypass(
        &self,
        target: &NodeRef,
        desired: bool,
        schedule: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<CommandOutcome> {
        let subtree = self
            .admit(target, CommandKind::Bypass, now)
            .await?
            .into_result()?;
        let report = self
            .dispatcher
            .dispatch_bypass(&subtree, desired, schedule)
            .await;
        Ok(CommandOutcome {
            target: target.clone(),
            leaves: subtree.leaf_count(),
            report,
        })
    }

    // ============= Acknowledgements =============

    pub async fn acknowledge(&self, acks: &[Ack]) -> AckReport {
        self.aggregator.apply(acks).await
    }

    /// Re-run the gateway and location fold for one gateway
    pub async fn reconcile_gateway(&self, gateway_id: &str) -> Reconciliation {
        self.aggregator
            .reconcile(BTreeSet::from([gateway_id.to_owned()]))
            .await
    }

    // ============= Reads =============

    pub async fn effective_status(&self, optimizer_id: &str, now: DateTime<Utc>) -> Result<EffectiveStatus> {
        self.status.effective_status(optimizer_id, now).await
    }

    pub async fn gateway_config(&self, gateway_id: &str, now: DateTime<Utc>) -> Result<GatewayConfigView> {
        self.status.gateway_config(gateway_id, now).await
    }

    // ============= Default settings =============

    pub async fn default_settings(&self) -> Result<SettingsPayload> {
        self.defaults
            .defaults()
            .await?
            .ok_or(FleetError::MissingDefaults)
    }

    pub async fn store_default_settings(&self, payload: &SettingsPayload) -> Result<()> {
        self.defaults.store_defaults(payload).await?;
        info!("Default settings updated");
        Ok(())
    }

    // ============= Telemetry =============

    pub async fn ingest_report(&self, report: &GatewayReport) -> Result<IngestSummary> {
        self.ingest.ingest(report).await
    }
}
