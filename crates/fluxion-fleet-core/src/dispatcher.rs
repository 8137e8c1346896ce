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

//! Command Dispatcher.
//!
//! Pushes settings to devices and writes pending bypass state across a
//! resolved subtree. Every node is an independent item: a failure on one never
//! stops its siblings, and no completed write is rolled back.

use chrono::{DateTime, Utc};
use fluxion_fleet_types::{BypassConfig, BypassMode, Level, NodeRef, SettingsAction, SettingsPayload};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{FleetError, Result};
use crate::fanout::run_bounded;
use crate::resolver::Subtree;
use crate::traits::{DeviceTransport, TreeStore};

/// Result of one node's write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemOutcome {
    pub node: NodeRef,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-node outcomes of one dispatch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub outcomes: Vec<ItemOutcome>,
}

impl DispatchReport {
    fn from_results(results: Vec<(NodeRef, Result<()>)>) -> Self {
        let outcomes = results
            .into_iter()
            .map(|(node, result)| ItemOutcome {
                node,
                error: result.err().map(|e| e.to_string()),
            })
            .collect();
        Self { outcomes }
    }

    /// Every node was written
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(ItemOutcome::is_ok)
    }

    pub fn failures(&self) -> impl Iterator<Item = &ItemOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    store: Arc<dyn TreeStore>,
    transport: Arc<dyn DeviceTransport>,
    deadline: Duration,
}

impl std::fmt::Debug for CommandDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandDispatcher")
            .field("store", &self.store.name())
            .field("transport", &self.transport.name())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl CommandDispatcher {
    pub fn new(
        store: Arc<dyn TreeStore>,
        transport: Arc<dyn DeviceTransport>,
        deadline: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            deadline,
        }
    }

    /// Push `payload` to every optimizer and flag the matching pending action.
    ///
    /// Reset is a push of the default record flagged as `isReset`.
    pub async fn dispatch_settings(
        &self,
        optimizers: &BTreeSet<String>,
        action: SettingsAction,
        payload: &SettingsPayload,
    ) -> DispatchReport {
        let results = run_bounded(optimizers.iter().cloned(), self.deadline, |id| async move {
            self.push_one(&id, action, payload).await
        })
        .await;

        let results = results
            .into_iter()
            .map(|(id, result)| (NodeRef::optimizer(id), result))
            .collect();
        let report = DispatchReport::from_results(results);
        log_report("settings", action.as_str(), &report);
        report
    }

    async fn push_one(
        &self,
        optimizer_id: &str,
        action: SettingsAction,
        payload: &SettingsPayload,
    ) -> Result<()> {
        self.transport
            .push_settings(optimizer_id, payload)
            .await
            .map_err(|e| FleetError::TransportFailure {
                device: optimizer_id.to_owned(),
                reason: format!("{e:#}"),
            })?;
        self.store.set_pending(optimizer_id, action, true).await?;
        Ok(())
    }

    /// Mark the subtree `IN_PROGRESS(desired)` and record the request on each leaf.
    ///
    /// Written nodes: the issuing node when its level carries a mode, every
    /// location and gateway beneath it, and every optimizer.
    pub async fn dispatch_bypass(
        &self,
        subtree: &Subtree,
        desired: bool,
        schedule: Option<DateTime<Utc>>,
    ) -> DispatchReport {
        let mode = BypassMode::InProgress(desired);
        let config = BypassConfig::requested(desired, schedule);

        let targets: Vec<NodeRef> = [Level::Location, Level::Gateway, Level::Optimizer]
            .into_iter()
            .flat_map(|level| subtree.nodes(level).map(move |id| NodeRef::new(level, id)))
            .collect();

        let config = &config;
        let results = run_bounded(targets, self.deadline, |node| async move {
            self.store.set_bypass_mode(&node, mode).await?;
            if node.level.is_leaf() {
                self.store.set_bypass_config(&node.id, config).await?;
            }
            Ok::<_, FleetError>(())
        })
        .await;

        let report = DispatchReport::from_results(results);
        log_report("bypass", mode.as_wire(), &report);
        report
    }
}

fn log_report(command: &str, detail: &str, report: &DispatchReport) {
    if report.is_complete() {
        info!(
            command,
            detail,
            nodes = report.outcomes.len(),
            "Dispatch complete"
        );
    } else {
        for failure in report.failures() {
            warn!(
                command,
                node = %failure.node,
                error = failure.error.as_deref().unwrap_or_default(),
                "Dispatch item failed"
            );
        }
        warn!(
            command,
            detail,
            succeeded = report.succeeded(),
            nodes = report.outcomes.len(),
            "Dispatch partially applied"
        );
    }
}
