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

//! In-memory implementation of every collaborator trait.
//!
//! Used by the test suites and for embedding the engine without a database.
//! Child links are derived from the parent fields of the child records, the
//! same way the document store queries them.

use anyhow::Result;
use async_trait::async_trait;
use fluxion_fleet_types::{
    BypassConfig, BypassMode, Enterprise, Gateway, GatewayLogRecord, Level, Location, NodeRef, Optimizer,
    SettingsAction, SettingsPayload, State, TelemetryRecord,
};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use crate::traits::{DefaultSettingsSource, DeviceTransport, GatewayFlags, TelemetryLog, TreeStore};

#[derive(Debug, Default)]
struct FleetData {
    enterprises: BTreeMap<String, Enterprise>,
    states: BTreeMap<String, State>,
    locations: BTreeMap<String, Location>,
    gateways: BTreeMap<String, Gateway>,
    optimizers: BTreeMap<String, Optimizer>,
    /// Extra child ids that point at nothing, for exercising broken trees
    dangling: BTreeMap<NodeRef, Vec<String>>,
    settings: BTreeMap<String, SettingsPayload>,
    defaults: Option<SettingsPayload>,
    telemetry: Vec<TelemetryRecord>,
    gateway_logs: Vec<GatewayLogRecord>,
    pushes: Vec<(String, SettingsPayload)>,
    failing_devices: BTreeSet<String>,
    /// Ids whose child lookups and liveness queries never complete
    stalled: BTreeSet<String>,
}

/// Whole fleet held in process memory
#[derive(Debug, Default)]
pub struct InMemoryFleet {
    data: RwLock<FleetData>,
}

impl InMemoryFleet {
    pub fn new() -> Self {
        Self::default()
    }

    // ============= Provisioning =============

    pub fn add_enterprise(&self, id: &str) {
        self.data.write().enterprises.insert(
            id.to_owned(),
            Enterprise {
                id: id.to_owned(),
                name: String::new(),
            },
        );
    }

    pub fn add_state(&self, id: &str, enterprise_id: &str, state_code: &str) {
        self.data.write().states.insert(
            id.to_owned(),
            State {
                id: id.to_owned(),
                enterprise_id: enterprise_id.to_owned(),
                state_code: state_code.to_owned(),
            },
        );
    }

    pub fn add_location(&self, location: Location) {
        self.data
            .write()
            .locations
            .insert(location.id.clone(), location);
    }

    pub fn add_gateway(&self, gateway: Gateway) {
        self.data.write().gateways.insert(gateway.id.clone(), gateway);
    }

    pub fn add_optimizer(&self, optimizer: Optimizer) {
        self.data
            .write()
            .optimizers
            .insert(optimizer.id.clone(), optimizer);
    }

    /// Make `parent` list a child id that has no record
    pub fn add_dangling_child(&self, parent: NodeRef, child_id: &str) {
        self.data
            .write()
            .dangling
            .entry(parent)
            .or_default()
            .push(child_id.to_owned());
    }

    /// Record a bare telemetry heartbeat for an optimizer
    pub fn record_telemetry(&self, device_id: &str, timestamp: i64) {
        let mut data = self.data.write();
        let gateway_id = data
            .optimizers
            .get(device_id)
            .map(|o| o.gateway_id.clone())
            .unwrap_or_default();
        data.telemetry
            .push(TelemetryRecord::new(device_id, gateway_id, timestamp));
    }

    /// Make every push to `device_id` fail
    pub fn fail_pushes_to(&self, device_id: &str) {
        self.data.write().failing_devices.insert(device_id.to_owned());
    }

    /// Make child lookups and liveness queries for `id` hang forever
    pub fn stall_queries_for(&self, id: &str) {
        self.data.write().stalled.insert(id.to_owned());
    }

    fn is_stalled(&self, id: &str) -> bool {
        self.data.read().stalled.contains(id)
    }

    // ============= Inspection =============

    pub fn optimizer_snapshot(&self, id: &str) -> Option<Optimizer> {
        self.data.read().optimizers.get(id).cloned()
    }

    pub fn gateway_snapshot(&self, id: &str) -> Option<Gateway> {
        self.data.read().gateways.get(id).cloned()
    }

    pub fn location_snapshot(&self, id: &str) -> Option<Location> {
        self.data.read().locations.get(id).cloned()
    }

    /// Every settings push in the order it reached the transport
    pub fn pushes(&self) -> Vec<(String, SettingsPayload)> {
        self.data.read().pushes.clone()
    }

    pub fn telemetry_len(&self) -> usize {
        self.data.read().telemetry.len()
    }

    pub fn gateway_logs(&self) -> Vec<GatewayLogRecord> {
        self.data.read().gateway_logs.clone()
    }
}

impl FleetData {
    fn children(&self, node: &NodeRef) -> Option<Vec<String>> {
        let mut children: Vec<String> = match node.level {
            Level::Enterprise => {
                self.enterprises.get(&node.id)?;
                self.states
                    .values()
                    .filter(|s| s.enterprise_id == node.id)
                    .map(|s| s.id.clone())
                    .collect()
            }
            Level::State => {
                let state = self.states.get(&node.id)?;
                self.locations
                    .values()
                    .filter(|l| {
                        l.enterprise_id == state.enterprise_id && l.state_code == state.state_code
                    })
                    .map(|l| l.id.clone())
                    .collect()
            }
            Level::Location => {
                self.locations.get(&node.id)?;
                self.gateways
                    .values()
                    .filter(|g| g.location_id == node.id)
                    .map(|g| g.id.clone())
                    .collect()
            }
            Level::Gateway => {
                self.gateways.get(&node.id)?;
                self.optimizers
                    .values()
                    .filter(|o| o.gateway_id == node.id)
                    .map(|o| o.id.clone())
                    .collect()
            }
            Level::Optimizer => {
                self.optimizers.get(&node.id)?;
                Vec::new()
            }
        };
        if let Some(extra) = self.dangling.get(node) {
            children.extend(extra.iter().cloned());
        }
        Some(children)
    }
}

fn missing(node: &NodeRef) -> anyhow::Error {
    anyhow::anyhow!("{node} does not exist")
}

#[async_trait]
impl TreeStore for InMemoryFleet {
    async fn children(&self, node: &NodeRef) -> Result<Option<Vec<String>>> {
        if self.is_stalled(&node.id) {
            return std::future::pending().await;
        }
        Ok(self.data.read().children(node))
    }

    async fn optimizer(&self, id: &str) -> Result<Option<Optimizer>> {
        Ok(self.data.read().optimizers.get(id).cloned())
    }

    async fn gateway(&self, id: &str) -> Result<Option<Gateway>> {
        Ok(self.data.read().gateways.get(id).cloned())
    }

    async fn location(&self, id: &str) -> Result<Option<Location>> {
        Ok(self.data.read().locations.get(id).cloned())
    }

    async fn online_optimizers(&self) -> Result<Vec<String>> {
        Ok(self
            .data
            .read()
            .optimizers
            .values()
            .filter(|o| o.online)
            .map(|o| o.id.clone())
            .collect())
    }

    async fn set_bypass_mode(&self, node: &NodeRef, mode: BypassMode) -> Result<()> {
        let mut data = self.data.write();
        let slot = match node.level {
            Level::Optimizer => data.optimizers.get_mut(&node.id).map(|o| &mut o.bypass_mode),
            Level::Gateway => data.gateways.get_mut(&node.id).map(|g| &mut g.bypass_mode),
            Level::Location => data.locations.get_mut(&node.id).map(|l| &mut l.bypass_mode),
            Level::State | Level::Enterprise => {
                return Err(anyhow::anyhow!("{node} carries no bypass mode"));
            }
        };
        *slot.ok_or_else(|| missing(node))? = mode;
        Ok(())
    }

    async fn set_bypass_config(&self, optimizer_id: &str, config: &BypassConfig) -> Result<()> {
        let mut data = self.data.write();
        let optimizer = data
            .optimizers
            .get_mut(optimizer_id)
            .ok_or_else(|| missing(&NodeRef::optimizer(optimizer_id)))?;
        optimizer.is_bypass = config.clone();
        Ok(())
    }

    async fn set_pending(
        &self,
        optimizer_id: &str,
        action: SettingsAction,
        pending: bool,
    ) -> Result<()> {
        let mut data = self.data.write();
        let optimizer = data
            .optimizers
            .get_mut(optimizer_id)
            .ok_or_else(|| missing(&NodeRef::optimizer(optimizer_id)))?;
        match action {
            SettingsAction::Set => optimizer.is_setting = pending,
            SettingsAction::Reset => optimizer.is_reset = pending,
        }
        Ok(())
    }

    async fn pending_settings(&self, optimizer_id: &str) -> Result<Option<SettingsPayload>> {
        Ok(self.data.read().settings.get(optimizer_id).copied())
    }

    async fn set_online(&self, optimizer_id: &str, online: bool) -> Result<()> {
        let mut data = self.data.write();
        let optimizer = data
            .optimizers
            .get_mut(optimizer_id)
            .ok_or_else(|| missing(&NodeRef::optimizer(optimizer_id)))?;
        optimizer.online = online;
        Ok(())
    }

    async fn set_gateway_flags(&self, gateway_id: &str, flags: GatewayFlags) -> Result<()> {
        let mut data = self.data.write();
        let gateway = data
            .gateways
            .get_mut(gateway_id)
            .ok_or_else(|| missing(&NodeRef::gateway(gateway_id)))?;
        if let Some(configured) = flags.configured {
            gateway.configured = configured;
        }
        if let Some(ready) = flags.ready_to_config {
            gateway.ready_to_config = ready;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl TelemetryLog for InMemoryFleet {
    async fn has_record_between(&self, device_id: &str, from: i64, to: i64) -> Result<bool> {
        if self.is_stalled(device_id) {
            return std::future::pending().await;
        }
        Ok(self
            .data
            .read()
            .telemetry
            .iter()
            .any(|r| r.device_id == device_id && (from..=to).contains(&r.timestamp)))
    }

    async fn append(&self, records: &[TelemetryRecord]) -> Result<()> {
        self.data.write().telemetry.extend_from_slice(records);
        Ok(())
    }

    async fn append_gateway_log(&self, record: &GatewayLogRecord) -> Result<()> {
        self.data.write().gateway_logs.push(record.clone());
        Ok(())
    }

    async fn prune_before(&self, cutoff: i64) -> Result<u64> {
        let mut data = self.data.write();
        let before = data.telemetry.len() + data.gateway_logs.len();
        data.telemetry.retain(|r| r.timestamp >= cutoff);
        data.gateway_logs.retain(|r| r.timestamp >= cutoff);
        Ok((before - data.telemetry.len() - data.gateway_logs.len()) as u64)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl DeviceTransport for InMemoryFleet {
    async fn push_settings(&self, optimizer_id: &str, payload: &SettingsPayload) -> Result<()> {
        let mut data = self.data.write();
        if data.failing_devices.contains(optimizer_id) {
            return Err(anyhow::anyhow!("device '{optimizer_id}' unreachable"));
        }
        data.pushes.push((optimizer_id.to_owned(), *payload));
        data.settings.insert(optimizer_id.to_owned(), *payload);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl DefaultSettingsSource for InMemoryFleet {
    async fn defaults(&self) -> Result<Option<SettingsPayload>> {
        Ok(self.data.read().defaults)
    }

    async fn store_defaults(&self, payload: &SettingsPayload) -> Result<()> {
        self.data.write().defaults = Some(*payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_state_children_follow_composite_key() {
        let fleet = InMemoryFleet::new();
        fleet.add_enterprise("ent-1");
        fleet.add_enterprise("ent-2");
        fleet.add_state("st-1", "ent-1", "KA");
        fleet.add_location(Location::new("loc-1", "ent-1", "KA"));
        fleet.add_location(Location::new("loc-2", "ent-1", "MH"));
        // Same state code under another enterprise is a different state
        fleet.add_location(Location::new("loc-3", "ent-2", "KA"));

        let children = fleet.children(&NodeRef::state("st-1")).await.unwrap();
        assert_eq!(children, Some(vec!["loc-1".to_owned()]));
    }

    #[tokio::test]
    async fn test_missing_node_has_no_children() {
        let fleet = InMemoryFleet::new();
        assert_eq!(fleet.children(&NodeRef::gateway("gw-x")).await.unwrap(), None);
        fleet.add_optimizer(Optimizer::new("opt-1", "gw-x"));
        assert_eq!(
            fleet.children(&NodeRef::optimizer("opt-1")).await.unwrap(),
            Some(vec![])
        );
    }

    #[tokio::test]
    async fn test_telemetry_window_is_inclusive() {
        let fleet = InMemoryFleet::new();
        fleet.record_telemetry("opt-1", 1_000);
        assert!(fleet.has_record_between("opt-1", 940, 1_000).await.unwrap());
        assert!(fleet.has_record_between("opt-1", 1_000, 1_060).await.unwrap());
        assert!(!fleet.has_record_between("opt-1", 1_001, 1_060).await.unwrap());
        assert!(!fleet.has_record_between("opt-2", 0, 2_000).await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_before_cutoff() {
        let fleet = InMemoryFleet::new();
        fleet.record_telemetry("opt-1", 100);
        fleet.record_telemetry("opt-1", 200);
        assert_eq!(fleet.prune_before(150).await.unwrap(), 1);
        assert_eq!(fleet.telemetry_len(), 1);
    }
}
