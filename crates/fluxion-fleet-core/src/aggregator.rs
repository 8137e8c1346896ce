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

//! Acknowledgement Aggregator.
//!
//! Devices acknowledge commands asynchronously. Each ack settles one leaf;
//! afterwards every gateway touched by a bypass ack folds its optimizers, and
//! every affected location folds its gateways using the values just computed.
//! Folding is idempotent, so re-running it is the recovery path after a
//! partial failure.

use fluxion_fleet_types::{Ack, AckPurpose, BypassConfig, BypassMode, NodeRef, SettingsAction};
use futures_util::future::try_join_all;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{FleetError, Result};
use crate::fanout::run_bounded;
use crate::traits::TreeStore;

/// Reduce children's modes into the parent's.
///
/// All `On` gives `On`, all `Off` gives `Off`. Any mix, any child still in
/// progress, or no children at all leaves `prior` untouched.
pub fn fold_bypass(children: impl IntoIterator<Item = BypassMode>, prior: BypassMode) -> BypassMode {
    let mut children = children.into_iter();
    let Some(first) = children.next() else {
        return prior;
    };
    let unanimous = children.all(|mode| mode == first);
    match first {
        BypassMode::On | BypassMode::Off if unanimous => first,
        BypassMode::On | BypassMode::Off | BypassMode::InProgress(_) | BypassMode::Pending => prior,
    }
}

/// Outcome of one acknowledgement item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AckOutcome {
    #[serde(rename = "OptimizerID")]
    pub optimizer_id: String,
    pub purpose: String,
    pub success: bool,
    pub message: String,
}

impl AckOutcome {
    /// Item refused before reaching the store, e.g. an unknown purpose
    pub fn rejected(
        optimizer_id: impl Into<String>,
        purpose: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            optimizer_id: optimizer_id.into(),
            purpose: purpose.into(),
            success: false,
            message: message.into(),
        }
    }
}

/// Aggregate values after a fold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Reconciliation {
    pub gateways: BTreeMap<String, BypassMode>,
    pub locations: BTreeMap<String, BypassMode>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AckReport {
    pub results: Vec<AckOutcome>,
    pub reconciliation: Reconciliation,
}

impl AckReport {
    /// Every item applied and every fold succeeded
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.success) && self.reconciliation.errors.is_empty()
    }
}

#[derive(Clone)]
pub struct AckAggregator {
    store: Arc<dyn TreeStore>,
    deadline: Duration,
}

impl std::fmt::Debug for AckAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AckAggregator")
            .field("store", &self.store.name())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl AckAggregator {
    pub fn new(store: Arc<dyn TreeStore>, deadline: Duration) -> Self {
        Self { store, deadline }
    }

    /// Apply a batch of acks, then fold every gateway a bypass ack touched
    pub async fn apply(&self, acks: &[Ack]) -> AckReport {
        let results = run_bounded(acks.iter().cloned(), self.deadline, |ack| async move {
            self.settle_leaf(&ack).await
        })
        .await;

        let mut touched = BTreeSet::new();
        let results = results
            .into_iter()
            .map(|(ack, result)| {
                let purpose = ack.purpose.as_str().to_owned();
                match result {
                    Ok(gateway) => {
                        touched.extend(gateway);
                        AckOutcome {
                            message: settled_message(&ack),
                            optimizer_id: ack.optimizer_id,
                            purpose,
                            success: true,
                        }
                    }
                    Err(e) => {
                        warn!(optimizer = %ack.optimizer_id, %purpose, error = %e, "Acknowledgement skipped");
                        AckOutcome::rejected(ack.optimizer_id, purpose, e.to_string())
                    }
                }
            })
            .collect();

        let reconciliation = self.reconcile(touched).await;
        AckReport {
            results,
            reconciliation,
        }
    }

    /// Settle one leaf; returns the optimizer's gateway when the bypass state changed
    async fn settle_leaf(&self, ack: &Ack) -> Result<Option<String>> {
        let optimizer = self
            .store
            .optimizer(&ack.optimizer_id)
            .await?
            .ok_or_else(|| FleetError::not_found(&NodeRef::optimizer(&ack.optimizer_id)))?;

        let Some(on) = ack.purpose.bypass_state() else {
            let action = if ack.purpose == AckPurpose::Reset {
                SettingsAction::Reset
            } else {
                SettingsAction::Set
            };
            self.store.set_pending(&optimizer.id, action, false).await?;
            return Ok(None);
        };

        let node = NodeRef::optimizer(&optimizer.id);
        self.store
            .set_bypass_mode(&node, BypassMode::settled(on))
            .await?;
        self.store
            .set_bypass_config(&optimizer.id, &BypassConfig::settled())
            .await?;
        info!(optimizer = %optimizer.id, bypass = on, "Optimizer bypass settled");
        Ok(Some(optimizer.gateway_id))
    }

    /// Fold the given gateways, then their locations
    pub async fn reconcile(&self, gateways: BTreeSet<String>) -> Reconciliation {
        let mut reconciliation = Reconciliation::default();
        if gateways.is_empty() {
            return reconciliation;
        }

        let folded = run_bounded(gateways, self.deadline, |id| async move {
            self.fold_gateway(&id).await
        })
        .await;

        let mut locations = BTreeSet::new();
        for (id, result) in folded {
            match result {
                Ok((location_id, mode)) => {
                    locations.insert(location_id);
                    reconciliation.gateways.insert(id, mode);
                }
                Err(e) => {
                    warn!(gateway = %id, error = %e, "Gateway fold failed");
                    reconciliation.errors.push(e.to_string());
                }
            }
        }

        let fresh = &reconciliation.gateways;
        let folded = run_bounded(locations, self.deadline, |id| async move {
            self.fold_location(&id, fresh).await
        })
        .await;

        for (id, result) in folded {
            match result {
                Ok(mode) => {
                    reconciliation.locations.insert(id, mode);
                }
                Err(e) => {
                    warn!(location = %id, error = %e, "Location fold failed");
                    reconciliation.errors.push(e.to_string());
                }
            }
        }
        reconciliation
    }

    /// Recompute one gateway's aggregate from its optimizers
    async fn fold_gateway(&self, gateway_id: &str) -> Result<(String, BypassMode)> {
        let node = NodeRef::gateway(gateway_id);
        let gateway = self
            .store
            .gateway(gateway_id)
            .await?
            .ok_or_else(|| FleetError::not_found(&node))?;
        let children = self.children_of(&node).await?;

        let parent = &node;
        let modes = try_join_all(children.iter().map(|child| async move {
            self.store
                .optimizer(&child.id)
                .await?
                .map(|o| o.bypass_mode)
                .ok_or_else(|| FleetError::Inconsistent {
                    parent: parent.clone(),
                    child: child.clone(),
                })
        }))
        .await?;

        let mode = fold_bypass(modes, gateway.bypass_mode);
        self.write_if_changed(&node, gateway.bypass_mode, mode).await?;
        Ok((gateway.location_id, mode))
    }

    /// Recompute one location's aggregate, preferring freshly folded gateway values
    async fn fold_location(
        &self,
        location_id: &str,
        fresh: &BTreeMap<String, BypassMode>,
    ) -> Result<BypassMode> {
        let node = NodeRef::location(location_id);
        let location = self
            .store
            .location(location_id)
            .await?
            .ok_or_else(|| FleetError::not_found(&node))?;
        let children = self.children_of(&node).await?;

        let parent = &node;
        let modes = try_join_all(children.iter().map(|child| async move {
            if let Some(mode) = fresh.get(&child.id) {
                return Ok(*mode);
            }
            self.store
                .gateway(&child.id)
                .await?
                .map(|g| g.bypass_mode)
                .ok_or_else(|| FleetError::Inconsistent {
                    parent: parent.clone(),
                    child: child.clone(),
                })
        }))
        .await?;

        let mode = fold_bypass(modes, location.bypass_mode);
        self.write_if_changed(&node, location.bypass_mode, mode).await?;
        Ok(mode)
    }

    async fn children_of(&self, node: &NodeRef) -> Result<Vec<NodeRef>> {
        let ids = self
            .store
            .children(node)
            .await?
            .ok_or_else(|| FleetError::not_found(node))?;
        Ok(ids
            .into_iter()
            .filter_map(|id| node.child(id))
            .collect())
    }

    async fn write_if_changed(&self, node: &NodeRef, prior: BypassMode, mode: BypassMode) -> Result<()> {
        if prior == mode {
            debug!(node = %node, mode = mode.as_wire(), "Aggregate unchanged");
            return Ok(());
        }
        self.store.set_bypass_mode(node, mode).await?;
        info!(
            node = %node,
            from = prior.as_wire(),
            to = mode.as_wire(),
            "Aggregate bypass mode updated"
        );
        Ok(())
    }
}

fn settled_message(ack: &Ack) -> String {
    let field = match ack.purpose {
        AckPurpose::Set => "isSetting",
        AckPurpose::Reset => "isReset",
        AckPurpose::BypassOn | AckPurpose::BypassOff => "isBypass",
    };
    format!("{field} updated for optimizer '{}'", ack.optimizer_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryFleet;
    use fluxion_fleet_types::{BypassType, Gateway, Location, Optimizer};

    const ALL: [BypassMode; 5] = [
        BypassMode::Off,
        BypassMode::On,
        BypassMode::InProgress(true),
        BypassMode::InProgress(false),
        BypassMode::Pending,
    ];

    fn fleet() -> Arc<InMemoryFleet> {
        let fleet = Arc::new(InMemoryFleet::new());
        fleet.add_location(Location::new("loc-1", "ent-1", "KA"));
        fleet.add_gateway(Gateway::new("gw-1", "loc-1"));
        fleet.add_gateway(Gateway::new("gw-2", "loc-1"));
        for (id, gw) in [("opt-1", "gw-1"), ("opt-2", "gw-1"), ("opt-3", "gw-2")] {
            fleet.add_optimizer(Optimizer::new(id, gw));
        }
        fleet
    }

    fn aggregator(fleet: &Arc<InMemoryFleet>) -> AckAggregator {
        AckAggregator::new(fleet.clone(), Duration::from_secs(30))
    }

    #[test]
    fn test_fold_unanimous_children() {
        for prior in ALL {
            assert_eq!(fold_bypass([BypassMode::On; 3], prior), BypassMode::On);
            assert_eq!(fold_bypass([BypassMode::Off; 2], prior), BypassMode::Off);
        }
    }

    #[test]
    fn test_fold_mixed_children_keep_prior() {
        for prior in ALL {
            assert_eq!(fold_bypass([BypassMode::On, BypassMode::Off], prior), prior);
            assert_eq!(
                fold_bypass([BypassMode::On, BypassMode::InProgress(true)], prior),
                prior
            );
            assert_eq!(fold_bypass([BypassMode::Pending; 2], prior), prior);
            assert_eq!(fold_bypass([], prior), prior);
        }
    }

    #[test]
    fn test_fold_is_idempotent() {
        for a in ALL {
            for b in ALL {
                for prior in ALL {
                    let once = fold_bypass([a, b], prior);
                    assert_eq!(fold_bypass([a, b], once), once);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_settings_acks_clear_flags() {
        let fleet = fleet();
        fleet
            .set_pending("opt-1", SettingsAction::Set, true)
            .await
            .unwrap();
        fleet
            .set_pending("opt-2", SettingsAction::Reset, true)
            .await
            .unwrap();

        let report = aggregator(&fleet)
            .apply(&[
                Ack::new("opt-1", AckPurpose::Set),
                Ack::new("opt-2", AckPurpose::Reset),
            ])
            .await;

        assert!(report.is_success());
        assert!(report.reconciliation.gateways.is_empty());
        assert!(!fleet.optimizer_snapshot("opt-1").unwrap().is_setting);
        assert!(!fleet.optimizer_snapshot("opt-2").unwrap().is_reset);
    }

    #[tokio::test]
    async fn test_unknown_optimizer_fails_only_its_item() {
        let fleet = fleet();
        let report = aggregator(&fleet)
            .apply(&[
                Ack::new("opt-404", AckPurpose::BypassOn),
                Ack::new("opt-3", AckPurpose::BypassOn),
            ])
            .await;

        assert!(!report.is_success());
        assert!(!report.results[0].success);
        assert!(report.results[1].success);
        assert_eq!(report.reconciliation.gateways["gw-2"], BypassMode::On);
    }

    #[tokio::test]
    async fn test_bypass_ack_settles_leaf_and_folds_upwards() {
        let fleet = fleet();
        let report = aggregator(&fleet)
            .apply(&[
                Ack::new("opt-1", AckPurpose::BypassOn),
                Ack::new("opt-2", AckPurpose::BypassOn),
                Ack::new("opt-3", AckPurpose::BypassOn),
            ])
            .await;

        assert!(report.is_success());
        let optimizer = fleet.optimizer_snapshot("opt-1").unwrap();
        assert_eq!(optimizer.bypass_mode, BypassMode::On);
        assert_eq!(optimizer.is_bypass.kind, BypassType::Default);
        assert_eq!(fleet.gateway_snapshot("gw-1").unwrap().bypass_mode, BypassMode::On);
        assert_eq!(fleet.location_snapshot("loc-1").unwrap().bypass_mode, BypassMode::On);
        assert_eq!(report.reconciliation.locations["loc-1"], BypassMode::On);
    }

    #[tokio::test]
    async fn test_ack_purpose_picks_bypass_or_settings_path() {
        let fleet = fleet();
        let node = NodeRef::optimizer("opt-1");
        fleet
            .set_bypass_mode(&node, BypassMode::InProgress(false))
            .await
            .unwrap();
        fleet
            .set_pending("opt-1", SettingsAction::Set, true)
            .await
            .unwrap();

        let report = aggregator(&fleet)
            .apply(&[Ack::new("opt-1", AckPurpose::Set)])
            .await;
        assert!(report.reconciliation.gateways.is_empty());
        let optimizer = fleet.optimizer_snapshot("opt-1").unwrap();
        assert!(!optimizer.is_setting);
        assert_eq!(optimizer.bypass_mode, BypassMode::InProgress(false));

        let report = aggregator(&fleet)
            .apply(&[Ack::new("opt-1", AckPurpose::BypassOff)])
            .await;
        assert!(report.reconciliation.gateways.contains_key("gw-1"));
        assert_eq!(fleet.optimizer_snapshot("opt-1").unwrap().bypass_mode, BypassMode::Off);
    }

    #[tokio::test]
    async fn test_location_keeps_prior_until_all_gateways_agree() {
        let fleet = fleet();
        let aggregator = aggregator(&fleet);

        // gw-1 settles ON, gw-2 stays OFF
        aggregator
            .apply(&[
                Ack::new("opt-1", AckPurpose::BypassOn),
                Ack::new("opt-2", AckPurpose::BypassOn),
            ])
            .await;
        assert_eq!(fleet.gateway_snapshot("gw-1").unwrap().bypass_mode, BypassMode::On);
        assert_eq!(fleet.location_snapshot("loc-1").unwrap().bypass_mode, BypassMode::Off);

        aggregator
            .apply(&[Ack::new("opt-3", AckPurpose::BypassOn)])
            .await;
        assert_eq!(fleet.location_snapshot("loc-1").unwrap().bypass_mode, BypassMode::On);
    }

    #[tokio::test]
    async fn test_dangling_optimizer_link_reports_fold_error() {
        let fleet = fleet();
        fleet.add_dangling_child(NodeRef::gateway("gw-2"), "opt-ghost");
        let report = aggregator(&fleet)
            .apply(&[Ack::new("opt-3", AckPurpose::BypassOff)])
            .await;

        assert!(report.results[0].success);
        assert_eq!(report.reconciliation.errors.len(), 1);
        assert!(!report.is_success());
    }
}
