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

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fluxion_fleet_core::{
    CommandKind, Denial, EngineConfig, FleetEngine, FleetError, InMemoryFleet, fold_bypass,
};
use fluxion_fleet_types::{
    Ack, AckPurpose, BypassMode, BypassType, Gateway, Level, Location, NodeRef, Optimizer,
    SettingsAction, SettingsPayload,
};

const NOW: i64 = 1_725_361_073;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("valid timestamp")
}

/// ent-1
/// ├── st-ka (KA)
/// │   ├── loc-a: gw-a1 {a1-1, a1-2}, gw-a2 {a2-1, a2-2}
/// │   └── loc-b: gw-b1 {b1-1, b1-2, b1-3}
/// └── st-mh (MH)
///     └── loc-c: gw-c1 {c1-1}
fn build_fleet() -> Arc<InMemoryFleet> {
    let fleet = Arc::new(InMemoryFleet::new());
    fleet.add_enterprise("ent-1");
    fleet.add_state("st-ka", "ent-1", "KA");
    fleet.add_state("st-mh", "ent-1", "MH");
    fleet.add_location(Location::new("loc-a", "ent-1", "KA"));
    fleet.add_location(Location::new("loc-b", "ent-1", "KA"));
    fleet.add_location(Location::new("loc-c", "ent-1", "MH"));

    let gateways = [
        ("gw-a1", "loc-a", &["a1-1", "a1-2"][..]),
        ("gw-a2", "loc-a", &["a2-1", "a2-2"][..]),
        ("gw-b1", "loc-b", &["b1-1", "b1-2", "b1-3"][..]),
        ("gw-c1", "loc-c", &["c1-1"][..]),
    ];
    for (gateway, location, optimizers) in gateways {
        fleet.add_gateway(Gateway::new(gateway, location));
        for id in optimizers {
            fleet.add_optimizer(Optimizer::new(*id, gateway));
        }
    }
    fleet
}

fn engine(fleet: &Arc<InMemoryFleet>) -> FleetEngine {
    FleetEngine::new(
        fleet.clone(),
        fleet.clone(),
        fleet.clone(),
        fleet.clone(),
        EngineConfig::default(),
    )
}

fn all_nodes() -> Vec<NodeRef> {
    let mut nodes = vec![
        NodeRef::enterprise("ent-1"),
        NodeRef::state("st-ka"),
        NodeRef::state("st-mh"),
    ];
    for id in ["loc-a", "loc-b", "loc-c"] {
        nodes.push(NodeRef::location(id));
    }
    for id in ["gw-a1", "gw-a2", "gw-b1", "gw-c1"] {
        nodes.push(NodeRef::gateway(id));
    }
    for id in ["a1-1", "a1-2", "a2-1", "a2-2", "b1-1", "b1-2", "b1-3", "c1-1"] {
        nodes.push(NodeRef::optimizer(id));
    }
    nodes
}

fn ids(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_resolution_is_union_of_children() {
    let fleet = build_fleet();
    let engine = engine(&fleet);

    for node in all_nodes() {
        let leaves = engine.resolve_leaves(&node).await.unwrap();
        if node.level == Level::Optimizer {
            assert_eq!(leaves, ids(&[node.id.as_str()]));
            continue;
        }

        let subtree = engine.resolve_subtree(&node).await.unwrap();
        let child_level = node.level.child().unwrap();
        let mut union = BTreeSet::new();
        for child in subtree.nodes(child_level) {
            union.extend(
                engine
                    .resolve_leaves(&NodeRef::new(child_level, child))
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(leaves, union, "{node}");
    }
}

#[tokio::test]
async fn test_location_with_two_gateways_of_two() {
    let fleet = build_fleet();
    let leaves = engine(&fleet)
        .resolve_leaves(&NodeRef::location("loc-a"))
        .await
        .unwrap();
    assert_eq!(leaves, ids(&["a1-1", "a1-2", "a2-1", "a2-2"]));
}

#[tokio::test]
async fn test_unknown_node_at_every_level() {
    let fleet = build_fleet();
    let engine = engine(&fleet);
    for level in Level::all() {
        let err = engine
            .resolve_leaves(&NodeRef::new(*level, "missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::NotFound { .. }), "{level}");
    }
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_settings_admitted_iff_sets_equal() {
    let fleet = build_fleet();
    for id in ["b1-1", "b1-2", "b1-3"] {
        fleet.record_telemetry(id, NOW - 30);
    }
    // Older than the window
    fleet.record_telemetry("a1-1", NOW - 61);
    let engine = engine(&fleet);
    let set = CommandKind::Settings(SettingsAction::Set);

    let admission = engine
        .admit(&NodeRef::location("loc-b"), set, at(NOW))
        .await
        .unwrap();
    assert!(admission.is_admitted());

    let admission = engine
        .admit(&NodeRef::state("st-ka"), set, at(NOW))
        .await
        .unwrap();
    match admission.denial {
        Some(Denial::PartialOffline { offline }) => {
            assert_eq!(offline, ["a1-1", "a1-2", "a2-1", "a2-2"]);
        }
        other => panic!("expected PartialOffline, got {other:?}"),
    }

    let admission = engine
        .admit(&NodeRef::gateway("gw-a1"), set, at(NOW))
        .await
        .unwrap();
    assert_eq!(admission.denial, Some(Denial::NoRecentTelemetry));
}

#[tokio::test]
async fn test_bypass_never_partial_offline() {
    let fleet = build_fleet();
    fleet.record_telemetry("a1-1", NOW);
    let engine = engine(&fleet);

    for node in all_nodes() {
        let admission = engine
            .admit(&node, CommandKind::Bypass, at(NOW))
            .await
            .unwrap();
        assert!(admission.is_admitted(), "{node}");
    }
}

#[tokio::test]
async fn test_settings_to_single_offline_optimizer_denied() {
    let fleet = build_fleet();
    let engine = engine(&fleet);

    let err = engine
        .apply_settings(&NodeRef::optimizer("c1-1"), &SettingsPayload::default(), at(NOW))
        .await
        .unwrap_err();
    assert!(err.is_liveness_denial());
    assert!(fleet.pushes().is_empty());
}

#[tokio::test]
async fn test_settings_to_live_subtree_dispatched() {
    let fleet = build_fleet();
    for id in ["a1-1", "a1-2", "a2-1", "a2-2"] {
        fleet.record_telemetry(id, NOW);
    }
    fleet.fail_pushes_to("a2-2");
    let engine = engine(&fleet);
    let payload = SettingsPayload {
        thermostat_monitoring_interval: 15.0,
        ..SettingsPayload::default()
    };

    let outcome = engine
        .apply_settings(&NodeRef::location("loc-a"), &payload, at(NOW))
        .await
        .unwrap();

    assert_eq!(outcome.leaves, 4);
    assert_eq!(outcome.report.succeeded(), 3);
    let failed: Vec<_> = outcome.report.failures().map(|o| o.node.id.clone()).collect();
    assert_eq!(failed, ["a2-2"]);
    assert!(fleet.optimizer_snapshot("a1-1").unwrap().is_setting);
    assert!(!fleet.optimizer_snapshot("a2-2").unwrap().is_setting);
}

// ---------------------------------------------------------------------------
// Bypass lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_gateway_settles_only_after_every_ack() {
    let fleet = build_fleet();
    let engine = engine(&fleet);
    let gateway = NodeRef::gateway("gw-b1");

    engine.bypass(&gateway, true, None, at(NOW)).await.unwrap();
    let prior = fleet.gateway_snapshot("gw-b1").unwrap().bypass_mode;
    assert_eq!(prior, BypassMode::InProgress(true));

    engine
        .acknowledge(&[
            Ack::new("b1-1", AckPurpose::BypassOn),
            Ack::new("b1-2", AckPurpose::BypassOn),
        ])
        .await;
    let after_two = fleet.gateway_snapshot("gw-b1").unwrap().bypass_mode;
    assert_eq!(after_two, prior);
    assert_ne!(after_two, BypassMode::On);

    engine
        .acknowledge(&[Ack::new("b1-3", AckPurpose::BypassOn)])
        .await;
    assert_eq!(fleet.gateway_snapshot("gw-b1").unwrap().bypass_mode, BypassMode::On);
    assert_eq!(fleet.location_snapshot("loc-b").unwrap().bypass_mode, BypassMode::On);
}

#[tokio::test]
async fn test_bypass_from_state_reaches_every_leaf() {
    let fleet = build_fleet();
    let engine = engine(&fleet);

    let outcome = engine
        .bypass(&NodeRef::state("st-ka"), false, None, at(NOW))
        .await
        .unwrap();
    // 2 locations + 3 gateways + 7 optimizers
    assert_eq!(outcome.report.outcomes.len(), 12);
    assert_eq!(outcome.leaves, 7);
    assert_eq!(
        fleet.optimizer_snapshot("b1-3").unwrap().bypass_mode,
        BypassMode::InProgress(false)
    );
    assert_eq!(
        fleet.optimizer_snapshot("c1-1").unwrap().bypass_mode,
        BypassMode::Off
    );
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let fleet = build_fleet();
    let engine = engine(&fleet);
    engine
        .acknowledge(&[
            Ack::new("a1-1", AckPurpose::BypassOn),
            Ack::new("a1-2", AckPurpose::BypassOn),
        ])
        .await;

    let first = engine.reconcile_gateway("gw-a1").await;
    let second = engine.reconcile_gateway("gw-a1").await;
    assert_eq!(first, second);
    assert_eq!(first.gateways["gw-a1"], BypassMode::On);
    // gw-a2 is still OFF
    assert_eq!(first.locations["loc-a"], BypassMode::Off);
}

#[test]
fn test_fold_monotone_on_disagreement() {
    let modes = [
        BypassMode::On,
        BypassMode::Off,
        BypassMode::InProgress(true),
        BypassMode::InProgress(false),
        BypassMode::Pending,
    ];
    for prior in modes {
        for a in modes {
            for b in modes {
                let folded = fold_bypass([a, b], prior);
                if a == b && a.as_settled().is_some() {
                    assert_eq!(folded, a);
                } else {
                    assert_eq!(folded, prior);
                }
            }
        }
    }
}

#[tokio::test]
async fn test_scheduled_bypass_effective_read() {
    let fleet = build_fleet();
    let engine = engine(&fleet);
    let schedule = at(NOW + 3_600);

    engine
        .bypass(&NodeRef::optimizer("c1-1"), true, Some(schedule), at(NOW))
        .await
        .unwrap();

    let before = engine.effective_status("c1-1", at(NOW)).await.unwrap();
    assert_eq!(before.is_bypass, BypassType::Default);
    let after = engine.effective_status("c1-1", schedule).await.unwrap();
    assert_eq!(after.is_bypass, BypassType::True);

    engine
        .bypass(&NodeRef::optimizer("c1-1"), false, None, at(NOW))
        .await
        .unwrap();
    let off = engine.effective_status("c1-1", at(NOW)).await.unwrap();
    assert_eq!(off.is_bypass, BypassType::False);
}

#[tokio::test]
async fn test_ack_settles_leaf_config() {
    let fleet = build_fleet();
    let engine = engine(&fleet);
    engine
        .bypass(&NodeRef::optimizer("c1-1"), true, None, at(NOW))
        .await
        .unwrap();

    engine
        .acknowledge(&[Ack::new("c1-1", AckPurpose::BypassOn)])
        .await;

    let status = engine.effective_status("c1-1", at(NOW)).await.unwrap();
    assert_eq!(status.is_bypass, BypassType::Default);
    assert_eq!(
        fleet.optimizer_snapshot("c1-1").unwrap().bypass_mode,
        BypassMode::On
    );
}
