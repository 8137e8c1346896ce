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

//! Dispatch Gate.
//!
//! Settings commands are admitted only when every targeted optimizer is live.
//! Bypass commands skip the liveness check and are always queued.

use fluxion_fleet_types::{NodeRef, SettingsAction};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use tracing::{info, warn};

use crate::error::{FleetError, Result};
use crate::liveness::LivenessOracle;
use crate::resolver::{HierarchyResolver, Subtree};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Settings(SettingsAction),
    Bypass,
}

impl CommandKind {
    /// Whether the all-or-nothing liveness rule applies
    pub fn requires_liveness(self) -> bool {
        match self {
            Self::Settings(_) => true,
            Self::Bypass => false,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Settings(action) => write!(f, "settings_{}", action.as_str()),
            Self::Bypass => write!(f, "bypass"),
        }
    }
}

/// Why a command was refused
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Denial {
    NoRecentTelemetry,
    PartialOffline { offline: Vec<String> },
}

/// Gate decision together with the resolved target
#[derive(Debug, Clone)]
pub struct Admission {
    pub kind: CommandKind,
    pub subtree: Subtree,
    pub denial: Option<Denial>,
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        self.denial.is_none()
    }

    /// The resolved subtree when admitted, the denial as an error otherwise
    pub fn into_result(self) -> Result<Subtree> {
        let total = self.subtree.leaf_count();
        match self.denial {
            None => Ok(self.subtree),
            Some(Denial::NoRecentTelemetry) => Err(FleetError::NoRecentTelemetry),
            Some(Denial::PartialOffline { offline }) => {
                Err(FleetError::PartialOffline { offline, total })
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatchGate {
    resolver: HierarchyResolver,
    oracle: LivenessOracle,
}

impl DispatchGate {
    pub fn new(resolver: HierarchyResolver, oracle: LivenessOracle) -> Self {
        Self { resolver, oracle }
    }

    /// Decide whether `kind` may be dispatched to `target` at ordinal `now`.
    ///
    /// `NotFound`, `Inconsistent` and `EmptyTarget` are returned as errors;
    /// liveness refusals come back inside the `Admission`.
    pub async fn admit(&self, target: &NodeRef, kind: CommandKind, now: i64) -> Result<Admission> {
        let subtree = self.resolver.resolve_subtree(target).await?;
        if subtree.leaf_count() == 0 {
            warn!(target_node = %target, command = %kind, "Command target has no optimizers");
            return Err(FleetError::EmptyTarget {
                level: target.level,
                id: target.id.clone(),
            });
        }

        let denial = if kind.requires_liveness() {
            let leaves = subtree.leaves();
            let live = self.oracle.live_subset(&leaves, now).await?;
            evaluate(&leaves, &live)
        } else {
            None
        };

        match &denial {
            None => info!(
                target_node = %target,
                command = %kind,
                leaves = subtree.leaf_count(),
                "Command admitted"
            ),
            Some(reason) => warn!(
                target_node = %target,
                command = %kind,
                ?reason,
                "Command denied"
            ),
        }

        Ok(Admission {
            kind,
            subtree,
            denial,
        })
    }
}

/// All-or-nothing rule: admit only when the live set equals the target set
fn evaluate(leaves: &BTreeSet<String>, live: &BTreeSet<String>) -> Option<Denial> {
    if live.is_empty() {
        return Some(Denial::NoRecentTelemetry);
    }
    if live == leaves {
        return None;
    }
    Some(Denial::PartialOffline {
        offline: leaves.difference(live).cloned().collect(),
    })
}
