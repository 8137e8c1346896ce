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

//! Error types for the fleet engine

use fluxion_fleet_types::{Level, NodeRef};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FleetError {
    #[error("{level} '{id}' not found")]
    NotFound { level: Level, id: String },

    #[error("{level} '{id}' has no optimizers")]
    EmptyTarget { level: Level, id: String },

    #[error("no recent telemetry from any targeted optimizer")]
    NoRecentTelemetry,

    #[error("{} of {total} targeted optimizers are offline", .offline.len())]
    PartialOffline { offline: Vec<String>, total: usize },

    #[error("push to optimizer '{device}' failed: {reason}")]
    TransportFailure { device: String, reason: String },

    #[error("{parent} links to missing {child}")]
    Inconsistent { parent: NodeRef, child: NodeRef },

    #[error("no default settings record exists")]
    MissingDefaults,

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl FleetError {
    pub fn not_found(node: &NodeRef) -> Self {
        Self::NotFound {
            level: node.level,
            id: node.id.clone(),
        }
    }

    /// Denials raised by the all-or-nothing liveness rule
    pub fn is_liveness_denial(&self) -> bool {
        matches!(self, Self::NoRecentTelemetry | Self::PartialOffline { .. })
    }
}

pub type Result<T> = std::result::Result<T, FleetError>;
