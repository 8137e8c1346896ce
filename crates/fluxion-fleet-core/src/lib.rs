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

//! Command propagation and status aggregation for a fleet of optimizers.
//!
//! Commands issued at any level of the Enterprise → State → Location →
//! Gateway → Optimizer tree are resolved to leaf devices, gated on recent
//! telemetry, dispatched, and reconciled as devices acknowledge them.

pub mod aggregator;
pub mod dispatcher;
pub mod engine;
pub mod error;
mod fanout;
pub mod gate;
pub mod ingest;
pub mod liveness;
pub mod memory;
pub mod provisioning;
pub mod resolver;
pub mod status;
pub mod traits;

pub use aggregator::{AckAggregator, AckOutcome, AckReport, Reconciliation, fold_bypass};
pub use dispatcher::{CommandDispatcher, DispatchReport, ItemOutcome};
pub use engine::{CommandOutcome, EngineConfig, FleetEngine};
pub use error::{FleetError, Result};
pub use gate::{Admission, CommandKind, Denial, DispatchGate};
pub use ingest::{IngestSummary, TelemetryIngest};
pub use liveness::LivenessOracle;
pub use memory::InMemoryFleet;
pub use provisioning::GatewayProvisioning;
pub use resolver::{HierarchyResolver, Subtree};
pub use status::StatusReader;
pub use traits::{DefaultSettingsSource, DeviceTransport, GatewayFlags, TelemetryLog, TreeStore};
