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

//! Shared data types for the FluxION fleet controller.
//!
//! Everything here is plain data. The string encodings that devices and the
//! legacy document store expect (`"IN_PROGRESS_true"`, `"default"`,
//! `"OptimizerID"`, ...) are confined to the serde attributes in this crate.

pub mod ack;
pub mod bypass;
pub mod entities;
pub mod hierarchy;
pub mod settings;
pub mod status;
pub mod telemetry;

// Re-export common types for convenience
pub use ack::{Ack, AckPurpose};
pub use bypass::{BypassConfig, BypassMode, BypassType, parse_schedule_time};
pub use entities::{Enterprise, Gateway, Location, Optimizer, State};
pub use hierarchy::{Level, NodeRef};
pub use settings::{SettingsAction, SettingsPayload};
pub use status::{EffectiveStatus, GatewayConfigView, InstallationProperty};
pub use telemetry::{
    GatewayLogRecord, GatewayReport, OptimizerReading, PhaseReading, TelemetryRecord,
};
