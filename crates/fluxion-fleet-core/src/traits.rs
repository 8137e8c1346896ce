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

//! Collaborator interfaces.
//!
//! The engine never talks to a database or a device directly. Storage,
//! telemetry, device transport and the default-settings record are injected
//! as trait objects, owned by whoever starts the process.

use anyhow::Result;
use async_trait::async_trait;
use fluxion_fleet_types::{
    BypassConfig, BypassMode, Gateway, GatewayLogRecord, Location, NodeRef, Optimizer, SettingsAction,
    SettingsPayload, TelemetryRecord,
};

/// Partial update of a gateway's provisioning flags. `None` leaves a flag as is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayFlags {
    pub configured: Option<bool>,
    pub ready_to_config: Option<bool>,
}

/// Read access to the tree shape, write access to per-node status fields
#[async_trait]
pub trait TreeStore: Send + Sync {
    /// Ids of the immediate children of `node`.
    ///
    /// Returns `None` when `node` itself does not exist. An existing optimizer
    /// has no children and yields `Some(vec![])`.
    async fn children(&self, node: &NodeRef) -> Result<Option<Vec<String>>>;

    async fn optimizer(&self, id: &str) -> Result<Option<Optimizer>>;

    async fn gateway(&self, id: &str) -> Result<Option<Gateway>>;

    async fn location(&self, id: &str) -> Result<Option<Location>>;

    /// Ids of optimizers currently flagged online
    async fn online_optimizers(&self) -> Result<Vec<String>>;

    /// Write the bypass mode of a location, gateway or optimizer
    async fn set_bypass_mode(&self, node: &NodeRef, mode: BypassMode) -> Result<()>;

    async fn set_bypass_config(&self, optimizer_id: &str, config: &BypassConfig) -> Result<()>;

    /// Set or clear the `isSetting` / `isReset` flag matching `action`
    async fn set_pending(&self, optimizer_id: &str, action: SettingsAction, pending: bool)
    -> Result<()>;

    /// Settings most recently pushed to an optimizer
    async fn pending_settings(&self, optimizer_id: &str) -> Result<Option<SettingsPayload>>;

    async fn set_online(&self, optimizer_id: &str, online: bool) -> Result<()>;

    async fn set_gateway_flags(&self, gateway_id: &str, flags: GatewayFlags) -> Result<()>;

    /// Store name for logging
    fn name(&self) -> &str;
}

/// Append-only telemetry used as the liveness signal
#[async_trait]
pub trait TelemetryLog: Send + Sync {
    /// Whether any record for `device_id` has a timestamp in `[from, to]`
    async fn has_record_between(&self, device_id: &str, from: i64, to: i64) -> Result<bool>;

    async fn append(&self, records: &[TelemetryRecord]) -> Result<()>;

    /// Store the meter readings of one gateway report
    async fn append_gateway_log(&self, record: &GatewayLogRecord) -> Result<()>;

    /// Delete optimizer and gateway records older than `cutoff`, returning how many were removed
    async fn prune_before(&self, cutoff: i64) -> Result<u64>;

    fn name(&self) -> &str;
}

/// Fire-and-forget push channel to optimizers
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn push_settings(&self, optimizer_id: &str, payload: &SettingsPayload) -> Result<()>;

    fn name(&self) -> &str;
}

/// The singleton default-settings record
#[async_trait]
pub trait DefaultSettingsSource: Send + Sync {
    async fn defaults(&self) -> Result<Option<SettingsPayload>>;

    async fn store_defaults(&self, payload: &SettingsPayload) -> Result<()>;
}
