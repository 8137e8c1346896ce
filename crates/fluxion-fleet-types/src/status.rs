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

//! Read models served to gateways.

use serde::{Deserialize, Serialize};

use crate::bypass::BypassType;
use crate::settings::SettingsPayload;

/// Configuration state of one optimizer as its gateway should apply it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveStatus {
    pub optimizer_id: String,
    /// Bypass type after evaluating any schedule
    pub is_bypass: BypassType,
    pub is_reset: bool,
    pub is_setting: bool,
    /// Present only while a settings push is outstanding
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsPayload>,
}

/// Everything a gateway pulls to configure itself and its optimizers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfigView {
    #[serde(rename = "gatewayID")]
    pub gateway_id: String,
    pub config: bool,
    #[serde(rename = "is_Ready_toConfig")]
    pub ready_to_config: bool,
    pub optimizer: Vec<EffectiveStatus>,
}

/// Network credentials and optimizer roster handed to a configured gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstallationProperty {
    Configured {
        #[serde(rename = "gatewayID")]
        gateway_id: String,
        ssid: Option<String>,
        password: Option<String>,
        optimizer_list: Vec<String>,
    },
    /// Gateway has not confirmed its optimizers yet
    Pending {
        #[serde(rename = "gatewayID")]
        gateway_id: String,
        property: Option<()>,
    },
}
