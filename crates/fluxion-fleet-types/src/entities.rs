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

//! Records of the five-level organizational tree.
//!
//! Records are provisioned externally. The fleet controller only reads the
//! tree shape and mutates the status fields.

use serde::{Deserialize, Serialize};

use crate::bypass::{BypassConfig, BypassMode};

/// Root of the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enterprise {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

/// A state within an enterprise.
///
/// Locations link to a state through the `(enterprise_id, state_code)` pair
/// rather than through the state's own id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub id: String,
    pub enterprise_id: String,
    pub state_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: String,
    pub enterprise_id: String,
    pub state_code: String,
    #[serde(default)]
    pub name: String,
    /// Aggregate of the gateways' modes
    #[serde(default)]
    pub bypass_mode: BypassMode,
}

/// Power-metering gateway relaying optimizer telemetry and commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gateway {
    pub id: String,
    pub location_id: String,
    /// Aggregate of the optimizers' modes
    #[serde(default)]
    pub bypass_mode: BypassMode,
    /// Gateway has confirmed all optimizers online and may pull its installation
    #[serde(default)]
    pub configured: bool,
    #[serde(default)]
    pub ready_to_config: bool,
    #[serde(default)]
    pub network_ssid: Option<String>,
    #[serde(default)]
    pub network_password: Option<String>,
}

/// Leaf device controlling one HVAC unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Optimizer {
    pub id: String,
    pub gateway_id: String,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub bypass_mode: BypassMode,
    #[serde(default)]
    pub is_bypass: BypassConfig,
    /// Settings were pushed and not yet acknowledged
    #[serde(default)]
    pub is_setting: bool,
    /// Defaults were pushed and not yet acknowledged
    #[serde(default)]
    pub is_reset: bool,
}

impl Optimizer {
    /// Freshly provisioned optimizer with no outstanding commands
    pub fn new(id: impl Into<String>, gateway_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            gateway_id: gateway_id.into(),
            online: false,
            bypass_mode: BypassMode::Off,
            is_bypass: BypassConfig::settled(),
            is_setting: false,
            is_reset: false,
        }
    }
}

impl Gateway {
    pub fn new(id: impl Into<String>, location_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            location_id: location_id.into(),
            bypass_mode: BypassMode::Off,
            configured: false,
            ready_to_config: false,
            network_ssid: None,
            network_password: None,
        }
    }
}

impl Location {
    pub fn new(
        id: impl Into<String>,
        enterprise_id: impl Into<String>,
        state_code: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            enterprise_id: enterprise_id.into(),
            state_code: state_code.into(),
            name: String::new(),
            bypass_mode: BypassMode::Off,
        }
    }
}
