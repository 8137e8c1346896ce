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

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a device is acknowledging
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckPurpose {
    Set,
    Reset,
    BypassOn,
    BypassOff,
}

impl AckPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Reset => "reset",
            Self::BypassOn => "bypass_on",
            Self::BypassOff => "bypass_off",
        }
    }

    /// Settled bypass state carried by a bypass acknowledgement
    pub fn bypass_state(self) -> Option<bool> {
        match self {
            Self::BypassOn => Some(true),
            Self::BypassOff => Some(false),
            Self::Set | Self::Reset => None,
        }
    }
}

impl fmt::Display for AckPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AckPurpose {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "set" => Ok(Self::Set),
            "reset" => Ok(Self::Reset),
            "bypass_on" => Ok(Self::BypassOn),
            "bypass_off" => Ok(Self::BypassOff),
            _ => Err(anyhow::anyhow!("Invalid purpose: '{s}'")),
        }
    }
}

/// One acknowledgement reported by a gateway on behalf of an optimizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    #[serde(rename = "OptimizerID")]
    pub optimizer_id: String,
    pub purpose: AckPurpose,
}

impl Ack {
    pub fn new(optimizer_id: impl Into<String>, purpose: AckPurpose) -> Self {
        Self {
            optimizer_id: optimizer_id.into(),
            purpose,
        }
    }
}
