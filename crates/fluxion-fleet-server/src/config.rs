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

use anyhow::{Context, Result, bail};
use fluxion_fleet_core::EngineConfig;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetServerConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub database: DatabaseSettings,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub monitor: MonitorSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_telemetry_retention_days")]
    pub telemetry_retention_days: u32,
    /// JSON topology imported on startup
    #[serde(default)]
    pub seed_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    8100
}

fn default_db_path() -> String {
    "./data/fluxion-fleet.db".to_owned()
}

fn default_telemetry_retention_days() -> u32 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            telemetry_retention_days: default_telemetry_retention_days(),
            seed_path: None,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl FleetServerConfig {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.bind_address.is_empty() {
            bail!("server.bind_address must be set");
        }
        if self.database.path.is_empty() {
            bail!("database.path must be set");
        }
        if self.database.telemetry_retention_days == 0 {
            bail!("database.telemetry_retention_days must be greater than 0");
        }
        if self.engine.liveness_window_secs == 0 {
            bail!("engine.liveness_window_secs must be greater than 0");
        }
        if self.engine.command_deadline_secs == 0 {
            bail!("engine.command_deadline_secs must be greater than 0");
        }
        if self.monitor.sweep_interval_secs == 0 {
            bail!("monitor.sweep_interval_secs must be greater than 0");
        }
        Ok(())
    }
}
