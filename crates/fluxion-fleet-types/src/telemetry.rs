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

//! Telemetry as reported by gateways.
//!
//! Telemetry is only consumed as a liveness signal by the fleet controller,
//! but the readings are kept with each record.

use anyhow::Result;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One stored telemetry record for an optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub device_id: String,
    pub gateway_id: String,
    /// Unix seconds
    pub timestamp: i64,
    #[serde(default)]
    pub room_temperature_c: f64,
    #[serde(default)]
    pub humidity: f64,
    #[serde(default)]
    pub coil_temperature_c: f64,
    #[serde(default)]
    pub mode: String,
}

impl TelemetryRecord {
    /// Record carrying no readings, only the fact that the device reported
    pub fn new(device_id: impl Into<String>, gateway_id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            device_id: device_id.into(),
            gateway_id: gateway_id.into(),
            timestamp,
            room_temperature_c: 0.0,
            humidity: 0.0,
            coil_temperature_c: 0.0,
            mode: String::new(),
        }
    }

    pub fn from_reading(gateway_id: &str, timestamp: i64, reading: &OptimizerReading) -> Self {
        Self {
            device_id: reading.optimizer_id.trim().to_owned(),
            gateway_id: gateway_id.to_owned(),
            timestamp,
            room_temperature_c: reading.room_temperature,
            humidity: reading.humidity,
            coil_temperature_c: reading.coil_temperature,
            mode: reading.mode.clone(),
        }
    }
}

// ============= Gateway Report =============

/// Periodic report posted by a gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayReport {
    #[serde(rename = "GatewayID")]
    pub gateway_id: String,
    /// Unix seconds. Gateways send this as a decimal string.
    #[serde(rename = "TimeStamp", deserialize_with = "ordinal")]
    pub timestamp: i64,
    #[serde(rename = "Phases", default)]
    pub phases: BTreeMap<String, PhaseReading>,
    #[serde(rename = "KVAH", default, deserialize_with = "lenient_f64")]
    pub kvah: f64,
    #[serde(rename = "KWH", default, deserialize_with = "lenient_f64")]
    pub kwh: f64,
    #[serde(rename = "PF", default, deserialize_with = "lenient_f64")]
    pub power_factor: f64,
    /// Optimizers the gateway heard from in this period
    #[serde(rename = "OptimizerDetails", default)]
    pub optimizers: Vec<OptimizerReading>,
}

/// Per-phase meter reading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PhaseReading {
    #[serde(rename = "Voltage", default, deserialize_with = "lenient_f64")]
    pub voltage: f64,
    #[serde(rename = "Current", default, deserialize_with = "lenient_f64")]
    pub current: f64,
    #[serde(rename = "ActivePower", default, deserialize_with = "lenient_f64")]
    pub active_power: f64,
    #[serde(rename = "PowerFactor", default, deserialize_with = "lenient_f64")]
    pub power_factor: f64,
    #[serde(rename = "ApparentPower", default, deserialize_with = "lenient_f64")]
    pub apparent_power: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerReading {
    #[serde(rename = "OptimizerID")]
    pub optimizer_id: String,
    #[serde(rename = "RoomTemperature", default, deserialize_with = "lenient_f64")]
    pub room_temperature: f64,
    #[serde(rename = "Humidity", default, deserialize_with = "lenient_f64")]
    pub humidity: f64,
    #[serde(rename = "CoilTemperature", default, deserialize_with = "lenient_f64")]
    pub coil_temperature: f64,
    #[serde(rename = "OptimizerMode", default)]
    pub mode: String,
}

// ============= Gateway Log =============

/// Meter readings of one gateway report, stored for energy audits.
///
/// Non-finite readings are already zero at this point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayLogRecord {
    pub gateway_id: String,
    pub timestamp: i64,
    #[serde(default)]
    pub phases: BTreeMap<String, PhaseReading>,
    pub kvah: f64,
    pub kwh: f64,
    pub power_factor: f64,
}

impl GatewayLogRecord {
    pub fn from_report(gateway_id: &str, report: &GatewayReport) -> Self {
        Self {
            gateway_id: gateway_id.to_owned(),
            timestamp: report.timestamp,
            phases: report.phases.clone(),
            kvah: report.kvah,
            kwh: report.kwh,
            power_factor: report.power_factor,
        }
    }
}

/// Parse a timestamp ordinal as an integer.
///
/// Ordinals must never be compared as strings: `"999" > "1000"` lexically.
pub fn parse_ordinal(value: &str) -> Result<i64> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|e| anyhow::anyhow!("Invalid timestamp '{value}': {e}"))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOrdinal {
    Integer(i64),
    Text(String),
}

fn ordinal<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    match RawOrdinal::deserialize(deserializer)? {
        RawOrdinal::Integer(value) => Ok(value),
        RawOrdinal::Text(text) => parse_ordinal(&text).map_err(D::Error::custom),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

/// Meter readings arrive as numbers, numeric strings, or `"nan"`. Anything
/// that is not a finite number reads as zero.
fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = match Option::<RawNumber>::deserialize(deserializer)? {
        Some(RawNumber::Number(value)) => value,
        Some(RawNumber::Text(text)) => text.trim().parse::<f64>().unwrap_or(0.0),
        None => 0.0,
    };
    Ok(if value.is_finite() { value } else { 0.0 })
}
