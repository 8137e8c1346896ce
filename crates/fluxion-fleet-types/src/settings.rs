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

use serde::{Deserialize, Serialize};

/// Optimizer tuning parameters pushed to devices.
///
/// Field names on the wire are the ones the firmware parses, typos included.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SettingsPayload {
    #[serde(rename = "firstPowerOnObservationTime")]
    pub first_power_on_observation_time: f64,
    #[serde(rename = "maxObservatioTime")]
    pub max_observation_time: f64,
    #[serde(rename = "OptimizationOnTime")]
    pub optimization_on_time: f64,
    #[serde(rename = "thermostatMonitoringInterval")]
    pub thermostat_monitoring_interval: f64,
    #[serde(rename = "thermostatMonitoringTimeIncrement")]
    pub thermostat_monitoring_time_increment: f64,
    #[serde(rename = "steadyStateTimeRoomTempTolerance")]
    pub steady_state_time_room_temp_tolerance: f64,
    #[serde(rename = "steadyStateCoilTempTolerance")]
    pub steady_state_coil_temp_tolerance: f64,
}

/// Whether a settings push applies caller values or restores the defaults.
///
/// Both travel through the same dispatch path; only the pending flag differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingsAction {
    Set,
    Reset,
}

impl SettingsAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Reset => "reset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_uses_firmware_field_names() {
        let payload = SettingsPayload {
            first_power_on_observation_time: 5.0,
            max_observation_time: 30.0,
            optimization_on_time: 15.0,
            thermostat_monitoring_interval: 2.0,
            thermostat_monitoring_time_increment: 1.0,
            steady_state_time_room_temp_tolerance: 0.5,
            steady_state_coil_temp_tolerance: 1.5,
        };
        let json = serde_json::to_value(payload).unwrap();
        assert_eq!(json["maxObservatioTime"], 30.0);
        assert_eq!(json["OptimizationOnTime"], 15.0);
        assert_eq!(json["steadyStateCoilTempTolerance"], 1.5);
        assert_eq!(json.as_object().unwrap().len(), 7);
    }

    #[test]
    fn test_payload_rejects_missing_field() {
        let result: Result<SettingsPayload, _> =
            serde_json::from_str(r#"{"firstPowerOnObservationTime": 5}"#);
        assert!(result.is_err());
    }
}
