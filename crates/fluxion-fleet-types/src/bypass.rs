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

//! Bypass state as persisted on optimizers, gateways and locations.

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============= Bypass Mode =============

/// Persisted bypass status of a node.
///
/// On optimizers this is the leaf state machine: `InProgress(true)` and
/// `InProgress(false)` are the pending-on and pending-off states written at
/// dispatch, `On`/`Off` are written when the device acknowledges. On gateways
/// and locations it is the aggregate derived from the children.
///
/// Wire encoding is kept verbatim for device compatibility:
/// `"OFF"`, `"ON"`, `"IN_PROGRESS_true"`, `"IN_PROGRESS_false"`, `"Pending"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BypassMode {
    #[default]
    Off,
    On,
    /// Command dispatched, waiting for acknowledgement. Holds the desired state.
    InProgress(bool),
    /// Legacy pending marker without a target state
    Pending,
}

impl BypassMode {
    /// Settled mode for the given state
    pub fn settled(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }

    /// `Some(on)` for `On`/`Off`, `None` while pending
    pub fn as_settled(self) -> Option<bool> {
        match self {
            Self::On => Some(true),
            Self::Off => Some(false),
            Self::InProgress(_) | Self::Pending => None,
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
            Self::InProgress(true) => "IN_PROGRESS_true",
            Self::InProgress(false) => "IN_PROGRESS_false",
            Self::Pending => "Pending",
        }
    }
}

impl fmt::Display for BypassMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for BypassMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "OFF" => Ok(Self::Off),
            "ON" => Ok(Self::On),
            "IN_PROGRESS_true" => Ok(Self::InProgress(true)),
            "IN_PROGRESS_false" => Ok(Self::InProgress(false)),
            "Pending" => Ok(Self::Pending),
            _ => Err(anyhow::anyhow!("Unknown bypass mode: '{s}'")),
        }
    }
}

impl TryFrom<String> for BypassMode {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BypassMode> for String {
    fn from(mode: BypassMode) -> Self {
        mode.as_wire().to_owned()
    }
}

// ============= Bypass Request =============

/// Requested bypass type stored in an optimizer's `isBypass.type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BypassType {
    True,
    False,
    /// No outstanding request, firmware runs its own control
    #[default]
    Default,
}

impl BypassType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::True => "true",
            Self::False => "false",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for BypassType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outstanding bypass request of an optimizer (`isBypass`)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BypassConfig {
    #[serde(rename = "type")]
    pub kind: BypassType,
    #[serde(default)]
    pub is_schedule: bool,
    /// Activation time of a scheduled bypass. Encoded as `""` when absent.
    #[serde(default, with = "schedule_time")]
    pub time: Option<DateTime<Utc>>,
}

impl BypassConfig {
    /// Request written at dispatch time.
    ///
    /// Turning bypass on may be scheduled; turning it off never is.
    pub fn requested(desired: bool, schedule: Option<DateTime<Utc>>) -> Self {
        if desired {
            Self {
                kind: BypassType::True,
                is_schedule: schedule.is_some(),
                time: schedule,
            }
        } else {
            Self {
                kind: BypassType::False,
                is_schedule: false,
                time: None,
            }
        }
    }

    /// Request cleared after the device acknowledged
    pub fn settled() -> Self {
        Self::default()
    }

    /// Bypass type reported to the gateway at `now`.
    ///
    /// A scheduled `true` stays `default` until its activation time has been
    /// reached, so no background clock is needed to flip it.
    pub fn effective(&self, now: DateTime<Utc>) -> BypassType {
        match self.kind {
            BypassType::True if self.is_schedule => match self.time {
                Some(at) if now >= at => BypassType::True,
                _ => BypassType::Default,
            },
            BypassType::True => BypassType::True,
            BypassType::False => BypassType::False,
            BypassType::Default => BypassType::Default,
        }
    }
}

/// Parse a schedule time given as RFC 3339, a naive UTC timestamp, or unix seconds
pub fn parse_schedule_time(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(at) = DateTime::parse_from_rfc3339(value) {
        return Ok(at.with_timezone(&Utc));
    }
    if let Ok(secs) = value.parse::<i64>() {
        return DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| anyhow::anyhow!("Schedule time out of range: {secs}"));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(anyhow::anyhow!("Unrecognized schedule time: '{value}'"))
}

mod schedule_time {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTime {
        Seconds(i64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(
        time: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match time {
            Some(at) => serializer.serialize_str(&at.to_rfc3339()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        match Option::<RawTime>::deserialize(deserializer)? {
            None => Ok(None),
            Some(RawTime::Text(text)) if text.trim().is_empty() => Ok(None),
            Some(RawTime::Text(text)) => super::parse_schedule_time(&text)
                .map(Some)
                .map_err(D::Error::custom),
            Some(RawTime::Seconds(secs)) => DateTime::from_timestamp(secs, 0)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("schedule time out of range: {secs}"))),
        }
    }
}
