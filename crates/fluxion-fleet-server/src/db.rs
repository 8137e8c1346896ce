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

//! SQLite persistence implementing every engine collaborator.
//!
//! Timestamps are INTEGER unix seconds so range queries compare numerically.
//! Bypass modes and requests are stored in their wire encodings.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Utc;
use fluxion_fleet_core::{DefaultSettingsSource, DeviceTransport, GatewayFlags, TelemetryLog, TreeStore};
use fluxion_fleet_types::{
    BypassConfig, BypassMode, Enterprise, Gateway, GatewayLogRecord, Level, Location, NodeRef,
    Optimizer, PhaseReading, SettingsAction, SettingsPayload, State, TelemetryRecord,
};
use parking_lot::Mutex;
use rusqlite::{OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug)]
pub struct Database {
    conn: Mutex<rusqlite::Connection>,
}

/// Provisioning snapshot of the organizational tree
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub enterprises: Vec<Enterprise>,
    #[serde(default)]
    pub states: Vec<State>,
    #[serde(default)]
    pub locations: Vec<Location>,
    #[serde(default)]
    pub gateways: Vec<Gateway>,
    #[serde(default)]
    pub optimizers: Vec<Optimizer>,
}

impl Topology {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("Failed to read topology file: {path}"))?;
        serde_json::from_str(&content).context("Failed to parse topology JSON")
    }
}

type OptimizerRow = (String, String, bool, String, String, bool, bool);
type GatewayRow = (String, String, String, bool, bool, Option<String>, Option<String>);

fn optimizer_from_row(row: OptimizerRow) -> Result<Optimizer> {
    let (id, gateway_id, online, bypass_mode, is_bypass, is_setting, is_reset) = row;
    Ok(Optimizer {
        bypass_mode: bypass_mode.parse()?,
        is_bypass: serde_json::from_str(&is_bypass)
            .with_context(|| format!("Invalid isBypass stored for optimizer '{id}'"))?,
        id,
        gateway_id,
        online,
        is_setting,
        is_reset,
    })
}

fn gateway_from_row(row: GatewayRow) -> Result<Gateway> {
    let (id, location_id, bypass_mode, configured, ready_to_config, network_ssid, network_password) =
        row;
    Ok(Gateway {
        bypass_mode: bypass_mode.parse()?,
        id,
        location_id,
        configured,
        ready_to_config,
        network_ssid,
        network_password,
    })
}

/// Table holding the records of `level`
fn table(level: Level) -> &'static str {
    match level {
        Level::Enterprise => "enterprises",
        Level::State => "states",
        Level::Location => "locations",
        Level::Gateway => "gateways",
        Level::Optimizer => "optimizers",
    }
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        let conn = rusqlite::Connection::open(path)
            .with_context(|| format!("Failed to open database: {path}"))?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS enterprises (
                id             TEXT PRIMARY KEY,
                name           TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS states (
                id             TEXT PRIMARY KEY,
                enterprise_id  TEXT NOT NULL,
                state_code     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS locations (
                id             TEXT PRIMARY KEY,
                enterprise_id  TEXT NOT NULL,
                state_code     TEXT NOT NULL,
                name           TEXT NOT NULL DEFAULT '',
                bypass_mode    TEXT NOT NULL DEFAULT 'OFF'
            );

            CREATE TABLE IF NOT EXISTS gateways (
                id               TEXT PRIMARY KEY,
                location_id      TEXT NOT NULL,
                bypass_mode      TEXT NOT NULL DEFAULT 'OFF',
                configured       INTEGER NOT NULL DEFAULT 0,
                ready_to_config  INTEGER NOT NULL DEFAULT 0,
                network_ssid     TEXT,
                network_password TEXT
            );

            CREATE TABLE IF NOT EXISTS optimizers (
                id             TEXT PRIMARY KEY,
                gateway_id     TEXT NOT NULL,
                online         INTEGER NOT NULL DEFAULT 0,
                bypass_mode    TEXT NOT NULL DEFAULT 'OFF',
                is_bypass      TEXT NOT NULL DEFAULT '{\"type\":\"default\",\"is_schedule\":false,\"time\":\"\"}',
                is_setting     INTEGER NOT NULL DEFAULT 0,
                is_reset       INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS optimizer_settings (
                optimizer_id   TEXT PRIMARY KEY,
                payload        TEXT NOT NULL,
                updated_at     INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS default_settings (
                id             INTEGER PRIMARY KEY CHECK (id = 1),
                payload        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS telemetry (
                id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id          TEXT NOT NULL,
                gateway_id         TEXT NOT NULL,
                timestamp          INTEGER NOT NULL,
                room_temperature   REAL NOT NULL DEFAULT 0,
                humidity           REAL NOT NULL DEFAULT 0,
                coil_temperature   REAL NOT NULL DEFAULT 0,
                mode               TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS gateway_telemetry (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                gateway_id     TEXT NOT NULL,
                timestamp      INTEGER NOT NULL,
                phases         TEXT NOT NULL DEFAULT '{}',
                kvah           REAL NOT NULL DEFAULT 0,
                kwh            REAL NOT NULL DEFAULT 0,
                power_factor   REAL NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_locations_state
                ON locations(enterprise_id, state_code);
            CREATE INDEX IF NOT EXISTS idx_gateways_location
                ON gateways(location_id);
            CREATE INDEX IF NOT EXISTS idx_optimizers_gateway
                ON optimizers(gateway_id);
            CREATE INDEX IF NOT EXISTS idx_telemetry_device_time
                ON telemetry(device_id, timestamp);
            CREATE INDEX IF NOT EXISTS idx_gateway_telemetry_time
                ON gateway_telemetry(gateway_id, timestamp);",
        )
        .context("Failed to initialize database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ============= Provisioning =============

    /// Insert or update the tree shape. Status fields of existing rows are kept.
    pub fn import_topology(&self, topology: &Topology) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for enterprise in &topology.enterprises {
            tx.execute(
                "INSERT INTO enterprises (id, name) VALUES (?1, ?2)
                 ON CONFLICT(id) DO UPDATE SET name = excluded.name",
                params![enterprise.id, enterprise.name],
            )?;
        }
        for state in &topology.states {
            tx.execute(
                "INSERT INTO states (id, enterprise_id, state_code) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET
                    enterprise_id = excluded.enterprise_id,
                    state_code = excluded.state_code",
                params![state.id, state.enterprise_id, state.state_code],
            )?;
        }
        for location in &topology.locations {
            tx.execute(
                "INSERT INTO locations (id, enterprise_id, state_code, name, bypass_mode)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    enterprise_id = excluded.enterprise_id,
                    state_code = excluded.state_code,
                    name = excluded.name",
                params![
                    location.id,
                    location.enterprise_id,
                    location.state_code,
                    location.name,
                    location.bypass_mode.as_wire()
                ],
            )?;
        }
        for gateway in &topology.gateways {
            tx.execute(
                "INSERT INTO gateways (id, location_id, bypass_mode, configured, ready_to_config, network_ssid, network_password)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                    location_id = excluded.location_id,
                    network_ssid = excluded.network_ssid,
                    network_password = excluded.network_password",
                params![
                    gateway.id,
                    gateway.location_id,
                    gateway.bypass_mode.as_wire(),
                    gateway.configured,
                    gateway.ready_to_config,
                    gateway.network_ssid,
                    gateway.network_password
                ],
            )?;
        }
        for optimizer in &topology.optimizers {
            tx.execute(
                "INSERT INTO optimizers (id, gateway_id, online, bypass_mode, is_bypass, is_setting, is_reset)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET gateway_id = excluded.gateway_id",
                params![
                    optimizer.id,
                    optimizer.gateway_id,
                    optimizer.online,
                    optimizer.bypass_mode.as_wire(),
                    serde_json::to_string(&optimizer.is_bypass)?,
                    optimizer.is_setting,
                    optimizer.is_reset
                ],
            )?;
        }

        tx.commit()?;
        info!(
            enterprises = topology.enterprises.len(),
            states = topology.states.len(),
            locations = topology.locations.len(),
            gateways = topology.gateways.len(),
            optimizers = topology.optimizers.len(),
            "Topology imported"
        );
        Ok(())
    }

    // ============= Tree queries =============

    fn exists(&self, node: &NodeRef) -> Result<bool> {
        let conn = self.conn.lock();
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?1)", table(node.level));
        Ok(conn.query_row(&sql, params![node.id], |row| row.get(0))?)
    }

    fn ids(&self, sql: &str, args: impl rusqlite::Params) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map(args, |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn query_children(&self, node: &NodeRef) -> Result<Option<Vec<String>>> {
        let children = match node.level {
            Level::Enterprise => {
                if !self.exists(node)? {
                    return Ok(None);
                }
                self.ids(
                    "SELECT id FROM states WHERE enterprise_id = ?1 ORDER BY id",
                    params![node.id],
                )?
            }
            Level::State => {
                let key: Option<(String, String)> = self
                    .conn
                    .lock()
                    .query_row(
                        "SELECT enterprise_id, state_code FROM states WHERE id = ?1",
                        params![node.id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let Some((enterprise_id, state_code)) = key else {
                    return Ok(None);
                };
                self.ids(
                    "SELECT id FROM locations WHERE enterprise_id = ?1 AND state_code = ?2 ORDER BY id",
                    params![enterprise_id, state_code],
                )?
            }
            Level::Location => {
                if !self.exists(node)? {
                    return Ok(None);
                }
                self.ids(
                    "SELECT id FROM gateways WHERE location_id = ?1 ORDER BY id",
                    params![node.id],
                )?
            }
            Level::Gateway => {
                if !self.exists(node)? {
                    return Ok(None);
                }
                self.ids(
                    "SELECT id FROM optimizers WHERE gateway_id = ?1 ORDER BY id",
                    params![node.id],
                )?
            }
            Level::Optimizer => {
                if !self.exists(node)? {
                    return Ok(None);
                }
                Vec::new()
            }
        };
        Ok(Some(children))
    }

    fn query_optimizer(&self, id: &str) -> Result<Option<Optimizer>> {
        let row: Option<OptimizerRow> = self
            .conn
            .lock()
            .query_row(
                "SELECT id, gateway_id, online, bypass_mode, is_bypass, is_setting, is_reset
                 FROM optimizers WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;
        row.map(optimizer_from_row).transpose()
    }

    fn query_gateway(&self, id: &str) -> Result<Option<Gateway>> {
        let row: Option<GatewayRow> = self
            .conn
            .lock()
            .query_row(
                "SELECT id, location_id, bypass_mode, configured, ready_to_config, network_ssid, network_password
                 FROM gateways WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()?;
        row.map(gateway_from_row).transpose()
    }

    fn query_location(&self, id: &str) -> Result<Option<Location>> {
        let row: Option<(String, String, String, String, String)> = self
            .conn
            .lock()
            .query_row(
                "SELECT id, enterprise_id, state_code, name, bypass_mode FROM locations WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()?;
        row.map(|(id, enterprise_id, state_code, name, bypass_mode)| {
            Ok(Location {
                bypass_mode: bypass_mode.parse()?,
                id,
                enterprise_id,
                state_code,
                name,
            })
        })
        .transpose()
    }

    /// Run an UPDATE that must hit exactly one existing row
    fn update_one(&self, node: &NodeRef, sql: &str, args: impl rusqlite::Params) -> Result<()> {
        let updated = self.conn.lock().execute(sql, args)?;
        if updated == 0 {
            bail!("{node} does not exist");
        }
        Ok(())
    }

    // ============= Telemetry =============

    pub fn telemetry_count(&self, device_id: &str) -> Result<u64> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM telemetry WHERE device_id = ?1",
            params![device_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn insert_telemetry(&self, records: &[TelemetryRecord]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO telemetry (device_id, gateway_id, timestamp, room_temperature, humidity, coil_temperature, mode)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.device_id,
                    record.gateway_id,
                    record.timestamp,
                    record.room_temperature_c,
                    record.humidity,
                    record.coil_temperature_c,
                    record.mode
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Meter logs of one gateway, oldest first
    pub fn gateway_logs(&self, gateway_id: &str) -> Result<Vec<GatewayLogRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, phases, kvah, kwh, power_factor FROM gateway_telemetry
             WHERE gateway_id = ?1 ORDER BY timestamp, id",
        )?;
        let rows = stmt
            .query_map(params![gateway_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(timestamp, phases, kvah, kwh, power_factor)| {
                let phases: BTreeMap<String, PhaseReading> =
                    serde_json::from_str(&phases).context("Invalid phase readings stored")?;
                Ok(GatewayLogRecord {
                    gateway_id: gateway_id.to_owned(),
                    timestamp,
                    phases,
                    kvah,
                    kwh,
                    power_factor,
                })
            })
            .collect()
    }

    fn query_payload(&self, sql: &str, key: &str) -> Result<Option<SettingsPayload>> {
        let json: Option<String> = self
            .conn
            .lock()
            .query_row(sql, params![key], |row| row.get(0))
            .optional()?;
        json.map(|json| serde_json::from_str(&json).context("Invalid settings payload stored"))
            .transpose()
    }
}

#[async_trait]
impl TreeStore for Database {
    async fn children(&self, node: &NodeRef) -> Result<Option<Vec<String>>> {
        self.query_children(node)
    }

    async fn optimizer(&self, id: &str) -> Result<Option<Optimizer>> {
        self.query_optimizer(id)
    }

    async fn gateway(&self, id: &str) -> Result<Option<Gateway>> {
        self.query_gateway(id)
    }

    async fn location(&self, id: &str) -> Result<Option<Location>> {
        self.query_location(id)
    }

    async fn online_optimizers(&self) -> Result<Vec<String>> {
        self.ids("SELECT id FROM optimizers WHERE online = 1 ORDER BY id", [])
    }

    async fn set_bypass_mode(&self, node: &NodeRef, mode: BypassMode) -> Result<()> {
        if !node.level.carries_bypass_mode() {
            bail!("{node} carries no bypass mode");
        }
        let sql = format!("UPDATE {} SET bypass_mode = ?1 WHERE id = ?2", table(node.level));
        self.update_one(node, &sql, params![mode.as_wire(), node.id])
    }

    async fn set_bypass_config(&self, optimizer_id: &str, config: &BypassConfig) -> Result<()> {
        self.update_one(
            &NodeRef::optimizer(optimizer_id),
            "UPDATE optimizers SET is_bypass = ?1 WHERE id = ?2",
            params![serde_json::to_string(config)?, optimizer_id],
        )
    }

    async fn set_pending(
        &self,
        optimizer_id: &str,
        action: SettingsAction,
        pending: bool,
    ) -> Result<()> {
        let sql = match action {
            SettingsAction::Set => "UPDATE optimizers SET is_setting = ?1 WHERE id = ?2",
            SettingsAction::Reset => "UPDATE optimizers SET is_reset = ?1 WHERE id = ?2",
        };
        self.update_one(&NodeRef::optimizer(optimizer_id), sql, params![pending, optimizer_id])
    }

    async fn pending_settings(&self, optimizer_id: &str) -> Result<Option<SettingsPayload>> {
        self.query_payload(
            "SELECT payload FROM optimizer_settings WHERE optimizer_id = ?1",
            optimizer_id,
        )
    }

    async fn set_online(&self, optimizer_id: &str, online: bool) -> Result<()> {
        self.update_one(
            &NodeRef::optimizer(optimizer_id),
            "UPDATE optimizers SET online = ?1 WHERE id = ?2",
            params![online, optimizer_id],
        )
    }

    async fn set_gateway_flags(&self, gateway_id: &str, flags: GatewayFlags) -> Result<()> {
        self.update_one(
            &NodeRef::gateway(gateway_id),
            "UPDATE gateways SET
                configured = COALESCE(?1, configured),
                ready_to_config = COALESCE(?2, ready_to_config)
             WHERE id = ?3",
            params![flags.configured, flags.ready_to_config, gateway_id],
        )
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

#[async_trait]
impl TelemetryLog for Database {
    async fn has_record_between(&self, device_id: &str, from: i64, to: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM telemetry WHERE device_id = ?1 AND timestamp BETWEEN ?2 AND ?3)",
            params![device_id, from, to],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    async fn append(&self, records: &[TelemetryRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        self.insert_telemetry(records)
    }

    async fn append_gateway_log(&self, record: &GatewayLogRecord) -> Result<()> {
        let phases = serde_json::to_string(&record.phases)?;
        self.conn.lock().execute(
            "INSERT INTO gateway_telemetry (gateway_id, timestamp, phases, kvah, kwh, power_factor)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.gateway_id,
                record.timestamp,
                phases,
                record.kvah,
                record.kwh,
                record.power_factor
            ],
        )?;
        Ok(())
    }

    async fn prune_before(&self, cutoff: i64) -> Result<u64> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM telemetry WHERE timestamp < ?1", params![cutoff])?
            + tx.execute("DELETE FROM gateway_telemetry WHERE timestamp < ?1", params![cutoff])?;
        tx.commit()?;
        Ok(deleted as u64)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

/// Pushes are stored for the gateway to pull through its config view
#[async_trait]
impl DeviceTransport for Database {
    async fn push_settings(&self, optimizer_id: &str, payload: &SettingsPayload) -> Result<()> {
        if !self.exists(&NodeRef::optimizer(optimizer_id))? {
            bail!("optimizer '{optimizer_id}' does not exist");
        }
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO optimizer_settings (optimizer_id, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(optimizer_id) DO UPDATE SET payload = excluded.payload, updated_at = excluded.updated_at",
            params![optimizer_id, serde_json::to_string(payload)?, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite-outbox"
    }
}

#[async_trait]
impl DefaultSettingsSource for Database {
    async fn defaults(&self) -> Result<Option<SettingsPayload>> {
        let conn = self.conn.lock();
        let json: Option<String> = conn
            .query_row("SELECT payload FROM default_settings WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        json.map(|json| serde_json::from_str(&json).context("Invalid default settings stored"))
            .transpose()
    }

    async fn store_defaults(&self, payload: &SettingsPayload) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO default_settings (id, payload) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
            params![serde_json::to_string(payload)?],
        )?;
        Ok(())
    }
}
