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

use std::sync::Arc;

use chrono::Utc;
use serde_json::{Value, json};

use fluxion_fleet_core::{EngineConfig, FleetEngine, TreeStore};
use fluxion_fleet_types::BypassMode;
use fluxion_fleet_server::api::{self, AppState};
use fluxion_fleet_server::db::{Database, Topology};

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

fn topology() -> Topology {
    serde_json::from_value(json!({
        "enterprises": [{"id": "ent-1", "name": "Acme Cooling"}],
        "states": [{"id": "st-ka", "enterprise_id": "ent-1", "state_code": "KA"}],
        "locations": [{"id": "loc-1", "enterprise_id": "ent-1", "state_code": "KA"}],
        "gateways": [
            {"id": "gw-1", "location_id": "loc-1", "network_ssid": "site-net", "network_password": "pw"},
            {"id": "gw-2", "location_id": "loc-1"}
        ],
        "optimizers": [
            {"id": "opt-1", "gateway_id": "gw-1"},
            {"id": "opt-2", "gateway_id": "gw-1"},
            {"id": "opt-3", "gateway_id": "gw-1"},
            {"id": "opt-4", "gateway_id": "gw-2"}
        ]
    }))
    .expect("valid topology")
}

struct TestServer {
    port: u16,
    db: Arc<Database>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let db = Arc::new(Database::open(":memory:").expect("Failed to open in-memory database"));
        db.import_topology(&topology())
            .expect("Failed to import topology");

        let engine = Arc::new(FleetEngine::new(
            db.clone(),
            db.clone(),
            db.clone(),
            db.clone(),
            EngineConfig::default(),
        ));
        let app = api::router(AppState { engine });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let port = listener.local_addr().expect("No local addr").port();

        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Test server error");
        });

        Self {
            port,
            db,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{path}", self.port)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send GET request")
    }

    async fn post(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send POST request")
    }

    async fn put(&self, path: &str, body: &Value) -> reqwest::Response {
        self.client
            .put(self.url(path))
            .json(body)
            .send()
            .await
            .expect("Failed to send PUT request")
    }

    /// Report telemetry for the given optimizers of a gateway at the current time
    async fn report(&self, gateway: &str, optimizers: &[&str]) -> Value {
        let details: Vec<Value> = optimizers
            .iter()
            .map(|id| {
                json!({
                    "OptimizerID": id,
                    "RoomTemperature": 24.0,
                    "Humidity": "nan",
                    "CoilTemperature": 11.5,
                    "OptimizerMode": "OPTIMIZATION"
                })
            })
            .collect();
        let resp = self
            .post(
                "/api/telemetry",
                &json!({
                    "GatewayID": gateway,
                    "TimeStamp": Utc::now().timestamp().to_string(),
                    "Phases": {
                        "Ph1": {"Voltage": "231.2", "Current": "nan", "ActivePower": 1200,
                                "PowerFactor": 0.97, "ApparentPower": 1237}
                    },
                    "KVAH": "nan",
                    "KWH": 12.5,
                    "PF": 0.97,
                    "OptimizerDetails": details
                }),
            )
            .await;
        assert_eq!(resp.status(), 200);
        resp.json().await.unwrap()
    }
}

fn settings_body(group: &str, id: &str) -> Value {
    json!({
        "group": group,
        "id": id,
        "firstPowerOnObservationTime": 5,
        "maxObservatioTime": 30,
        "OptimizationOnTime": 20,
        "thermostatMonitoringInterval": 15,
        "thermostatMonitoringTimeIncrement": 2,
        "steadyStateTimeRoomTempTolerance": 0.5,
        "steadyStateCoilTempTolerance": 1.0
    })
}

// ---------------------------------------------------------------------------
// Hierarchy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn health_returns_ok() {
    let server = TestServer::start().await;
    let resp = server.get("/health").await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn leaves_resolve_for_every_level() {
    let server = TestServer::start().await;

    let body: Value = server
        .get("/api/hierarchy/enterprise/ent-1/leaves")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["leaves"], json!(["opt-1", "opt-2", "opt-3", "opt-4"]));

    let body: Value = server
        .get("/api/hierarchy/gateway/gw-2/leaves")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(body["leaves"], json!(["opt-4"]));
}

#[tokio::test]
async fn leaves_reject_unknown_level_and_id() {
    let server = TestServer::start().await;

    let resp = server.get("/api/hierarchy/planet/earth/leaves").await;
    assert_eq!(resp.status(), 400);

    let resp = server.get("/api/hierarchy/location/loc-404/leaves").await;
    assert_eq!(resp.status(), 404);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert_eq!(body["key"], "location");
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

#[tokio::test]
async fn settings_denied_when_any_optimizer_is_silent() {
    let server = TestServer::start().await;
    server.report("gw-1", &["opt-1", "opt-2"]).await;

    let resp = server
        .post("/api/settings/set", &settings_body("gateway", "gw-1"))
        .await;
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["key"], "optimizer_status");
    assert_eq!(body["offline"], json!(["opt-3"]));

    let resp = server
        .post("/api/settings/set", &settings_body("gateway", "gw-2"))
        .await;
    assert_eq!(resp.status(), 503);
}

#[tokio::test]
async fn settings_flow_through_gateway_config() {
    let server = TestServer::start().await;
    server.report("gw-1", &["opt-1", "opt-2", "opt-3"]).await;

    let resp = server
        .post("/api/settings/set", &settings_body("gateway", "gw-1"))
        .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["leaves"], 3);

    let config: Value = server.get("/api/gateways/gw-1/config").await.json().await.unwrap();
    assert_eq!(config["gatewayID"], "gw-1");
    let first = &config["optimizer"][0];
    assert_eq!(first["is_setting"], true);
    assert_eq!(first["settings"]["maxObservatioTime"], 30.0);

    let resp = server
        .post(
            "/api/acknowledgement",
            &json!([{"OptimizerID": "opt-1", "purpose": "set"}]),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let status: Value = server
        .get("/api/optimizers/opt-1/status")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status["is_setting"], false);
    assert!(status.get("settings").is_none());
}

#[tokio::test]
async fn reset_requires_default_record() {
    let server = TestServer::start().await;
    server.report("gw-2", &["opt-4"]).await;

    let resp = server.get("/api/settings/default").await;
    assert_eq!(resp.status(), 500);

    let resp = server
        .post("/api/settings/reset", &json!({"group": "optimizer", "id": "opt-4"}))
        .await;
    assert_eq!(resp.status(), 500);

    let mut defaults = settings_body("", "");
    defaults.as_object_mut().unwrap().remove("group");
    defaults.as_object_mut().unwrap().remove("id");
    let resp = server.put("/api/settings/default", &defaults).await;
    assert_eq!(resp.status(), 200);

    let body: Value = server.get("/api/settings/default").await.json().await.unwrap();
    assert_eq!(body["data"]["OptimizationOnTime"], 20.0);

    let resp = server
        .post("/api/settings/reset", &json!({"group": "optimizer", "id": "opt-4"}))
        .await;
    assert_eq!(resp.status(), 200);
    let status: Value = server
        .get("/api/optimizers/opt-4/status")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status["is_reset"], true);
}

// ---------------------------------------------------------------------------
// Bypass
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bypass_accepted_while_offline_and_settles_on_acks() {
    let server = TestServer::start().await;

    let resp = server
        .post(
            "/api/bypass",
            &json!({"group": "gateway", "id": "gw-1", "state": true, "is_schedule": false}),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let acks = json!([
        {"OptimizerID": "opt-1", "purpose": "bypass_on"},
        {"OptimizerID": "opt-2", "purpose": "bypass_on"},
        {"OptimizerID": "opt-2", "purpose": "bypass_sideways"}
    ]);
    let resp = server.post("/api/acknowledgement", &acks).await;
    assert_eq!(resp.status(), 500);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["results"][0]["success"], true);
    assert_eq!(report["results"][2]["success"], false);
    assert_eq!(report["reconciliation"]["gateways"]["gw-1"], "IN_PROGRESS_true");

    let resp = server
        .post(
            "/api/acknowledgement",
            &json!([{"OptimizerID": "opt-3", "purpose": "bypass_on"}]),
        )
        .await;
    assert_eq!(resp.status(), 200);
    let report: Value = resp.json().await.unwrap();
    assert_eq!(report["reconciliation"]["gateways"]["gw-1"], "ON");

    let gateway = server.db.gateway("gw-1").await.unwrap().unwrap();
    assert_eq!(gateway.bypass_mode, BypassMode::On);
    let location = server.db.location("loc-1").await.unwrap().unwrap();
    assert_eq!(location.bypass_mode, BypassMode::Off);
}

#[tokio::test]
async fn scheduled_bypass_reads_default_until_due() {
    let server = TestServer::start().await;
    let later = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();

    let resp = server
        .post(
            "/api/bypass",
            &json!({"group": "optimizer", "id": "opt-4", "state": true,
                    "is_schedule": true, "schedule_time": later}),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let status: Value = server
        .get("/api/optimizers/opt-4/status")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(status["is_bypass"], "default");

    let resp = server
        .post(
            "/api/bypass",
            &json!({"group": "optimizer", "id": "opt-4", "state": true, "is_schedule": true}),
        )
        .await;
    assert_eq!(resp.status(), 400);
}

// ---------------------------------------------------------------------------
// Provisioning & telemetry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn provisioning_handshake() {
    let server = TestServer::start().await;

    let resp = server.post("/api/gateways/gw-1/ready", &json!({})).await;
    assert_eq!(resp.status(), 200);

    let property: Value = server
        .get("/api/gateways/gw-1/installation")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(property, json!({"gatewayID": "gw-1", "property": null}));

    let resp = server
        .post(
            "/api/gateways/online-check",
            &json!({"gateway_id": "gw-1", "onlineOptimizers": ["opt-1", "opt-2", ""]}),
        )
        .await;
    assert_eq!(resp.status(), 503);

    let resp = server
        .post(
            "/api/gateways/online-check",
            &json!({"gateway_id": "gw-1", "onlineOptimizers": ["opt-1", "opt-2", "opt-3"]}),
        )
        .await;
    assert_eq!(resp.status(), 200);

    let property: Value = server
        .get("/api/gateways/gw-1/installation")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(property["ssid"], "site-net");
    assert_eq!(property["optimizer_list"], json!(["opt-1", "opt-2", "opt-3"]));

    let resp = server.post("/api/gateways/gw-1/configured", &json!({})).await;
    assert_eq!(resp.status(), 200);
    let config: Value = server.get("/api/gateways/gw-1/config").await.json().await.unwrap();
    assert_eq!(config["config"], false);
    assert_eq!(config["is_Ready_toConfig"], false);
}

#[tokio::test]
async fn telemetry_refreshes_online_flags() {
    let server = TestServer::start().await;

    let summary = server.report("gw-1", &["opt-1", "opt-3", "opt-9"]).await;
    assert_eq!(summary["online"], json!(["opt-1", "opt-3"]));
    assert_eq!(summary["offline"], json!(["opt-2"]));
    assert_eq!(summary["unknown"], json!(["opt-9"]));
    assert_eq!(server.db.telemetry_count("opt-1").unwrap(), 1);
    assert_eq!(server.db.telemetry_count("opt-2").unwrap(), 0);

    let logs = server.db.gateway_logs("gw-1").unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].kvah, 0.0);
    assert_eq!(logs[0].kwh, 12.5);
    assert_eq!(logs[0].phases["Ph1"].voltage, 231.2);
    assert_eq!(logs[0].phases["Ph1"].current, 0.0);

    let resp = server
        .post(
            "/api/telemetry",
            &json!({"GatewayID": "gw-404", "TimeStamp": 1, "OptimizerDetails": []}),
        )
        .await;
    assert_eq!(resp.status(), 404);
}
