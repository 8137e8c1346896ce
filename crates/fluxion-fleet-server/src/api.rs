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

//! HTTP surface over the fleet engine.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use fluxion_fleet_core::{AckOutcome, AckReport, CommandOutcome, FleetEngine, IngestSummary};
use fluxion_fleet_types::{
    Ack, AckPurpose, EffectiveStatus, GatewayConfigView, GatewayReport, InstallationProperty,
    Level, NodeRef, SettingsPayload, parse_schedule_time,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ApiError, ApiResult};

#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<FleetEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/hierarchy/{level}/{id}/leaves", get(leaves_handler))
        .route("/api/settings/set", post(set_settings_handler))
        .route("/api/settings/reset", post(reset_settings_handler))
        .route(
            "/api/settings/default",
            get(get_defaults_handler).put(put_defaults_handler),
        )
        .route("/api/bypass", post(bypass_handler))
        .route("/api/acknowledgement", post(acknowledgement_handler))
        .route("/api/optimizers/{id}/status", get(optimizer_status_handler))
        .route("/api/gateways/online-check", post(online_check_handler))
        .route("/api/gateways/{id}/config", get(gateway_config_handler))
        .route("/api/gateways/{id}/ready", post(gateway_ready_handler))
        .route("/api/gateways/{id}/installation", get(installation_handler))
        .route("/api/gateways/{id}/configured", post(gateway_configured_handler))
        .route("/api/telemetry", post(telemetry_handler))
        .with_state(state)
}

// ============= Shared bodies =============

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.into(),
        })
    }
}

/// Target of a command: a level name and an id at that level
#[derive(Debug, Deserialize)]
pub struct TargetRequest {
    pub group: Level,
    pub id: String,
}

impl TargetRequest {
    fn node(&self) -> NodeRef {
        NodeRef::new(self.group, self.id.trim())
    }
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub success: bool,
    pub message: String,
    #[serde(flatten)]
    pub outcome: CommandOutcome,
}

impl CommandResponse {
    fn from_outcome(outcome: CommandOutcome, done: &str) -> Json<Self> {
        let success = outcome.report.is_complete();
        let message = if success {
            done.to_owned()
        } else {
            format!(
                "{} of {} nodes updated",
                outcome.report.succeeded(),
                outcome.report.outcomes.len()
            )
        };
        Json(Self {
            success,
            message,
            outcome,
        })
    }
}

// ============= Hierarchy =============

#[derive(Debug, Serialize)]
pub struct LeavesResponse {
    pub target: NodeRef,
    pub leaves: BTreeSet<String>,
}

async fn leaves_handler(
    State(state): State<AppState>,
    Path((level, id)): Path<(String, String)>,
) -> ApiResult<Json<LeavesResponse>> {
    let level: Level = level
        .parse()
        .map_err(|e: anyhow::Error| ApiError::bad_request(e.to_string()))?;
    let target = NodeRef::new(level, id);
    let leaves = state.engine.resolve_leaves(&target).await?;
    Ok(Json(LeavesResponse { target, leaves }))
}

// ============= Settings =============

#[derive(Debug, Deserialize)]
pub struct SetSettingsRequest {
    #[serde(flatten)]
    pub target: TargetRequest,
    #[serde(flatten)]
    pub settings: SettingsPayload,
}

async fn set_settings_handler(
    State(state): State<AppState>,
    Json(request): Json<SetSettingsRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let target = request.target.node();
    let outcome = state
        .engine
        .apply_settings(&target, &request.settings, Utc::now())
        .await?;
    Ok(CommandResponse::from_outcome(outcome, "Settings dispatched"))
}

async fn reset_settings_handler(
    State(state): State<AppState>,
    Json(request): Json<TargetRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let outcome = state
        .engine
        .reset_settings(&request.node(), Utc::now())
        .await?;
    Ok(CommandResponse::from_outcome(outcome, "Default settings dispatched"))
}

#[derive(Debug, Serialize)]
pub struct DefaultsResponse {
    pub success: bool,
    pub data: SettingsPayload,
}

async fn get_defaults_handler(State(state): State<AppState>) -> ApiResult<Json<DefaultsResponse>> {
    let data = state.engine.default_settings().await?;
    Ok(Json(DefaultsResponse {
        success: true,
        data,
    }))
}

async fn put_defaults_handler(
    State(state): State<AppState>,
    Json(payload): Json<SettingsPayload>,
) -> ApiResult<Json<MessageResponse>> {
    state.engine.store_default_settings(&payload).await?;
    Ok(MessageResponse::ok("Default settings stored"))
}

// ============= Bypass =============

#[derive(Debug, Deserialize)]
pub struct BypassRequest {
    #[serde(flatten)]
    pub target: TargetRequest,
    pub state: bool,
    #[serde(default)]
    pub is_schedule: bool,
    #[serde(default)]
    pub schedule_time: Option<String>,
}

impl BypassRequest {
    fn schedule(&self) -> ApiResult<Option<chrono::DateTime<Utc>>> {
        if !self.is_schedule || !self.state {
            return Ok(None);
        }
        let raw = self
            .schedule_time
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("schedule_time is required for a scheduled bypass"))?;
        parse_schedule_time(raw)
            .map(Some)
            .map_err(|e| ApiError::bad_request(e.to_string()))
    }
}

async fn bypass_handler(
    State(state): State<AppState>,
    Json(request): Json<BypassRequest>,
) -> ApiResult<Json<CommandResponse>> {
    let schedule = request.schedule()?;
    let outcome = state
        .engine
        .bypass(&request.target.node(), request.state, schedule, Utc::now())
        .await?;
    let done = if request.state {
        "Bypass mode is in on state"
    } else {
        "Bypass mode is in off state"
    };
    Ok(CommandResponse::from_outcome(outcome, done))
}

// ============= Acknowledgements =============

/// Acknowledgement item as sent by gateways. The purpose is checked per item.
#[derive(Debug, Deserialize)]
pub struct RawAck {
    #[serde(rename = "OptimizerID")]
    pub optimizer_id: String,
    pub purpose: String,
}

/// Answers 500 when any item or fold failed; the body still lists every item's outcome
async fn acknowledgement_handler(
    State(state): State<AppState>,
    Json(items): Json<Vec<RawAck>>,
) -> (StatusCode, Json<AckReport>) {
    let parsed: Vec<Result<Ack, AckOutcome>> = items
        .into_iter()
        .map(|item| match item.purpose.parse::<AckPurpose>() {
            Ok(purpose) => Ok(Ack::new(item.optimizer_id.trim(), purpose)),
            Err(e) => Err(AckOutcome::rejected(item.optimizer_id, item.purpose, e.to_string())),
        })
        .collect();

    let valid: Vec<Ack> = parsed.iter().filter_map(|p| p.as_ref().ok().cloned()).collect();
    let mut report = state.engine.acknowledge(&valid).await;

    // Put rejected items back in request order
    let mut applied = std::mem::take(&mut report.results).into_iter();
    report.results = parsed
        .into_iter()
        .filter_map(|item| match item {
            Ok(_) => applied.next(),
            Err(rejected) => Some(rejected),
        })
        .collect();

    info!(
        items = report.results.len(),
        success = report.is_success(),
        "Acknowledgements processed"
    );
    let status = if report.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(report))
}

// ============= Gateway reads =============

async fn optimizer_status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<EffectiveStatus>> {
    Ok(Json(state.engine.effective_status(&id, Utc::now()).await?))
}

async fn gateway_config_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GatewayConfigView>> {
    Ok(Json(state.engine.gateway_config(&id, Utc::now()).await?))
}

// ============= Provisioning =============

async fn gateway_ready_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.engine.provisioning().mark_ready_to_config(&id).await?;
    Ok(MessageResponse::ok("Gateway is ready to config"))
}

#[derive(Debug, Deserialize)]
pub struct OnlineCheckRequest {
    pub gateway_id: String,
    #[serde(rename = "onlineOptimizers", default)]
    pub online_optimizers: Vec<String>,
}

async fn online_check_handler(
    State(state): State<AppState>,
    Json(request): Json<OnlineCheckRequest>,
) -> ApiResult<Json<MessageResponse>> {
    state
        .engine
        .provisioning()
        .confirm_online(&request.gateway_id, &request.online_optimizers)
        .await?;
    Ok(MessageResponse::ok("All optimizers are online"))
}

async fn installation_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<InstallationProperty>> {
    Ok(Json(
        state.engine.provisioning().installation_property(&id).await?,
    ))
}

async fn gateway_configured_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MessageResponse>> {
    state.engine.provisioning().acknowledge_configured(&id).await?;
    Ok(MessageResponse::ok("Gateway updated"))
}

// ============= Telemetry =============

async fn telemetry_handler(
    State(state): State<AppState>,
    Json(report): Json<GatewayReport>,
) -> ApiResult<Json<IngestSummary>> {
    Ok(Json(state.engine.ingest_report(&report).await?))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub server_time: chrono::DateTime<Utc>,
}

#[expect(clippy::unused_async, reason = "axum handler must be async")]
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        server_time: Utc::now(),
    })
}
