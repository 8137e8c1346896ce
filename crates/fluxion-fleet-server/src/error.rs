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

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use fluxion_fleet_core::FleetError;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Fleet(#[from] FleetError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Fleet(err) => match err {
                FleetError::NotFound { .. } | FleetError::EmptyTarget { .. } => {
                    StatusCode::NOT_FOUND
                }
                FleetError::NoRecentTelemetry | FleetError::PartialOffline { .. } => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                FleetError::TransportFailure { .. } => StatusCode::BAD_GATEWAY,
                FleetError::Inconsistent { .. } => StatusCode::CONFLICT,
                FleetError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                FleetError::MissingDefaults | FleetError::Store(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    /// Machine-readable hint matched on by dashboards
    fn key(&self) -> Option<&'static str> {
        match self {
            Self::Fleet(err) if err.is_liveness_denial() => Some("optimizer_status"),
            Self::Fleet(FleetError::NotFound { level, .. }) => Some(level.as_str()),
            Self::Fleet(FleetError::MissingDefaults) => Some("default_settings"),
            Self::Fleet(_) | Self::BadRequest(_) => None,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offline: Option<&'a [String]>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let message = self.to_string();
        let offline = match &self {
            Self::Fleet(FleetError::PartialOffline { offline, .. }) => Some(offline.as_slice()),
            Self::Fleet(_) | Self::BadRequest(_) => None,
        };
        let body = ErrorBody {
            success: false,
            message: &message,
            key: self.key(),
            offline,
        };
        (status, Json(body)).into_response()
    }
}
