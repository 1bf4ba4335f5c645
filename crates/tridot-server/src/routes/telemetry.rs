// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Reports pushed by node agents.

use axum::{extract::State, Json};
use tridot_server_provisioning::types::{
	HandshakeReportRequest, HandshakeReportResponse, HealthReportRequest, HealthReportResponse,
};
use tridot_wg_common::PeerId;

use crate::{api::AppState, auth::NodeAuth, error::ServerError, extract::ApiJson};

#[utoipa::path(
    post,
    path = "/telemetry/handshake",
    request_body = HandshakeReportRequest,
    responses(
        (status = 200, description = "Handshake recorded or ignored as stale", body = HandshakeReportResponse),
        (status = 400, description = "Malformed body or timestamp too far in the future", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid provision token", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown peer", body = crate::error::ErrorResponse)
    ),
    security(("provision_token" = [])),
    tag = "telemetry"
)]
pub async fn report_handshake(
	State(state): State<AppState>,
	_node: NodeAuth,
	ApiJson(body): ApiJson<HandshakeReportRequest>,
) -> Result<Json<HandshakeReportResponse>, ServerError> {
	let update = state
		.services
		.telemetry
		.report_handshake(PeerId::from_uuid(body.peer_id), body.timestamp)
		.await?;
	Ok(Json(HandshakeReportResponse::from_update(&update)))
}

#[utoipa::path(
    post,
    path = "/telemetry/health",
    request_body = HealthReportRequest,
    responses(
        (status = 200, description = "Report stored", body = HealthReportResponse),
        (status = 400, description = "Malformed body, out of range metrics or unknown region", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid provision token", body = crate::error::ErrorResponse)
    ),
    security(("provision_token" = [])),
    tag = "telemetry"
)]
pub async fn report_health(
	State(state): State<AppState>,
	_node: NodeAuth,
	ApiJson(body): ApiJson<HealthReportRequest>,
) -> Result<Json<HealthReportResponse>, ServerError> {
	let (node_id, report) = body.into_parts();
	let health = state.services.telemetry.report_health(node_id, report)?;
	Ok(Json(health.into()))
}
