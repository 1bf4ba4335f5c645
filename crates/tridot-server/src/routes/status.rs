// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{extract::State, Json};
use chrono::Utc;
use tridot_server_provisioning::types::{RegionStatusResponse, StatusResponse};

use crate::api::AppState;

#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Node health per region", body = StatusResponse)
    ),
    tag = "status"
)]
/// GET /status - Public region health built from node reports.
pub async fn region_status(State(state): State<AppState>) -> Json<StatusResponse> {
	let regions = state
		.services
		.telemetry
		.status(Utc::now())
		.into_iter()
		.map(RegionStatusResponse::from)
		.collect();
	Json(StatusResponse { regions })
}
