// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{extract::State, Json};
use tridot_server_provisioning::types::QuotaResponse;

use crate::{api::AppState, auth::AccountAuth, error::ServerError};

#[utoipa::path(
    get,
    path = "/account/quota",
    responses(
        (status = 200, description = "Device quota and current usage", body = QuotaResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "account"
)]
pub async fn get_quota(
	State(state): State<AppState>,
	AccountAuth(account_id): AccountAuth,
) -> Result<Json<QuotaResponse>, ServerError> {
	let quota = state.services.registry.quota().quota(account_id).await?;
	Ok(Json(quota.into()))
}
