// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer management for account holders.

use axum::{
	extract::{Path, State},
	http::{header, StatusCode},
	response::{IntoResponse, Response},
	Json,
};
use tracing::instrument;
use tridot_server_provisioning::types::{
	ConfigFormat, CreatePeerRequest, CreatePeerResponse, ListPeersQuery, ListPeersResponse,
	PeerResponse, RedeemConfigQuery, TicketResponse, UpdatePeerRequest, UsageResponse,
};
use tridot_wg_common::{AccountId, PeerId};

use crate::{
	api::AppState,
	auth::AccountAuth,
	error::ServerError,
	extract::{ApiJson, ApiQuery},
	qr::config_qr_png,
};

/// Unparseable ids are indistinguishable from unknown ones.
fn parse_peer_id(raw: &str) -> Result<PeerId, ServerError> {
	raw.parse()
		.map_err(|_| ServerError::NotFound(format!("peer {raw}")))
}

#[utoipa::path(
    get,
    path = "/peers",
    params(ListPeersQuery),
    responses(
        (status = 200, description = "Live peers of the account", body = ListPeersResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 404, description = "accountId is not the caller's account", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "peers"
)]
#[instrument(skip(state, query), fields(%account_id))]
pub async fn list_peers(
	State(state): State<AppState>,
	AccountAuth(account_id): AccountAuth,
	ApiQuery(query): ApiQuery<ListPeersQuery>,
) -> Result<Json<ListPeersResponse>, ServerError> {
	if let Some(requested) = query.account_id {
		if AccountId::from_uuid(requested) != account_id {
			return Err(ServerError::NotFound(format!("account {requested}")));
		}
	}

	let peers = state.services.registry.list_by_account(account_id).await?;
	Ok(Json(ListPeersResponse {
		peers: peers.into_iter().map(PeerResponse::from).collect(),
	}))
}

#[utoipa::path(
    post,
    path = "/peers",
    request_body = CreatePeerRequest,
    responses(
        (status = 201, description = "Peer created with a single-use config ticket", body = CreatePeerResponse),
        (status = 400, description = "Malformed body or invalid name, key or region", body = crate::error::ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorResponse),
        (status = 409, description = "Device quota reached or public key already registered", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "peers"
)]
#[instrument(skip(state, body), fields(%account_id))]
pub async fn create_peer(
	State(state): State<AppState>,
	AccountAuth(account_id): AccountAuth,
	ApiJson(body): ApiJson<CreatePeerRequest>,
) -> Result<(StatusCode, Json<CreatePeerResponse>), ServerError> {
	let provisioned = state
		.services
		.provisioning
		.provision_peer(
			account_id,
			&body.name,
			body.public_key.as_deref(),
			body.region.as_deref(),
		)
		.await?;

	Ok((StatusCode::CREATED, Json(provisioned.into())))
}

#[utoipa::path(
    get,
    path = "/peers/{id}",
    params(("id" = String, Path, description = "Peer id")),
    responses(
        (status = 200, description = "Peer", body = PeerResponse),
        (status = 404, description = "Peer not found", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "peers"
)]
#[instrument(skip(state), fields(%account_id))]
pub async fn get_peer(
	State(state): State<AppState>,
	AccountAuth(account_id): AccountAuth,
	Path(id): Path<String>,
) -> Result<Json<PeerResponse>, ServerError> {
	let id = parse_peer_id(&id)?;
	let peer = state.services.registry.get_owned(account_id, id).await?;
	Ok(Json(peer.into()))
}

#[utoipa::path(
    patch,
    path = "/peers/{id}",
    params(("id" = String, Path, description = "Peer id")),
    request_body = UpdatePeerRequest,
    responses(
        (status = 200, description = "Peer renamed", body = PeerResponse),
        (status = 400, description = "Malformed body or invalid name", body = crate::error::ErrorResponse),
        (status = 404, description = "Peer not found or revoked", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "peers"
)]
#[instrument(skip(state, body), fields(%account_id))]
pub async fn update_peer(
	State(state): State<AppState>,
	AccountAuth(account_id): AccountAuth,
	Path(id): Path<String>,
	ApiJson(body): ApiJson<UpdatePeerRequest>,
) -> Result<Json<PeerResponse>, ServerError> {
	let id = parse_peer_id(&id)?;
	let registry = &state.services.registry;
	registry.get_owned(account_id, id).await?;
	let peer = registry.rename_peer(id, &body.name).await?;
	Ok(Json(peer.into()))
}

#[utoipa::path(
    delete,
    path = "/peers/{id}",
    params(("id" = String, Path, description = "Peer id")),
    responses(
        (status = 200, description = "Peer revoked", body = PeerResponse),
        (status = 404, description = "Peer not found or already revoked", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "peers"
)]
#[instrument(skip(state), fields(%account_id))]
pub async fn revoke_peer(
	State(state): State<AppState>,
	AccountAuth(account_id): AccountAuth,
	Path(id): Path<String>,
) -> Result<Json<PeerResponse>, ServerError> {
	let id = parse_peer_id(&id)?;
	state
		.services
		.provisioning
		.revoke_peer(account_id, id)
		.await?;
	let peer = state.services.registry.get(id).await?;
	Ok(Json(peer.into()))
}

#[utoipa::path(
    post,
    path = "/peers/{id}/config",
    params(("id" = String, Path, description = "Peer id")),
    responses(
        (status = 201, description = "New config ticket; any earlier unredeemed one is void", body = TicketResponse),
        (status = 404, description = "Peer not found or revoked", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "peers"
)]
#[instrument(skip(state), fields(%account_id))]
pub async fn reissue_config(
	State(state): State<AppState>,
	AccountAuth(account_id): AccountAuth,
	Path(id): Path<String>,
) -> Result<(StatusCode, Json<TicketResponse>), ServerError> {
	let id = parse_peer_id(&id)?;
	let ticket = state.services.provisioning.reissue(account_id, id).await?;
	Ok((StatusCode::CREATED, Json(ticket.into())))
}

#[utoipa::path(
    get,
    path = "/peers/{id}/config/{config_id}",
    params(
        ("id" = String, Path, description = "Peer id"),
        ("config_id" = String, Path, description = "Single-use config ticket"),
        RedeemConfigQuery
    ),
    responses(
        (status = 200, description = "WireGuard client config, or a PNG QR code of it with format=qr", content_type = "text/plain", body = String),
        (status = 400, description = "Unknown format", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown ticket", body = crate::error::ErrorResponse),
        (status = 410, description = "Ticket expired or already redeemed", body = crate::error::ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "peers"
)]
#[instrument(skip(state, config_id), fields(%account_id, format = ?query.format))]
pub async fn redeem_config(
	State(state): State<AppState>,
	AccountAuth(account_id): AccountAuth,
	Path((id, config_id)): Path<(String, String)>,
	ApiQuery(query): ApiQuery<RedeemConfigQuery>,
) -> Result<Response, ServerError> {
	let id = parse_peer_id(&id)?;
	let config = state
		.services
		.provisioning
		.redeem_for(account_id, id, &config_id)
		.await?;

	let response = match query.format {
		ConfigFormat::Text => (
			[
				(header::CONTENT_TYPE, "text/plain; charset=utf-8"),
				(header::CACHE_CONTROL, "no-store"),
			],
			config.into_string(),
		)
			.into_response(),
		ConfigFormat::Qr => (
			[
				(header::CONTENT_TYPE, "image/png"),
				(header::CACHE_CONTROL, "no-store"),
			],
			config_qr_png(&config)?,
		)
			.into_response(),
	};
	Ok(response)
}

#[utoipa::path(
    get,
    path = "/peers/usage",
    responses(
        (status = 200, description = "Peer counts and latest handshake", body = UsageResponse)
    ),
    security(("bearer" = [])),
    tag = "peers"
)]
#[instrument(skip(state), fields(%account_id))]
pub async fn peer_usage(
	State(state): State<AppState>,
	AccountAuth(account_id): AccountAuth,
) -> Result<Json<UsageResponse>, ServerError> {
	let usage = state.services.registry.usage(account_id).await?;
	Ok(Json(usage.into()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn malformed_peer_id_is_not_found() {
		assert!(matches!(
			parse_peer_id("not-a-uuid"),
			Err(ServerError::NotFound(_))
		));
		let id = PeerId::new();
		assert_eq!(parse_peer_id(&id.to_string()).unwrap(), id);
	}
}
