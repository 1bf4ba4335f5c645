// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Request authentication.
//!
//! Account endpoints take `Authorization: Bearer <token>`; the token is looked
//! up by its SHA-256 digest. Node endpoints take the shared provision token in
//! `X-Provision-Token`.

use axum::{
	extract::FromRequestParts,
	http::{request::Parts, HeaderMap},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{instrument, warn};
use tridot_server_db::AccountStore;
use tridot_wg_common::{AccountId, SecretString};

use crate::{api::AppState, error::ServerError};

pub const NODE_TOKEN_HEADER: &str = "X-Provision-Token";
const ACCOUNT_TOKEN_PREFIX: &str = "tdt_";
const TOKEN_BYTES: usize = 32;

/// Mints a new account bearer token. Only its hash is ever stored.
pub fn generate_account_token() -> SecretString {
	let mut bytes = [0u8; TOKEN_BYTES];
	OsRng.fill_bytes(&mut bytes);
	SecretString::new(format!("{ACCOUNT_TOKEN_PREFIX}{}", URL_SAFE_NO_PAD.encode(bytes)))
}

pub fn hash_token(token: &str) -> String {
	hex::encode(Sha256::digest(token.as_bytes()))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
	headers
		.get(axum::http::header::AUTHORIZATION)
		.and_then(|h| h.to_str().ok())
		.and_then(|value| value.strip_prefix("Bearer "))
		.map(str::trim)
		.filter(|token| !token.is_empty())
}

/// The account a request acts for.
#[derive(Debug, Clone, Copy)]
pub struct AccountAuth(pub AccountId);

impl FromRequestParts<AppState> for AccountAuth {
	type Rejection = ServerError;

	#[instrument(name = "AccountAuth::from_request_parts", skip_all)]
	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let Some(token) = bearer_token(&parts.headers) else {
			return Err(ServerError::Unauthorized(
				"Bearer token required".to_string(),
			));
		};

		match state.accounts.get_account_by_token_hash(&hash_token(token)).await? {
			Some(account_id) => Ok(AccountAuth(account_id)),
			None => {
				warn!("account auth failed: unknown token");
				Err(ServerError::Unauthorized("Invalid token".to_string()))
			}
		}
	}
}

/// A node agent holding the shared provision token.
#[derive(Debug, Clone, Copy)]
pub struct NodeAuth;

impl FromRequestParts<AppState> for NodeAuth {
	type Rejection = ServerError;

	#[instrument(name = "NodeAuth::from_request_parts", skip_all)]
	async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
		let Some(expected) = state.node_token.as_ref() else {
			warn!("node auth failed: no provision token configured");
			return Err(ServerError::ServiceUnavailable(
				"Node telemetry is not configured".to_string(),
			));
		};

		let presented = parts
			.headers
			.get(NODE_TOKEN_HEADER)
			.and_then(|h| h.to_str().ok())
			.map(str::trim);
		let Some(presented) = presented else {
			warn!("node auth failed: missing provision token");
			return Err(ServerError::Unauthorized(
				"Provision token required".to_string(),
			));
		};

		if tokens_match(expected.expose().as_bytes(), presented.as_bytes()) {
			Ok(NodeAuth)
		} else {
			warn!("node auth failed: invalid provision token");
			Err(ServerError::Unauthorized(
				"Invalid provision token".to_string(),
			))
		}
	}
}

fn tokens_match(expected: &[u8], presented: &[u8]) -> bool {
	expected.len() == presented.len() && bool::from(expected.ct_eq(presented))
}
