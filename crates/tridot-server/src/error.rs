// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Server error types and HTTP response conversions.

use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
	Json,
};
use serde::Serialize;
use tridot_server_db::DbError;
use tridot_server_provisioning::ProvisioningError;
use tridot_wg_common::KeyFileError;
use utoipa::ToSchema;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
	#[error(transparent)]
	Provisioning(#[from] ProvisioningError),

	#[error("Database error: {0}")]
	Db(#[from] DbError),

	#[error("Key file error: {0}")]
	KeyFile(#[from] KeyFileError),

	#[error("Invalid request: {0}")]
	BadRequest(String),

	#[error("Payload too large: {0}")]
	PayloadTooLarge(String),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Unauthorized: {0}")]
	Unauthorized(String),

	/// A feature the request needs is not configured on this server.
	#[error("Service unavailable: {0}")]
	ServiceUnavailable(String),

	#[error("Internal error: {0}")]
	Internal(String),
}

/// Error response body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

impl ErrorResponse {
	fn new(error: &str, message: impl Into<String>) -> Self {
		Self {
			error: error.to_string(),
			message: message.into(),
		}
	}
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		let (status, body) = match self {
			ServerError::Provisioning(err) => return provisioning_response(err),
			ServerError::Db(err) if err.is_transient() => {
				tracing::warn!(error = %err, "transient database error");
				(
					StatusCode::SERVICE_UNAVAILABLE,
					ErrorResponse::new("unavailable", "Storage is temporarily unavailable"),
				)
			}
			ServerError::Db(err) => {
				tracing::error!(error = %err, "database error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ErrorResponse::new("database_error", "A database error occurred"),
				)
			}
			ServerError::KeyFile(err) => {
				tracing::error!(error = %err, "key file error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ErrorResponse::new("internal_error", "An internal error occurred"),
				)
			}
			ServerError::BadRequest(msg) => (
				StatusCode::BAD_REQUEST,
				ErrorResponse::new("bad_request", msg),
			),
			ServerError::PayloadTooLarge(msg) => (
				StatusCode::PAYLOAD_TOO_LARGE,
				ErrorResponse::new("payload_too_large", msg),
			),
			ServerError::NotFound(what) => (
				StatusCode::NOT_FOUND,
				ErrorResponse::new("not_found", format!("{what} not found")),
			),
			ServerError::Unauthorized(msg) => (
				StatusCode::UNAUTHORIZED,
				ErrorResponse::new("unauthorized", msg),
			),
			ServerError::ServiceUnavailable(msg) => (
				StatusCode::SERVICE_UNAVAILABLE,
				ErrorResponse::new("unavailable", msg),
			),
			ServerError::Internal(msg) => {
				tracing::error!(error = %msg, "internal error");
				(
					StatusCode::INTERNAL_SERVER_ERROR,
					ErrorResponse::new("internal_error", "An internal error occurred"),
				)
			}
		};

		(status, Json(body)).into_response()
	}
}

fn provisioning_response(err: ProvisioningError) -> Response {
	let message = err.to_string();
	let (status, body) = match err {
		ProvisioningError::Validation(_) => (
			StatusCode::BAD_REQUEST,
			ErrorResponse::new("validation_failed", message),
		),
		ProvisioningError::InvalidKeyFormat(_) => (
			StatusCode::BAD_REQUEST,
			ErrorResponse::new("invalid_key_format", message),
		),
		ProvisioningError::QuotaExceeded { .. } => (
			StatusCode::CONFLICT,
			ErrorResponse::new("quota_exceeded", message),
		),
		ProvisioningError::Conflict(_) => (
			StatusCode::CONFLICT,
			ErrorResponse::new("conflict", message),
		),
		ProvisioningError::NotFound(_) => (
			StatusCode::NOT_FOUND,
			ErrorResponse::new("not_found", message),
		),
		ProvisioningError::Expired => (
			StatusCode::GONE,
			ErrorResponse::new("expired", message),
		),
		ProvisioningError::AlreadyConsumed => (
			StatusCode::GONE,
			ErrorResponse::new("already_consumed", message),
		),
		ProvisioningError::Transient(_) => {
			tracing::warn!(error = %message, "transient provisioning failure");
			(
				StatusCode::SERVICE_UNAVAILABLE,
				ErrorResponse::new("unavailable", "Storage is temporarily unavailable"),
			)
		}
		ProvisioningError::Fatal(_) => {
			tracing::error!(error = %message, "provisioning failure");
			(
				StatusCode::INTERNAL_SERVER_ERROR,
				ErrorResponse::new("internal_error", "An internal error occurred"),
			)
		}
	};

	(status, Json(body)).into_response()
}
