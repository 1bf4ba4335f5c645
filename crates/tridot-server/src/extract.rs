// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Body and query extractors that reject with the JSON error body.
//!
//! axum's own `Json` and `Query` answer malformed input with a plain-text 400
//! or 422. These wrap them and turn rejections into [`ServerError::BadRequest`],
//! or [`ServerError::PayloadTooLarge`] past the configured body limit.

use axum::{
	extract::{FromRequest, FromRequestParts, Query, Request},
	http::{request::Parts, StatusCode},
	Json,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ServerError;

/// JSON request body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
	T: DeserializeOwned,
	S: Send + Sync,
{
	type Rejection = ServerError;

	async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
		match Json::<T>::from_request(req, state).await {
			Ok(Json(value)) => Ok(ApiJson(value)),
			Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
				debug!("request body over limit");
				Err(ServerError::PayloadTooLarge(rejection.body_text()))
			}
			Err(rejection) => {
				debug!(status = %rejection.status(), "rejected request body");
				Err(ServerError::BadRequest(rejection.body_text()))
			}
		}
	}
}

/// Query string.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
	T: DeserializeOwned,
	S: Send + Sync,
{
	type Rejection = ServerError;

	async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
		match Query::<T>::from_request_parts(parts, state).await {
			Ok(Query(value)) => Ok(ApiQuery(value)),
			Err(rejection) => Err(ServerError::BadRequest(rejection.body_text())),
		}
	}
}
