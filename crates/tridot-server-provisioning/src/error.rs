// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;
use tridot_server_db::DbError;
use tridot_wg_common::{IpError, KeyError};

#[derive(Debug, Error)]
pub enum ProvisioningError {
	#[error("validation failed: {0}")]
	Validation(String),

	#[error("invalid public key: {0}")]
	InvalidKeyFormat(#[from] KeyError),

	#[error("device quota exceeded: plan '{plan_tier}' allows {max_peers} peers")]
	QuotaExceeded { plan_tier: String, max_peers: u32 },

	#[error("{0} not found")]
	NotFound(String),

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("provisioning ticket has expired")]
	Expired,

	#[error("provisioning ticket has already been redeemed")]
	AlreadyConsumed,

	#[error("temporarily unavailable: {0}")]
	Transient(String),

	#[error("internal error: {0}")]
	Fatal(String),
}

pub type Result<T> = std::result::Result<T, ProvisioningError>;

impl ProvisioningError {
	/// Only transient storage failures are worth another attempt.
	pub fn is_retriable(&self) -> bool {
		matches!(self, ProvisioningError::Transient(_))
	}
}

impl From<DbError> for ProvisioningError {
	fn from(err: DbError) -> Self {
		if err.is_transient() {
			return ProvisioningError::Transient(err.to_string());
		}
		match err {
			DbError::NotFound(what) => ProvisioningError::NotFound(what),
			DbError::Conflict(message) => ProvisioningError::Conflict(message),
			other => ProvisioningError::Fatal(other.to_string()),
		}
	}
}

impl From<IpError> for ProvisioningError {
	fn from(err: IpError) -> Self {
		ProvisioningError::Fatal(err.to_string())
	}
}
