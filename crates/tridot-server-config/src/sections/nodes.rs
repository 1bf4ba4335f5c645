// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Node agent authentication and health bookkeeping.

use serde::Deserialize;
use tridot_wg_common::SecretString;

const DEFAULT_HEALTH_RETENTION_SECS: u64 = 60 * 60;
const DEFAULT_HEALTH_PRUNE_INTERVAL_SECS: u64 = 5 * 60;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodesConfigLayer {
	#[serde(default)]
	pub provision_token: Option<SecretString>,
	#[serde(default)]
	pub health_retention_secs: Option<u64>,
	#[serde(default)]
	pub health_prune_interval_secs: Option<u64>,
}

impl NodesConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.provision_token.is_some() {
			self.provision_token = other.provision_token;
		}
		if other.health_retention_secs.is_some() {
			self.health_retention_secs = other.health_retention_secs;
		}
		if other.health_prune_interval_secs.is_some() {
			self.health_prune_interval_secs = other.health_prune_interval_secs;
		}
	}

	pub fn finalize(self) -> NodesConfig {
		let defaults = NodesConfig::default();
		NodesConfig {
			provision_token: self
				.provision_token
				.filter(|t| !t.expose().trim().is_empty()),
			health_retention_secs: self
				.health_retention_secs
				.unwrap_or(defaults.health_retention_secs),
			health_prune_interval_secs: self
				.health_prune_interval_secs
				.filter(|s| *s > 0)
				.unwrap_or(defaults.health_prune_interval_secs),
		}
	}
}

/// Node endpoints are disabled while no provision token is configured.
#[derive(Debug, Clone)]
pub struct NodesConfig {
	pub provision_token: Option<SecretString>,
	/// Health reports older than this are forgotten.
	pub health_retention_secs: u64,
	pub health_prune_interval_secs: u64,
}

impl Default for NodesConfig {
	fn default() -> Self {
		Self {
			provision_token: None,
			health_retention_secs: DEFAULT_HEALTH_RETENTION_SECS,
			health_prune_interval_secs: DEFAULT_HEALTH_PRUNE_INTERVAL_SECS,
		}
	}
}
