// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer provisioning configuration section.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TICKET_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_ADDRESS_COOLDOWN_SECS: u64 = 300;
const DEFAULT_REGION: &str = "EU-FRA";
const DEFAULT_TICKET_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_COOLDOWN_SWEEP_INTERVAL_SECS: u64 = 30;
const DEFAULT_STORAGE_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_STORAGE_RETRIES: u32 = 3;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProvisioningConfigLayer {
	pub ticket_ttl_secs: Option<u64>,
	pub address_cooldown_secs: Option<u64>,
	pub default_region: Option<String>,
	pub ticket_sweep_interval_secs: Option<u64>,
	pub cooldown_sweep_interval_secs: Option<u64>,
	pub storage_timeout_ms: Option<u64>,
	pub storage_retries: Option<u32>,
}

impl ProvisioningConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.ticket_ttl_secs.is_some() {
			self.ticket_ttl_secs = other.ticket_ttl_secs;
		}
		if other.address_cooldown_secs.is_some() {
			self.address_cooldown_secs = other.address_cooldown_secs;
		}
		if other.default_region.is_some() {
			self.default_region = other.default_region;
		}
		if other.ticket_sweep_interval_secs.is_some() {
			self.ticket_sweep_interval_secs = other.ticket_sweep_interval_secs;
		}
		if other.cooldown_sweep_interval_secs.is_some() {
			self.cooldown_sweep_interval_secs = other.cooldown_sweep_interval_secs;
		}
		if other.storage_timeout_ms.is_some() {
			self.storage_timeout_ms = other.storage_timeout_ms;
		}
		if other.storage_retries.is_some() {
			self.storage_retries = other.storage_retries;
		}
	}

	pub fn finalize(self) -> ProvisioningConfig {
		let defaults = ProvisioningConfig::default();
		ProvisioningConfig {
			ticket_ttl_secs: self.ticket_ttl_secs.unwrap_or(defaults.ticket_ttl_secs),
			address_cooldown_secs: self
				.address_cooldown_secs
				.unwrap_or(defaults.address_cooldown_secs),
			default_region: self
				.default_region
				.map(|r| r.to_ascii_uppercase())
				.unwrap_or(defaults.default_region),
			ticket_sweep_interval_secs: self
				.ticket_sweep_interval_secs
				.unwrap_or(defaults.ticket_sweep_interval_secs),
			cooldown_sweep_interval_secs: self
				.cooldown_sweep_interval_secs
				.unwrap_or(defaults.cooldown_sweep_interval_secs),
			storage_timeout_ms: self
				.storage_timeout_ms
				.unwrap_or(defaults.storage_timeout_ms),
			storage_retries: self.storage_retries.unwrap_or(defaults.storage_retries),
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProvisioningConfig {
	pub ticket_ttl_secs: u64,
	/// Time a revoked peer's address stays out of the free list.
	pub address_cooldown_secs: u64,
	pub default_region: String,
	pub ticket_sweep_interval_secs: u64,
	pub cooldown_sweep_interval_secs: u64,
	pub storage_timeout_ms: u64,
	/// Extra attempts after the first for transient storage failures.
	pub storage_retries: u32,
}

impl ProvisioningConfig {
	pub fn ticket_ttl(&self) -> Duration {
		Duration::from_secs(self.ticket_ttl_secs)
	}

	pub fn address_cooldown(&self) -> Duration {
		Duration::from_secs(self.address_cooldown_secs)
	}

	pub fn storage_timeout(&self) -> Duration {
		Duration::from_millis(self.storage_timeout_ms)
	}
}

impl Default for ProvisioningConfig {
	fn default() -> Self {
		Self {
			ticket_ttl_secs: DEFAULT_TICKET_TTL_SECS,
			address_cooldown_secs: DEFAULT_ADDRESS_COOLDOWN_SECS,
			default_region: DEFAULT_REGION.to_string(),
			ticket_sweep_interval_secs: DEFAULT_TICKET_SWEEP_INTERVAL_SECS,
			cooldown_sweep_interval_secs: DEFAULT_COOLDOWN_SWEEP_INTERVAL_SECS,
			storage_timeout_ms: DEFAULT_STORAGE_TIMEOUT_MS,
			storage_retries: DEFAULT_STORAGE_RETRIES,
		}
	}
}
