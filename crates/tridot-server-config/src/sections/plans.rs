// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Plan tier limits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigError;

const DEFAULT_TIER: &str = "standard";

fn default_tiers() -> BTreeMap<String, u32> {
	BTreeMap::from([
		("free".to_string(), 1),
		("standard".to_string(), 5),
		("family".to_string(), 10),
	])
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlansConfigLayer {
	pub default_tier: Option<String>,
	/// Tier name to maximum number of non-revoked peers.
	pub tiers: Option<BTreeMap<String, u32>>,
}

impl PlansConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.default_tier.is_some() {
			self.default_tier = other.default_tier;
		}
		if let Some(tiers) = other.tiers {
			self.tiers.get_or_insert_with(BTreeMap::new).extend(tiers);
		}
	}

	pub fn finalize(self) -> Result<PlansConfig, ConfigError> {
		let config = PlansConfig {
			default_tier: self
				.default_tier
				.unwrap_or_else(|| DEFAULT_TIER.to_string()),
			tiers: self.tiers.unwrap_or_else(default_tiers),
		};
		if !config.tiers.contains_key(&config.default_tier) {
			return Err(ConfigError::Validation(format!(
				"default plan tier '{}' is not defined in [plans.tiers]",
				config.default_tier
			)));
		}
		Ok(config)
	}
}

/// Resolved plan table. Cheap to clone; swapped wholesale on reload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlansConfig {
	pub default_tier: String,
	pub tiers: BTreeMap<String, u32>,
}

impl PlansConfig {
	/// Resolves a tier name, falling back to the default tier when unknown.
	pub fn resolve<'a>(&'a self, tier: Option<&'a str>) -> (&'a str, u32) {
		if let Some(tier) = tier {
			if let Some((name, max)) = self.tiers.get_key_value(tier) {
				return (name.as_str(), *max);
			}
		}
		let max = self.tiers.get(&self.default_tier).copied().unwrap_or(0);
		(self.default_tier.as_str(), max)
	}

	pub fn contains(&self, tier: &str) -> bool {
		self.tiers.contains_key(tier)
	}
}

impl Default for PlansConfig {
	fn default() -> Self {
		Self {
			default_tier: DEFAULT_TIER.to_string(),
			tiers: default_tiers(),
		}
	}
}
