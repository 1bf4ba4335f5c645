// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::BTreeMap;
use tridot_server_config::RegionConfig;
use tridot_wg_common::{default_routes, AddressPlan, TunnelSpec, WgPublicKey};

use crate::error::{ProvisioningError, Result};

/// A region peers can be placed in: its address plan and the server side of
/// the tunnel.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
	pub code: String,
	pub name: String,
	pub plan: AddressPlan,
	pub tunnel: TunnelSpec,
}

impl Region {
	/// Builds a region from config once its server public key is known.
	pub fn from_config(config: &RegionConfig, server_public_key: WgPublicKey) -> Result<Self> {
		Ok(Self {
			code: config.code.clone(),
			name: config.name.clone(),
			plan: AddressPlan::new(config.subnet)?,
			tunnel: TunnelSpec {
				server_public_key,
				endpoint: config.endpoint.clone(),
				dns: config.dns.clone(),
				mtu: config.mtu,
				persistent_keepalive: config.persistent_keepalive,
				client_allowed_ips: default_routes(),
			},
		})
	}

	pub fn endpoint(&self) -> &str {
		&self.tunnel.endpoint
	}
}

#[derive(Debug, Clone)]
pub struct RegionDirectory {
	regions: BTreeMap<String, Region>,
	default_region: String,
}

impl RegionDirectory {
	pub fn new(regions: Vec<Region>, default_region: &str) -> Result<Self> {
		let regions: BTreeMap<_, _> = regions
			.into_iter()
			.map(|region| (region.code.to_ascii_uppercase(), region))
			.collect();
		let default_region = default_region.to_ascii_uppercase();
		if !regions.contains_key(&default_region) {
			return Err(ProvisioningError::Fatal(format!(
				"default region {default_region} is not configured"
			)));
		}
		Ok(Self {
			regions,
			default_region,
		})
	}

	pub fn get(&self, code: &str) -> Option<&Region> {
		self.regions.get(&code.trim().to_ascii_uppercase())
	}

	/// The requested region, or the default one when none is given.
	pub fn resolve(&self, code: Option<&str>) -> Result<&Region> {
		match code.map(str::trim).filter(|c| !c.is_empty()) {
			Some(code) => self
				.get(code)
				.ok_or_else(|| ProvisioningError::Validation(format!("unknown region {code}"))),
			None => self
				.regions
				.get(&self.default_region)
				.ok_or_else(|| ProvisioningError::Fatal("default region missing".to_string())),
		}
	}

	pub fn default_region(&self) -> &str {
		&self.default_region
	}

	pub fn iter(&self) -> impl Iterator<Item = &Region> {
		self.regions.values()
	}
}
