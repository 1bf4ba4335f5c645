// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Region definitions: tunnel subnet, node endpoint and server key.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;
use tridot_wg_common::{validate_public_key, AddressPlan, WgPublicKey, DEFAULT_PERSISTENT_KEEPALIVE};

use crate::error::ConfigError;

/// Where a region's server public key comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerKeySource {
	PublicKey(WgPublicKey),
	/// Private key file shared with the node agent; created on first start.
	KeyFile(PathBuf),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RegionConfigLayer {
	pub code: Option<String>,
	pub name: Option<String>,
	pub subnet: Option<Ipv4Net>,
	pub endpoint: Option<String>,
	pub server_public_key: Option<String>,
	pub server_key_file: Option<PathBuf>,
	pub dns: Option<Vec<IpAddr>>,
	pub mtu: Option<u16>,
	pub persistent_keepalive: Option<u16>,
}

impl RegionConfigLayer {
	pub fn finalize(self) -> Result<RegionConfig, ConfigError> {
		let code = self
			.code
			.map(|c| c.trim().to_ascii_uppercase())
			.filter(|c| !c.is_empty())
			.ok_or_else(|| ConfigError::Validation("region is missing a code".to_string()))?;

		let invalid = |message: String| ConfigError::InvalidValue {
			key: format!("regions.{code}"),
			message,
		};

		let subnet = self
			.subnet
			.ok_or_else(|| invalid("subnet is required".to_string()))?;
		AddressPlan::new(subnet).map_err(|e| invalid(e.to_string()))?;

		let endpoint = self
			.endpoint
			.filter(|e| !e.trim().is_empty())
			.ok_or_else(|| invalid("endpoint is required".to_string()))?;

		let server_key = match (self.server_public_key, self.server_key_file) {
			(Some(key), None) => ServerKeySource::PublicKey(
				validate_public_key(&key).map_err(|e| invalid(format!("server_public_key: {e}")))?,
			),
			(None, Some(path)) => ServerKeySource::KeyFile(path),
			(Some(_), Some(_)) => {
				return Err(invalid(
					"set either server_public_key or server_key_file, not both".to_string(),
				))
			}
			(None, None) => {
				return Err(invalid(
					"server_public_key or server_key_file is required".to_string(),
				))
			}
		};

		Ok(RegionConfig {
			name: self.name.unwrap_or_else(|| code.clone()),
			code,
			subnet: subnet.trunc(),
			endpoint,
			server_key,
			dns: self
				.dns
				.unwrap_or_else(|| vec![IpAddr::from([1, 1, 1, 1])]),
			mtu: self.mtu,
			persistent_keepalive: self
				.persistent_keepalive
				.unwrap_or(DEFAULT_PERSISTENT_KEEPALIVE),
		})
	}
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionConfig {
	pub code: String,
	pub name: String,
	pub subnet: Ipv4Net,
	pub endpoint: String,
	pub server_key: ServerKeySource,
	pub dns: Vec<IpAddr>,
	pub mtu: Option<u16>,
	pub persistent_keepalive: u16,
}

/// Development default: one region whose server key is generated locally.
pub fn default_regions() -> Vec<RegionConfigLayer> {
	vec![RegionConfigLayer {
		code: Some("EU-FRA".to_string()),
		name: Some("Frankfurt".to_string()),
		subnet: "10.20.0.0/16".parse().ok(),
		endpoint: Some("fra.vpn.tridot.dev:51820".to_string()),
		server_key_file: Some(PathBuf::from("./data/wg/eu-fra.key")),
		..Default::default()
	}]
}

pub fn finalize_regions(layers: Vec<RegionConfigLayer>) -> Result<Vec<RegionConfig>, ConfigError> {
	let regions = layers
		.into_iter()
		.map(RegionConfigLayer::finalize)
		.collect::<Result<Vec<_>, _>>()?;

	if regions.is_empty() {
		return Err(ConfigError::Validation(
			"at least one region must be configured".to_string(),
		));
	}

	let mut seen = HashSet::new();
	for region in &regions {
		if !seen.insert(region.code.as_str()) {
			return Err(ConfigError::Validation(format!(
				"region {} is defined more than once",
				region.code
			)));
		}
	}

	Ok(regions)
}
