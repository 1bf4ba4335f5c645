// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration layer for merging from multiple sources.

use serde::Deserialize;

use crate::sections::{
	DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer, NodesConfigLayer, PlansConfigLayer,
	ProvisioningConfigLayer, RegionConfigLayer,
};

/// Server configuration layer - all fields are Option for merging.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfigLayer {
	#[serde(default)]
	pub http: Option<HttpConfigLayer>,
	#[serde(default)]
	pub database: Option<DatabaseConfigLayer>,
	#[serde(default)]
	pub logging: Option<LoggingConfigLayer>,
	#[serde(default)]
	pub provisioning: Option<ProvisioningConfigLayer>,
	#[serde(default)]
	pub plans: Option<PlansConfigLayer>,
	/// Replaced wholesale by a higher-precedence source.
	#[serde(default)]
	pub regions: Option<Vec<RegionConfigLayer>>,
	#[serde(default)]
	pub nodes: Option<NodesConfigLayer>,
}

impl ServerConfigLayer {
	/// Merge another layer into this one. Other layer takes precedence.
	pub fn merge(&mut self, other: ServerConfigLayer) {
		merge_option(&mut self.http, other.http, HttpConfigLayer::merge);
		merge_option(
			&mut self.database,
			other.database,
			DatabaseConfigLayer::merge,
		);
		merge_option(&mut self.logging, other.logging, LoggingConfigLayer::merge);
		merge_option(
			&mut self.provisioning,
			other.provisioning,
			ProvisioningConfigLayer::merge,
		);
		merge_option(&mut self.plans, other.plans, PlansConfigLayer::merge);
		if other.regions.is_some() {
			self.regions = other.regions;
		}
		merge_option(&mut self.nodes, other.nodes, NodesConfigLayer::merge);
	}
}

fn merge_option<T, F>(target: &mut Option<T>, source: Option<T>, merge_fn: F)
where
	F: FnOnce(&mut T, T),
{
	match (target.as_mut(), source) {
		(Some(t), Some(s)) => merge_fn(t, s),
		(None, Some(s)) => *target = Some(s),
		_ => {}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_merge_empty_layers() {
		let mut base = ServerConfigLayer::default();
		base.merge(ServerConfigLayer::default());
		assert!(base.http.is_none());
		assert!(base.regions.is_none());
	}

	#[test]
	fn test_merge_other_overwrites() {
		let mut base = ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(9000),
				host: Some("127.0.0.1".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			http: Some(HttpConfigLayer {
				port: Some(8080),
				..Default::default()
			}),
			..Default::default()
		});
		let http = base.http.unwrap();
		assert_eq!(http.port, Some(8080));
		assert_eq!(http.host, Some("127.0.0.1".to_string()));
	}

	#[test]
	fn test_regions_replaced_not_appended() {
		let region = |code: &str| RegionConfigLayer {
			code: Some(code.to_string()),
			..Default::default()
		};
		let mut base = ServerConfigLayer {
			regions: Some(vec![region("EU-FRA"), region("EU-NL")]),
			..Default::default()
		};
		base.merge(ServerConfigLayer {
			regions: Some(vec![region("TR-IST")]),
			..Default::default()
		});
		let regions = base.regions.unwrap();
		assert_eq!(regions.len(), 1);
		assert_eq!(regions[0].code.as_deref(), Some("TR-IST"));
	}
}
