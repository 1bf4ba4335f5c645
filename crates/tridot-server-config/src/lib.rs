// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Centralized configuration management for the Tridot provisioning server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`TRIDOT_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use tridot_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}", config.socket_addr());
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{load_secret_env, ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;
use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub logging: LoggingConfig,
	pub provisioning: ProvisioningConfig,
	pub plans: PlansConfig,
	pub regions: Vec<RegionConfig>,
	pub nodes: NodesConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}

	pub fn region(&self, code: &str) -> Option<&RegionConfig> {
		self.regions.iter().find(|r| r.code.eq_ignore_ascii_case(code))
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`TRIDOT_SERVER_*`)
/// 2. Config file (`/etc/tridot/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(mut sources: Vec<Box<dyn ConfigSource>>) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let http = layer.http.unwrap_or_default().finalize()?;
	let database = layer.database.unwrap_or_default().finalize();
	let logging = layer.logging.unwrap_or_default().finalize();
	let provisioning = layer.provisioning.unwrap_or_default().finalize();
	let plans = layer.plans.unwrap_or_default().finalize()?;
	let regions = finalize_regions(layer.regions.unwrap_or_else(default_regions))?;
	let nodes = layer.nodes.unwrap_or_default().finalize();

	let config = ServerConfig {
		http,
		database,
		logging,
		provisioning,
		plans,
		regions,
		nodes,
	};
	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		regions = config.regions.len(),
		default_region = %config.provisioning.default_region,
		plan_tiers = config.plans.tiers.len(),
		nodes_enabled = config.nodes.provision_token.is_some(),
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	if config.region(&config.provisioning.default_region).is_none() {
		return Err(ConfigError::Validation(format!(
			"default region {} is not among the configured regions",
			config.provisioning.default_region
		)));
	}

	if config.provisioning.ticket_ttl_secs == 0 {
		return Err(ConfigError::Validation(
			"provisioning.ticket_ttl_secs must be greater than zero".to_string(),
		));
	}

	if config.provisioning.storage_timeout_ms == 0 {
		return Err(ConfigError::Validation(
			"provisioning.storage_timeout_ms must be greater than zero".to_string(),
		));
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	const SERVER_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

	#[test]
	fn test_defaults_finalize() {
		let config = finalize(ServerConfigLayer::default()).unwrap();
		assert_eq!(config.socket_addr(), "0.0.0.0:8080");
		assert!(config.region("eu-fra").is_some());
		assert!(config.nodes.provision_token.is_none());
	}

	#[test]
	fn test_unknown_default_region_rejected() {
		let layer = ServerConfigLayer {
			provisioning: Some(ProvisioningConfigLayer {
				default_region: Some("US-NYC".to_string()),
				..Default::default()
			}),
			..Default::default()
		};
		let err = finalize(layer).unwrap_err();
		assert!(err.to_string().contains("US-NYC"));
	}

	#[test]
	fn test_zero_ttl_rejected() {
		let layer = ServerConfigLayer {
			provisioning: Some(ProvisioningConfigLayer {
				ticket_ttl_secs: Some(0),
				..Default::default()
			}),
			..Default::default()
		};
		assert!(finalize(layer).is_err());
	}

	#[test]
	fn test_toml_file_overrides_defaults() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("server.toml");
		std::fs::write(
			&path,
			format!(
				r#"
[http]
port = 9100
cors_origins = ["https://app.tridot.dev/"]

[provisioning]
default_region = "TR-IST"
ticket_ttl_secs = 3600

[plans]
default_tier = "solo"

[plans.tiers]
solo = 2

[[regions]]
code = "TR-IST"
name = "Istanbul"
subnet = "10.50.0.0/24"
endpoint = "ist.example:51820"
server_public_key = "{SERVER_KEY}"
"#
			),
		)
		.unwrap();

		let mut merged = DefaultsSource.load().unwrap();
		merged.merge(TomlSource::new(&path).load().unwrap());
		let config = finalize(merged).unwrap();

		assert_eq!(config.http.port, 9100);
		assert_eq!(config.http.cors_origins, vec!["https://app.tridot.dev"]);
		assert_eq!(config.provisioning.ticket_ttl_secs, 3600);
		assert_eq!(config.regions.len(), 1);
		assert_eq!(config.regions[0].name, "Istanbul");
		assert_eq!(config.plans.resolve(None), ("solo", 2));
	}
}
