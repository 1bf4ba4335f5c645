// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, trace};
use tridot_wg_common::{Secret, SecretString};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, HttpConfigLayer, LoggingConfigLayer, NodesConfigLayer, PlansConfigLayer,
	ProvisioningConfigLayer, RegionConfigLayer,
};

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer {
			regions: Some(crate::sections::default_regions()),
			..Default::default()
		})
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new("/etc/tridot/server.toml")
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: TRIDOT_SERVER_<SECTION>_<FIELD>
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			database: Some(load_database_from_env()?),
			logging: Some(load_logging_from_env()?),
			provisioning: Some(load_provisioning_from_env()?),
			plans: Some(load_plans_from_env()?),
			regions: load_regions_from_env()?,
			nodes: Some(load_nodes_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {kind} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	env_parse(name, "u16")
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	env_parse(name, "u32")
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	env_parse(name, "u64")
}

/// Reads `VAR_FILE` (trailing newline stripped) before falling back to `VAR`.
pub fn load_secret_env(var: &str) -> Result<Option<SecretString>, ConfigError> {
	let file_var = format!("{var}_FILE");

	if let Ok(path_str) = std::env::var(&file_var) {
		if path_str.is_empty() {
			return Err(ConfigError::Secret(format!("{file_var} is set but empty")));
		}
		let path = PathBuf::from(&path_str);
		let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
			path: path.clone(),
			source: e,
		})?;
		let secret = content.strip_suffix('\n').unwrap_or(&content).to_string();
		return Ok(Some(Secret::new(secret)));
	}

	Ok(env_var(var).map(Secret::new))
}

/// `TRIDOT_SERVER_CORS_ORIGINS=https://app.tridot.dev,http://localhost:5173`
fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	Ok(HttpConfigLayer {
		host: env_var("TRIDOT_SERVER_HOST"),
		port: env_u16("TRIDOT_SERVER_PORT")?,
		max_body_bytes: env_parse("TRIDOT_SERVER_MAX_BODY_BYTES", "usize")?,
		cors_origins: env_var("TRIDOT_SERVER_CORS_ORIGINS")
			.map(|raw| raw.split(',').map(str::to_string).collect()),
	})
}

fn load_database_from_env() -> Result<DatabaseConfigLayer, ConfigError> {
	Ok(DatabaseConfigLayer {
		url: env_var("TRIDOT_SERVER_DATABASE_URL"),
		max_connections: env_u32("TRIDOT_SERVER_DATABASE_MAX_CONNECTIONS")?,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = match env_var("TRIDOT_SERVER_LOG_FORMAT") {
		Some(v) => Some(v.parse().map_err(|message| ConfigError::InvalidValue {
			key: "TRIDOT_SERVER_LOG_FORMAT".to_string(),
			message,
		})?),
		None => None,
	};

	Ok(LoggingConfigLayer {
		level: env_var("TRIDOT_SERVER_LOG_LEVEL"),
		format,
	})
}

fn load_provisioning_from_env() -> Result<ProvisioningConfigLayer, ConfigError> {
	Ok(ProvisioningConfigLayer {
		ticket_ttl_secs: env_u64("TRIDOT_SERVER_TICKET_TTL_SECS")?,
		address_cooldown_secs: env_u64("TRIDOT_SERVER_ADDRESS_COOLDOWN_SECS")?,
		default_region: env_var("TRIDOT_SERVER_DEFAULT_REGION"),
		ticket_sweep_interval_secs: env_u64("TRIDOT_SERVER_TICKET_SWEEP_INTERVAL_SECS")?,
		cooldown_sweep_interval_secs: env_u64("TRIDOT_SERVER_COOLDOWN_SWEEP_INTERVAL_SECS")?,
		storage_timeout_ms: env_u64("TRIDOT_SERVER_STORAGE_TIMEOUT_MS")?,
		storage_retries: env_u32("TRIDOT_SERVER_STORAGE_RETRIES")?,
	})
}

/// `TRIDOT_SERVER_PLAN_TIERS=free:1,standard:5`
fn load_plans_from_env() -> Result<PlansConfigLayer, ConfigError> {
	let tiers = match env_var("TRIDOT_SERVER_PLAN_TIERS") {
		Some(raw) => Some(parse_tiers(&raw)?),
		None => None,
	};

	Ok(PlansConfigLayer {
		default_tier: env_var("TRIDOT_SERVER_DEFAULT_PLAN"),
		tiers,
	})
}

fn parse_tiers(raw: &str) -> Result<BTreeMap<String, u32>, ConfigError> {
	let invalid = |entry: &str| ConfigError::InvalidValue {
		key: "TRIDOT_SERVER_PLAN_TIERS".to_string(),
		message: format!("expected tier:max_peers, got '{entry}'"),
	};

	raw.split(',')
		.map(str::trim)
		.filter(|s| !s.is_empty())
		.map(|entry| -> Result<(String, u32), ConfigError> {
			let (tier, max) = entry.split_once(':').ok_or_else(|| invalid(entry))?;
			let max = max.trim().parse().map_err(|_| invalid(entry))?;
			Ok((tier.trim().to_string(), max))
		})
		.collect()
}

/// `TRIDOT_SERVER_REGIONS` holds a JSON array of region objects.
fn load_regions_from_env() -> Result<Option<Vec<RegionConfigLayer>>, ConfigError> {
	match env_var("TRIDOT_SERVER_REGIONS") {
		Some(json) => serde_json::from_str(&json)
			.map(Some)
			.map_err(|e| ConfigError::InvalidValue {
				key: "TRIDOT_SERVER_REGIONS".to_string(),
				message: e.to_string(),
			}),
		None => Ok(None),
	}
}

fn load_nodes_from_env() -> Result<NodesConfigLayer, ConfigError> {
	Ok(NodesConfigLayer {
		provision_token: load_secret_env("TRIDOT_SERVER_NODE_PROVISION_TOKEN")?,
		health_retention_secs: env_u64("TRIDOT_SERVER_NODE_HEALTH_RETENTION_SECS")?,
		health_prune_interval_secs: env_u64("TRIDOT_SERVER_NODE_HEALTH_PRUNE_INTERVAL_SECS")?,
	})
}
