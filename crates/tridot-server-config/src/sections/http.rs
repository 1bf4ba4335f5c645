// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Listener and request-surface configuration section.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;
/// Largest body any endpoint accepts; peer and telemetry payloads are tiny.
const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HttpConfigLayer {
	pub host: Option<String>,
	pub port: Option<u16>,
	pub max_body_bytes: Option<usize>,
	/// Browser origins allowed by CORS. Unset or empty allows any origin.
	pub cors_origins: Option<Vec<String>>,
}

impl HttpConfigLayer {
	pub fn merge(&mut self, other: Self) {
		if other.host.is_some() {
			self.host = other.host;
		}
		if other.port.is_some() {
			self.port = other.port;
		}
		if other.max_body_bytes.is_some() {
			self.max_body_bytes = other.max_body_bytes;
		}
		if other.cors_origins.is_some() {
			self.cors_origins = other.cors_origins;
		}
	}

	pub fn finalize(self) -> Result<HttpConfig, ConfigError> {
		let defaults = HttpConfig::default();
		let max_body_bytes = self.max_body_bytes.unwrap_or(defaults.max_body_bytes);
		if max_body_bytes == 0 {
			return Err(ConfigError::InvalidValue {
				key: "http.max_body_bytes".to_string(),
				message: "must be greater than zero".to_string(),
			});
		}

		let cors_origins = self
			.cors_origins
			.unwrap_or_default()
			.into_iter()
			.map(|origin| origin.trim().trim_end_matches('/').to_string())
			.filter(|origin| !origin.is_empty())
			.collect::<Vec<_>>();
		if let Some(bad) = cors_origins
			.iter()
			.find(|o| !(o.starts_with("https://") || o.starts_with("http://")))
		{
			return Err(ConfigError::InvalidValue {
				key: "http.cors_origins".to_string(),
				message: format!("'{bad}' is not an http(s) origin"),
			});
		}

		Ok(HttpConfig {
			host: self.host.unwrap_or(defaults.host),
			port: self.port.unwrap_or(defaults.port),
			max_body_bytes,
			cors_origins,
		})
	}
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HttpConfig {
	pub host: String,
	pub port: u16,
	pub max_body_bytes: usize,
	pub cors_origins: Vec<String>,
}

impl HttpConfig {
	pub fn allows_any_origin(&self) -> bool {
		self.cors_origins.is_empty()
	}
}

impl Default for HttpConfig {
	fn default() -> Self {
		Self {
			host: DEFAULT_HOST.to_string(),
			port: DEFAULT_PORT,
			max_body_bytes: DEFAULT_MAX_BODY_BYTES,
			cors_origins: Vec::new(),
		}
	}
}
