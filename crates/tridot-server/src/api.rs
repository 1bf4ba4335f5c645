// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router.

use axum::{
	extract::DefaultBodyLimit,
	http::HeaderValue,
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use tower_http::{
	cors::{AllowOrigin, Any, CorsLayer},
	trace::TraceLayer,
};
use tracing::info;
use tridot_server_config::{HttpConfig, RegionConfig, ServerConfig, ServerKeySource};
use tridot_server_db::{AccountRepository, AccountStore, PeerRepository, PeerStore, SqlitePool};
use tridot_server_jobs::JobScheduler;
use tridot_server_provisioning::{ProvisioningServices, Region, RegionDirectory};
use tridot_wg_common::{get_or_create_server_key, load_wg_key_env, SecretString};

use crate::error::ServerError;
use crate::routes;

#[derive(Clone)]
pub struct AppState {
	pub pool: SqlitePool,
	pub services: ProvisioningServices,
	pub accounts: Arc<dyn AccountStore>,
	/// Shared token node agents present. Node endpoints answer 503 without it.
	pub node_token: Option<SecretString>,
	pub job_scheduler: Option<Arc<JobScheduler>>,
}

/// Environment variable that carries a region's server private key, e.g.
/// `TRIDOT_SERVER_REGION_EU_FRA_PRIVATE_KEY` (or `..._PRIVATE_KEY_FILE`).
pub fn region_key_env_var(code: &str) -> String {
	let code: String = code
		.chars()
		.map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
		.collect();
	format!("TRIDOT_SERVER_REGION_{code}_PRIVATE_KEY")
}

/// Resolves each region's server public key. A private key in the region's
/// environment variable wins over the configured source; key files are
/// created on first start.
pub async fn build_region_directory(
	regions: &[RegionConfig],
	default_region: &str,
) -> Result<RegionDirectory, ServerError> {
	let mut resolved = Vec::with_capacity(regions.len());
	for config in regions {
		let (server_public_key, source) =
			match load_wg_key_env(&region_key_env_var(&config.code))? {
				Some(keypair) => (*keypair.public_key(), "environment"),
				None => match &config.server_key {
					ServerKeySource::PublicKey(key) => (*key, "config"),
					ServerKeySource::KeyFile(path) => {
						(*get_or_create_server_key(path).await?.public_key(), "key_file")
					}
				},
			};
		info!(
			region = %config.code,
			subnet = %config.subnet,
			server_key = %server_public_key.prefix(),
			key_source = source,
			"region configured"
		);
		resolved.push(Region::from_config(config, server_public_key)?);
	}
	Ok(RegionDirectory::new(resolved, default_region)?)
}

pub async fn create_app_state(pool: SqlitePool, config: &ServerConfig) -> Result<AppState, ServerError> {
	let regions =
		build_region_directory(&config.regions, &config.provisioning.default_region).await?;
	let peers: Arc<dyn PeerStore> = Arc::new(PeerRepository::new(pool.clone()));
	let accounts: Arc<dyn AccountStore> = Arc::new(AccountRepository::new(pool.clone()));
	let services = ProvisioningServices::with_stores(
		peers,
		Arc::clone(&accounts),
		config.provisioning.clone(),
		regions,
		config.plans.clone(),
	)
	.await?;

	if config.nodes.provision_token.is_none() {
		tracing::warn!("no node provision token configured; telemetry and peer streams are disabled");
	}

	Ok(AppState {
		accounts,
		pool,
		services,
		node_token: config.nodes.provision_token.clone(),
		job_scheduler: None,
	})
}

pub fn create_router(state: AppState) -> Router {
	Router::new()
		.route("/health", get(routes::health::health_check))
		.route("/status", get(routes::status::region_status))
		.route("/api/openapi.json", get(routes::docs::openapi_json))
		.route(
			"/peers",
			get(routes::peers::list_peers).post(routes::peers::create_peer),
		)
		.route("/peers/usage", get(routes::peers::peer_usage))
		.route(
			"/peers/{id}",
			get(routes::peers::get_peer)
				.patch(routes::peers::update_peer)
				.delete(routes::peers::revoke_peer),
		)
		.route("/peers/{id}/config", post(routes::peers::reissue_config))
		.route(
			"/peers/{id}/config/{config_id}",
			get(routes::peers::redeem_config),
		)
		.route("/account/quota", get(routes::account::get_quota))
		.route(
			"/telemetry/handshake",
			post(routes::telemetry::report_handshake),
		)
		.route("/telemetry/health", post(routes::telemetry::report_health))
		.route(
			"/nodes/regions/{region}/peers/stream",
			get(routes::nodes::peer_stream),
		)
		.with_state(state)
}

/// Wraps the router with request tracing, the body size limit and CORS.
pub fn apply_http_layers(router: Router, http: &HttpConfig) -> Result<Router, ServerError> {
	let origins = if http.allows_any_origin() {
		AllowOrigin::any()
	} else {
		let values = http
			.cors_origins
			.iter()
			.map(|origin| {
				HeaderValue::from_str(origin)
					.map_err(|_| ServerError::Internal(format!("invalid CORS origin '{origin}'")))
			})
			.collect::<Result<Vec<_>, _>>()?;
		AllowOrigin::list(values)
	};

	Ok(router
		.layer(DefaultBodyLimit::max(http.max_body_bytes))
		.layer(TraceLayer::new_for_http())
		.layer(
			CorsLayer::new()
				.allow_origin(origins)
				.allow_methods(Any)
				.allow_headers(Any),
		))
}
