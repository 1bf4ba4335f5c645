// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared setup for router integration tests.

#![allow(dead_code)]

use axum::{
	body::Body,
	http::{Request, Response, StatusCode},
	Router,
};
use serde_json::Value;
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;
use tridot_server::{
	auth::{generate_account_token, hash_token},
	apply_http_layers, create_app_state, create_router,
	db::{open_database, AccountRepository},
	AppState,
};
use tridot_server_config::{
	DatabaseConfig, HttpConfig, LoggingConfig, NodesConfig, PlansConfig, ProvisioningConfig,
	RegionConfig, ServerConfig, ServerKeySource,
};
use tridot_wg_common::{AccountId, SecretString, WgKeyPair};

pub const NODE_TOKEN: &str = "node-provision-secret";

pub struct TestApp {
	pub router: Router,
	pub state: AppState,
	pub accounts: AccountRepository,
	_dir: TempDir,
}

pub fn test_config(node_token: Option<&str>) -> ServerConfig {
	ServerConfig {
		http: HttpConfig::default(),
		database: DatabaseConfig::default(),
		logging: LoggingConfig::default(),
		provisioning: ProvisioningConfig::default(),
		plans: PlansConfig::default(),
		regions: vec![RegionConfig {
			code: "EU-FRA".to_string(),
			name: "Frankfurt".to_string(),
			subnet: "10.20.0.0/16".parse().unwrap(),
			endpoint: "fra.vpn.tridot.dev:51820".to_string(),
			server_key: ServerKeySource::PublicKey(*WgKeyPair::generate().public_key()),
			dns: vec!["1.1.1.1".parse().unwrap()],
			mtu: None,
			persistent_keepalive: 25,
		}],
		nodes: NodesConfig {
			provision_token: node_token.map(|t| SecretString::new(t.to_string())),
			..Default::default()
		},
	}
}

pub async fn setup_test_app() -> TestApp {
	setup_with_config(test_config(Some(NODE_TOKEN))).await
}

pub async fn setup_with_config(config: ServerConfig) -> TestApp {
	let dir = tempdir().unwrap();
	let db_url = format!("sqlite:{}?mode=rwc", dir.path().join("tridot.db").display());
	let pool = open_database(&db_url, 4).await.unwrap();

	let state = create_app_state(pool.clone(), &config).await.unwrap();
	TestApp {
		router: apply_http_layers(create_router(state.clone()), &config.http).unwrap(),
		state,
		accounts: AccountRepository::new(pool),
		_dir: dir,
	}
}

impl TestApp {
	/// Creates an account on `plan` and returns it with a bearer token.
	pub async fn account(&self, plan: &str) -> (AccountId, String) {
		let account = self.accounts.create_account(plan).await.unwrap();
		let token = generate_account_token();
		self.accounts
			.create_token(account.id, &hash_token(token.expose()))
			.await
			.unwrap();
		(account.id, token.expose().clone())
	}

	pub async fn send(&self, request: Request<Body>) -> Response<Body> {
		self.router.clone().oneshot(request).await.unwrap()
	}

	pub async fn get(&self, uri: &str, token: &str) -> Response<Body> {
		self.send(
			Request::builder()
				.uri(uri)
				.header("authorization", format!("Bearer {token}"))
				.body(Body::empty())
				.unwrap(),
		)
		.await
	}

	pub async fn json(&self, method: &str, uri: &str, token: &str, body: Value) -> Response<Body> {
		self.send(
			Request::builder()
				.method(method)
				.uri(uri)
				.header("authorization", format!("Bearer {token}"))
				.header("content-type", "application/json")
				.body(Body::from(body.to_string()))
				.unwrap(),
		)
		.await
	}

	pub async fn node_post(&self, uri: &str, token: Option<&str>, body: Value) -> Response<Body> {
		let mut builder = Request::builder()
			.method("POST")
			.uri(uri)
			.header("content-type", "application/json");
		if let Some(token) = token {
			builder = builder.header("x-provision-token", token);
		}
		self.send(builder.body(Body::from(body.to_string())).unwrap())
			.await
	}

	/// Creates a peer with a fresh client key and returns the response body.
	pub async fn create_peer(&self, token: &str, name: &str) -> Value {
		let response = self
			.json(
				"POST",
				"/peers",
				token,
				serde_json::json!({
					"name": name,
					"publicKey": WgKeyPair::generate().public_key().to_base64(),
				}),
			)
			.await;
		assert_eq!(response.status(), StatusCode::CREATED);
		body_json(response).await
	}
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
	axum::body::to_bytes(response.into_body(), usize::MAX)
		.await
		.unwrap()
		.to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
	serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response<Body>) -> String {
	String::from_utf8(body_bytes(response).await).unwrap()
}
