// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer lifecycle through the HTTP API.

mod common;

use axum::{
	body::Body,
	http::{Request, StatusCode},
};
use common::{body_bytes, body_json, body_text, setup_test_app};
use serde_json::json;
use tridot_wg_common::WgKeyPair;

#[tokio::test]
async fn provision_and_redeem_once() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;
	let client_key = WgKeyPair::generate().public_key().to_base64();

	let response = app
		.json(
			"POST",
			"/peers",
			&token,
			json!({ "name": "Pixel 8", "publicKey": client_key }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::CREATED);
	let created = body_json(response).await;
	assert_eq!(created["peer"]["allowedIps"], "10.20.0.2/32");
	assert_eq!(created["peer"]["status"], "pending");
	assert_eq!(created["peer"]["region"], "EU-FRA");

	let peer_id = created["peer"]["id"].as_str().unwrap();
	let config_id = created["configId"].as_str().unwrap();
	let uri = format!("/peers/{peer_id}/config/{config_id}");

	let response = app.get(&uri, &token).await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers().get("content-type").unwrap(),
		"text/plain; charset=utf-8"
	);
	assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
	let config = body_text(response).await;
	assert!(config.contains("Address = 10.20.0.2/32"));
	assert!(config.contains("Endpoint = fra.vpn.tridot.dev:51820"));
	assert!(config.contains("PresharedKey = "));
	assert!(!config.contains("PrivateKey"));

	let response = app.get(&uri, &token).await;
	assert_eq!(response.status(), StatusCode::GONE);
	let body = body_json(response).await;
	assert_eq!(body["error"], "already_consumed");
}

#[tokio::test]
async fn config_redeems_as_qr_png() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;
	let created = app.create_peer(&token, "phone").await;
	let uri = format!(
		"/peers/{}/config/{}",
		created["peer"]["id"].as_str().unwrap(),
		created["configId"].as_str().unwrap()
	);

	let response = app.get(&format!("{uri}?format=pdf"), &token).await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(body_json(response).await["error"], "bad_request");

	let response = app.get(&format!("{uri}?format=qr"), &token).await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
	assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
	let png = body_bytes(response).await;
	assert!(png.starts_with(b"\x89PNG\r\n\x1a\n"));

	let response = app.get(&uri, &token).await;
	assert_eq!(response.status(), StatusCode::GONE);
}

#[tokio::test]
async fn server_generated_key_is_in_config() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;

	let response = app
		.json("POST", "/peers", &token, json!({ "name": "laptop" }))
		.await;
	assert_eq!(response.status(), StatusCode::CREATED);
	let created = body_json(response).await;

	let uri = format!(
		"/peers/{}/config/{}",
		created["peer"]["id"].as_str().unwrap(),
		created["configId"].as_str().unwrap()
	);
	let config = body_text(app.get(&uri, &token).await).await;
	assert!(config.contains("PrivateKey = "));
}

#[tokio::test]
async fn missing_or_unknown_token_is_unauthorized() {
	let app = setup_test_app().await;

	let response = app
		.send(Request::builder().uri("/peers").body(Body::empty()).unwrap())
		.await;
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	let response = app.get("/peers", "tdt_not-a-real-token").await;
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
	let body = body_json(response).await;
	assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn quota_blocks_extra_devices() {
	let app = setup_test_app().await;
	let (_, token) = app.account("free").await;

	app.create_peer(&token, "phone").await;

	let response = app
		.json(
			"POST",
			"/peers",
			&token,
			json!({
				"name": "tablet",
				"publicKey": WgKeyPair::generate().public_key().to_base64(),
			}),
		)
		.await;
	assert_eq!(response.status(), StatusCode::CONFLICT);
	let body = body_json(response).await;
	assert_eq!(body["error"], "quota_exceeded");

	let quota = body_json(app.get("/account/quota", &token).await).await;
	assert_eq!(quota["planTier"], "free");
	assert_eq!(quota["maxPeers"], 1);
	assert_eq!(quota["currentPeerCount"], 1);
	assert_eq!(quota["remaining"], 0);
}

#[tokio::test]
async fn invalid_input_is_bad_request() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;

	let response = app
		.json(
			"POST",
			"/peers",
			&token,
			json!({ "name": "phone", "publicKey": "not-base64" }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	let response = app
		.json(
			"POST",
			"/peers",
			&token,
			json!({ "name": "phone", "region": "MARS-1" }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_body_is_json_bad_request() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;

	let response = app
		.json("POST", "/peers", &token, json!({ "publicKey": null }))
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	let body = body_json(response).await;
	assert_eq!(body["error"], "bad_request");
	assert!(body["message"].as_str().unwrap().contains("name"));

	let response = app
		.send(
			Request::builder()
				.method("POST")
				.uri("/peers")
				.header("authorization", format!("Bearer {token}"))
				.header("content-type", "application/json")
				.body(Body::from("{not json"))
				.unwrap(),
		)
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(body_json(response).await["error"], "bad_request");

	let created = app.create_peer(&token, "phone").await;
	let response = app
		.json(
			"PATCH",
			&format!("/peers/{}", created["peer"]["id"].as_str().unwrap()),
			&token,
			json!({ "name": 7 }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(body_json(response).await["error"], "bad_request");

	let response = app.get("/peers?accountId=not-a-uuid", &token).await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(body_json(response).await["error"], "bad_request");
}

#[tokio::test]
async fn duplicate_public_key_conflicts() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;
	let key = WgKeyPair::generate().public_key().to_base64();

	let body = json!({ "name": "phone", "publicKey": key });
	let response = app.json("POST", "/peers", &token, body.clone()).await;
	assert_eq!(response.status(), StatusCode::CREATED);
	let response = app.json("POST", "/peers", &token, body).await;
	assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn peers_are_scoped_to_their_account() {
	let app = setup_test_app().await;
	let (_, owner) = app.account("standard").await;
	let (other_id, other) = app.account("standard").await;

	let created = app.create_peer(&owner, "phone").await;
	let peer_id = created["peer"]["id"].as_str().unwrap();
	let config_id = created["configId"].as_str().unwrap();

	let response = app.get(&format!("/peers/{peer_id}"), &other).await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	let response = app
		.get(&format!("/peers/{peer_id}/config/{config_id}"), &other)
		.await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	// The foreign attempt did not burn the ticket.
	let response = app
		.get(&format!("/peers/{peer_id}/config/{config_id}"), &owner)
		.await;
	assert_eq!(response.status(), StatusCode::OK);

	let response = app
		.get(&format!("/peers?accountId={other_id}"), &owner)
		.await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	let listed = body_json(app.get("/peers", &other).await).await;
	assert_eq!(listed["peers"].as_array().unwrap().len(), 0);
	let listed = body_json(app.get("/peers", &owner).await).await;
	assert_eq!(listed["peers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rename_and_revoke() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;
	let created = app.create_peer(&token, "phone").await;
	let peer_id = created["peer"]["id"].as_str().unwrap();
	let uri = format!("/peers/{peer_id}");

	let response = app
		.json("PATCH", &uri, &token, json!({ "name": "work phone" }))
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_json(response).await["name"], "work phone");

	let response = app.json("PATCH", &uri, &token, json!({ "name": "   " })).await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	let response = app
		.send(
			Request::builder()
				.method("DELETE")
				.uri(&uri)
				.header("authorization", format!("Bearer {token}"))
				.body(Body::empty())
				.unwrap(),
		)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	let revoked = body_json(response).await;
	assert_eq!(revoked["status"], "revoked");
	assert!(revoked["revokedAt"].is_string());

	// Tickets die with the peer.
	let response = app
		.get(
			&format!("/peers/{peer_id}/config/{}", created["configId"].as_str().unwrap()),
			&token,
		)
		.await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	let response = app
		.send(
			Request::builder()
				.method("DELETE")
				.uri(&uri)
				.header("authorization", format!("Bearer {token}"))
				.body(Body::empty())
				.unwrap(),
		)
		.await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	let response = app
		.json("PATCH", &uri, &token, json!({ "name": "again" }))
		.await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn reissue_voids_previous_ticket() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;
	let created = app.create_peer(&token, "phone").await;
	let peer_id = created["peer"]["id"].as_str().unwrap();
	let first = created["configId"].as_str().unwrap();

	let response = app
		.json("POST", &format!("/peers/{peer_id}/config"), &token, json!({}))
		.await;
	assert_eq!(response.status(), StatusCode::CREATED);
	let ticket = body_json(response).await;
	let second = ticket["configId"].as_str().unwrap();
	assert_ne!(first, second);
	assert_eq!(ticket["peerId"], peer_id);

	let response = app
		.get(&format!("/peers/{peer_id}/config/{first}"), &token)
		.await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
	let response = app
		.get(&format!("/peers/{peer_id}/config/{second}"), &token)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn usage_counts_pending_peers() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;
	app.create_peer(&token, "phone").await;
	app.create_peer(&token, "laptop").await;

	let usage = body_json(app.get("/peers/usage", &token).await).await;
	assert_eq!(usage["peerCount"], 2);
	assert_eq!(usage["activePeerCount"], 0);
	assert_eq!(usage["pendingPeerCount"], 2);
	assert!(usage["lastHandshakeAt"].is_null());
}

#[tokio::test]
async fn malformed_peer_id_is_not_found() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;
	let response = app.get("/peers/not-a-uuid", &token).await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
