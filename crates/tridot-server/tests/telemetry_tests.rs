// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Node-facing endpoints: telemetry reports and the peer event stream.

mod common;

use axum::{
	body::Body,
	http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use common::{body_json, setup_test_app, setup_with_config, test_config, NODE_TOKEN};
use futures::StreamExt;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn handshake_activates_then_ignores_stale() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;
	let created = app.create_peer(&token, "phone").await;
	let peer_id = created["peer"]["id"].as_str().unwrap().to_string();

	let seen = Utc::now() - Duration::seconds(30);
	let response = app
		.node_post(
			"/telemetry/handshake",
			Some(NODE_TOKEN),
			json!({ "peerId": peer_id, "timestamp": seen.to_rfc3339() }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_json(response).await["outcome"], "activated");

	let peer = body_json(app.get(&format!("/peers/{peer_id}"), &token).await).await;
	assert_eq!(peer["status"], "active");
	assert!(peer["lastHandshakeAt"].is_string());

	let older = seen - Duration::seconds(60);
	let response = app
		.node_post(
			"/telemetry/handshake",
			Some(NODE_TOKEN),
			json!({ "peerId": peer_id, "timestamp": older.to_rfc3339() }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(body_json(response).await["outcome"], "stale");

	let newer = Utc::now();
	let response = app
		.node_post(
			"/telemetry/handshake",
			Some(NODE_TOKEN),
			json!({ "peerId": peer_id, "timestamp": newer.to_rfc3339() }),
		)
		.await;
	assert_eq!(body_json(response).await["outcome"], "advanced");
}

#[tokio::test]
async fn handshake_rejects_unknown_peer_and_future_time() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;
	let created = app.create_peer(&token, "phone").await;

	let response = app
		.node_post(
			"/telemetry/handshake",
			Some(NODE_TOKEN),
			json!({ "peerId": Uuid::new_v4(), "timestamp": Utc::now().to_rfc3339() }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);

	let response = app
		.node_post(
			"/telemetry/handshake",
			Some(NODE_TOKEN),
			json!({
				"peerId": created["peer"]["id"],
				"timestamp": (Utc::now() + Duration::hours(1)).to_rfc3339(),
			}),
		)
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_reports_are_json_bad_request() {
	let app = setup_test_app().await;

	let response = app
		.node_post(
			"/telemetry/handshake",
			Some(NODE_TOKEN),
			json!({ "peerId": "zzz", "timestamp": Utc::now().to_rfc3339() }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	let body = body_json(response).await;
	assert_eq!(body["error"], "bad_request");
	assert!(body["message"].is_string());

	let response = app
		.node_post("/telemetry/health", Some(NODE_TOKEN), json!({ "region": "EU-FRA" }))
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
	assert_eq!(body_json(response).await["error"], "bad_request");
}

#[tokio::test]
async fn node_endpoints_require_provision_token() {
	let app = setup_test_app().await;
	let report = json!({ "peerId": Uuid::new_v4(), "timestamp": Utc::now().to_rfc3339() });

	let response = app
		.node_post("/telemetry/handshake", None, report.clone())
		.await;
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

	let response = app
		.node_post("/telemetry/handshake", Some("wrong-token"), report)
		.await;
	assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn node_endpoints_unavailable_without_configured_token() {
	let app = setup_with_config(test_config(None)).await;
	let response = app
		.node_post(
			"/telemetry/health",
			Some(NODE_TOKEN),
			json!({ "nodeId": Uuid::new_v4(), "region": "EU-FRA" }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn health_reports_feed_region_status() {
	let app = setup_test_app().await;
	let node_id = Uuid::new_v4();

	let response = app
		.node_post(
			"/telemetry/health",
			Some(NODE_TOKEN),
			json!({
				"nodeId": node_id,
				"region": "eu-fra",
				"activePeers": 10,
				"cpuPercent": 20.0,
				"throughputMbps": 100.0,
				"packetLoss": 0.0,
			}),
		)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	let body = body_json(response).await;
	assert_eq!(body["region"], "EU-FRA");
	assert_eq!(body["capacityScore"], 49);

	let response = app
		.send(Request::builder().uri("/status").body(Body::empty()).unwrap())
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	let status = body_json(response).await;
	let region = &status["regions"][0];
	assert_eq!(region["code"], "EU-FRA");
	assert_eq!(region["nodeCount"], 1);
	assert_eq!(region["onlineNodes"], 1);
	assert_eq!(region["averageCapacity"], 49.0);
}

#[tokio::test]
async fn health_report_validates_input() {
	let app = setup_test_app().await;

	let response = app
		.node_post(
			"/telemetry/health",
			Some(NODE_TOKEN),
			json!({ "nodeId": Uuid::new_v4(), "region": "MARS-1" }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);

	let response = app
		.node_post(
			"/telemetry/health",
			Some(NODE_TOKEN),
			json!({ "nodeId": Uuid::new_v4(), "region": "EU-FRA", "cpuPercent": 140.0 }),
		)
		.await;
	assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

async fn next_event(stream: &mut axum::body::BodyDataStream) -> String {
	let chunk = tokio::time::timeout(std::time::Duration::from_secs(5), stream.next())
		.await
		.expect("event within timeout")
		.expect("stream open")
		.expect("frame");
	String::from_utf8(chunk.to_vec()).unwrap()
}

#[tokio::test]
async fn peer_stream_sends_snapshot_then_live_events() {
	let app = setup_test_app().await;
	let (_, token) = app.account("standard").await;
	let first = app.create_peer(&token, "phone").await;

	let response = app
		.send(
			Request::builder()
				.uri("/nodes/regions/eu-fra/peers/stream")
				.header("x-provision-token", NODE_TOKEN)
				.body(Body::empty())
				.unwrap(),
		)
		.await;
	assert_eq!(response.status(), StatusCode::OK);
	assert_eq!(
		response.headers().get("content-type").unwrap(),
		"text/event-stream"
	);
	assert_eq!(app.state.services.peer_notifier.subscriber_count("EU-FRA"), 1);

	let mut stream = response.into_body().into_data_stream();

	let snapshot = next_event(&mut stream).await;
	assert!(snapshot.contains("event: peer_added"));
	assert!(snapshot.contains(first["peer"]["id"].as_str().unwrap()));

	let second = app.create_peer(&token, "laptop").await;
	let live = next_event(&mut stream).await;
	assert!(live.contains("event: peer_added"));
	assert!(live.contains(second["peer"]["id"].as_str().unwrap()));
	assert!(live.contains("10.20.0.3/32"));

	drop(stream);
	assert_eq!(app.state.services.peer_notifier.subscriber_count("EU-FRA"), 0);
}

#[tokio::test]
async fn peer_stream_unknown_region_is_not_found() {
	let app = setup_test_app().await;
	let response = app
		.send(
			Request::builder()
				.uri("/nodes/regions/MARS-1/peers/stream")
				.header("x-provision-token", NODE_TOKEN)
				.body(Body::empty())
				.unwrap(),
		)
		.await;
	assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
