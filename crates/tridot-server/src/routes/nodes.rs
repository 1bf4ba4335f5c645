// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer event stream for node agents.
//!
//! A connection first receives a `peer_added` event for every live peer in
//! the region, then live events as they happen. A node that falls behind gets
//! a `resync` event and should reconnect.

use axum::{
	extract::{Path, State},
	response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tracing::{info, warn};
use tridot_server_provisioning::{PeerEvent, PeerNotifier};
use uuid::Uuid;

use crate::{api::AppState, auth::NodeAuth, error::ServerError};

/// Ends the subscription when the client goes away.
struct SubscriptionGuard {
	notifier: PeerNotifier,
	id: Uuid,
	region: String,
}

impl Drop for SubscriptionGuard {
	fn drop(&mut self) {
		self.notifier.unsubscribe(self.id);
		info!(region = %self.region, subscription_id = %self.id, "peer stream closed");
	}
}

fn to_event(event: &PeerEvent) -> Option<Event> {
	match Event::default().event(event.name()).json_data(event) {
		Ok(event) => Some(event),
		Err(e) => {
			warn!(error = %e, "failed to encode peer event");
			None
		}
	}
}

#[utoipa::path(
    get,
    path = "/nodes/regions/{region}/peers/stream",
    params(("region" = String, Path, description = "Region code")),
    responses(
        (status = 200, description = "Server-sent peer_added, peer_activated and peer_revoked events", content_type = "text/event-stream"),
        (status = 401, description = "Missing or invalid provision token", body = crate::error::ErrorResponse),
        (status = 404, description = "Unknown region", body = crate::error::ErrorResponse)
    ),
    security(("provision_token" = [])),
    tag = "nodes"
)]
pub async fn peer_stream(
	State(state): State<AppState>,
	_node: NodeAuth,
	Path(region): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ServerError> {
	let registry = &state.services.registry;
	let code = registry
		.regions()
		.get(&region)
		.map(|r| r.code.clone())
		.ok_or_else(|| ServerError::NotFound(format!("region {region}")))?;

	// Subscribe before the snapshot so nothing falls between them.
	let subscription = state.services.peer_notifier.subscribe(&code);
	let guard = SubscriptionGuard {
		notifier: state.services.peer_notifier.clone(),
		id: subscription.id,
		region: code.clone(),
	};
	let peers = registry.list_by_region(&code).await?;
	info!(region = %code, peers = peers.len(), subscription_id = %subscription.id, "peer stream opened");

	let snapshot: Vec<Result<Event, Infallible>> = peers
		.into_iter()
		.filter_map(|peer| to_event(&PeerEvent::added(&peer)))
		.map(Ok)
		.collect();

	let live = BroadcastStream::new(subscription.receiver).filter_map(move |result| {
		let _guard = &guard;
		match result {
			Ok(event) => to_event(&event).map(Ok),
			Err(BroadcastStreamRecvError::Lagged(skipped)) => {
				warn!(skipped, "peer stream lagged");
				Some(Ok(Event::default()
					.event("resync")
					.data(skipped.to_string())))
			}
		}
	});

	Ok(Sse::new(tokio_stream::iter(snapshot).chain(live)).keep_alive(
		KeepAlive::new()
			.interval(Duration::from_secs(15))
			.text("keep-alive"),
	))
}
