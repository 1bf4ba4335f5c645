// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tracing::instrument;
use tridot_wg_common::{PeerRecord, SecretString};
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 64;

/// Peer lifecycle change pushed to a region's node agents. Only node agents
/// see these, so `peer_added` carries the preshared key in the clear on the
/// wire; `Debug` keeps it redacted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum PeerEvent {
	#[serde(rename = "peer_added")]
	PeerAdded {
		peer_id: String,
		public_key: String,
		allowed_ip: String,
		#[serde(
			serialize_with = "expose_secret",
			skip_serializing_if = "Option::is_none"
		)]
		preshared_key: Option<SecretString>,
	},
	#[serde(rename = "peer_activated")]
	PeerActivated { peer_id: String },
	#[serde(rename = "peer_revoked")]
	PeerRevoked {
		peer_id: String,
		public_key: String,
		allowed_ip: String,
	},
}

fn expose_secret<S>(value: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
where
	S: Serializer,
{
	match value {
		Some(secret) => serializer.serialize_str(secret.expose()),
		None => serializer.serialize_none(),
	}
}

impl PeerEvent {
	/// `peer_added` for a stored peer.
	pub fn added(peer: &PeerRecord) -> Self {
		PeerEvent::PeerAdded {
			peer_id: peer.id.to_string(),
			public_key: peer.public_key.to_base64(),
			allowed_ip: peer.allowed_ips.to_string(),
			preshared_key: peer.preshared_key.as_ref().map(|psk| psk.to_base64()),
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			PeerEvent::PeerAdded { .. } => "peer_added",
			PeerEvent::PeerActivated { .. } => "peer_activated",
			PeerEvent::PeerRevoked { .. } => "peer_revoked",
		}
	}
}

/// A live subscription to one region's peer events.
pub struct Subscription {
	pub id: Uuid,
	pub region: String,
	pub receiver: broadcast::Receiver<PeerEvent>,
}

#[derive(Default)]
struct Channels {
	senders: HashMap<String, broadcast::Sender<PeerEvent>>,
	subscriptions: HashMap<Uuid, String>,
}

/// Fans peer lifecycle events out to node agents, per region.
#[derive(Clone, Default)]
pub struct PeerNotifier {
	channels: Arc<Mutex<Channels>>,
}

impl PeerNotifier {
	pub fn new() -> Self {
		Self::default()
	}

	fn channels(&self) -> MutexGuard<'_, Channels> {
		self.channels
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	#[instrument(skip(self))]
	pub fn subscribe(&self, region: &str) -> Subscription {
		let mut channels = self.channels();
		let receiver = match channels.senders.get(region) {
			Some(sender) => sender.subscribe(),
			None => {
				let (tx, rx) = broadcast::channel(CHANNEL_CAPACITY);
				channels.senders.insert(region.to_string(), tx);
				rx
			}
		};
		let id = Uuid::new_v4();
		channels.subscriptions.insert(id, region.to_string());

		Subscription {
			id,
			region: region.to_string(),
			receiver,
		}
	}

	/// Ends a subscription. The region's channel is closed once its last
	/// subscriber leaves. Returns false for an unknown id.
	#[instrument(skip(self), fields(%subscription_id))]
	pub fn unsubscribe(&self, subscription_id: Uuid) -> bool {
		let mut channels = self.channels();
		let Some(region) = channels.subscriptions.remove(&subscription_id) else {
			return false;
		};
		if !channels.subscriptions.values().any(|r| *r == region) {
			channels.senders.remove(&region);
		}
		true
	}

	#[instrument(skip(self, event), fields(event = event.name()))]
	pub fn notify(&self, region: &str, event: PeerEvent) {
		let channels = self.channels();
		if let Some(sender) = channels.senders.get(region) {
			let _ = sender.send(event);
		}
	}

	pub fn subscriber_count(&self, region: &str) -> usize {
		self.channels()
			.subscriptions
			.values()
			.filter(|r| r.as_str() == region)
			.count()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn activated(id: &str) -> PeerEvent {
		PeerEvent::PeerActivated {
			peer_id: id.to_string(),
		}
	}

	#[tokio::test]
	async fn subscriber_receives_region_events_only() {
		let notifier = PeerNotifier::new();
		let mut fra = notifier.subscribe("EU-FRA");
		let mut ist = notifier.subscribe("TR-IST");

		notifier.notify("EU-FRA", activated("a"));
		assert_eq!(fra.receiver.recv().await.unwrap(), activated("a"));
		assert!(ist.receiver.try_recv().is_err());
	}

	#[tokio::test]
	async fn last_unsubscribe_closes_channel() {
		let notifier = PeerNotifier::new();
		let first = notifier.subscribe("EU-FRA");
		let mut second = notifier.subscribe("EU-FRA");
		assert_eq!(notifier.subscriber_count("EU-FRA"), 2);

		assert!(notifier.unsubscribe(first.id));
		notifier.notify("EU-FRA", activated("b"));
		assert_eq!(second.receiver.recv().await.unwrap(), activated("b"));

		assert!(notifier.unsubscribe(second.id));
		assert_eq!(notifier.subscriber_count("EU-FRA"), 0);
		assert!(matches!(
			second.receiver.recv().await,
			Err(broadcast::error::RecvError::Closed)
		));
		assert!(!notifier.unsubscribe(second.id));
	}

	#[test]
	fn notify_without_subscribers_is_noop() {
		let notifier = PeerNotifier::new();
		notifier.notify("EU-FRA", activated("c"));
		assert_eq!(notifier.subscriber_count("EU-FRA"), 0);
	}

	#[test]
	fn events_serialize_with_type_tag() {
		let json = serde_json::to_value(PeerEvent::PeerRevoked {
			peer_id: "p".to_string(),
			public_key: "k".to_string(),
			allowed_ip: "10.20.0.2/32".to_string(),
		})
		.unwrap();
		assert_eq!(json["type"], "peer_revoked");
		assert_eq!(json["allowed_ip"], "10.20.0.2/32");
	}

	#[test]
	fn added_event_carries_preshared_key_on_the_wire_only() {
		let event = PeerEvent::PeerAdded {
			peer_id: "p".to_string(),
			public_key: "k".to_string(),
			allowed_ip: "10.20.0.2/32".to_string(),
			preshared_key: Some(SecretString::new("psk-value".to_string())),
		};
		let json = serde_json::to_value(&event).unwrap();
		assert_eq!(json["preshared_key"], "psk-value");
		assert!(!format!("{event:?}").contains("psk-value"));

		let legacy = serde_json::to_value(PeerEvent::PeerAdded {
			peer_id: "p".to_string(),
			public_key: "k".to_string(),
			allowed_ip: "10.20.0.2/32".to_string(),
			preshared_key: None,
		})
		.unwrap();
		assert!(legacy.get("preshared_key").is_none());
	}
}
