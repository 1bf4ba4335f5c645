// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Telemetry from node agents.
//!
//! Handshakes go to the registry as a conditional update per peer. Health
//! reports only feed the in-memory [`HealthBoard`] and never touch peers.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use tridot_server_db::HandshakeUpdate;
use tridot_wg_common::{NodeId, PeerId};

use crate::error::{ProvisioningError, Result};
use crate::registry::PeerRegistry;

/// Handshakes claimed further in the future than this are rejected.
const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Nodes that reported within this window count as online.
const ONLINE_WINDOW_SECS: i64 = 120;

#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
	pub region: String,
	pub active_peers: u32,
	pub cpu_percent: f64,
	pub throughput_mbps: f64,
	pub packet_loss: f64,
}

impl HealthReport {
	fn validate(&self) -> Result<()> {
		let finite = [self.cpu_percent, self.throughput_mbps, self.packet_loss]
			.iter()
			.all(|v| v.is_finite());
		if !finite {
			return Err(ProvisioningError::Validation(
				"metrics must be finite numbers".to_string(),
			));
		}
		if !(0.0..=100.0).contains(&self.cpu_percent) {
			return Err(ProvisioningError::Validation(
				"cpu_percent must be between 0 and 100".to_string(),
			));
		}
		if self.throughput_mbps < 0.0 {
			return Err(ProvisioningError::Validation(
				"throughput_mbps must not be negative".to_string(),
			));
		}
		if !(0.0..=1.0).contains(&self.packet_loss) {
			return Err(ProvisioningError::Validation(
				"packet_loss must be between 0 and 1".to_string(),
			));
		}
		Ok(())
	}
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeHealth {
	pub node_id: NodeId,
	pub region: String,
	pub active_peers: u32,
	pub cpu_percent: f64,
	pub throughput_mbps: f64,
	pub packet_loss: f64,
	pub capacity_score: u8,
	pub reported_at: DateTime<Utc>,
}

/// Headroom of a node, 0 (saturated) to 100 (idle).
pub fn capacity_score(report: &HealthReport) -> u8 {
	let peers = (f64::from(report.active_peers) * 4.0).min(60.0);
	let score = 100.0
		- peers
		- (report.cpu_percent / 2.0).round()
		- (report.throughput_mbps / 100.0).round()
		- (report.packet_loss * 50.0).round();
	score.clamp(0.0, 100.0) as u8
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionStatus {
	pub code: String,
	pub name: String,
	pub endpoint: String,
	pub node_count: usize,
	pub online_nodes: usize,
	/// Mean capacity of online nodes. `None` when no node is online.
	pub average_capacity: Option<f64>,
	pub last_report_at: Option<DateTime<Utc>>,
}

/// Latest health report per node.
#[derive(Debug, Default)]
pub struct HealthBoard {
	nodes: Mutex<HashMap<NodeId, NodeHealth>>,
}

impl HealthBoard {
	pub fn new() -> Self {
		Self::default()
	}

	fn nodes(&self) -> MutexGuard<'_, HashMap<NodeId, NodeHealth>> {
		self.nodes
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	pub fn record(&self, health: NodeHealth) {
		self.nodes().insert(health.node_id, health);
	}

	pub fn get(&self, node_id: NodeId) -> Option<NodeHealth> {
		self.nodes().get(&node_id).cloned()
	}

	/// Forgets nodes whose latest report is older than `cutoff`.
	pub fn prune_before(&self, cutoff: DateTime<Utc>) -> usize {
		let mut nodes = self.nodes();
		let before = nodes.len();
		nodes.retain(|_, n| n.reported_at >= cutoff);
		before - nodes.len()
	}

	pub fn len(&self) -> usize {
		self.nodes().len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes().is_empty()
	}

	pub fn in_region(&self, region: &str) -> Vec<NodeHealth> {
		let mut nodes: Vec<_> = self
			.nodes()
			.values()
			.filter(|n| n.region == region)
			.cloned()
			.collect();
		nodes.sort_by_key(|n| n.node_id);
		nodes
	}
}

#[derive(Clone)]
pub struct TelemetryIngest {
	registry: PeerRegistry,
	board: Arc<HealthBoard>,
}

impl TelemetryIngest {
	pub fn new(registry: PeerRegistry, board: Arc<HealthBoard>) -> Self {
		Self { registry, board }
	}

	pub fn board(&self) -> &HealthBoard {
		&self.board
	}

	/// Records a handshake observed by a node. Older timestamps and revoked
	/// peers leave the record unchanged and still succeed.
	#[instrument(skip(self), fields(%peer_id, %at))]
	pub async fn report_handshake(&self, peer_id: PeerId, at: DateTime<Utc>) -> Result<HandshakeUpdate> {
		if at > Utc::now() + Duration::seconds(MAX_CLOCK_SKEW_SECS) {
			return Err(ProvisioningError::Validation(
				"handshake timestamp is in the future".to_string(),
			));
		}

		let update = self.registry.mark_handshake(peer_id, at).await?;
		match &update {
			HandshakeUpdate::NotFound => {
				return Err(ProvisioningError::NotFound(format!("peer {peer_id}")));
			}
			HandshakeUpdate::Stale => debug!("stale handshake ignored"),
			HandshakeUpdate::Revoked => debug!("handshake for revoked peer ignored"),
			HandshakeUpdate::Activated { .. } | HandshakeUpdate::Advanced => {}
		}
		Ok(update)
	}

	/// Stores a node's health report and returns it with its capacity score.
	#[instrument(skip(self, report), fields(%node_id, region = %report.region))]
	pub fn report_health(&self, node_id: NodeId, report: HealthReport) -> Result<NodeHealth> {
		report.validate()?;
		let region = self
			.registry
			.regions()
			.get(&report.region)
			.ok_or_else(|| ProvisioningError::Validation(format!("unknown region {}", report.region)))?;

		let health = NodeHealth {
			node_id,
			region: region.code.clone(),
			active_peers: report.active_peers,
			cpu_percent: report.cpu_percent,
			throughput_mbps: report.throughput_mbps,
			packet_loss: report.packet_loss,
			capacity_score: capacity_score(&report),
			reported_at: Utc::now(),
		};
		info!(capacity_score = health.capacity_score, "node health reported");
		self.board.record(health.clone());
		Ok(health)
	}

	/// Drops nodes silent for longer than `retention`. Online nodes are kept
	/// whatever the retention.
	#[instrument(skip(self))]
	pub fn prune_nodes(&self, now: DateTime<Utc>, retention: Duration) -> usize {
		let retention = retention.max(Duration::seconds(ONLINE_WINDOW_SECS));
		let pruned = self.board.prune_before(now - retention);
		if pruned > 0 {
			info!(pruned, "forgot silent nodes");
		}
		pruned
	}

	/// Aggregate health of every configured region.
	pub fn status(&self, now: DateTime<Utc>) -> Vec<RegionStatus> {
		let online_since = now - Duration::seconds(ONLINE_WINDOW_SECS);
		self.registry
			.regions()
			.iter()
			.map(|region| {
				let nodes = self.board.in_region(&region.code);
				let online: Vec<_> = nodes
					.iter()
					.filter(|n| n.reported_at >= online_since)
					.collect();
				let average_capacity = (!online.is_empty()).then(|| {
					online
						.iter()
						.map(|n| f64::from(n.capacity_score))
						.sum::<f64>() / online.len() as f64
				});
				RegionStatus {
					code: region.code.clone(),
					name: region.name.clone(),
					endpoint: region.endpoint().to_string(),
					node_count: nodes.len(),
					online_nodes: online.len(),
					average_capacity,
					last_report_at: nodes.iter().map(|n| n.reported_at).max(),
				}
			})
			.collect()
	}
}
