// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tridot_server_db::{HandshakeUpdate, PeerUsage};
use tridot_wg_common::{NodeId, PeerRecord};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::provisioning::{IssuedTicket, ProvisionedPeer};
use crate::quota::AccountQuota;
use crate::telemetry::{HealthReport, NodeHealth, RegionStatus};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePeerRequest {
	pub name: String,
	/// Omit to have the server generate the client keypair.
	#[serde(default)]
	pub public_key: Option<String>,
	#[serde(default)]
	pub region: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePeerRequest {
	pub name: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ListPeersQuery {
	/// Must match the authenticated account when given.
	pub account_id: Option<Uuid>,
}

/// How a redeemed config is delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
	/// The `.conf` file as text.
	#[default]
	Text,
	/// A PNG QR code of the same text.
	Qr,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct RedeemConfigQuery {
	#[serde(default)]
	#[param(inline)]
	pub format: ConfigFormat,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeerResponse {
	pub id: String,
	pub account_id: String,
	pub name: String,
	pub public_key: String,
	pub allowed_ips: String,
	pub region: String,
	pub endpoint: String,
	pub status: String,
	pub last_handshake_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub revoked_at: Option<DateTime<Utc>>,
}

impl From<PeerRecord> for PeerResponse {
	fn from(peer: PeerRecord) -> Self {
		Self {
			id: peer.id.to_string(),
			account_id: peer.account_id.to_string(),
			name: peer.name,
			public_key: peer.public_key.to_base64(),
			allowed_ips: peer.allowed_ips.to_string(),
			region: peer.region,
			endpoint: peer.endpoint,
			status: peer.status.to_string(),
			last_handshake_at: peer.last_handshake_at,
			created_at: peer.created_at,
			updated_at: peer.updated_at,
			revoked_at: peer.revoked_at,
		}
	}
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ListPeersResponse {
	pub peers: Vec<PeerResponse>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreatePeerResponse {
	pub peer: PeerResponse,
	/// Single-use token for `GET /peers/{id}/config/{configId}`.
	pub config_id: String,
	pub config_expires_at: DateTime<Utc>,
}

impl From<ProvisionedPeer> for CreatePeerResponse {
	fn from(provisioned: ProvisionedPeer) -> Self {
		Self {
			config_id: provisioned.ticket.config_id.expose().clone(),
			config_expires_at: provisioned.ticket.expires_at,
			peer: provisioned.peer.into(),
		}
	}
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TicketResponse {
	pub peer_id: String,
	pub config_id: String,
	pub issued_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

impl From<IssuedTicket> for TicketResponse {
	fn from(ticket: IssuedTicket) -> Self {
		Self {
			peer_id: ticket.peer_id.to_string(),
			config_id: ticket.config_id.expose().clone(),
			issued_at: ticket.issued_at,
			expires_at: ticket.expires_at,
		}
	}
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuotaResponse {
	pub account_id: String,
	pub plan_tier: String,
	pub max_peers: u32,
	pub current_peer_count: u32,
	pub remaining: u32,
}

impl From<AccountQuota> for QuotaResponse {
	fn from(quota: AccountQuota) -> Self {
		Self {
			remaining: quota.remaining(),
			account_id: quota.account_id.to_string(),
			plan_tier: quota.plan_tier,
			max_peers: quota.max_peers,
			current_peer_count: quota.current_peer_count,
		}
	}
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageResponse {
	pub peer_count: u32,
	pub active_peer_count: u32,
	pub pending_peer_count: u32,
	pub last_handshake_at: Option<DateTime<Utc>>,
}

impl From<PeerUsage> for UsageResponse {
	fn from(usage: PeerUsage) -> Self {
		Self {
			pending_peer_count: usage.peer_count.saturating_sub(usage.active_peer_count),
			peer_count: usage.peer_count,
			active_peer_count: usage.active_peer_count,
			last_handshake_at: usage.last_handshake_at,
		}
	}
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeReportRequest {
	pub peer_id: Uuid,
	pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HandshakeReportResponse {
	/// One of `activated`, `advanced`, `stale`, `revoked`.
	pub outcome: String,
}

impl HandshakeReportResponse {
	pub fn from_update(update: &HandshakeUpdate) -> Self {
		let outcome = match update {
			HandshakeUpdate::Activated { .. } => "activated",
			HandshakeUpdate::Advanced => "advanced",
			HandshakeUpdate::Stale => "stale",
			HandshakeUpdate::Revoked => "revoked",
			HandshakeUpdate::NotFound => "not_found",
		};
		Self {
			outcome: outcome.to_string(),
		}
	}
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthReportRequest {
	pub node_id: Uuid,
	pub region: String,
	#[serde(default)]
	pub active_peers: u32,
	#[serde(default)]
	pub cpu_percent: f64,
	#[serde(default)]
	pub throughput_mbps: f64,
	#[serde(default)]
	pub packet_loss: f64,
}

impl HealthReportRequest {
	pub fn into_parts(self) -> (NodeId, HealthReport) {
		(
			NodeId::from_uuid(self.node_id),
			HealthReport {
				region: self.region,
				active_peers: self.active_peers,
				cpu_percent: self.cpu_percent,
				throughput_mbps: self.throughput_mbps,
				packet_loss: self.packet_loss,
			},
		)
	}
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthReportResponse {
	pub node_id: String,
	pub region: String,
	pub capacity_score: u8,
}

impl From<NodeHealth> for HealthReportResponse {
	fn from(health: NodeHealth) -> Self {
		Self {
			node_id: health.node_id.to_string(),
			region: health.region,
			capacity_score: health.capacity_score,
		}
	}
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegionStatusResponse {
	pub code: String,
	pub name: String,
	pub endpoint: String,
	pub node_count: usize,
	pub online_nodes: usize,
	pub average_capacity: Option<f64>,
	pub last_report_at: Option<DateTime<Utc>>,
}

impl From<RegionStatus> for RegionStatusResponse {
	fn from(status: RegionStatus) -> Self {
		Self {
			code: status.code,
			name: status.name,
			endpoint: status.endpoint,
			node_count: status.node_count,
			online_nodes: status.online_nodes,
			average_capacity: status.average_capacity,
			last_report_at: status.last_report_at,
		}
	}
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StatusResponse {
	pub regions: Vec<RegionStatusResponse>,
}
