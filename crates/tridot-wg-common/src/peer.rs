// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use chrono::{DateTime, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::ids::{AccountId, PeerId};
use crate::keys::{WgPresharedKey, WgPublicKey};

/// Lifecycle of a peer. `Revoked` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerStatus {
	Pending,
	Active,
	Revoked,
}

impl PeerStatus {
	pub fn as_str(&self) -> &'static str {
		match self {
			PeerStatus::Pending => "pending",
			PeerStatus::Active => "active",
			PeerStatus::Revoked => "revoked",
		}
	}

	pub fn is_revoked(&self) -> bool {
		matches!(self, PeerStatus::Revoked)
	}
}

impl fmt::Display for PeerStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown peer status: {0}")]
pub struct PeerStatusParseError(pub String);

impl FromStr for PeerStatus {
	type Err = PeerStatusParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(PeerStatus::Pending),
			"active" => Ok(PeerStatus::Active),
			"revoked" => Ok(PeerStatus::Revoked),
			other => Err(PeerStatusParseError(other.to_string())),
		}
	}
}

/// One provisioned device. Handed out as an owned snapshot; mutations go
/// through the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
	pub id: PeerId,
	pub account_id: AccountId,
	pub name: String,
	pub public_key: WgPublicKey,
	pub allowed_ips: Ipv4Net,
	pub region: String,
	pub endpoint: String,
	pub status: PeerStatus,
	pub last_handshake_at: Option<DateTime<Utc>>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	pub revoked_at: Option<DateTime<Utc>>,
	/// `None` only for peers created before preshared keys were issued.
	#[serde(skip)]
	pub preshared_key: Option<WgPresharedKey>,
}

impl PeerRecord {
	pub fn is_live(&self) -> bool {
		!self.status.is_revoked()
	}
}
