// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer repository.
//!
//! Peers are never deleted: revocation flips `status` to `revoked` and stamps
//! `revoked_at`. Two constraints back the registry's invariants:
//! - `public_key` is unique across all peers
//! - `(region, allowed_ips)` is unique across non-revoked peers
//!
//! `last_handshake_at` is stored as epoch milliseconds so the monotonic update
//! can compare integers.
//!
//! New peers go through [`PeerStore::stage_peer`], which leaves the insert
//! uncommitted so the caller can check the quota against what the
//! transaction saw before deciding to commit.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::{Sqlite, Transaction};
use tridot_wg_common::{
	validate_public_key, AccountId, PeerId, PeerRecord, PeerStatus, WgPresharedKey, WgPublicKey,
};

use crate::accounts::AccountRepository;
use crate::error::{unique_violation, DbError};
use crate::parse_datetime;

type PeerRowTuple = (
	String,
	String,
	String,
	String,
	String,
	String,
	String,
	String,
	Option<i64>,
	String,
	String,
	Option<String>,
	Option<String>,
);

const PEER_COLUMNS: &str = "id, account_id, name, public_key, allowed_ips, region, endpoint, status, \
	 last_handshake_at, created_at, updated_at, revoked_at, preshared_key";

fn parse_peer_row(row: PeerRowTuple) -> Result<PeerRecord, DbError> {
	let (
		id,
		account_id,
		name,
		public_key,
		allowed_ips,
		region,
		endpoint,
		status,
		last_handshake_at,
		created_at,
		updated_at,
		revoked_at,
		preshared_key,
	) = row;

	let corrupt = |field: &str, e: &dyn std::fmt::Display| {
		DbError::Internal(format!("invalid {field} for peer {id}: {e}"))
	};

	Ok(PeerRecord {
		id: id.parse().map_err(|e| corrupt("id", &e))?,
		account_id: account_id.parse().map_err(|e| corrupt("account_id", &e))?,
		name,
		public_key: validate_public_key(&public_key).map_err(|e| corrupt("public_key", &e))?,
		allowed_ips: allowed_ips
			.parse()
			.map_err(|e| corrupt("allowed_ips", &e))?,
		region,
		endpoint,
		status: status.parse().map_err(|e| corrupt("status", &e))?,
		last_handshake_at: last_handshake_at.map(millis_to_datetime).transpose()?,
		created_at: parse_datetime(&created_at)?,
		updated_at: parse_datetime(&updated_at)?,
		revoked_at: revoked_at.as_deref().map(parse_datetime).transpose()?,
		preshared_key: preshared_key
			.as_deref()
			.map(WgPresharedKey::from_base64)
			.transpose()
			.map_err(|e| corrupt("preshared_key", &e))?,
	})
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, DbError> {
	Utc.timestamp_millis_opt(millis)
		.single()
		.ok_or_else(|| DbError::Internal(format!("invalid handshake timestamp {millis}")))
}

/// Result of applying a handshake report to a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeUpdate {
	/// First handshake of a pending peer; it is now active.
	Activated { region: String },
	/// Newer handshake recorded on an active peer.
	Advanced,
	/// Timestamp not newer than the stored one; nothing written.
	Stale,
	/// Peer is revoked; nothing written.
	Revoked,
	NotFound,
}

/// Address and region released by a revocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevokedPeer {
	pub public_key: WgPublicKey,
	pub region: String,
	pub allowed_ips: Ipv4Net,
	pub revoked_at: DateTime<Utc>,
}

/// Aggregate over an account's non-revoked peers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerUsage {
	pub peer_count: u32,
	pub active_peer_count: u32,
	pub last_handshake_at: Option<DateTime<Utc>>,
}

/// An address held by a peer, used to rebuild the in-memory address pools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressHolding {
	pub region: String,
	pub allowed_ips: Ipv4Net,
	pub revoked_at: Option<DateTime<Utc>>,
}

/// What the creation transaction saw right after writing the new row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAdmission {
	/// `None` when the account has no row.
	pub plan_tier: Option<String>,
	/// Live peers of the account, the staged one included.
	pub live_peer_count: u32,
}

/// A peer row written inside an open transaction. Dropping it rolls back.
#[async_trait]
pub trait StagedPeer: Send {
	fn admission(&self) -> &PeerAdmission;

	async fn commit(self: Box<Self>) -> Result<(), DbError>;
}

struct SqliteStagedPeer {
	tx: Transaction<'static, Sqlite>,
	admission: PeerAdmission,
}

#[async_trait]
impl StagedPeer for SqliteStagedPeer {
	fn admission(&self) -> &PeerAdmission {
		&self.admission
	}

	async fn commit(self: Box<Self>) -> Result<(), DbError> {
		self.tx.commit().await?;
		Ok(())
	}
}

#[async_trait]
pub trait PeerStore: Send + Sync {
	/// Inserts `peer` without committing. Unique violations become
	/// `DbError::Conflict` naming the column (`public_key` or `allowed_ips`).
	async fn stage_peer(&self, peer: &PeerRecord) -> Result<Box<dyn StagedPeer>, DbError>;
	async fn get_peer(&self, id: PeerId) -> Result<Option<PeerRecord>, DbError>;
	async fn list_live_peers_for_account(
		&self,
		account_id: AccountId,
	) -> Result<Vec<PeerRecord>, DbError>;
	async fn list_live_peers_in_region(&self, region: &str) -> Result<Vec<PeerRecord>, DbError>;
	async fn update_peer_name(&self, id: PeerId, name: &str) -> Result<Option<PeerRecord>, DbError>;
	async fn revoke_peer(&self, id: PeerId) -> Result<Option<RevokedPeer>, DbError>;
	async fn record_handshake(
		&self,
		id: PeerId,
		at: DateTime<Utc>,
	) -> Result<HandshakeUpdate, DbError>;
	async fn usage_for_account(&self, account_id: AccountId) -> Result<PeerUsage, DbError>;
	async fn count_live_peers(&self, account_id: AccountId) -> Result<u32, DbError>;
	async fn list_address_holdings(
		&self,
		revoked_since: DateTime<Utc>,
	) -> Result<Vec<AddressHolding>, DbError>;
}

#[async_trait]
impl PeerStore for PeerRepository {
	async fn stage_peer(&self, peer: &PeerRecord) -> Result<Box<dyn StagedPeer>, DbError> {
		Ok(Box::new(self.stage_peer(peer).await?))
	}

	async fn get_peer(&self, id: PeerId) -> Result<Option<PeerRecord>, DbError> {
		self.get_peer(id).await
	}

	async fn list_live_peers_for_account(
		&self,
		account_id: AccountId,
	) -> Result<Vec<PeerRecord>, DbError> {
		self.list_live_peers_for_account(account_id).await
	}

	async fn list_live_peers_in_region(&self, region: &str) -> Result<Vec<PeerRecord>, DbError> {
		self.list_live_peers_in_region(region).await
	}

	async fn update_peer_name(&self, id: PeerId, name: &str) -> Result<Option<PeerRecord>, DbError> {
		self.update_peer_name(id, name).await
	}

	async fn revoke_peer(&self, id: PeerId) -> Result<Option<RevokedPeer>, DbError> {
		self.revoke_peer(id).await
	}

	async fn record_handshake(
		&self,
		id: PeerId,
		at: DateTime<Utc>,
	) -> Result<HandshakeUpdate, DbError> {
		self.record_handshake(id, at).await
	}

	async fn usage_for_account(&self, account_id: AccountId) -> Result<PeerUsage, DbError> {
		self.usage_for_account(account_id).await
	}

	async fn count_live_peers(&self, account_id: AccountId) -> Result<u32, DbError> {
		let mut conn = self.pool.acquire().await?;
		Self::count_live_peers_in(&mut conn, account_id).await
	}

	async fn list_address_holdings(
		&self,
		revoked_since: DateTime<Utc>,
	) -> Result<Vec<AddressHolding>, DbError> {
		self.list_address_holdings(revoked_since).await
	}
}

#[derive(Clone)]
pub struct PeerRepository {
	pool: SqlitePool,
}

impl PeerRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	/// Writes `peer`, then reads the account's plan tier and live peer count
	/// in the same transaction. The insert holds SQLite's write lock, so the
	/// count cannot move until the transaction ends.
	#[tracing::instrument(skip(self, peer), fields(peer_id = %peer.id, account_id = %peer.account_id, region = %peer.region))]
	async fn stage_peer(&self, peer: &PeerRecord) -> Result<SqliteStagedPeer, DbError> {
		let mut tx = self.pool.begin().await?;
		Self::insert_peer_in(&mut tx, peer).await?;
		let plan_tier = AccountRepository::get_plan_tier_in(&mut tx, peer.account_id).await?;
		let live_peer_count = Self::count_live_peers_in(&mut tx, peer.account_id).await?;

		Ok(SqliteStagedPeer {
			tx,
			admission: PeerAdmission {
				plan_tier,
				live_peer_count,
			},
		})
	}

	async fn insert_peer_in(conn: &mut SqliteConnection, peer: &PeerRecord) -> Result<(), DbError> {
		let result = sqlx::query(
			r#"
			INSERT INTO peers (
				id, account_id, name, public_key, allowed_ips, region, endpoint, status,
				last_handshake_at, created_at, updated_at, revoked_at, preshared_key
			) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
			"#,
		)
		.bind(peer.id.to_string())
		.bind(peer.account_id.to_string())
		.bind(&peer.name)
		.bind(peer.public_key.to_base64())
		.bind(peer.allowed_ips.to_string())
		.bind(&peer.region)
		.bind(&peer.endpoint)
		.bind(peer.status.as_str())
		.bind(peer.last_handshake_at.map(|t| t.timestamp_millis()))
		.bind(peer.created_at.to_rfc3339())
		.bind(peer.updated_at.to_rfc3339())
		.bind(peer.revoked_at.map(|t| t.to_rfc3339()))
		.bind(peer.preshared_key.as_ref().map(|k| k.to_base64().expose().clone()))
		.execute(conn)
		.await;

		match result {
			Ok(_) => Ok(()),
			Err(e) => match unique_violation(&e) {
				Some(message) => Err(DbError::Conflict(message)),
				None => Err(e.into()),
			},
		}
	}

	async fn count_live_peers_in(
		conn: &mut SqliteConnection,
		account_id: AccountId,
	) -> Result<u32, DbError> {
		let (count,): (i64,) = sqlx::query_as(
			"SELECT COUNT(*) FROM peers WHERE account_id = ? AND status != 'revoked'",
		)
		.bind(account_id.to_string())
		.fetch_one(conn)
		.await?;

		u32::try_from(count).map_err(|_| DbError::Internal(format!("peer count {count} out of range")))
	}

	#[tracing::instrument(skip(self), fields(%id))]
	pub async fn get_peer(&self, id: PeerId) -> Result<Option<PeerRecord>, DbError> {
		let row: Option<PeerRowTuple> =
			sqlx::query_as(&format!("SELECT {PEER_COLUMNS} FROM peers WHERE id = ?"))
				.bind(id.to_string())
				.fetch_optional(&self.pool)
				.await?;

		row.map(parse_peer_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(%account_id))]
	pub async fn list_live_peers_for_account(
		&self,
		account_id: AccountId,
	) -> Result<Vec<PeerRecord>, DbError> {
		let rows: Vec<PeerRowTuple> = sqlx::query_as(&format!(
			"SELECT {PEER_COLUMNS} FROM peers
			 WHERE account_id = ? AND status != 'revoked'
			 ORDER BY created_at ASC, id ASC"
		))
		.bind(account_id.to_string())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(parse_peer_row).collect()
	}

	#[tracing::instrument(skip(self))]
	pub async fn list_live_peers_in_region(&self, region: &str) -> Result<Vec<PeerRecord>, DbError> {
		let rows: Vec<PeerRowTuple> = sqlx::query_as(&format!(
			"SELECT {PEER_COLUMNS} FROM peers
			 WHERE region = ? AND status != 'revoked'
			 ORDER BY created_at ASC, id ASC"
		))
		.bind(region)
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter().map(parse_peer_row).collect()
	}

	/// Renames a non-revoked peer. `None` when the peer is missing or revoked.
	#[tracing::instrument(skip(self, name), fields(%id))]
	pub async fn update_peer_name(&self, id: PeerId, name: &str) -> Result<Option<PeerRecord>, DbError> {
		let result = sqlx::query(
			"UPDATE peers SET name = ?, updated_at = ? WHERE id = ? AND status != 'revoked'",
		)
		.bind(name)
		.bind(Utc::now().to_rfc3339())
		.bind(id.to_string())
		.execute(&self.pool)
		.await?;

		if result.rows_affected() == 0 {
			return Ok(None);
		}
		self.get_peer(id).await
	}

	/// Marks a peer revoked. `None` when the peer is missing or already revoked.
	#[tracing::instrument(skip(self), fields(%id))]
	pub async fn revoke_peer(&self, id: PeerId) -> Result<Option<RevokedPeer>, DbError> {
		let now = Utc::now();
		let row: Option<(String, String, String)> = sqlx::query_as(
			"UPDATE peers SET status = 'revoked', revoked_at = ?, updated_at = ?
			 WHERE id = ? AND status != 'revoked'
			 RETURNING public_key, region, allowed_ips",
		)
		.bind(now.to_rfc3339())
		.bind(now.to_rfc3339())
		.bind(id.to_string())
		.fetch_optional(&self.pool)
		.await?;

		row.map(|(public_key, region, allowed_ips)| {
			Ok(RevokedPeer {
				public_key: validate_public_key(&public_key).map_err(|e| {
					DbError::Internal(format!("invalid public_key for peer {id}: {e}"))
				})?,
				allowed_ips: allowed_ips.parse().map_err(|e| {
					DbError::Internal(format!("invalid allowed_ips for peer {id}: {e}"))
				})?,
				region,
				revoked_at: now,
			})
		})
		.transpose()
	}

	/// Applies a handshake timestamp if it is newer than the stored one.
	///
	/// Each statement is a single conditional UPDATE, so concurrent reports for
	/// the same peer can only move `last_handshake_at` forward.
	#[tracing::instrument(skip(self), fields(%id, at = %at))]
	pub async fn record_handshake(
		&self,
		id: PeerId,
		at: DateTime<Utc>,
	) -> Result<HandshakeUpdate, DbError> {
		let millis = at.timestamp_millis();
		let now = Utc::now().to_rfc3339();

		let activated: Option<(String,)> = sqlx::query_as(
			"UPDATE peers SET status = 'active', last_handshake_at = ?, updated_at = ?
			 WHERE id = ? AND status = 'pending'
			   AND (last_handshake_at IS NULL OR last_handshake_at < ?)
			 RETURNING region",
		)
		.bind(millis)
		.bind(&now)
		.bind(id.to_string())
		.bind(millis)
		.fetch_optional(&self.pool)
		.await?;

		if let Some((region,)) = activated {
			return Ok(HandshakeUpdate::Activated { region });
		}

		let advanced = sqlx::query(
			"UPDATE peers SET last_handshake_at = ?, updated_at = ?
			 WHERE id = ? AND status = 'active'
			   AND (last_handshake_at IS NULL OR last_handshake_at < ?)",
		)
		.bind(millis)
		.bind(&now)
		.bind(id.to_string())
		.bind(millis)
		.execute(&self.pool)
		.await?;

		if advanced.rows_affected() > 0 {
			return Ok(HandshakeUpdate::Advanced);
		}

		let status: Option<(String,)> = sqlx::query_as("SELECT status FROM peers WHERE id = ?")
			.bind(id.to_string())
			.fetch_optional(&self.pool)
			.await?;

		Ok(match status {
			None => HandshakeUpdate::NotFound,
			Some((status,)) if status == PeerStatus::Revoked.as_str() => HandshakeUpdate::Revoked,
			Some(_) => HandshakeUpdate::Stale,
		})
	}

	#[tracing::instrument(skip(self), fields(%account_id))]
	pub async fn usage_for_account(&self, account_id: AccountId) -> Result<PeerUsage, DbError> {
		let (peer_count, active_peer_count, last_handshake): (i64, Option<i64>, Option<i64>) =
			sqlx::query_as(
				"SELECT COUNT(*),
				        SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END),
				        MAX(last_handshake_at)
				 FROM peers WHERE account_id = ? AND status != 'revoked'",
			)
			.bind(account_id.to_string())
			.fetch_one(&self.pool)
			.await?;

		Ok(PeerUsage {
			peer_count: peer_count.max(0) as u32,
			active_peer_count: active_peer_count.unwrap_or(0).max(0) as u32,
			last_handshake_at: last_handshake.map(millis_to_datetime).transpose()?,
		})
	}

	/// Addresses held by live peers plus those revoked at or after
	/// `revoked_since` (still cooling down).
	#[tracing::instrument(skip(self))]
	pub async fn list_address_holdings(
		&self,
		revoked_since: DateTime<Utc>,
	) -> Result<Vec<AddressHolding>, DbError> {
		let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
			"SELECT region, allowed_ips, revoked_at FROM peers
			 WHERE status != 'revoked' OR revoked_at >= ?",
		)
		.bind(revoked_since.to_rfc3339())
		.fetch_all(&self.pool)
		.await?;

		rows.into_iter()
			.map(|(region, allowed_ips, revoked_at)| {
				Ok(AddressHolding {
					allowed_ips: allowed_ips.parse().map_err(|e| {
						DbError::Internal(format!("invalid stored address {allowed_ips}: {e}"))
					})?,
					region,
					revoked_at: revoked_at.as_deref().map(parse_datetime).transpose()?,
				})
			})
			.collect()
	}
}
