// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer registry: the only writer of peer records.
//!
//! Creation is one critical section per account:
//! 1. take the account's async mutex
//! 2. reserve an address (RAII, released on drop)
//! 3. stage the row, reading the account's tier and live count in the same
//!    transaction, and check the quota
//! 4. commit, then confirm the reservation
//!
//! Only step 3 is retried. A commit is never replayed: if it reports an
//! error the row is looked up to learn whether it landed. Dropping the future
//! before the commit rolls the transaction back and frees the address.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument, warn};
use tridot_server_db::{DbError, HandshakeUpdate, PeerStore, PeerUsage, StagedPeer};
use tridot_wg_common::{
	validate_public_key, AccountId, PeerId, PeerRecord, PeerStatus, WgPresharedKey,
};

use crate::address_pool::AddressPool;
use crate::error::{ProvisioningError, Result};
use crate::peer_stream::{PeerEvent, PeerNotifier};
use crate::quota::QuotaEnforcer;
use crate::regions::RegionDirectory;
use crate::retry::{with_retry, RetryPolicy};

pub const MAX_NAME_LEN: usize = 64;

/// Idle account locks are pruned once the map grows past this.
const ACCOUNT_LOCK_PRUNE_THRESHOLD: usize = 1024;

/// Trims a display name and checks its length and characters.
pub fn validate_name(name: &str) -> Result<String> {
	let trimmed = name.trim();
	if trimmed.is_empty() {
		return Err(ProvisioningError::Validation("name must not be empty".to_string()));
	}
	if trimmed.chars().count() > MAX_NAME_LEN {
		return Err(ProvisioningError::Validation(format!(
			"name must be at most {MAX_NAME_LEN} characters"
		)));
	}
	if trimmed.chars().any(char::is_control) {
		return Err(ProvisioningError::Validation(
			"name must not contain control characters".to_string(),
		));
	}
	Ok(trimmed.to_string())
}

#[derive(Clone, Default)]
struct AccountLocks {
	locks: Arc<Mutex<HashMap<AccountId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl AccountLocks {
	async fn lock(&self, account_id: AccountId) -> OwnedMutexGuard<()> {
		let lock = {
			let mut locks = self
				.locks
				.lock()
				.unwrap_or_else(|poisoned| poisoned.into_inner());
			if locks.len() >= ACCOUNT_LOCK_PRUNE_THRESHOLD {
				locks.retain(|_, lock| Arc::strong_count(lock) > 1);
			}
			Arc::clone(locks.entry(account_id).or_default())
		};
		lock.lock_owned().await
	}
}

#[derive(Clone)]
pub struct PeerRegistry {
	store: Arc<dyn PeerStore>,
	quota: QuotaEnforcer,
	addresses: AddressPool,
	regions: Arc<RegionDirectory>,
	notifier: PeerNotifier,
	account_locks: AccountLocks,
	retry: RetryPolicy,
}

impl PeerRegistry {
	pub fn new(
		store: Arc<dyn PeerStore>,
		quota: QuotaEnforcer,
		addresses: AddressPool,
		regions: Arc<RegionDirectory>,
		notifier: PeerNotifier,
		retry: RetryPolicy,
	) -> Self {
		Self {
			store,
			quota,
			addresses,
			regions,
			notifier,
			account_locks: AccountLocks::default(),
			retry,
		}
	}

	pub fn quota(&self) -> &QuotaEnforcer {
		&self.quota
	}

	pub fn addresses(&self) -> &AddressPool {
		&self.addresses
	}

	pub fn regions(&self) -> &RegionDirectory {
		&self.regions
	}

	pub fn notifier(&self) -> &PeerNotifier {
		&self.notifier
	}

	/// Creates a pending peer with the next free address in `region` (or the
	/// default region) and a fresh preshared key.
	#[instrument(skip(self, name, public_key), fields(%account_id))]
	pub async fn create_peer(
		&self,
		account_id: AccountId,
		name: &str,
		public_key: &str,
		region: Option<&str>,
	) -> Result<PeerRecord> {
		let name = validate_name(name)?;
		let public_key = validate_public_key(public_key)?;
		let region = self.regions.resolve(region)?;

		let _account_guard = self.account_locks.lock(account_id).await;
		let reservation = self.addresses.reserve(&region.code)?;

		let now = Utc::now();
		let peer = PeerRecord {
			id: PeerId::new(),
			account_id,
			name,
			public_key,
			allowed_ips: reservation.address(),
			region: region.code.clone(),
			endpoint: region.endpoint().to_string(),
			status: PeerStatus::Pending,
			last_handshake_at: None,
			created_at: now,
			updated_at: now,
			revoked_at: None,
			preshared_key: Some(WgPresharedKey::generate()),
		};

		let staged = match self.stage(&peer).await? {
			Ok(staged) => staged,
			Err(DbError::Conflict(message)) if message.contains("public_key") => {
				return Err(ProvisioningError::Conflict(
					"public key is already registered".to_string(),
				));
			}
			Err(DbError::Conflict(_)) => {
				reservation.retain();
				return Err(ProvisioningError::Conflict(format!(
					"address {} is already assigned",
					peer.allowed_ips
				)));
			}
			Err(other) => return Err(other.into()),
		};

		let quota = self.quota.authorize(account_id, staged.admission())?;
		self.commit(staged, peer.id).await?;
		reservation.confirm();

		info!(
			peer_id = %peer.id,
			region = %peer.region,
			address = %peer.allowed_ips,
			public_key = %peer.public_key.prefix(),
			current_peer_count = quota.current_peer_count,
			max_peers = quota.max_peers,
			"peer created"
		);
		self.notifier.notify(&peer.region, PeerEvent::added(&peer));
		Ok(peer)
	}

	/// Writes the row uncommitted. Transient storage errors are retried;
	/// anything else comes back as the inner error for the caller to map.
	async fn stage(
		&self,
		peer: &PeerRecord,
	) -> Result<std::result::Result<Box<dyn StagedPeer>, DbError>> {
		let store = &self.store;
		with_retry(&self.retry, "stage_peer", move || async move {
			match store.stage_peer(peer).await {
				Err(err) if err.is_transient() => Err(err.into()),
				other => Ok(other),
			}
		})
		.await
	}

	/// Commits once, without a deadline. On error the row is looked up: a
	/// commit that landed is a success.
	async fn commit(&self, staged: Box<dyn StagedPeer>, id: PeerId) -> Result<()> {
		let Err(err) = staged.commit().await else {
			return Ok(());
		};

		warn!(%id, error = %err, "peer commit reported an error, checking whether it landed");
		let store = &self.store;
		let landed = with_retry(&self.retry, "verify_peer_commit", move || async move {
			Ok(store.get_peer(id).await?)
		})
		.await?;

		match landed {
			Some(_) => {
				info!(%id, "peer commit landed");
				Ok(())
			}
			None => Err(err.into()),
		}
	}

	#[instrument(skip(self, new_name), fields(%id))]
	pub async fn rename_peer(&self, id: PeerId, new_name: &str) -> Result<PeerRecord> {
		let name = validate_name(new_name)?;
		let name = name.as_str();
		with_retry(&self.retry, "rename_peer", move || async move {
			Ok(self.store.update_peer_name(id, name).await?)
		})
		.await?
		.ok_or_else(|| ProvisioningError::NotFound(format!("peer {id}")))
	}

	/// Revokes a peer. Its address enters the cooldown pool. A peer that is
	/// already revoked is reported as not found.
	#[instrument(skip(self), fields(%id))]
	pub async fn revoke_peer(&self, id: PeerId) -> Result<()> {
		let revoked = with_retry(&self.retry, "revoke_peer", move || async move {
			Ok(self.store.revoke_peer(id).await?)
		})
		.await?
		.ok_or_else(|| ProvisioningError::NotFound(format!("peer {id}")))?;

		self.addresses
			.retire(&revoked.region, revoked.allowed_ips, revoked.revoked_at);
		self.notifier.notify(
			&revoked.region,
			PeerEvent::PeerRevoked {
				peer_id: id.to_string(),
				public_key: revoked.public_key.to_base64(),
				allowed_ip: revoked.allowed_ips.to_string(),
			},
		);
		info!(region = %revoked.region, address = %revoked.allowed_ips, "peer revoked");
		Ok(())
	}

	/// Snapshot of a peer, revoked ones included.
	#[instrument(skip(self), fields(%id))]
	pub async fn get(&self, id: PeerId) -> Result<PeerRecord> {
		with_retry(&self.retry, "get_peer", move || async move {
			Ok(self.store.get_peer(id).await?)
		})
		.await?
		.ok_or_else(|| ProvisioningError::NotFound(format!("peer {id}")))
	}

	/// Like [`get`](Self::get), but a peer owned by another account is
	/// reported as not found.
	pub async fn get_owned(&self, account_id: AccountId, id: PeerId) -> Result<PeerRecord> {
		let peer = self.get(id).await?;
		if peer.account_id != account_id {
			debug!(%id, %account_id, "peer belongs to another account");
			return Err(ProvisioningError::NotFound(format!("peer {id}")));
		}
		Ok(peer)
	}

	/// Non-revoked peers of an account, oldest first.
	#[instrument(skip(self), fields(%account_id))]
	pub async fn list_by_account(&self, account_id: AccountId) -> Result<Vec<PeerRecord>> {
		with_retry(&self.retry, "list_peers", move || async move {
			Ok(self.store.list_live_peers_for_account(account_id).await?)
		})
		.await
	}

	/// Non-revoked peers in a region, for node agents syncing their config.
	#[instrument(skip(self))]
	pub async fn list_by_region(&self, region: &str) -> Result<Vec<PeerRecord>> {
		let region = self
			.regions
			.get(region)
			.ok_or_else(|| ProvisioningError::NotFound(format!("region {region}")))?;
		let code = region.code.as_str();
		with_retry(&self.retry, "list_region_peers", move || async move {
			Ok(self.store.list_live_peers_in_region(code).await?)
		})
		.await
	}

	#[instrument(skip(self), fields(%account_id))]
	pub async fn usage(&self, account_id: AccountId) -> Result<PeerUsage> {
		with_retry(&self.retry, "peer_usage", move || async move {
			Ok(self.store.usage_for_account(account_id).await?)
		})
		.await
	}

	/// Records a handshake. The first one moves a pending peer to active.
	#[instrument(skip(self), fields(%id, %at))]
	pub async fn mark_handshake(&self, id: PeerId, at: DateTime<Utc>) -> Result<HandshakeUpdate> {
		let update = with_retry(&self.retry, "mark_handshake", move || async move {
			Ok(self.store.record_handshake(id, at).await?)
		})
		.await?;

		if let HandshakeUpdate::Activated { region } = &update {
			info!(%region, "peer activated");
			self.notifier.notify(
				region,
				PeerEvent::PeerActivated {
					peer_id: id.to_string(),
				},
			);
		}
		Ok(update)
	}
}
