// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Single-use provisioning tickets.
//!
//! A ticket's `config_id` is 32 random bytes, URL-safe base64. Stores only
//! ever see its SHA-256 hex digest. Tickets live in memory: losing them on
//! restart only forces a reissue.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use tridot_wg_common::{AccountId, PeerId, SecretString, WgPrivateKey};

use crate::error::ProvisioningError;

const CONFIG_ID_BYTES: usize = 32;

/// Generates a fresh `config_id`.
pub fn generate_config_id() -> SecretString {
	let mut bytes = [0u8; CONFIG_ID_BYTES];
	OsRng.fill_bytes(&mut bytes);
	SecretString::new(URL_SAFE_NO_PAD.encode(bytes))
}

/// SHA-256 hex digest used as the store key.
pub fn hash_config_id(config_id: &str) -> String {
	hex::encode(Sha256::digest(config_id.as_bytes()))
}

pub struct ProvisioningTicket {
	pub peer_id: PeerId,
	pub account_id: AccountId,
	pub issued_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
	pub consumed: bool,
	/// Set when the server generated the client's keypair. Handed out once.
	pub client_private_key: Option<WgPrivateKey>,
}

impl ProvisioningTicket {
	pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
		now >= self.expires_at
	}
}

/// A redeemable ticket, seen without consuming it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketClaim {
	pub peer_id: PeerId,
	pub account_id: AccountId,
}

/// What a successful redemption yields.
pub struct RedeemedTicket {
	pub peer_id: PeerId,
	pub account_id: AccountId,
	pub client_private_key: Option<WgPrivateKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemError {
	NotFound,
	Expired,
	AlreadyConsumed,
}

impl From<RedeemError> for ProvisioningError {
	fn from(err: RedeemError) -> Self {
		match err {
			RedeemError::NotFound => ProvisioningError::NotFound("provisioning ticket".to_string()),
			RedeemError::Expired => ProvisioningError::Expired,
			RedeemError::AlreadyConsumed => ProvisioningError::AlreadyConsumed,
		}
	}
}

#[async_trait]
pub trait TicketStore: Send + Sync {
	/// Stores a ticket, invalidating any unconsumed ticket of the same peer.
	async fn insert(&self, token_hash: String, ticket: ProvisioningTicket);

	/// Checks a ticket the way [`redeem`](Self::redeem) does but leaves it
	/// unconsumed.
	async fn peek(
		&self,
		token_hash: &str,
		owner: Option<(AccountId, PeerId)>,
		now: DateTime<Utc>,
	) -> Result<TicketClaim, RedeemError>;

	/// Atomically checks and consumes a ticket.
	///
	/// Expiry is checked before consumption. When `owner` is given, a ticket
	/// for any other account or peer is reported as `NotFound` and left
	/// untouched.
	async fn redeem(
		&self,
		token_hash: &str,
		owner: Option<(AccountId, PeerId)>,
		now: DateTime<Utc>,
	) -> Result<RedeemedTicket, RedeemError>;

	/// Drops every ticket of a peer.
	async fn revoke_for_peer(&self, peer_id: PeerId) -> usize;

	/// Drops expired tickets and returns how many were removed.
	async fn sweep_expired(&self, now: DateTime<Utc>) -> usize;

	async fn len(&self) -> usize;
}

#[derive(Default)]
struct TicketTable {
	by_hash: HashMap<String, ProvisioningTicket>,
	live_by_peer: HashMap<PeerId, String>,
}

/// In-memory store. All operations are short critical sections on one lock.
#[derive(Default)]
pub struct InMemoryTicketStore {
	table: Mutex<TicketTable>,
}

impl InMemoryTicketStore {
	pub fn new() -> Self {
		Self::default()
	}

	fn table(&self) -> MutexGuard<'_, TicketTable> {
		self.table
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}
}

fn check(
	ticket: &ProvisioningTicket,
	owner: Option<(AccountId, PeerId)>,
	now: DateTime<Utc>,
) -> Result<(), RedeemError> {
	if let Some((account_id, peer_id)) = owner {
		if ticket.account_id != account_id || ticket.peer_id != peer_id {
			return Err(RedeemError::NotFound);
		}
	}
	if ticket.is_expired(now) {
		return Err(RedeemError::Expired);
	}
	if ticket.consumed {
		return Err(RedeemError::AlreadyConsumed);
	}
	Ok(())
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
	async fn insert(&self, token_hash: String, ticket: ProvisioningTicket) {
		let mut table = self.table();
		let peer_id = ticket.peer_id;
		if let Some(previous) = table.live_by_peer.insert(peer_id, token_hash.clone()) {
			let unconsumed = table
				.by_hash
				.get(&previous)
				.map(|t| !t.consumed)
				.unwrap_or(false);
			if unconsumed {
				table.by_hash.remove(&previous);
				debug!(%peer_id, "previous ticket invalidated");
			}
		}
		table.by_hash.insert(token_hash, ticket);
	}

	async fn peek(
		&self,
		token_hash: &str,
		owner: Option<(AccountId, PeerId)>,
		now: DateTime<Utc>,
	) -> Result<TicketClaim, RedeemError> {
		let table = self.table();
		let ticket = table.by_hash.get(token_hash).ok_or(RedeemError::NotFound)?;
		check(ticket, owner, now)?;
		Ok(TicketClaim {
			peer_id: ticket.peer_id,
			account_id: ticket.account_id,
		})
	}

	async fn redeem(
		&self,
		token_hash: &str,
		owner: Option<(AccountId, PeerId)>,
		now: DateTime<Utc>,
	) -> Result<RedeemedTicket, RedeemError> {
		let mut table = self.table();
		let ticket = table.by_hash.get_mut(token_hash).ok_or(RedeemError::NotFound)?;
		check(ticket, owner, now)?;

		ticket.consumed = true;
		Ok(RedeemedTicket {
			peer_id: ticket.peer_id,
			account_id: ticket.account_id,
			client_private_key: ticket.client_private_key.take(),
		})
	}

	async fn revoke_for_peer(&self, peer_id: PeerId) -> usize {
		let mut table = self.table();
		table.live_by_peer.remove(&peer_id);
		let before = table.by_hash.len();
		table.by_hash.retain(|_, ticket| ticket.peer_id != peer_id);
		before - table.by_hash.len()
	}

	async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
		let mut guard = self.table();
		let table = &mut *guard;
		let before = table.by_hash.len();
		table.by_hash.retain(|_, ticket| !ticket.is_expired(now));
		let by_hash = &table.by_hash;
		table.live_by_peer.retain(|_, hash| by_hash.contains_key(hash));
		before - table.by_hash.len()
	}

	async fn len(&self) -> usize {
		self.table().by_hash.len()
	}
}
