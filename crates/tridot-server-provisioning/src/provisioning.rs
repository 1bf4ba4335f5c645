// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ticket issuance and one-time config redemption.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use tridot_wg_common::{
	render_tunnel_config, AccountId, ConfigText, PeerId, PeerRecord, SecretString, WgPrivateKey,
};

use crate::error::{ProvisioningError, Result};
use crate::registry::PeerRegistry;
use crate::tickets::{generate_config_id, hash_config_id, ProvisioningTicket, TicketStore};

/// A freshly issued ticket. `config_id` is the only copy of the raw token.
#[derive(Debug, Clone)]
pub struct IssuedTicket {
	pub config_id: SecretString,
	pub peer_id: PeerId,
	pub issued_at: DateTime<Utc>,
	pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProvisionedPeer {
	pub peer: PeerRecord,
	pub ticket: IssuedTicket,
}

#[derive(Clone)]
pub struct ProvisioningService {
	registry: PeerRegistry,
	tickets: Arc<dyn TicketStore>,
	ttl: Duration,
}

impl ProvisioningService {
	pub fn new(
		registry: PeerRegistry,
		tickets: Arc<dyn TicketStore>,
		ttl: std::time::Duration,
	) -> Result<Self> {
		let ttl = Duration::from_std(ttl)
			.map_err(|_| ProvisioningError::Fatal("ticket ttl is out of range".to_string()))?;
		Ok(Self {
			registry,
			tickets,
			ttl,
		})
	}

	pub fn registry(&self) -> &PeerRegistry {
		&self.registry
	}

	pub fn tickets(&self) -> &Arc<dyn TicketStore> {
		&self.tickets
	}

	/// Creates a peer and issues its first ticket.
	///
	/// Without a client public key the server generates the client's keypair.
	/// The private key lives only inside the ticket and is rendered into the
	/// config on redemption.
	#[instrument(skip(self, name, public_key), fields(%account_id))]
	pub async fn provision_peer(
		&self,
		account_id: AccountId,
		name: &str,
		public_key: Option<&str>,
		region: Option<&str>,
	) -> Result<ProvisionedPeer> {
		let (public_key, client_private_key) = match public_key {
			Some(key) => (key.to_string(), None),
			None => {
				let private = WgPrivateKey::generate();
				(private.public_key().to_base64(), Some(private))
			}
		};

		let peer = self
			.registry
			.create_peer(account_id, name, &public_key, region)
			.await?;
		let ticket = self.issue_for(&peer, client_private_key).await;
		Ok(ProvisionedPeer { peer, ticket })
	}

	/// Issues a ticket for a live peer, replacing any unconsumed one.
	#[instrument(skip(self), fields(%peer_id))]
	pub async fn issue(&self, peer_id: PeerId) -> Result<IssuedTicket> {
		let peer = self.live_peer(self.registry.get(peer_id).await?)?;
		Ok(self.issue_for(&peer, None).await)
	}

	/// Reissue requested by the owning account.
	#[instrument(skip(self), fields(%account_id, %peer_id))]
	pub async fn reissue(&self, account_id: AccountId, peer_id: PeerId) -> Result<IssuedTicket> {
		let peer = self.live_peer(self.registry.get_owned(account_id, peer_id).await?)?;
		Ok(self.issue_for(&peer, None).await)
	}

	/// Redeems a ticket and renders the tunnel config. Expired beats
	/// consumed, and nothing is regenerated.
	#[instrument(skip_all)]
	pub async fn redeem(&self, config_id: &str) -> Result<ConfigText> {
		self.redeem_checked(config_id, None).await
	}

	/// Like [`redeem`](Self::redeem), but only for a ticket of `peer_id`
	/// owned by `account_id`. Anything else is not found and stays unconsumed.
	#[instrument(skip(self, config_id), fields(%account_id, %peer_id))]
	pub async fn redeem_for(
		&self,
		account_id: AccountId,
		peer_id: PeerId,
		config_id: &str,
	) -> Result<ConfigText> {
		self.redeem_checked(config_id, Some((account_id, peer_id)))
			.await
	}

	/// Revokes an owned peer and drops its tickets.
	#[instrument(skip(self), fields(%account_id, %peer_id))]
	pub async fn revoke_peer(&self, account_id: AccountId, peer_id: PeerId) -> Result<()> {
		let peer = self.live_peer(self.registry.get_owned(account_id, peer_id).await?)?;
		self.registry.revoke_peer(peer.id).await?;
		let dropped = self.tickets.revoke_for_peer(peer.id).await;
		debug!(dropped, "tickets dropped with revoked peer");
		Ok(())
	}

	/// Drops expired tickets.
	pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
		self.tickets.sweep_expired(now).await
	}

	async fn issue_for(
		&self,
		peer: &PeerRecord,
		client_private_key: Option<WgPrivateKey>,
	) -> IssuedTicket {
		let config_id = generate_config_id();
		let issued_at = Utc::now();
		let expires_at = issued_at + self.ttl;

		self.tickets
			.insert(
				hash_config_id(config_id.expose()),
				ProvisioningTicket {
					peer_id: peer.id,
					account_id: peer.account_id,
					issued_at,
					expires_at,
					consumed: false,
					client_private_key,
				},
			)
			.await;

		info!(peer_id = %peer.id, %expires_at, "provisioning ticket issued");
		IssuedTicket {
			config_id,
			peer_id: peer.id,
			issued_at,
			expires_at,
		}
	}

	/// Everything that can fail on a storage hiccup runs before the ticket
	/// is spent, so a failed attempt leaves it redeemable.
	async fn redeem_checked(
		&self,
		config_id: &str,
		owner: Option<(AccountId, PeerId)>,
	) -> Result<ConfigText> {
		let config_id = config_id.trim();
		if config_id.is_empty() {
			return Err(ProvisioningError::NotFound("provisioning ticket".to_string()));
		}
		let token_hash = hash_config_id(config_id);

		let claim = self.tickets.peek(&token_hash, owner, Utc::now()).await?;
		let peer = self.live_peer(self.registry.get(claim.peer_id).await?)?;
		let region = self.registry.regions().get(&peer.region).ok_or_else(|| {
			ProvisioningError::Fatal(format!("region {} is no longer configured", peer.region))
		})?;

		let redeemed = self.tickets.redeem(&token_hash, owner, Utc::now()).await?;
		info!(peer_id = %redeemed.peer_id, "provisioning ticket redeemed");
		Ok(render_tunnel_config(
			&peer,
			&region.tunnel,
			redeemed.client_private_key.as_ref(),
		))
	}

	fn live_peer(&self, peer: PeerRecord) -> Result<PeerRecord> {
		if peer.is_live() {
			Ok(peer)
		} else {
			Err(ProvisioningError::NotFound(format!("peer {}", peer.id)))
		}
	}
}
