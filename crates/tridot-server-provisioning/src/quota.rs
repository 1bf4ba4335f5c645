// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Per-account device quota.
//!
//! Limits come from the plan table in config and can be swapped at runtime
//! with [`QuotaEnforcer::reload`]. Accounts without a row, or on a tier the
//! table does not know, get the default tier.

use serde::Serialize;
use std::sync::{Arc, RwLock};
use tracing::{info, instrument};
use tridot_server_config::PlansConfig;
use tridot_server_db::{AccountStore, PeerAdmission, PeerStore};
use tridot_wg_common::AccountId;

use crate::error::{ProvisioningError, Result};
use crate::retry::{with_retry, RetryPolicy};

pub type PlanLimits = PlansConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountQuota {
	pub account_id: AccountId,
	pub plan_tier: String,
	pub max_peers: u32,
	pub current_peer_count: u32,
}

impl AccountQuota {
	pub fn remaining(&self) -> u32 {
		self.max_peers.saturating_sub(self.current_peer_count)
	}
}

#[derive(Clone)]
pub struct QuotaEnforcer {
	peers: Arc<dyn PeerStore>,
	accounts: Arc<dyn AccountStore>,
	plans: Arc<RwLock<PlanLimits>>,
	retry: RetryPolicy,
}

impl QuotaEnforcer {
	pub fn new(
		peers: Arc<dyn PeerStore>,
		accounts: Arc<dyn AccountStore>,
		plans: PlanLimits,
		retry: RetryPolicy,
	) -> Self {
		Self {
			peers,
			accounts,
			plans: Arc::new(RwLock::new(plans)),
			retry,
		}
	}

	/// Checks what the peer creation transaction saw after writing the new
	/// row, so the count already includes it. Exceeding the limit fails with
	/// `QuotaExceeded`; the caller rolls back.
	#[instrument(skip(self, admission), fields(%account_id, live_peer_count = admission.live_peer_count))]
	pub fn authorize(&self, account_id: AccountId, admission: &PeerAdmission) -> Result<AccountQuota> {
		let quota = self.resolve(
			account_id,
			admission.plan_tier.as_deref(),
			admission.live_peer_count,
		);

		if quota.current_peer_count > quota.max_peers {
			info!(
				plan_tier = %quota.plan_tier,
				max_peers = quota.max_peers,
				"device quota exceeded"
			);
			return Err(ProvisioningError::QuotaExceeded {
				plan_tier: quota.plan_tier,
				max_peers: quota.max_peers,
			});
		}
		Ok(quota)
	}

	/// Current usage against the plan, for dashboards.
	#[instrument(skip(self), fields(%account_id))]
	pub async fn quota(&self, account_id: AccountId) -> Result<AccountQuota> {
		let (tier, count) = with_retry(&self.retry, "quota", move || async move {
			let tier = self
				.accounts
				.get_account(account_id)
				.await?
				.map(|account| account.plan_tier);
			let count = self.peers.count_live_peers(account_id).await?;
			Ok((tier, count))
		})
		.await?;
		Ok(self.resolve(account_id, tier.as_deref(), count))
	}

	/// Swaps the plan table. In-flight creations keep the limits they read.
	pub fn reload(&self, plans: PlanLimits) {
		info!(
			default_tier = %plans.default_tier,
			tiers = plans.tiers.len(),
			"plan limits reloaded"
		);
		*self
			.plans
			.write()
			.unwrap_or_else(|poisoned| poisoned.into_inner()) = plans;
	}

	pub fn plans(&self) -> PlanLimits {
		self.plans
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.clone()
	}

	/// Whether `tier` is a known plan tier.
	pub fn has_tier(&self, tier: &str) -> bool {
		self.plans
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
			.contains(tier)
	}

	pub fn accounts(&self) -> &Arc<dyn AccountStore> {
		&self.accounts
	}

	fn resolve(&self, account_id: AccountId, tier: Option<&str>, count: u32) -> AccountQuota {
		let plans = self
			.plans
			.read()
			.unwrap_or_else(|poisoned| poisoned.into_inner());
		let (plan_tier, max_peers) = plans.resolve(tier);
		AccountQuota {
			account_id,
			plan_tier: plan_tier.to_string(),
			max_peers,
			current_peer_count: count,
		}
	}
}
