// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Peer provisioning for the Tridot control plane.
//!
//! [`PeerRegistry`] owns peer records and region address pools,
//! [`QuotaEnforcer`] applies plan limits to what the registry's transaction
//! saw,
//! [`ProvisioningService`] hands out single-use tunnel configs and
//! [`TelemetryIngest`] takes handshake and health reports from nodes.

pub mod address_pool;
pub mod error;
pub mod peer_stream;
pub mod provisioning;
pub mod quota;
pub mod regions;
pub mod registry;
pub mod retry;
pub mod telemetry;
pub mod tickets;
pub mod types;

#[cfg(test)]
mod testing;

pub use address_pool::{AddressPool, AddressReservation, RegionAddressUsage};
pub use error::{ProvisioningError, Result};
pub use peer_stream::{PeerEvent, PeerNotifier, Subscription};
pub use provisioning::{IssuedTicket, ProvisionedPeer, ProvisioningService};
pub use quota::{AccountQuota, PlanLimits, QuotaEnforcer};
pub use regions::{Region, RegionDirectory};
pub use registry::{validate_name, PeerRegistry};
pub use retry::{with_retry, RetryPolicy};
pub use telemetry::{capacity_score, HealthBoard, HealthReport, NodeHealth, RegionStatus, TelemetryIngest};
pub use tickets::{InMemoryTicketStore, TicketStore};

use chrono::Utc;
use std::sync::Arc;
use tridot_server_config::ProvisioningConfig;
use tridot_server_db::{AccountRepository, AccountStore, PeerRepository, PeerStore, SqlitePool};

#[derive(Clone)]
pub struct ProvisioningServices {
	pub registry: PeerRegistry,
	pub provisioning: ProvisioningService,
	pub telemetry: TelemetryIngest,
	pub peer_notifier: PeerNotifier,
	pub config: Arc<ProvisioningConfig>,
}

impl ProvisioningServices {
	/// Wires the services over the SQLite repositories.
	pub async fn new(
		db: SqlitePool,
		config: ProvisioningConfig,
		regions: RegionDirectory,
		plans: PlanLimits,
	) -> Result<Self> {
		Self::with_stores(
			Arc::new(PeerRepository::new(db.clone())),
			Arc::new(AccountRepository::new(db)),
			config,
			regions,
			plans,
		)
		.await
	}

	/// Wires the services together and rebuilds the address pools from the
	/// peers already in storage.
	pub async fn with_stores(
		peers: Arc<dyn PeerStore>,
		accounts: Arc<dyn AccountStore>,
		config: ProvisioningConfig,
		regions: RegionDirectory,
		plans: PlanLimits,
	) -> Result<Self> {
		let config = Arc::new(config);
		let retry = RetryPolicy::from_config(&config);
		let regions = Arc::new(regions);

		let addresses = AddressPool::new(
			regions.iter().map(|r| (r.code.clone(), r.plan)),
			config.address_cooldown(),
		);
		let cooldown = chrono::Duration::from_std(config.address_cooldown())
			.map_err(|_| ProvisioningError::Fatal("address cooldown is out of range".to_string()))?;
		let store = &peers;
		let holdings = with_retry(&retry, "load_address_holdings", move || async move {
			Ok(store.list_address_holdings(Utc::now() - cooldown).await?)
		})
		.await?;
		addresses.restore(&holdings);

		let peer_notifier = PeerNotifier::new();
		let quota = QuotaEnforcer::new(Arc::clone(&peers), accounts, plans, retry);
		let registry = PeerRegistry::new(
			peers,
			quota,
			addresses,
			regions,
			peer_notifier.clone(),
			retry,
		);
		let provisioning = ProvisioningService::new(
			registry.clone(),
			Arc::new(InMemoryTicketStore::new()),
			config.ticket_ttl(),
		)?;
		let telemetry = TelemetryIngest::new(registry.clone(), Arc::new(HealthBoard::new()));

		Ok(Self {
			registry,
			provisioning,
			telemetry,
			peer_notifier,
			config,
		})
	}
}
