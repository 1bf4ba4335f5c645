// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tridot_server_config::{RegionConfig, ServerKeySource};
use tridot_server_db::{
	AccountRepository, AddressHolding, DbError, HandshakeUpdate, PeerAdmission, PeerRepository,
	PeerStore, PeerUsage, RevokedPeer, SqlitePool, StagedPeer,
};
use tridot_wg_common::{AccountId, PeerId, PeerRecord, WgKeyPair, WgPublicKey};

use crate::address_pool::AddressPool;
use crate::peer_stream::PeerNotifier;
use crate::quota::{PlanLimits, QuotaEnforcer};
use crate::regions::{Region, RegionDirectory};
use crate::registry::PeerRegistry;
use crate::retry::RetryPolicy;

pub const CLIENT_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

pub fn client_key() -> String {
	WgKeyPair::generate().public_key().to_base64()
}

pub fn plans(max_peers: u32) -> PlanLimits {
	PlanLimits {
		default_tier: "standard".to_string(),
		tiers: BTreeMap::from([
			("standard".to_string(), max_peers),
			("family".to_string(), 10),
		]),
	}
}

pub fn region(code: &str, subnet: &str, server_key: WgPublicKey) -> Region {
	let config = RegionConfig {
		code: code.to_string(),
		name: code.to_string(),
		subnet: subnet.parse().unwrap(),
		endpoint: format!("{}.tridot.example:51820", code.to_lowercase()),
		server_key: ServerKeySource::PublicKey(server_key),
		dns: vec![std::net::IpAddr::from([1, 1, 1, 1])],
		mtu: None,
		persistent_keepalive: 25,
	};
	Region::from_config(&config, server_key).unwrap()
}

pub struct Fixture {
	pub pool: SqlitePool,
	pub registry: PeerRegistry,
	pub server: WgKeyPair,
}

pub fn retry() -> RetryPolicy {
	RetryPolicy {
		max_retries: 5,
		attempt_timeout: Duration::from_secs(10),
		base_delay: Duration::from_millis(5),
		max_delay: Duration::from_millis(50),
	}
}

pub fn fixture_with(pool: SqlitePool, max_peers: u32, subnet: &str, cooldown: Duration) -> Fixture {
	let store = Arc::new(PeerRepository::new(pool.clone()));
	fixture_with_store(pool, store, max_peers, subnet, cooldown)
}

pub fn fixture_with_store(
	pool: SqlitePool,
	store: Arc<dyn PeerStore>,
	max_peers: u32,
	subnet: &str,
	cooldown: Duration,
) -> Fixture {
	let server = WgKeyPair::generate();
	let regions = Arc::new(
		RegionDirectory::new(
			vec![
				region("EU-FRA", subnet, *server.public_key()),
				region("TR-IST", "10.30.0.0/24", *server.public_key()),
			],
			"EU-FRA",
		)
		.unwrap(),
	);
	let addresses = AddressPool::new(
		regions.iter().map(|r| (r.code.clone(), r.plan)),
		cooldown,
	);
	let quota = QuotaEnforcer::new(
		Arc::clone(&store),
		Arc::new(AccountRepository::new(pool.clone())),
		plans(max_peers),
		retry(),
	);
	let registry = PeerRegistry::new(
		store,
		quota,
		addresses,
		regions,
		PeerNotifier::new(),
		retry(),
	);
	Fixture {
		pool,
		registry,
		server,
	}
}

pub async fn fixture(max_peers: u32) -> Fixture {
	let pool = tridot_server_db::testing::create_provisioning_test_pool().await;
	fixture_with(pool, max_peers, "10.20.0.0/16", Duration::from_secs(300))
}

/// Fixture over a [`FlakyStore`], file-backed so a rolled-back writer never
/// blocks readers.
pub async fn flaky_fixture(dir: &std::path::Path, max_peers: u32) -> (Fixture, Arc<FlakyStore>) {
	let pool = tridot_server_db::testing::create_file_test_pool(dir).await;
	let store = Arc::new(FlakyStore::new(PeerRepository::new(pool.clone())));
	let fx = fixture_with_store(
		pool,
		Arc::clone(&store) as Arc<dyn PeerStore>,
		max_peers,
		"10.20.0.0/16",
		Duration::from_secs(300),
	);
	(fx, store)
}

fn pool_timeout() -> DbError {
	DbError::Sqlx(sqlx::Error::PoolTimedOut)
}

/// Peer store that can be told to fail the way a struggling database does.
pub struct FlakyStore {
	inner: PeerRepository,
	/// `get_peer` fails with a pool timeout.
	pub fail_reads: AtomicBool,
	/// Commits land, then report an I/O error.
	pub fail_after_commit: AtomicBool,
	/// Commits never finish.
	pub stall_commits: AtomicBool,
}

impl FlakyStore {
	pub fn new(inner: PeerRepository) -> Self {
		Self {
			inner,
			fail_reads: AtomicBool::new(false),
			fail_after_commit: AtomicBool::new(false),
			stall_commits: AtomicBool::new(false),
		}
	}
}

enum CommitFault {
	None,
	AfterCommit,
	Stall,
}

struct FlakyStaged {
	inner: Box<dyn StagedPeer>,
	fault: CommitFault,
}

#[async_trait]
impl StagedPeer for FlakyStaged {
	fn admission(&self) -> &PeerAdmission {
		self.inner.admission()
	}

	async fn commit(self: Box<Self>) -> Result<(), DbError> {
		let FlakyStaged { inner, fault } = *self;
		match fault {
			CommitFault::None => inner.commit().await,
			CommitFault::AfterCommit => {
				inner.commit().await?;
				Err(DbError::Sqlx(sqlx::Error::Io(std::io::Error::new(
					std::io::ErrorKind::ConnectionReset,
					"connection reset after commit",
				))))
			}
			CommitFault::Stall => {
				let _held = inner;
				std::future::pending::<()>().await;
				Ok(())
			}
		}
	}
}

#[async_trait]
impl PeerStore for FlakyStore {
	async fn stage_peer(&self, peer: &PeerRecord) -> Result<Box<dyn StagedPeer>, DbError> {
		let fault = if self.stall_commits.load(Ordering::SeqCst) {
			CommitFault::Stall
		} else if self.fail_after_commit.load(Ordering::SeqCst) {
			CommitFault::AfterCommit
		} else {
			CommitFault::None
		};
		let inner = PeerStore::stage_peer(&self.inner, peer).await?;
		Ok(Box::new(FlakyStaged { inner, fault }))
	}

	async fn get_peer(&self, id: PeerId) -> Result<Option<PeerRecord>, DbError> {
		if self.fail_reads.load(Ordering::SeqCst) {
			return Err(pool_timeout());
		}
		self.inner.get_peer(id).await
	}

	async fn list_live_peers_for_account(
		&self,
		account_id: AccountId,
	) -> Result<Vec<PeerRecord>, DbError> {
		self.inner.list_live_peers_for_account(account_id).await
	}

	async fn list_live_peers_in_region(&self, region: &str) -> Result<Vec<PeerRecord>, DbError> {
		self.inner.list_live_peers_in_region(region).await
	}

	async fn update_peer_name(&self, id: PeerId, name: &str) -> Result<Option<PeerRecord>, DbError> {
		self.inner.update_peer_name(id, name).await
	}

	async fn revoke_peer(&self, id: PeerId) -> Result<Option<RevokedPeer>, DbError> {
		self.inner.revoke_peer(id).await
	}

	async fn record_handshake(
		&self,
		id: PeerId,
		at: DateTime<Utc>,
	) -> Result<HandshakeUpdate, DbError> {
		self.inner.record_handshake(id, at).await
	}

	async fn usage_for_account(&self, account_id: AccountId) -> Result<PeerUsage, DbError> {
		self.inner.usage_for_account(account_id).await
	}

	async fn count_live_peers(&self, account_id: AccountId) -> Result<u32, DbError> {
		PeerStore::count_live_peers(&self.inner, account_id).await
	}

	async fn list_address_holdings(
		&self,
		revoked_since: DateTime<Utc>,
	) -> Result<Vec<AddressHolding>, DbError> {
		self.inner.list_address_holdings(revoked_since).await
	}
}
