// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! SQLite persistence for the Tridot provisioning server.
//!
//! This crate provides:
//! - Connection pool setup ([`create_pool`])
//! - The peer registry's durable state ([`PeerRepository`])
//! - Accounts and their bearer tokens ([`AccountRepository`])
//! - The schema itself ([`run_migrations`])
//!
//! Repositories expose both inherent methods and a `*Store` trait so services
//! can be tested against alternative implementations.

pub mod accounts;
mod error;
pub mod migrations;
pub mod peers;
pub mod pool;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use accounts::{Account, AccountRepository, AccountStore};
pub use error::{DbError, Result};
pub use migrations::run_migrations;
pub use peers::{
	AddressHolding, HandshakeUpdate, PeerAdmission, PeerRepository, PeerStore, PeerUsage,
	RevokedPeer, StagedPeer,
};
pub use pool::create_pool;

pub use sqlx::sqlite::SqlitePool;

use chrono::{DateTime, Utc};

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
	DateTime::parse_from_rfc3339(s)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("invalid timestamp {s}: {e}")))
}
