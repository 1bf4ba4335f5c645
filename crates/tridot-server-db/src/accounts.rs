// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Account repository.
//!
//! Accounts carry the plan tier that sizes their device quota. Bearer tokens
//! are stored as SHA-256 hex digests, never in plaintext.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use tridot_wg_common::AccountId;

use crate::error::DbError;
use crate::parse_datetime;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
	pub id: AccountId,
	pub plan_tier: String,
	pub created_at: DateTime<Utc>,
}

type AccountRowTuple = (String, String, String);

fn parse_account_row(row: AccountRowTuple) -> Result<Account, DbError> {
	let (id, plan_tier, created_at) = row;
	Ok(Account {
		id: id
			.parse()
			.map_err(|e| DbError::Internal(format!("invalid account id {id}: {e}")))?,
		plan_tier,
		created_at: parse_datetime(&created_at)?,
	})
}

#[async_trait]
pub trait AccountStore: Send + Sync {
	async fn create_account(&self, plan_tier: &str) -> Result<Account, DbError>;
	async fn get_account(&self, id: AccountId) -> Result<Option<Account>, DbError>;
	async fn update_plan_tier(&self, id: AccountId, plan_tier: &str) -> Result<(), DbError>;
	async fn create_token(&self, account_id: AccountId, token_hash: &str) -> Result<(), DbError>;
	async fn get_account_by_token_hash(&self, token_hash: &str) -> Result<Option<AccountId>, DbError>;
}

#[async_trait]
impl AccountStore for AccountRepository {
	async fn create_account(&self, plan_tier: &str) -> Result<Account, DbError> {
		self.create_account(plan_tier).await
	}

	async fn get_account(&self, id: AccountId) -> Result<Option<Account>, DbError> {
		self.get_account(id).await
	}

	async fn update_plan_tier(&self, id: AccountId, plan_tier: &str) -> Result<(), DbError> {
		self.update_plan_tier(id, plan_tier).await
	}

	async fn create_token(&self, account_id: AccountId, token_hash: &str) -> Result<(), DbError> {
		self.create_token(account_id, token_hash).await
	}

	async fn get_account_by_token_hash(&self, token_hash: &str) -> Result<Option<AccountId>, DbError> {
		self.get_account_by_token_hash(token_hash).await
	}
}

#[derive(Clone)]
pub struct AccountRepository {
	pool: SqlitePool,
}

impl AccountRepository {
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	#[tracing::instrument(skip(self))]
	pub async fn create_account(&self, plan_tier: &str) -> Result<Account, DbError> {
		let account = Account {
			id: AccountId::new(),
			plan_tier: plan_tier.to_string(),
			created_at: Utc::now(),
		};

		sqlx::query("INSERT INTO accounts (id, plan_tier, created_at) VALUES (?, ?, ?)")
			.bind(account.id.to_string())
			.bind(&account.plan_tier)
			.bind(account.created_at.to_rfc3339())
			.execute(&self.pool)
			.await?;

		tracing::debug!(account_id = %account.id, "account created");
		Ok(account)
	}

	#[tracing::instrument(skip(self), fields(%id))]
	pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>, DbError> {
		let row: Option<AccountRowTuple> =
			sqlx::query_as("SELECT id, plan_tier, created_at FROM accounts WHERE id = ?")
				.bind(id.to_string())
				.fetch_optional(&self.pool)
				.await?;

		row.map(parse_account_row).transpose()
	}

	#[tracing::instrument(skip(self), fields(%id))]
	pub async fn update_plan_tier(&self, id: AccountId, plan_tier: &str) -> Result<(), DbError> {
		let result = sqlx::query("UPDATE accounts SET plan_tier = ? WHERE id = ?")
			.bind(plan_tier)
			.bind(id.to_string())
			.execute(&self.pool)
			.await?;

		if result.rows_affected() == 0 {
			return Err(DbError::NotFound(format!("account {id}")));
		}
		Ok(())
	}

	/// Plan tier read on the caller's connection, typically inside the peer
	/// creation transaction.
	pub(crate) async fn get_plan_tier_in(
		conn: &mut SqliteConnection,
		id: AccountId,
	) -> Result<Option<String>, DbError> {
		let row: Option<(String,)> = sqlx::query_as("SELECT plan_tier FROM accounts WHERE id = ?")
			.bind(id.to_string())
			.fetch_optional(conn)
			.await?;

		Ok(row.map(|(tier,)| tier))
	}

	#[tracing::instrument(skip(self, token_hash), fields(%account_id))]
	pub async fn create_token(&self, account_id: AccountId, token_hash: &str) -> Result<(), DbError> {
		sqlx::query("INSERT INTO account_tokens (token_hash, account_id, created_at) VALUES (?, ?, ?)")
			.bind(token_hash)
			.bind(account_id.to_string())
			.bind(Utc::now().to_rfc3339())
			.execute(&self.pool)
			.await?;

		Ok(())
	}

	#[tracing::instrument(skip(self, token_hash))]
	pub async fn get_account_by_token_hash(
		&self,
		token_hash: &str,
	) -> Result<Option<AccountId>, DbError> {
		let row: Option<(String,)> =
			sqlx::query_as("SELECT account_id FROM account_tokens WHERE token_hash = ?")
				.bind(token_hash)
				.fetch_optional(&self.pool)
				.await?;

		let Some((account_id,)) = row else {
			return Ok(None);
		};

		sqlx::query("UPDATE account_tokens SET last_used_at = ? WHERE token_hash = ?")
			.bind(Utc::now().to_rfc3339())
			.bind(token_hash)
			.execute(&self.pool)
			.await?;

		account_id
			.parse()
			.map(Some)
			.map_err(|e| DbError::Internal(format!("invalid account id {account_id}: {e}")))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::testing::create_provisioning_test_pool;

	async fn make_repo() -> AccountRepository {
		AccountRepository::new(create_provisioning_test_pool().await)
	}

	#[tokio::test]
	async fn test_create_and_get_account() {
		let repo = make_repo().await;
		let account = repo.create_account("family").await.unwrap();

		let loaded = repo.get_account(account.id).await.unwrap().unwrap();
		assert_eq!(loaded.id, account.id);
		assert_eq!(loaded.plan_tier, "family");
	}

	#[tokio::test]
	async fn test_get_account_not_found() {
		let repo = make_repo().await;
		assert!(repo.get_account(AccountId::new()).await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_update_plan_tier() {
		let repo = make_repo().await;
		let account = repo.create_account("free").await.unwrap();
		repo.update_plan_tier(account.id, "standard").await.unwrap();
		let loaded = repo.get_account(account.id).await.unwrap().unwrap();
		assert_eq!(loaded.plan_tier, "standard");

		let err = repo
			.update_plan_tier(AccountId::new(), "standard")
			.await
			.unwrap_err();
		assert!(matches!(err, DbError::NotFound(_)));
	}

	#[tokio::test]
	async fn test_token_lookup() {
		let repo = make_repo().await;
		let account = repo.create_account("standard").await.unwrap();
		repo.create_token(account.id, "abc123hash").await.unwrap();

		let found = repo.get_account_by_token_hash("abc123hash").await.unwrap();
		assert_eq!(found, Some(account.id));
		assert!(repo
			.get_account_by_token_hash("other")
			.await
			.unwrap()
			.is_none());
	}

	#[tokio::test]
	async fn test_plan_tier_in_transaction() {
		let pool = create_provisioning_test_pool().await;
		let repo = AccountRepository::new(pool.clone());
		let account = repo.create_account("family").await.unwrap();

		let mut tx = pool.begin().await.unwrap();
		let tier = AccountRepository::get_plan_tier_in(&mut tx, account.id)
			.await
			.unwrap();
		assert_eq!(tier.as_deref(), Some("family"));
		let missing = AccountRepository::get_plan_tier_in(&mut tx, AccountId::new())
			.await
			.unwrap();
		assert!(missing.is_none());
	}
}
