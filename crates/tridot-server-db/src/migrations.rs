// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Schema migrations, shared by the server and by test pools.

use sqlx::sqlite::SqlitePool;

use crate::error::Result;

const MIGRATIONS: &[(&str, &str)] = &[
	(
		"001_create_peers",
		include_str!("../migrations/001_create_peers.sql"),
	),
	(
		"002_create_accounts",
		include_str!("../migrations/002_create_accounts.sql"),
	),
	(
		"003_add_preshared_key",
		include_str!("../migrations/003_add_preshared_key.sql"),
	),
];

/// Applies the schema on each start. Table and index statements are
/// idempotent; a column that already exists is skipped.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
	for (name, sql) in MIGRATIONS {
		for stmt in statements(sql) {
			if let Err(e) = sqlx::query(stmt).execute(pool).await {
				if !e.to_string().contains("duplicate column") {
					return Err(e.into());
				}
				tracing::debug!(migration = name, "column already present");
			}
		}
		tracing::debug!(migration = name, "migration applied");
	}
	Ok(())
}

fn statements(sql: &str) -> impl Iterator<Item = &str> {
	sql.split(';').map(str::trim).filter(|stmt| {
		stmt.lines()
			.any(|line| !line.trim().is_empty() && !line.trim_start().starts_with("--"))
	})
}
