// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::SqlitePool;
use std::path::Path;

use crate::migrations::run_migrations;
use crate::pool::create_pool;

/// Empty in-memory pool, no schema.
pub async fn create_test_pool() -> SqlitePool {
	SqlitePool::connect(":memory:").await.unwrap()
}

/// File-backed WAL pool for tests that write from many tasks at once.
pub async fn create_file_test_pool(dir: &Path) -> SqlitePool {
	let url = format!("sqlite:{}", dir.join("tridot-test.db").display());
	let pool = create_pool(&url, 8).await.unwrap();
	run_migrations(&pool).await.unwrap();
	pool
}

/// In-memory pool with the production schema applied.
pub async fn create_provisioning_test_pool() -> SqlitePool {
	let pool = create_test_pool().await;
	run_migrations(&pool).await.unwrap();
	pool
}
