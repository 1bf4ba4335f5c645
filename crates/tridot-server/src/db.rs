// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Database setup for the server binary.

pub use tridot_server_db::{
	create_pool, run_migrations, AccountRepository, DbError, PeerRepository, SqlitePool,
};

use crate::error::ServerError;

/// Opens the pool and brings the schema up to date.
pub async fn open_database(url: &str, max_connections: u32) -> Result<SqlitePool, ServerError> {
	let pool = create_pool(url, max_connections).await?;
	run_migrations(&pool).await?;
	Ok(pool)
}
