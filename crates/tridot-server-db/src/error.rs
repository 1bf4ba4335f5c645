// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#[derive(Debug, thiserror::Error)]
pub enum DbError {
	#[error("Database error: {0}")]
	Sqlx(#[from] sqlx::Error),

	#[error("Not found: {0}")]
	NotFound(String),

	#[error("Conflict: {0}")]
	Conflict(String),

	#[error("Internal: {0}")]
	Internal(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl DbError {
	/// True for failures that may succeed on a later attempt: pool exhaustion,
	/// I/O hiccups and lock contention.
	pub fn is_transient(&self) -> bool {
		match self {
			DbError::Sqlx(err) => is_transient_sqlx(err),
			_ => false,
		}
	}
}

fn is_transient_sqlx(err: &sqlx::Error) -> bool {
	match err {
		sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => true,
		sqlx::Error::Database(db) => db
			.code()
			.and_then(|code| code.parse::<i32>().ok())
			.map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
			.unwrap_or(false),
		_ => false,
	}
}

/// Which unique constraint an insert tripped, if any.
pub(crate) fn unique_violation(err: &sqlx::Error) -> Option<String> {
	match err {
		sqlx::Error::Database(db) if db.is_unique_violation() => Some(db.message().to_string()),
		_ => None,
	}
}
