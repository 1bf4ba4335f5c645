// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Bounded retry for storage calls.
//!
//! Every attempt runs under a timeout. Timeouts and transient database errors
//! are retried with exponential backoff plus jitter; anything else is returned
//! on the first failure.

use std::future::Future;
use std::time::Duration;
use tracing::warn;
use tridot_server_config::ProvisioningConfig;

use crate::error::{ProvisioningError, Result};

const BASE_RETRY_DELAY_MS: u64 = 25;
const MAX_RETRY_DELAY_MS: u64 = 1_000;
const RETRY_FACTOR: f64 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	pub max_retries: u32,
	pub attempt_timeout: Duration,
	pub base_delay: Duration,
	pub max_delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_retries: 3,
			attempt_timeout: Duration::from_secs(5),
			base_delay: Duration::from_millis(BASE_RETRY_DELAY_MS),
			max_delay: Duration::from_millis(MAX_RETRY_DELAY_MS),
		}
	}
}

impl RetryPolicy {
	pub fn from_config(config: &ProvisioningConfig) -> Self {
		Self {
			max_retries: config.storage_retries,
			attempt_timeout: config.storage_timeout(),
			..Self::default()
		}
	}

	/// Delay before retry number `retry` (1-based), without jitter.
	pub fn backoff(&self, retry: u32) -> Duration {
		let exp = RETRY_FACTOR.powi(retry.saturating_sub(1) as i32);
		let delay_ms = self.base_delay.as_millis() as f64 * exp;
		Duration::from_millis(delay_ms as u64).min(self.max_delay)
	}

	fn backoff_with_jitter(&self, retry: u32) -> Duration {
		let delay = self.backoff(retry);
		let jitter_ms = fastrand::u64(0..=delay.as_millis() as u64 / 2);
		delay + Duration::from_millis(jitter_ms)
	}
}

/// Runs `op` until it succeeds, fails permanently, or the retry budget is spent.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut op: F) -> Result<T>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<T>>,
{
	let mut retry = 0u32;
	loop {
		let outcome = match tokio::time::timeout(policy.attempt_timeout, op()).await {
			Ok(result) => result,
			Err(_) => Err(ProvisioningError::Transient(format!(
				"{operation} timed out after {}ms",
				policy.attempt_timeout.as_millis()
			))),
		};

		match outcome {
			Err(err) if err.is_retriable() && retry < policy.max_retries => {
				retry += 1;
				let delay = policy.backoff_with_jitter(retry);
				warn!(
					operation,
					retry,
					delay_ms = delay.as_millis() as u64,
					error = %err,
					"storage call failed, retrying"
				);
				tokio::time::sleep(delay).await;
			}
			other => return other,
		}
	}
}
