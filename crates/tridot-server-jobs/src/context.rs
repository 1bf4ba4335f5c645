// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::types::TriggerSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Handed to every job run.
pub struct JobContext {
	pub run_id: String,
	pub triggered_by: TriggerSource,
	pub cancellation_token: CancellationToken,
}

impl JobContext {
	/// Fails with `JobError::Cancelled` once the job has been cancelled.
	pub fn check_cancelled(&self) -> crate::Result<()> {
		if self.cancellation_token.is_cancelled() {
			return Err(crate::JobError::Cancelled);
		}
		Ok(())
	}
}

/// Cancels future scheduled runs of a job. Runs already in flight see it
/// through [`JobContext::check_cancelled`].
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
	cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn cancel(&self) {
		self.cancelled.store(true, Ordering::SeqCst);
	}

	pub fn resume(&self) {
		self.cancelled.store(false, Ordering::SeqCst);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::SeqCst)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cancel_is_shared_between_clones() {
		let token = CancellationToken::new();
		let clone = token.clone();
		clone.cancel();
		assert!(token.is_cancelled());
		token.resume();
		assert!(!clone.is_cancelled());
	}

	#[test]
	fn check_cancelled_reports_cancellation() {
		let ctx = JobContext {
			run_id: "run-1".to_string(),
			triggered_by: TriggerSource::Manual,
			cancellation_token: CancellationToken::new(),
		};
		assert!(ctx.check_cancelled().is_ok());
		ctx.cancellation_token.cancel();
		assert!(matches!(ctx.check_cancelled(), Err(crate::JobError::Cancelled)));
	}
}
