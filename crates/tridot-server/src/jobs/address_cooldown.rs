// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;
use tridot_server_jobs::{Job, JobContext, JobError, JobOutput};
use tridot_server_provisioning::AddressPool;

/// Returns addresses of revoked peers to the free list once their cooldown
/// has passed.
pub struct AddressCooldownJob {
	addresses: AddressPool,
}

impl AddressCooldownJob {
	pub fn new(addresses: AddressPool) -> Self {
		Self { addresses }
	}
}

#[async_trait]
impl Job for AddressCooldownJob {
	fn id(&self) -> &str {
		"address-cooldown"
	}

	fn name(&self) -> &str {
		"Address Cooldown"
	}

	fn description(&self) -> &str {
		"Release cooled-down addresses of revoked peers"
	}

	#[instrument(skip(self, ctx), fields(job_id = "address-cooldown"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		ctx.check_cancelled()?;

		let released = self.addresses.release_cooled(Utc::now());

		tracing::debug!(released_count = released, "address cooldown completed");

		Ok(JobOutput {
			message: format!("Released {released} addresses"),
			metadata: Some(serde_json::json!({ "released_count": released })),
		})
	}
}
