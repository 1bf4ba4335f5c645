// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;
use tridot_server_jobs::{Job, JobContext, JobError, JobOutput};
use tridot_server_provisioning::ProvisioningService;

pub struct TicketSweepJob {
	provisioning: ProvisioningService,
}

impl TicketSweepJob {
	pub fn new(provisioning: ProvisioningService) -> Self {
		Self { provisioning }
	}
}

#[async_trait]
impl Job for TicketSweepJob {
	fn id(&self) -> &str {
		"ticket-sweep"
	}

	fn name(&self) -> &str {
		"Ticket Sweep"
	}

	fn description(&self) -> &str {
		"Drop provisioning tickets past their expiry"
	}

	#[instrument(skip(self, ctx), fields(job_id = "ticket-sweep"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		ctx.check_cancelled()?;

		let removed = self.provisioning.sweep_expired(Utc::now()).await;

		tracing::debug!(removed_count = removed, "ticket sweep completed");

		Ok(JobOutput {
			message: format!("Removed {removed} expired tickets"),
			metadata: Some(serde_json::json!({ "removed_count": removed })),
		})
	}
}
