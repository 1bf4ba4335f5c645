// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use async_trait::async_trait;
use chrono::Utc;
use tracing::instrument;
use tridot_server_jobs::{Job, JobContext, JobError, JobOutput};
use tridot_server_provisioning::TelemetryIngest;

/// Forgets health reports of nodes that stopped reporting.
pub struct NodePruneJob {
	telemetry: TelemetryIngest,
	retention: chrono::Duration,
}

impl NodePruneJob {
	pub fn new(telemetry: TelemetryIngest, retention: std::time::Duration) -> Self {
		Self {
			telemetry,
			retention: chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX),
		}
	}
}

#[async_trait]
impl Job for NodePruneJob {
	fn id(&self) -> &str {
		"node-prune"
	}

	fn name(&self) -> &str {
		"Node Prune"
	}

	fn description(&self) -> &str {
		"Forget nodes that stopped sending health reports"
	}

	#[instrument(skip(self, ctx), fields(job_id = "node-prune"))]
	async fn run(&self, ctx: &JobContext) -> Result<JobOutput, JobError> {
		ctx.check_cancelled()?;

		let pruned = self.telemetry.prune_nodes(Utc::now(), self.retention);

		tracing::debug!(pruned_count = pruned, "node prune completed");

		Ok(JobOutput {
			message: format!("Forgot {pruned} silent nodes"),
			metadata: Some(serde_json::json!({ "pruned_count": pruned })),
		})
	}
}
