// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Health assessment of the maintenance jobs.
//!
//! A job is degraded after a failed run and unhealthy after
//! [`UNHEALTHY_AFTER_FAILURES`] in a row. A periodic job with no success for
//! [`STALL_INTERVALS`] of its interval is degraded as well: a stalled ticket
//! sweep leaves dead tickets behind and a stalled cooldown sweep keeps
//! addresses out of the pool.

use crate::types::{JobRun, JobStatus, JobType};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const UNHEALTHY_AFTER_FAILURES: u32 = 3;
pub const STALL_INTERVALS: u32 = 3;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
	Healthy,
	Degraded,
	Unhealthy,
}

impl HealthState {
	/// Failures outrank a stall; a stall alone only degrades.
	pub fn assess(last_run: Option<&JobRun>, consecutive_failures: u32, stalled: bool) -> Self {
		let from_runs = match last_run.map(|r| r.status) {
			Some(JobStatus::Failed) if consecutive_failures >= UNHEALTHY_AFTER_FAILURES => {
				HealthState::Unhealthy
			}
			Some(JobStatus::Failed) if consecutive_failures > 0 => HealthState::Degraded,
			_ => HealthState::Healthy,
		};
		if stalled {
			from_runs.max(HealthState::Degraded)
		} else {
			from_runs
		}
	}
}

/// Whether a periodic job has gone [`STALL_INTERVALS`] intervals without
/// succeeding. `since` is the last success, or registration if it never
/// succeeded.
pub fn is_stalled(job_type: &JobType, since: DateTime<Utc>, now: DateTime<Utc>) -> bool {
	let JobType::Periodic { interval } = job_type else {
		return false;
	};
	let Ok(window) = chrono::Duration::from_std(*interval * STALL_INTERVALS) else {
		return false;
	};
	now - since > window
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
	pub run_id: String,
	pub status: JobStatus,
	pub started_at: DateTime<Utc>,
	pub duration_ms: Option<i64>,
	pub error: Option<String>,
}

impl From<JobRun> for RunSummary {
	fn from(run: JobRun) -> Self {
		Self {
			run_id: run.id,
			status: run.status,
			started_at: run.started_at,
			duration_ms: run.duration_ms,
			error: run.error_message,
		}
	}
}

#[derive(Debug, Clone, Serialize)]
pub struct JobHealth {
	pub job_id: String,
	pub name: String,
	pub state: HealthState,
	pub stalled: bool,
	pub consecutive_failures: u32,
	pub last_run: Option<RunSummary>,
}

/// Every registered job, worst state first in `state`.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerHealth {
	pub state: HealthState,
	pub jobs: Vec<JobHealth>,
}

impl SchedulerHealth {
	pub fn from_jobs(jobs: Vec<JobHealth>) -> Self {
		let state = jobs
			.iter()
			.map(|j| j.state)
			.max()
			.unwrap_or(HealthState::Healthy);
		Self { state, jobs }
	}

	pub fn healthy_count(&self) -> usize {
		self.jobs
			.iter()
			.filter(|j| j.state == HealthState::Healthy)
			.count()
	}

	/// Ids of jobs that are not healthy.
	pub fn attention(&self) -> Vec<String> {
		self.jobs
			.iter()
			.filter(|j| j.state != HealthState::Healthy)
			.map(|j| j.job_id.clone())
			.collect()
	}
}
