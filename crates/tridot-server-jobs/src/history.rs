// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! In-memory record of recent job runs.

use crate::types::{JobRun, JobStatus};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

const DEFAULT_RUNS_PER_JOB: usize = 32;

#[derive(Debug)]
pub struct RunHistory {
	runs: Mutex<HashMap<String, VecDeque<JobRun>>>,
	capacity: usize,
}

impl Default for RunHistory {
	fn default() -> Self {
		Self::with_capacity(DEFAULT_RUNS_PER_JOB)
	}
}

impl RunHistory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Keeps at most `capacity` runs per job, newest first.
	pub fn with_capacity(capacity: usize) -> Self {
		Self {
			runs: Mutex::new(HashMap::new()),
			capacity: capacity.max(1),
		}
	}

	fn runs(&self) -> MutexGuard<'_, HashMap<String, VecDeque<JobRun>>> {
		self.runs
			.lock()
			.unwrap_or_else(|poisoned| poisoned.into_inner())
	}

	pub fn record_run_start(&self, run: &JobRun) {
		let mut runs = self.runs();
		let job_runs = runs.entry(run.job_id.clone()).or_default();
		job_runs.push_front(run.clone());
		job_runs.truncate(self.capacity);
	}

	pub fn record_run_complete(
		&self,
		job_id: &str,
		run_id: &str,
		status: JobStatus,
		error_message: Option<String>,
		metadata: Option<serde_json::Value>,
	) {
		let mut runs = self.runs();
		let Some(run) = runs
			.get_mut(job_id)
			.and_then(|job_runs| job_runs.iter_mut().find(|r| r.id == run_id))
		else {
			return;
		};
		let now = Utc::now();
		run.status = status;
		run.completed_at = Some(now);
		run.duration_ms = Some((now - run.started_at).num_milliseconds());
		run.error_message = error_message;
		run.metadata = metadata;
	}

	pub fn record_retry(&self, job_id: &str, run_id: &str, retry_count: u32) {
		let mut runs = self.runs();
		if let Some(run) = runs
			.get_mut(job_id)
			.and_then(|job_runs| job_runs.iter_mut().find(|r| r.id == run_id))
		{
			run.retry_count = retry_count;
		}
	}

	pub fn get_last_run(&self, job_id: &str) -> Option<JobRun> {
		self.runs().get(job_id).and_then(|runs| runs.front().cloned())
	}

	/// Failed runs since the last run that did not fail.
	pub fn count_consecutive_failures(&self, job_id: &str) -> u32 {
		self.runs()
			.get(job_id)
			.map(|runs| {
				runs.iter()
					.take_while(|r| r.status == JobStatus::Failed)
					.count() as u32
			})
			.unwrap_or(0)
	}

	/// Completion time of the newest successful run still in memory.
	pub fn last_success_at(&self, job_id: &str) -> Option<DateTime<Utc>> {
		self.runs().get(job_id).and_then(|runs| {
			runs.iter()
				.find(|r| r.status == JobStatus::Succeeded)
				.and_then(|r| r.completed_at)
		})
	}

	pub fn list_runs(&self, job_id: &str, limit: usize) -> Vec<JobRun> {
		self.runs()
			.get(job_id)
			.map(|runs| runs.iter().take(limit).cloned().collect())
			.unwrap_or_default()
	}
}
