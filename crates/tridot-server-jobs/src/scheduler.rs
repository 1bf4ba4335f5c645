// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::context::{CancellationToken, JobContext};
use crate::error::{JobError, Result};
use crate::health::{is_stalled, HealthState, JobHealth, SchedulerHealth};
use crate::history::RunHistory;
use crate::job::Job;
use crate::types::{JobRun, JobStatus, JobType, TriggerSource};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

const BASE_RETRY_DELAY_SECS: u64 = 1;
const MAX_RETRY_DELAY_SECS: u64 = 60;
const RETRY_FACTOR: f64 = 2.0;
const MAX_RETRIES: u32 = 3;

/// Retry budget for failed runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
	pub max_retries: u32,
	pub base_delay: Duration,
	pub max_delay: Duration,
}

impl Default for RetrySettings {
	fn default() -> Self {
		Self {
			max_retries: MAX_RETRIES,
			base_delay: Duration::from_secs(BASE_RETRY_DELAY_SECS),
			max_delay: Duration::from_secs(MAX_RETRY_DELAY_SECS),
		}
	}
}

impl RetrySettings {
	pub(crate) fn backoff_delay(&self, retry_count: u32) -> Duration {
		let factor = RETRY_FACTOR.powi(retry_count as i32 - 1);
		let delay_ms = self.base_delay.as_millis() as f64 * factor;
		Duration::from_millis(delay_ms as u64).min(self.max_delay)
	}
}

struct RegisteredJob {
	job: Arc<dyn Job>,
	job_type: JobType,
	registered_at: DateTime<Utc>,
	cancellation_token: CancellationToken,
}

pub struct JobScheduler {
	jobs: HashMap<String, RegisteredJob>,
	history: Arc<RunHistory>,
	retry: RetrySettings,
	shutdown_tx: broadcast::Sender<()>,
	handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for JobScheduler {
	fn default() -> Self {
		Self::new(Arc::new(RunHistory::new()))
	}
}

impl JobScheduler {
	pub fn new(history: Arc<RunHistory>) -> Self {
		let (shutdown_tx, _) = broadcast::channel(1);
		Self {
			jobs: HashMap::new(),
			history,
			retry: RetrySettings::default(),
			shutdown_tx,
			handles: Mutex::new(Vec::new()),
		}
	}

	pub fn with_retry(mut self, retry: RetrySettings) -> Self {
		self.retry = retry;
		self
	}

	pub fn register_periodic(&mut self, job: Arc<dyn Job>, interval: Duration) {
		let id = job.id().to_string();
		self.jobs.insert(
			id,
			RegisteredJob {
				job,
				job_type: JobType::Periodic { interval },
				registered_at: Utc::now(),
				cancellation_token: CancellationToken::new(),
			},
		);
	}

	pub fn register_one_shot(&mut self, job: Arc<dyn Job>) {
		let id = job.id().to_string();
		self.jobs.insert(
			id,
			RegisteredJob {
				job,
				job_type: JobType::OneShot,
				registered_at: Utc::now(),
				cancellation_token: CancellationToken::new(),
			},
		);
	}

	/// Spawns a loop per periodic job. One-shot jobs only run when triggered.
	#[instrument(skip(self))]
	pub async fn start(&self) {
		let mut handles = self.handles.lock().await;

		for (job_id, registered) in &self.jobs {
			let JobType::Periodic { interval } = registered.job_type else {
				continue;
			};
			let job = Arc::clone(&registered.job);
			let history = Arc::clone(&self.history);
			let retry = self.retry;
			let mut shutdown_rx = self.shutdown_tx.subscribe();
			let cancellation_token = registered.cancellation_token.clone();
			let job_id = job_id.clone();

			let handle = tokio::spawn(async move {
				let mut ticker = tokio::time::interval(interval);
				ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
				// The first tick fires immediately.
				ticker.tick().await;
				loop {
					tokio::select! {
						_ = ticker.tick() => {
							if cancellation_token.is_cancelled() {
								continue;
							}
							let _ = run_job_with_retry(
								&job,
								&history,
								retry,
								TriggerSource::Schedule,
								&cancellation_token,
							).await;
						}
						_ = shutdown_rx.recv() => {
							info!(job_id = %job_id, "Shutting down periodic job");
							break;
						}
					}
				}
			});

			handles.push(handle);
		}

		info!(job_count = handles.len(), "Job scheduler started");
	}

	#[instrument(skip(self))]
	pub async fn trigger_job(&self, job_id: &str, triggered_by: TriggerSource) -> Result<String> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		run_job_with_retry(
			&registered.job,
			&self.history,
			self.retry,
			triggered_by,
			&registered.cancellation_token,
		)
		.await
	}

	#[instrument(skip(self))]
	pub fn cancel_job(&self, job_id: &str) -> Result<()> {
		let registered = self
			.jobs
			.get(job_id)
			.ok_or_else(|| JobError::NotFound(job_id.to_string()))?;

		registered.cancellation_token.cancel();
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		let _ = self.shutdown_tx.send(());

		let mut handles = self.handles.lock().await;
		for handle in handles.drain(..) {
			let _ = handle.await;
		}

		info!("Job scheduler shut down");
	}

	pub fn job_ids(&self) -> Vec<String> {
		let mut ids: Vec<_> = self.jobs.keys().cloned().collect();
		ids.sort();
		ids
	}

	pub fn history(&self) -> &RunHistory {
		&self.history
	}

	pub fn job_status(&self, job_id: &str) -> Option<JobHealth> {
		self.job_status_at(job_id, Utc::now())
	}

	fn job_status_at(&self, job_id: &str, now: DateTime<Utc>) -> Option<JobHealth> {
		let registered = self.jobs.get(job_id)?;

		let last_run = self.history.get_last_run(job_id);
		let consecutive_failures = self.history.count_consecutive_failures(job_id);
		let since = self
			.history
			.last_success_at(job_id)
			.unwrap_or(registered.registered_at);
		let stalled = is_stalled(&registered.job_type, since, now);

		Some(JobHealth {
			job_id: job_id.to_string(),
			name: registered.job.name().to_string(),
			state: HealthState::assess(last_run.as_ref(), consecutive_failures, stalled),
			stalled,
			consecutive_failures,
			last_run: last_run.map(Into::into),
		})
	}

	pub fn health_status(&self) -> SchedulerHealth {
		let now = Utc::now();
		SchedulerHealth::from_jobs(
			self.job_ids()
				.iter()
				.filter_map(|job_id| self.job_status_at(job_id, now))
				.collect(),
		)
	}
}

async fn run_job_with_retry(
	job: &Arc<dyn Job>,
	history: &RunHistory,
	retry: RetrySettings,
	triggered_by: TriggerSource,
	cancellation_token: &CancellationToken,
) -> Result<String> {
	let mut retry_count = 0u32;
	let run_id = uuid::Uuid::new_v4().to_string();

	history.record_run_start(&JobRun {
		id: run_id.clone(),
		job_id: job.id().to_string(),
		status: JobStatus::Running,
		started_at: Utc::now(),
		completed_at: None,
		duration_ms: None,
		error_message: None,
		retry_count,
		triggered_by,
		metadata: None,
	});

	loop {
		let ctx = JobContext {
			run_id: run_id.clone(),
			triggered_by: if retry_count > 0 {
				TriggerSource::Retry
			} else {
				triggered_by
			},
			cancellation_token: cancellation_token.clone(),
		};

		match job.run(&ctx).await {
			Ok(output) => {
				history.record_run_complete(
					job.id(),
					&run_id,
					JobStatus::Succeeded,
					None,
					output.metadata,
				);
				info!(job_id = %job.id(), run_id = %run_id, message = %output.message, "Job completed successfully");
				return Ok(run_id);
			}
			Err(JobError::Cancelled) => {
				history.record_run_complete(job.id(), &run_id, JobStatus::Cancelled, None, None);
				info!(job_id = %job.id(), run_id = %run_id, "Job cancelled");
				return Err(JobError::Cancelled);
			}
			Err(JobError::Failed { message, retryable }) => {
				if retryable && retry_count < retry.max_retries {
					retry_count += 1;
					history.record_retry(job.id(), &run_id, retry_count);
					let delay = retry.backoff_delay(retry_count);
					warn!(
						job_id = %job.id(),
						run_id = %run_id,
						retry_count,
						delay_ms = delay.as_millis() as u64,
						error = %message,
						"Job failed, retrying"
					);
					tokio::time::sleep(delay).await;
					continue;
				}

				history.record_run_complete(
					job.id(),
					&run_id,
					JobStatus::Failed,
					Some(message.clone()),
					None,
				);
				warn!(job_id = %job.id(), run_id = %run_id, error = %message, "Job failed");
				return Err(JobError::Failed { message, retryable });
			}
			Err(e) => {
				let message = e.to_string();
				history.record_run_complete(
					job.id(),
					&run_id,
					JobStatus::Failed,
					Some(message.clone()),
					None,
				);
				warn!(job_id = %job.id(), run_id = %run_id, error = %message, "Job failed with error");
				return Err(e);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::types::JobOutput;
	use async_trait::async_trait;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct MockJob {
		id: String,
		failures_before_success: u32,
		retryable: bool,
		calls: AtomicU32,
	}

	impl MockJob {
		fn new(id: &str) -> Self {
			Self::failing(id, 0, true)
		}

		fn failing(id: &str, failures_before_success: u32, retryable: bool) -> Self {
			Self {
				id: id.to_string(),
				failures_before_success,
				retryable,
				calls: AtomicU32::new(0),
			}
		}
	}

	#[async_trait]
	impl Job for MockJob {
		fn id(&self) -> &str {
			&self.id
		}

		fn name(&self) -> &str {
			"Mock job"
		}

		fn description(&self) -> &str {
			"A mock job for testing"
		}

		async fn run(&self, ctx: &JobContext) -> std::result::Result<JobOutput, JobError> {
			ctx.check_cancelled()?;
			let call = self.calls.fetch_add(1, Ordering::SeqCst);
			if call < self.failures_before_success {
				return Err(JobError::Failed {
					message: format!("attempt {call} failed"),
					retryable: self.retryable,
				});
			}
			Ok(JobOutput {
				message: "Mock job completed".to_string(),
				metadata: Some(serde_json::json!({ "calls": call + 1 })),
			})
		}
	}

	fn fast_retry(max_retries: u32) -> RetrySettings {
		RetrySettings {
			max_retries,
			base_delay: Duration::from_millis(1),
			max_delay: Duration::from_millis(5),
		}
	}

	fn scheduler(max_retries: u32) -> JobScheduler {
		JobScheduler::new(Arc::new(RunHistory::new())).with_retry(fast_retry(max_retries))
	}

	#[test]
	fn test_default_backoff_doubles_and_caps() {
		let retry = RetrySettings::default();
		assert_eq!(retry.backoff_delay(1), Duration::from_secs(BASE_RETRY_DELAY_SECS));
		assert_eq!(retry.backoff_delay(2), Duration::from_secs(2));
		assert_eq!(retry.backoff_delay(3), Duration::from_secs(4));
		assert_eq!(retry.backoff_delay(10), Duration::from_secs(MAX_RETRY_DELAY_SECS));
		assert_eq!(retry.backoff_delay(100), Duration::from_secs(MAX_RETRY_DELAY_SECS));
	}

	#[tokio::test]
	async fn test_periodic_job_without_success_stalls() {
		let mut scheduler = scheduler(0);
		scheduler.register_periodic(Arc::new(MockJob::new("ticket-sweep")), Duration::from_secs(60));
		scheduler.register_one_shot(Arc::new(MockJob::new("oneshot")));

		let registered = scheduler.jobs["ticket-sweep"].registered_at;
		let fresh = scheduler.job_status_at("ticket-sweep", registered).unwrap();
		assert!(!fresh.stalled);
		assert_eq!(fresh.state, HealthState::Healthy);

		let later = registered + chrono::Duration::minutes(4);
		let stale = scheduler.job_status_at("ticket-sweep", later).unwrap();
		assert!(stale.stalled);
		assert_eq!(stale.state, HealthState::Degraded);
		assert!(!scheduler.job_status_at("oneshot", later).unwrap().stalled);

		scheduler
			.trigger_job("ticket-sweep", TriggerSource::Manual)
			.await
			.unwrap();
		let success = scheduler.history().last_success_at("ticket-sweep").unwrap();
		let after_run = scheduler
			.job_status_at("ticket-sweep", success + chrono::Duration::minutes(1))
			.unwrap();
		assert!(!after_run.stalled);
	}

	#[tokio::test]
	async fn test_register_jobs() {
		let mut scheduler = scheduler(0);
		scheduler.register_periodic(Arc::new(MockJob::new("periodic-job")), Duration::from_secs(60));
		scheduler.register_one_shot(Arc::new(MockJob::new("oneshot-job")));

		assert_eq!(scheduler.job_ids(), vec!["oneshot-job", "periodic-job"]);
	}

	#[tokio::test]
	async fn test_trigger_nonexistent_job_returns_not_found() {
		let scheduler = scheduler(0);
		match scheduler.trigger_job("nonexistent-job", TriggerSource::Manual).await {
			Err(JobError::NotFound(id)) => assert_eq!(id, "nonexistent-job"),
			other => panic!("Expected NotFound error, got: {other:?}"),
		}
	}

	#[tokio::test]
	async fn test_retryable_failure_is_retried() {
		let mut scheduler = scheduler(3);
		let job = Arc::new(MockJob::failing("flaky", 2, true));
		scheduler.register_one_shot(job.clone());

		let run_id = scheduler
			.trigger_job("flaky", TriggerSource::Manual)
			.await
			.unwrap();
		assert_eq!(job.calls.load(Ordering::SeqCst), 3);

		let last = scheduler.history().get_last_run("flaky").unwrap();
		assert_eq!(last.id, run_id);
		assert_eq!(last.status, JobStatus::Succeeded);
		assert_eq!(last.retry_count, 2);
		assert_eq!(scheduler.job_status("flaky").unwrap().state, HealthState::Healthy);
	}

	#[tokio::test]
	async fn test_permanent_failure_is_not_retried() {
		let mut scheduler = scheduler(3);
		let job = Arc::new(MockJob::failing("broken", u32::MAX, false));
		scheduler.register_one_shot(job.clone());

		let err = scheduler
			.trigger_job("broken", TriggerSource::Manual)
			.await
			.unwrap_err();
		assert!(matches!(err, JobError::Failed { retryable: false, .. }));
		assert_eq!(job.calls.load(Ordering::SeqCst), 1);

		let status = scheduler.job_status("broken").unwrap();
		assert_eq!(status.state, HealthState::Degraded);
		assert_eq!(status.consecutive_failures, 1);
		assert_eq!(
			status.last_run.unwrap().error.as_deref(),
			Some("attempt 0 failed")
		);
	}

	#[tokio::test]
	async fn test_repeated_failures_make_scheduler_unhealthy() {
		let mut scheduler = scheduler(0);
		scheduler.register_one_shot(Arc::new(MockJob::failing("broken", u32::MAX, true)));
		scheduler.register_one_shot(Arc::new(MockJob::new("fine")));

		for _ in 0..3 {
			let _ = scheduler.trigger_job("broken", TriggerSource::Manual).await;
		}
		scheduler.trigger_job("fine", TriggerSource::Manual).await.unwrap();

		let health = scheduler.health_status();
		assert_eq!(health.state, HealthState::Unhealthy);
		assert_eq!(health.jobs.len(), 2);
		assert_eq!(health.attention(), vec!["broken"]);
	}

	#[tokio::test]
	async fn test_cancelled_job_reports_cancelled() {
		let mut scheduler = scheduler(0);
		scheduler.register_one_shot(Arc::new(MockJob::new("sweep")));
		scheduler.cancel_job("sweep").unwrap();

		let err = scheduler
			.trigger_job("sweep", TriggerSource::Manual)
			.await
			.unwrap_err();
		assert!(matches!(err, JobError::Cancelled));
		assert_eq!(
			scheduler.history().get_last_run("sweep").unwrap().status,
			JobStatus::Cancelled
		);
		assert!(scheduler.cancel_job("missing").is_err());
	}

	#[tokio::test]
	async fn test_periodic_job_runs_until_shutdown() {
		let mut scheduler = scheduler(0);
		let job = Arc::new(MockJob::new("tick"));
		scheduler.register_periodic(job.clone(), Duration::from_millis(10));

		scheduler.start().await;
		tokio::time::sleep(Duration::from_millis(100)).await;
		scheduler.shutdown().await;

		let calls = job.calls.load(Ordering::SeqCst);
		assert!(calls >= 1, "expected at least one scheduled run, got {calls}");
		tokio::time::sleep(Duration::from_millis(30)).await;
		assert_eq!(job.calls.load(Ordering::SeqCst), calls);
	}
}
