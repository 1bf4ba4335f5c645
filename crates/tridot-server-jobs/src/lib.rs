// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Background job scheduler for the Tridot server.
//!
//! Runs periodic and one-shot maintenance tasks with retry and keeps the
//! outcome of recent runs in memory for health reporting.

pub mod context;
pub mod error;
pub mod health;
pub mod history;
pub mod job;
pub mod scheduler;
pub mod types;

pub use context::{CancellationToken, JobContext};
pub use error::{JobError, Result};
pub use health::{is_stalled, HealthState, JobHealth, RunSummary, SchedulerHealth};
pub use history::RunHistory;
pub use job::Job;
pub use scheduler::{JobScheduler, RetrySettings};
pub use types::{JobOutput, JobRun, JobStatus, JobType, TriggerSource};
