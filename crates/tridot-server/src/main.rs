// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tridot provisioning server binary.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tridot_server::{
	auth::{generate_account_token, hash_token},
	apply_http_layers, create_app_state, create_router,
	db::{self, AccountRepository},
	jobs::{AddressCooldownJob, NodePruneJob, TicketSweepJob},
};
use tridot_server_config::{ConfigError, LogFormat, LoggingConfig, ServerConfig};
use tridot_server_jobs::{JobScheduler, RunHistory};
use tridot_wg_common::AccountId;
use uuid::Uuid;

/// Tridot server - WireGuard peer provisioning.
#[derive(Parser, Debug)]
#[command(name = "tridot-server", about = "Tridot peer provisioning server", version)]
struct Args {
	/// Config file to use instead of /etc/tridot/server.toml
	#[arg(long, short, env = "TRIDOT_SERVER_CONFIG", global = true)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the HTTP server (default)
	Serve,
	/// Manage accounts
	Account {
		#[command(subcommand)]
		command: AccountCommand,
	},
	/// Show version information
	Version,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
	/// Create an account and print its first bearer token
	Create {
		/// Plan tier; defaults to the configured default tier
		#[arg(long)]
		plan: Option<String>,
	},
	/// Issue another bearer token for an existing account
	Token { account_id: Uuid },
	/// Move an account to another plan tier
	Plan { account_id: Uuid, tier: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("tridot-server {}", env!("CARGO_PKG_VERSION"));
		return Ok(());
	}

	// Load .env file if present
	dotenvy::dotenv().ok();

	let config = load(args.config.as_deref()).context("failed to load configuration")?;
	init_tracing(&config.logging);

	match args.command {
		Some(Command::Account { command }) => run_account_command(&config, command).await,
		Some(Command::Serve) | None => serve(config, args.config).await,
		Some(Command::Version) => Ok(()),
	}
}

fn load(path: Option<&Path>) -> Result<ServerConfig, ConfigError> {
	match path {
		Some(path) => tridot_server_config::load_config_with_file(path),
		None => tridot_server_config::load_config(),
	}
}

fn init_tracing(logging: &LoggingConfig) {
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| logging.level.clone().into());
	let registry = tracing_subscriber::registry().with(filter);
	match logging.format {
		LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
		LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
	}
}

async fn serve(config: ServerConfig, config_path: Option<PathBuf>) -> anyhow::Result<()> {
	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		regions = config.regions.len(),
		"starting tridot-server"
	);

	let pool = db::open_database(&config.database.url, config.database.max_connections).await?;
	let mut state = create_app_state(pool, &config).await?;

	let mut scheduler = JobScheduler::new(Arc::new(RunHistory::new()));
	scheduler.register_periodic(
		Arc::new(TicketSweepJob::new(state.services.provisioning.clone())),
		Duration::from_secs(config.provisioning.ticket_sweep_interval_secs),
	);
	scheduler.register_periodic(
		Arc::new(AddressCooldownJob::new(
			state.services.registry.addresses().clone(),
		)),
		Duration::from_secs(config.provisioning.cooldown_sweep_interval_secs),
	);
	scheduler.register_periodic(
		Arc::new(NodePruneJob::new(
			state.services.telemetry.clone(),
			Duration::from_secs(config.nodes.health_retention_secs),
		)),
		Duration::from_secs(config.nodes.health_prune_interval_secs),
	);
	let scheduler = Arc::new(scheduler);
	scheduler.start().await;
	state.job_scheduler = Some(Arc::clone(&scheduler));

	#[cfg(unix)]
	spawn_plan_reload(state.services.registry.quota().clone(), config_path);
	#[cfg(not(unix))]
	let _ = config_path;

	let app = apply_http_layers(create_router(state), &config.http)?;

	let addr = config.socket_addr();
	let listener = tokio::net::TcpListener::bind(&addr)
		.await
		.with_context(|| format!("failed to bind {addr}"))?;
	tracing::info!(%addr, "listening");

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("shutdown signal received");
		}
	}

	scheduler.shutdown().await;
	tracing::info!("tridot-server stopped");
	Ok(())
}

/// Re-reads the plan table on SIGHUP.
#[cfg(unix)]
fn spawn_plan_reload(
	quota: tridot_server_provisioning::QuotaEnforcer,
	config_path: Option<PathBuf>,
) {
	use tokio::signal::unix::{signal, SignalKind};

	tokio::spawn(async move {
		let mut hangup = match signal(SignalKind::hangup()) {
			Ok(hangup) => hangup,
			Err(e) => {
				tracing::warn!(error = %e, "cannot listen for SIGHUP; plan reload disabled");
				return;
			}
		};
		while hangup.recv().await.is_some() {
			match load(config_path.as_deref()) {
				Ok(config) => quota.reload(config.plans),
				Err(e) => tracing::warn!(error = %e, "plan reload failed; keeping current limits"),
			}
		}
	});
}

async fn run_account_command(config: &ServerConfig, command: AccountCommand) -> anyhow::Result<()> {
	let pool = db::open_database(&config.database.url, config.database.max_connections).await?;
	let accounts = AccountRepository::new(pool);

	let account_id = match command {
		AccountCommand::Create { plan } => {
			let tier = plan.unwrap_or_else(|| config.plans.default_tier.clone());
			check_tier(config, &tier)?;
			let account = accounts.create_account(&tier).await?;
			println!("account:   {}", account.id);
			println!("plan:      {}", account.plan_tier);
			account.id
		}
		AccountCommand::Token { account_id } => {
			let account_id = AccountId::from_uuid(account_id);
			if accounts.get_account(account_id).await?.is_none() {
				bail!("account {account_id} not found");
			}
			account_id
		}
		AccountCommand::Plan { account_id, tier } => {
			check_tier(config, &tier)?;
			let account_id = AccountId::from_uuid(account_id);
			accounts.update_plan_tier(account_id, &tier).await?;
			println!("account:   {account_id}");
			println!("plan:      {tier}");
			return Ok(());
		}
	};

	let token = generate_account_token();
	accounts
		.create_token(account_id, &hash_token(token.expose()))
		.await?;
	println!("token:     {}", token.expose());
	println!("The token is shown once. Store it now.");
	Ok(())
}

fn check_tier(config: &ServerConfig, tier: &str) -> anyhow::Result<()> {
	if !config.plans.contains(tier) {
		bail!(
			"unknown plan tier '{tier}' (known: {})",
			config.plans.tiers.keys().cloned().collect::<Vec<_>>().join(", ")
		);
	}
	Ok(())
}
