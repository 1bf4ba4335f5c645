// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Tridot provisioning server.
//!
//! HTTP front end for peer provisioning: account-scoped peer management,
//! single-use tunnel config delivery, node telemetry and peer event streams.

pub mod api;
pub mod api_docs;
pub mod auth;
pub mod db;
pub mod error;
pub mod extract;
pub mod health;
pub mod jobs;
pub mod qr;
pub mod routes;

pub use api::{apply_http_layers, build_region_directory, create_app_state, create_router, AppState};
pub use api_docs::ApiDoc;
pub use error::ServerError;
pub use tridot_server_config::ServerConfig;
