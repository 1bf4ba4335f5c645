// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! HTTP route handlers.

pub mod account;
pub mod docs;
pub mod health;
pub mod nodes;
pub mod peers;
pub mod status;
pub mod telemetry;
