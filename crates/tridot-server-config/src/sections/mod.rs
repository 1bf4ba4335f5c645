// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sections for tridot-server.

pub mod database;
pub mod http;
pub mod logging;
pub mod nodes;
pub mod plans;
pub mod provisioning;
pub mod regions;

pub use database::{DatabaseConfig, DatabaseConfigLayer};
pub use http::{HttpConfig, HttpConfigLayer};
pub use logging::{LogFormat, LoggingConfig, LoggingConfigLayer};
pub use nodes::{NodesConfig, NodesConfigLayer};
pub use plans::{PlansConfig, PlansConfigLayer};
pub use provisioning::{ProvisioningConfig, ProvisioningConfigLayer};
pub use regions::{default_regions, finalize_regions, RegionConfig, RegionConfigLayer, ServerKeySource};
