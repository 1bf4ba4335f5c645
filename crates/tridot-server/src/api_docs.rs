// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! OpenAPI documentation for tridot-server, served at `/api/openapi.json`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::auth::NODE_TOKEN_HEADER;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tridot Provisioning API",
        version = "1.0.0",
        description = "WireGuard peer provisioning, single-use tunnel configs and node telemetry.",
        license(name = "Proprietary")
    ),
    servers(
        (url = "/", description = "Local server")
    ),
    tags(
        (name = "peers", description = "Peer lifecycle and tunnel config delivery"),
        (name = "account", description = "Device quota"),
        (name = "telemetry", description = "Handshake and health reports from node agents"),
        (name = "nodes", description = "Peer event streams for node agents"),
        (name = "status", description = "Public region health"),
        (name = "health", description = "Service health checks")
    ),
    paths(
        crate::routes::peers::list_peers,
        crate::routes::peers::create_peer,
        crate::routes::peers::get_peer,
        crate::routes::peers::update_peer,
        crate::routes::peers::revoke_peer,
        crate::routes::peers::reissue_config,
        crate::routes::peers::redeem_config,
        crate::routes::peers::peer_usage,
        crate::routes::account::get_quota,
        crate::routes::telemetry::report_handshake,
        crate::routes::telemetry::report_health,
        crate::routes::nodes::peer_stream,
        crate::routes::status::region_status,
        crate::routes::health::health_check,
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            crate::health::HealthResponse,
            crate::health::HealthComponents,
            crate::health::HealthStatus,
            crate::health::DatabaseHealth,
            crate::health::JobsHealth,
            tridot_server_provisioning::types::CreatePeerRequest,
            tridot_server_provisioning::types::CreatePeerResponse,
            tridot_server_provisioning::types::UpdatePeerRequest,
            tridot_server_provisioning::types::PeerResponse,
            tridot_server_provisioning::types::ListPeersResponse,
            tridot_server_provisioning::types::TicketResponse,
            tridot_server_provisioning::types::QuotaResponse,
            tridot_server_provisioning::types::UsageResponse,
            tridot_server_provisioning::types::HandshakeReportRequest,
            tridot_server_provisioning::types::HandshakeReportResponse,
            tridot_server_provisioning::types::HealthReportRequest,
            tridot_server_provisioning::types::HealthReportResponse,
            tridot_server_provisioning::types::RegionStatusResponse,
            tridot_server_provisioning::types::StatusResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
	fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
		let components = openapi.components.get_or_insert_with(Default::default);
		components.add_security_scheme(
			"bearer",
			SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
		);
		components.add_security_scheme(
			"provision_token",
			SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new(NODE_TOKEN_HEADER))),
		);
	}
}
