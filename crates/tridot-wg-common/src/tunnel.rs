// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! `wg-quick` configuration rendering.
//!
//! [`TunnelSpec`] describes the server side of a region. It holds the server's
//! public key only, so a rendered config can never carry server secrets.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::net::IpAddr;

use crate::keys::{WgPrivateKey, WgPublicKey};
use crate::peer::PeerRecord;

pub const DEFAULT_PERSISTENT_KEEPALIVE: u16 = 25;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TunnelSpec {
	pub server_public_key: WgPublicKey,
	pub endpoint: String,
	pub dns: Vec<IpAddr>,
	pub mtu: Option<u16>,
	pub persistent_keepalive: u16,
	/// Routes sent through the tunnel.
	pub client_allowed_ips: Vec<IpNet>,
}

impl TunnelSpec {
	/// Full-tunnel spec with Cloudflare DNS.
	pub fn new(server_public_key: WgPublicKey, endpoint: impl Into<String>) -> Self {
		Self {
			server_public_key,
			endpoint: endpoint.into(),
			dns: vec![IpAddr::from([1, 1, 1, 1])],
			mtu: None,
			persistent_keepalive: DEFAULT_PERSISTENT_KEEPALIVE,
			client_allowed_ips: default_routes(),
		}
	}
}

pub fn default_routes() -> Vec<IpNet> {
	vec![
		IpNet::V4(ipnet::Ipv4Net::default()),
		IpNet::V6(ipnet::Ipv6Net::default()),
	]
}

/// Rendered client configuration. May contain a client private key, so
/// `Debug` only reports its size.
#[derive(Clone, PartialEq, Eq)]
pub struct ConfigText(String);

impl ConfigText {
	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_string(self) -> String {
		self.0
	}
}

impl fmt::Debug for ConfigText {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("ConfigText")
			.field("len", &self.0.len())
			.finish()
	}
}

fn join<T: fmt::Display>(items: &[T]) -> String {
	items
		.iter()
		.map(ToString::to_string)
		.collect::<Vec<_>>()
		.join(", ")
}

/// Renders the client side of a tunnel. Pure: the same inputs always produce
/// the same text. `client_private_key` is set only when the server generated
/// the client's keypair. The peer's preshared key, when it has one, goes in
/// the `[Peer]` section.
pub fn render_tunnel_config(
	peer: &PeerRecord,
	spec: &TunnelSpec,
	client_private_key: Option<&WgPrivateKey>,
) -> ConfigText {
	let mut out = String::new();

	// Writing to a String cannot fail.
	let _ = writeln!(out, "[Interface]");
	if let Some(key) = client_private_key {
		let _ = writeln!(out, "PrivateKey = {}", key.to_base64().expose());
	}
	let _ = writeln!(out, "Address = {}", peer.allowed_ips);
	if !spec.dns.is_empty() {
		let _ = writeln!(out, "DNS = {}", join(&spec.dns));
	}
	if let Some(mtu) = spec.mtu {
		let _ = writeln!(out, "MTU = {mtu}");
	}

	let _ = writeln!(out);
	let _ = writeln!(out, "[Peer]");
	let _ = writeln!(out, "PublicKey = {}", spec.server_public_key);
	if let Some(psk) = &peer.preshared_key {
		let _ = writeln!(out, "PresharedKey = {}", psk.to_base64().expose());
	}
	let _ = writeln!(out, "Endpoint = {}", spec.endpoint);
	let _ = writeln!(out, "AllowedIPs = {}", join(&spec.client_allowed_ips));
	if spec.persistent_keepalive > 0 {
		let _ = writeln!(out, "PersistentKeepalive = {}", spec.persistent_keepalive);
	}

	ConfigText(out)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::ids::{AccountId, PeerId};
	use crate::keys::{validate_public_key, WgKeyPair, WgPresharedKey};
	use crate::peer::PeerStatus;
	use chrono::{TimeZone, Utc};

	const CLIENT_KEY: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

	fn peer() -> PeerRecord {
		let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
		PeerRecord {
			id: PeerId::new(),
			account_id: AccountId::new(),
			name: "Pixel 8".to_string(),
			public_key: validate_public_key(CLIENT_KEY).unwrap(),
			allowed_ips: "10.20.0.2/32".parse().unwrap(),
			region: "EU-FRA".to_string(),
			endpoint: "fra.tridot.example:51820".to_string(),
			status: PeerStatus::Pending,
			last_handshake_at: None,
			created_at: at,
			updated_at: at,
			revoked_at: None,
			preshared_key: None,
		}
	}

	#[test]
	fn renders_full_tunnel_config() {
		let server = WgKeyPair::generate();
		let spec = TunnelSpec::new(*server.public_key(), "fra.tridot.example:51820");

		let text = render_tunnel_config(&peer(), &spec, None);
		let expected = format!(
			"[Interface]\n\
			 Address = 10.20.0.2/32\n\
			 DNS = 1.1.1.1\n\
			 \n\
			 [Peer]\n\
			 PublicKey = {}\n\
			 Endpoint = fra.tridot.example:51820\n\
			 AllowedIPs = 0.0.0.0/0, ::/0\n\
			 PersistentKeepalive = 25\n",
			server.public_key().to_base64()
		);
		assert_eq!(text.as_str(), expected);
	}

	#[test]
	fn rendering_is_deterministic() {
		let server = WgKeyPair::generate();
		let mut spec = TunnelSpec::new(*server.public_key(), "fra.tridot.example:51820");
		spec.mtu = Some(1420);
		let peer = peer();
		assert_eq!(
			render_tunnel_config(&peer, &spec, None),
			render_tunnel_config(&peer, &spec, None)
		);
	}

	#[test]
	fn client_private_key_rendered_only_when_given() {
		let server = WgKeyPair::generate();
		let client = WgKeyPair::generate();
		let spec = TunnelSpec::new(*server.public_key(), "fra.tridot.example:51820");
		let client_b64 = client.private_key().to_base64();

		let without = render_tunnel_config(&peer(), &spec, None);
		assert!(!without.as_str().contains("PrivateKey"));

		let with = render_tunnel_config(&peer(), &spec, Some(client.private_key()));
		assert!(with
			.as_str()
			.contains(&format!("PrivateKey = {}", client_b64.expose())));
	}

	#[test]
	fn server_private_key_never_rendered() {
		let server = WgKeyPair::generate();
		let server_private = server.private_key().to_base64();
		let spec = TunnelSpec::new(*server.public_key(), "fra.tridot.example:51820");

		let text = render_tunnel_config(&peer(), &spec, None);
		assert!(!text.as_str().contains(server_private.expose().as_str()));
		assert!(!serde_json::to_string(&spec)
			.unwrap()
			.contains(server_private.expose().as_str()));
	}

	#[test]
	fn preshared_key_follows_server_public_key() {
		let server = WgKeyPair::generate();
		let spec = TunnelSpec::new(*server.public_key(), "fra.tridot.example:51820");
		let psk = WgPresharedKey::generate();
		let mut peer = peer();
		peer.preshared_key = Some(psk.clone());

		let text = render_tunnel_config(&peer, &spec, None);
		let lines: Vec<&str> = text.as_str().lines().collect();
		let at = lines
			.iter()
			.position(|l| l.starts_with("PublicKey = "))
			.unwrap();
		assert_eq!(
			lines[at + 1],
			format!("PresharedKey = {}", psk.to_base64().expose())
		);
		assert_eq!(text.as_str().matches("PresharedKey").count(), 1);
	}

	#[test]
	fn zero_keepalive_is_omitted() {
		let server = WgKeyPair::generate();
		let mut spec = TunnelSpec::new(*server.public_key(), "fra.tridot.example:51820");
		spec.persistent_keepalive = 0;
		spec.dns.clear();
		let text = render_tunnel_config(&peer(), &spec, None);
		assert!(!text.as_str().contains("PersistentKeepalive"));
		assert!(!text.as_str().contains("DNS"));
	}

	#[test]
	fn debug_hides_contents() {
		let server = WgKeyPair::generate();
		let client = WgKeyPair::generate();
		let spec = TunnelSpec::new(*server.public_key(), "fra.tridot.example:51820");
		let text = render_tunnel_config(&peer(), &spec, Some(client.private_key()));
		assert!(!format!("{text:?}").contains("PrivateKey"));
	}
}
