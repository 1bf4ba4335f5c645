// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared WireGuard primitives for the Tridot control plane.
//!
//! - [`keys`]: key types and client public key validation
//! - [`tunnel`]: `wg-quick` configuration rendering
//! - [`ip`]: region address plans
//! - [`peer`]: the peer record snapshot shared by every layer

pub mod ids;
pub mod ip;
pub mod keys;
pub mod keys_file;
pub mod peer;
pub mod secret;
pub mod tunnel;

pub use ids::{AccountId, NodeId, PeerId};
pub use ip::{AddressPlan, IpError, FIRST_CLIENT_INDEX};
pub use keys::{
	validate_public_key, KeyError, WgKeyPair, WgPresharedKey, WgPrivateKey, WgPublicKey,
};
pub use keys_file::{
	get_or_create_server_key, load_wg_key_env, load_wg_key_from_file, save_wg_key_to_file,
	KeyFileError,
};
pub use peer::{PeerRecord, PeerStatus, PeerStatusParseError};
pub use secret::{Secret, SecretString, REDACTED};
pub use tunnel::{
	default_routes, render_tunnel_config, ConfigText, TunnelSpec, DEFAULT_PERSISTENT_KEEPALIVE,
};
