// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroize;

use crate::secret::Secret;

pub const KEY_LEN: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
	#[error("key is empty")]
	Empty,

	#[error("invalid character {0:?} in base64 key")]
	InvalidCharset(char),

	#[error("invalid base64 padding")]
	InvalidPadding,

	#[error("invalid base64 encoding: {0}")]
	InvalidBase64(String),

	#[error("invalid key length: expected 32 bytes, got {0}")]
	InvalidLength(usize),
}

pub type Result<T> = std::result::Result<T, KeyError>;

fn is_base64_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '+' || c == '/'
}

fn decode_key(s: &str) -> Result<[u8; KEY_LEN]> {
	let bytes = STANDARD
		.decode(s)
		.or_else(|_| STANDARD_NO_PAD.decode(s))
		.map_err(|e| KeyError::InvalidBase64(e.to_string()))?;
	bytes
		.as_slice()
		.try_into()
		.map_err(|_| KeyError::InvalidLength(bytes.len()))
}

/// Validate a client-supplied WireGuard public key.
///
/// Accepts the standard base64 alphabet, padded or unpadded, and requires the
/// decoded value to be exactly 32 bytes. Surrounding whitespace is ignored.
pub fn validate_public_key(input: &str) -> Result<WgPublicKey> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(KeyError::Empty);
	}

	let body = trimmed.trim_end_matches('=');
	if trimmed.len() - body.len() > 2 {
		return Err(KeyError::InvalidPadding);
	}
	if let Some(c) = body.chars().find(|c| !is_base64_char(*c)) {
		return Err(KeyError::InvalidCharset(c));
	}

	decode_key(trimmed).map(WgPublicKey::from_bytes)
}

#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct WgPrivateKey {
	bytes: [u8; KEY_LEN],
}

impl WgPrivateKey {
	pub fn generate() -> Self {
		let secret = StaticSecret::random_from_rng(OsRng);
		Self {
			bytes: secret.to_bytes(),
		}
	}

	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		decode_key(s.trim()).map(Self::from_bytes)
	}

	pub fn to_base64(&self) -> Secret<String> {
		Secret::new(STANDARD.encode(self.bytes))
	}

	pub fn public_key(&self) -> WgPublicKey {
		let secret = StaticSecret::from(self.bytes);
		let public = PublicKey::from(&secret);
		WgPublicKey {
			bytes: *public.as_bytes(),
		}
	}
}

impl fmt::Debug for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgPrivateKey")
			.field("bytes", &"[REDACTED]")
			.finish()
	}
}

impl fmt::Display for WgPrivateKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str("[REDACTED]")
	}
}

impl Serialize for WgPrivateKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str("[REDACTED]")
	}
}

/// Per-peer symmetric key mixed into the handshake. Known to the client and
/// the region's node, never shown in listings.
#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct WgPresharedKey {
	bytes: [u8; KEY_LEN],
}

impl WgPresharedKey {
	pub fn generate() -> Self {
		let mut bytes = [0u8; KEY_LEN];
		OsRng.fill_bytes(&mut bytes);
		Self { bytes }
	}

	pub fn from_base64(s: &str) -> Result<Self> {
		decode_key(s.trim()).map(|bytes| Self { bytes })
	}

	pub fn to_base64(&self) -> Secret<String> {
		Secret::new(STANDARD.encode(self.bytes))
	}
}

impl fmt::Debug for WgPresharedKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgPresharedKey")
			.field("bytes", &"[REDACTED]")
			.finish()
	}
}

impl Serialize for WgPresharedKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str("[REDACTED]")
	}
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WgPublicKey {
	bytes: [u8; KEY_LEN],
}

impl WgPublicKey {
	pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
		Self { bytes }
	}

	pub fn from_slice(bytes: &[u8]) -> Result<Self> {
		bytes
			.try_into()
			.map(Self::from_bytes)
			.map_err(|_| KeyError::InvalidLength(bytes.len()))
	}

	pub fn to_base64(&self) -> String {
		STANDARD.encode(self.bytes)
	}

	pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
		&self.bytes
	}

	/// Short form safe for log lines.
	pub fn prefix(&self) -> String {
		let b64 = self.to_base64();
		format!("{}...", &b64[..8])
	}
}

impl fmt::Debug for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgPublicKey")
			.field("prefix", &self.prefix())
			.finish()
	}
}

impl fmt::Display for WgPublicKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_base64())
	}
}

impl std::str::FromStr for WgPublicKey {
	type Err = KeyError;

	fn from_str(s: &str) -> Result<Self> {
		validate_public_key(s)
	}
}

impl Serialize for WgPublicKey {
	fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_str(&self.to_base64())
	}
}

impl<'de> Deserialize<'de> for WgPublicKey {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let s = String::deserialize(deserializer)?;
		validate_public_key(&s).map_err(serde::de::Error::custom)
	}
}

#[derive(Clone)]
pub struct WgKeyPair {
	private: WgPrivateKey,
	public: WgPublicKey,
}

impl WgKeyPair {
	pub fn generate() -> Self {
		Self::from_private_key(WgPrivateKey::generate())
	}

	pub fn from_private_key(private: WgPrivateKey) -> Self {
		let public = private.public_key();
		Self { private, public }
	}

	pub fn private_key(&self) -> &WgPrivateKey {
		&self.private
	}

	pub fn public_key(&self) -> &WgPublicKey {
		&self.public
	}
}

impl fmt::Debug for WgKeyPair {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("WgKeyPair")
			.field("private", &self.private)
			.field("public", &self.public)
			.finish()
	}
}
