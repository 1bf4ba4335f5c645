// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use crate::keys::{WgKeyPair, WgPrivateKey};
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::instrument;

#[derive(Error, Debug)]
pub enum KeyFileError {
	#[error("failed to read key file: {0}")]
	Read(#[from] std::io::Error),

	#[error("invalid key format: {0}")]
	InvalidFormat(#[from] crate::keys::KeyError),
}

pub type Result<T> = std::result::Result<T, KeyFileError>;

#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn load_wg_key_from_file(path: impl AsRef<Path>) -> Result<WgKeyPair> {
	let content = fs::read_to_string(path.as_ref()).await?;
	let private = WgPrivateKey::from_base64(content.trim())?;
	Ok(WgKeyPair::from_private_key(private))
}

/// Reads a base64 private key from the file named by `VAR_FILE`, falling back
/// to `VAR` itself. Empty values count as unset.
#[instrument(skip(var_name), fields(var = %var_name))]
pub fn load_wg_key_env(var_name: &str) -> Result<Option<WgKeyPair>> {
	let file_var = format!("{var_name}_FILE");
	let encoded = match std::env::var(&file_var).ok().filter(|p| !p.is_empty()) {
		Some(path) => std::fs::read_to_string(&path)?,
		None => match std::env::var(var_name).ok().filter(|v| !v.is_empty()) {
			Some(value) => value,
			None => return Ok(None),
		},
	};

	let private = WgPrivateKey::from_base64(encoded.trim())?;
	Ok(Some(WgKeyPair::from_private_key(private)))
}

#[instrument(skip(key), fields(path = %path.as_ref().display()))]
pub async fn save_wg_key_to_file(key: &WgKeyPair, path: impl AsRef<Path>) -> Result<()> {
	let path = path.as_ref();

	if let Some(parent) = path.parent() {
		fs::create_dir_all(parent).await?;
	}

	let private_b64 = key.private_key().to_base64();
	let content = format!("{}\n", private_b64.expose());

	#[cfg(unix)]
	{
		use tokio::fs::OpenOptions;
		use tokio::io::AsyncWriteExt;

		let mut file = OpenOptions::new()
			.write(true)
			.create(true)
			.truncate(true)
			.mode(0o600)
			.open(path)
			.await?;
		file.write_all(content.as_bytes()).await?;
	}

	#[cfg(not(unix))]
	{
		fs::write(path, content).await?;
	}

	Ok(())
}

/// Loads a region's server key, generating and persisting one on first use.
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub async fn get_or_create_server_key(path: impl AsRef<Path>) -> Result<WgKeyPair> {
	let path = path.as_ref();

	if fs::try_exists(path).await? {
		return load_wg_key_from_file(path).await;
	}

	let keypair = WgKeyPair::generate();
	save_wg_key_to_file(&keypair, path).await?;
	tracing::info!(public_key = %keypair.public_key().prefix(), "generated region server key");
	Ok(keypair)
}
