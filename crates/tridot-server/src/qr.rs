// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! QR rendering of tunnel configs for mobile clients.

use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use tridot_wg_common::ConfigText;

use crate::error::ServerError;

/// Smallest edge of the rendered image, in pixels.
pub const QR_MIN_DIMENSION: u32 = 256;

/// Encodes a config as a PNG QR code the WireGuard mobile apps can scan.
pub fn config_qr_png(config: &ConfigText) -> Result<Vec<u8>, ServerError> {
	let code = QrCode::with_error_correction_level(config.as_str(), EcLevel::M)
		.map_err(|e| ServerError::Internal(format!("QR encoding failed: {e}")))?;
	let image = code
		.render::<Luma<u8>>()
		.min_dimensions(QR_MIN_DIMENSION, QR_MIN_DIMENSION)
		.build();

	let mut png = Vec::new();
	DynamicImage::ImageLuma8(image)
		.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
		.map_err(|e| ServerError::Internal(format!("PNG encoding failed: {e}")))?;
	Ok(png)
}
