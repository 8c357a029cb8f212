// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PNG encoder: turns extracted rasters into compressed, displayable bytes and
// wraps them as data URIs for storage next to each record.

use base64::{Engine, engine::general_purpose};
use image::{DynamicImage, ImageFormat};
use qrscan_core::error::{QrScanError, Result};
use qrscan_core::ports::ImageEncoder;
use qrscan_core::types::RawImage;
use tracing::{debug, instrument};

use super::convert::to_dynamic;

/// Lossless PNG encoder backed by the `image` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngEncoder;

impl ImageEncoder for PngEncoder {
    #[instrument(skip_all, fields(width = image.width, height = image.height, channels = image.channels))]
    fn encode(&self, image: &RawImage) -> Result<Vec<u8>> {
        let dynamic = to_dynamic(image)?;
        let bytes = encode_to_format(&dynamic, ImageFormat::Png)?;
        debug!(png_bytes = bytes.len(), "raster encoded");
        Ok(bytes)
    }

    fn mime_type(&self) -> &'static str {
        "image/png"
    }
}

/// `data:<mime>;base64,<payload>`
pub fn to_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!(
        "data:{mime_type};base64,{}",
        general_purpose::STANDARD.encode(bytes)
    )
}

/// Encode a `DynamicImage` into the specified format, returning the raw bytes.
fn encode_to_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, format)
        .map_err(|err| QrScanError::ImageProcessing(format!("image encoding failed: {err}")))?;
    Ok(buffer)
}
