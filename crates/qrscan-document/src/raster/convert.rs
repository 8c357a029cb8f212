// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Conversions between the pipeline's `RawImage` and `image` crate buffers.

use image::{DynamicImage, GrayAlphaImage, GrayImage, RgbImage, RgbaImage};
use qrscan_core::error::{QrScanError, Result};
use qrscan_core::types::RawImage;

/// Wrap a raw raster in a `DynamicImage` without copying channel layout.
///
/// Fails when the channel count is unsupported or the buffer length does not
/// match `width * height * channels`.
pub fn to_dynamic(raw: &RawImage) -> Result<DynamicImage> {
    if raw.width == 0 || raw.height == 0 {
        return Err(QrScanError::ImageProcessing(format!(
            "empty raster {}x{}",
            raw.width, raw.height
        )));
    }
    if raw.pixels.len() != raw.expected_len() {
        return Err(QrScanError::ImageProcessing(format!(
            "raster buffer holds {} bytes, expected {} for {}x{}x{}",
            raw.pixels.len(),
            raw.expected_len(),
            raw.width,
            raw.height,
            raw.channels
        )));
    }

    let (w, h) = (raw.width, raw.height);
    let pixels = raw.pixels.clone();
    let image = match raw.channels {
        1 => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        2 => GrayAlphaImage::from_raw(w, h, pixels).map(DynamicImage::ImageLumaA8),
        3 => RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
        4 => RgbaImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgba8),
        other => {
            return Err(QrScanError::ImageProcessing(format!(
                "unsupported channel count {other}"
            )));
        }
    };

    image.ok_or_else(|| QrScanError::ImageProcessing("raster buffer too small".into()))
}

/// Normalize any raw raster to RGBA8, the layout the heuristic and decoder
/// read.
pub fn to_rgba(raw: &RawImage) -> Result<RgbaImage> {
    Ok(to_dynamic(raw)?.to_rgba8())
}

/// Flatten a decoded image into a `RawImage`, keeping gray images single
/// channel and everything else as RGB or RGBA.
pub fn from_dynamic(image: DynamicImage) -> RawImage {
    let (width, height) = (image.width(), image.height());
    let color = image.color();
    if color.has_alpha() {
        RawImage::new(image.to_rgba8().into_raw(), width, height, 4)
    } else if color.has_color() {
        RawImage::new(image.to_rgb8().into_raw(), width, height, 3)
    } else {
        RawImage::new(image.to_luma8().into_raw(), width, height, 1)
    }
}
