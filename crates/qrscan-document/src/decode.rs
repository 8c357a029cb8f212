// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// QR payload decoding backed by `rqrr`.

use qrscan_core::ports::BarcodeDecoder;
use tracing::{debug, trace};

/// Decodes the first readable QR symbol in an RGBA8 buffer.
///
/// Pixels are reduced to luminance (Rec. 601 weights) and composited onto
/// white using their alpha before grid detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrDecoder;

impl BarcodeDecoder for RqrrDecoder {
    fn decode(&self, rgba: &[u8], width: u32, height: u32) -> Option<String> {
        let (w, h) = (width as usize, height as usize);
        if w == 0 || h == 0 || rgba.len() < w * h * 4 {
            return None;
        }

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
            let idx = (y * w + x) * 4;
            luma_on_white(&rgba[idx..idx + 4])
        });

        let grids = prepared.detect_grids();
        trace!(grids = grids.len(), "QR grids detected");

        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) if !content.is_empty() => return Some(content),
                Ok(_) => debug!("QR grid decoded to empty payload"),
                Err(err) => debug!(error = %err, "QR grid failed to decode"),
            }
        }
        None
    }
}

fn luma_on_white(px: &[u8]) -> u8 {
    let luma = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
    let alpha = px[3] as f32 / 255.0;
    (luma * alpha + 255.0 * (1.0 - alpha)).round().clamp(0.0, 255.0) as u8
}
