// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image classification: QR-likelihood heuristic, decode, payload
// normalization, status resolution, and persistence of exactly one record
// per image.

use std::sync::Arc;

use qrscan_core::ScanConfig;
use qrscan_core::error::{QrScanError, Result};
use qrscan_core::ports::{BarcodeDecoder, ImageEncoder, RecordStore};
use qrscan_core::types::{QrRecord, QrStatus, RawImage};
use qrscan_document::{to_data_uri, to_rgba};
use tracing::{debug, error, instrument, warn};

use crate::context::RunContext;

/// Outcome of classifying one image.
#[derive(Debug, Clone)]
pub struct Classification {
    pub record: QrRecord,
    /// Whether the heuristic judged the image to be a QR symbol, decoded or not.
    pub is_qr_like: bool,
}

/// Trim, lowercase, and strip every whitespace character.
pub fn normalize_payload(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Width/height ratio within the configured bounds (inclusive).
pub fn is_square_like(width: u32, height: u32, config: &ScanConfig) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    let ratio = width as f32 / height as f32;
    ratio >= config.square_ratio_min && ratio <= config.square_ratio_max
}

/// Samples three points on the diagonal through the centre of an RGBA8
/// buffer and counts the ones that are very dark or very light.
///
/// Points falling outside the image are skipped.
pub fn has_contrast_signature(rgba: &[u8], width: u32, height: u32, config: &ScanConfig) -> bool {
    let (w, h) = (width as i64, height as i64);
    let (cx, cy) = (w / 2, h / 2);
    let off = config.sample_offset as i64;

    let extreme = [(cx - off, cy - off), (cx, cy), (cx + off, cy + off)]
        .into_iter()
        .filter(|&(x, y)| x >= 0 && x < w && y >= 0 && y < h)
        .filter_map(|(x, y)| {
            let idx = ((y * w + x) * 4) as usize;
            rgba.get(idx..idx + 3)
        })
        .filter(|px| {
            let luma = (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0;
            luma < config.dark_luma || luma > config.light_luma
        })
        .count();

    extreme >= config.min_extreme_samples
}

/// Classifies images and persists one record for each.
pub struct ImageClassifier {
    encoder: Arc<dyn ImageEncoder>,
    decoder: Arc<dyn BarcodeDecoder>,
    store: Arc<dyn RecordStore>,
    config: ScanConfig,
}

impl ImageClassifier {
    pub fn new(
        encoder: Arc<dyn ImageEncoder>,
        decoder: Arc<dyn BarcodeDecoder>,
        store: Arc<dyn RecordStore>,
        config: ScanConfig,
    ) -> Self {
        Self {
            encoder,
            decoder,
            store,
            config,
        }
    }

    /// Classify one image found on `page_number` and persist the record.
    ///
    /// Never fails: any internal error yields an INVALID record with no value
    /// and no image.
    #[instrument(skip_all, fields(session = %ctx.session_id, page = page_number, width = image.width, height = image.height))]
    pub fn classify(&self, ctx: &mut RunContext, page_number: u32, image: &RawImage) -> Classification {
        let classification = match self.evaluate(ctx, page_number, image) {
            Ok(classification) => classification,
            Err(err) => {
                warn!(error = %err, "image classification failed, recording as invalid");
                Self::fallback(ctx, page_number)
            }
        };
        self.finish(ctx, classification)
    }

    /// Record an image the extractor found but could not rasterize.
    #[instrument(skip_all, fields(session = %ctx.session_id, page = page_number))]
    pub fn classify_failed(&self, ctx: &mut RunContext, page_number: u32, err: &QrScanError) -> Classification {
        warn!(error = %err, "image could not be extracted, recording as invalid");
        let classification = Self::fallback(ctx, page_number);
        self.finish(ctx, classification)
    }

    fn evaluate(&self, ctx: &mut RunContext, page_number: u32, image: &RawImage) -> Result<Classification> {
        let encoded = self.encoder.encode(image)?;
        let data_uri = to_data_uri(self.encoder.mime_type(), &encoded);
        let rgba = to_rgba(image)?;
        let (width, height) = rgba.dimensions();

        let (is_qr_like, payload) = if is_square_like(width, height, &self.config) {
            match self.decoder.decode(rgba.as_raw(), width, height) {
                Some(raw) => (true, Some(normalize_payload(&raw))),
                None => (
                    has_contrast_signature(rgba.as_raw(), width, height, &self.config),
                    None,
                ),
            }
        } else {
            (false, None)
        };

        let (status, value) = match (is_qr_like, payload.filter(|p| !p.is_empty())) {
            (false, _) => (QrStatus::Invalid, None),
            (true, None) => (QrStatus::Unreadable, None),
            (true, Some(value)) => (ctx.dedup.resolve(&value), Some(value)),
        };
        debug!(%status, is_qr_like, "image classified");

        Ok(Classification {
            record: QrRecord::new(
                ctx.session_id.clone(),
                page_number,
                value,
                status,
                Some(data_uri),
            ),
            is_qr_like,
        })
    }

    fn fallback(ctx: &RunContext, page_number: u32) -> Classification {
        Classification {
            record: QrRecord::invalid_fallback(ctx.session_id.clone(), page_number),
            is_qr_like: false,
        }
    }

    fn finish(&self, ctx: &mut RunContext, classification: Classification) -> Classification {
        if classification.is_qr_like {
            ctx.qr_like += 1;
        }
        self.persist(ctx, &classification.record);
        classification
    }

    /// Append with bounded retries. A record that still cannot be written is
    /// counted on the run context and otherwise dropped.
    fn persist(&self, ctx: &mut RunContext, record: &QrRecord) {
        let attempts = self.config.store_write_retries + 1;
        for attempt in 1..=attempts {
            match self.store.append(record) {
                Ok(()) => return,
                Err(err) if attempt < attempts => {
                    warn!(error = %err, attempt, "record write failed, retrying");
                }
                Err(err) => {
                    error!(error = %err, page = record.page_number, "record write failed, dropping record");
                    ctx.dropped_writes += 1;
                }
            }
        }
    }
}
