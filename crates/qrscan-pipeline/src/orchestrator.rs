// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Drives one document through the pipeline: pages in order, images in
// order, one classified record per image, progress after every page.
//
// A panic while classifying one image costs that image only. A panic while
// listing a page's images ends the run like any other page error, and a
// panic that escapes the worker is still reported to the tracker, so a
// session never stays `processing` after its worker is gone.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use qrscan_core::ScanConfig;
use qrscan_core::error::{QrScanError, Result};
use qrscan_core::ports::{BarcodeDecoder, ImageEncoder, PageImageExtractor, RecordStore};
use qrscan_core::types::{ProgressStatus, QrRecord, RawImage, SessionId};
use qrscan_document::hash_bytes;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument};

use crate::classifier::{Classification, ImageClassifier};
use crate::context::RunContext;
use crate::progress::ProgressTracker;

/// Percentage reported after finishing `page` of `total`.
pub fn page_progress(page: u32, total: u32) -> u8 {
    if total == 0 {
        return 100;
    }
    ((page as f64 / total as f64) * 100.0).round().min(100.0) as u8
}

/// Runs documents through extraction, classification, and persistence while
/// reporting progress to a shared [`ProgressTracker`].
pub struct Orchestrator {
    extractor: Arc<dyn PageImageExtractor>,
    classifier: ImageClassifier,
    tracker: Arc<ProgressTracker>,
    config: ScanConfig,
}

impl Orchestrator {
    pub fn new(
        extractor: Arc<dyn PageImageExtractor>,
        encoder: Arc<dyn ImageEncoder>,
        decoder: Arc<dyn BarcodeDecoder>,
        store: Arc<dyn RecordStore>,
        tracker: Arc<ProgressTracker>,
        config: ScanConfig,
    ) -> Self {
        Self {
            extractor,
            classifier: ImageClassifier::new(encoder, decoder, store, config.clone()),
            tracker,
            config,
        }
    }

    /// Process `buffer` under `session_id` and return every record produced,
    /// in document order.
    ///
    /// Blocks for the whole run. Fails only when the document cannot be
    /// opened or a page's image list cannot be read; records classified up
    /// to that point stay persisted. The session snapshot is scheduled for
    /// removal whatever the outcome.
    #[instrument(skip(self, buffer), fields(session = %session_id, bytes = buffer.len()))]
    pub fn process_document(&self, buffer: &[u8], session_id: &SessionId) -> Result<Vec<QrRecord>> {
        let result = self.run(buffer, session_id);
        self.tracker
            .schedule_removal(session_id, self.config.grace_period());
        result
    }

    /// Start `process_document` on a blocking worker and return at once.
    ///
    /// If the worker dies, the session is moved to `error` and the handle
    /// resolves to `QrScanError::Worker`.
    pub fn spawn(self: &Arc<Self>, buffer: Vec<u8>, session_id: SessionId) -> JoinHandle<Result<Vec<QrRecord>>> {
        let worker = {
            let orchestrator = Arc::clone(self);
            let session_id = session_id.clone();
            tokio::task::spawn_blocking(move || orchestrator.process_document(&buffer, &session_id))
        };
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            match worker.await {
                Ok(result) => result,
                Err(join_err) => {
                    let err = QrScanError::Worker(if join_err.is_panic() {
                        format!("worker panicked: {}", panic_message(&*join_err.into_panic()))
                    } else {
                        format!("worker cancelled: {join_err}")
                    });
                    let progress = orchestrator.tracker.get(&session_id).progress;
                    let err = orchestrator.fail(&session_id, progress, err);
                    orchestrator
                        .tracker
                        .schedule_removal(&session_id, orchestrator.config.grace_period());
                    Err(err)
                }
            }
        })
    }

    fn run(&self, buffer: &[u8], id: &SessionId) -> Result<Vec<QrRecord>> {
        self.tracker
            .update(id, 0, ProgressStatus::Processing, "Starting processing");

        let mut ctx = RunContext::new(id.clone(), hash_bytes(buffer));
        info!(document = %ctx.document_hash, "run started");

        let source = match self.extractor.open(buffer) {
            Ok(source) => source,
            Err(err) => return Err(self.fail(id, 0, err)),
        };
        let total = source.page_count();
        info!(pages = total, "document opened");

        let mut records = Vec::new();
        let mut progress = 0;
        for page in 1..=total {
            let images = match catch_unwind(AssertUnwindSafe(|| source.page_images(page))) {
                Ok(Ok(images)) => images,
                Ok(Err(err)) => return Err(self.fail(id, progress, err)),
                Err(payload) => {
                    let err = QrScanError::PageExtraction {
                        page,
                        reason: format!("panicked: {}", panic_message(&*payload)),
                    };
                    return Err(self.fail(id, progress, err));
                }
            };

            for image in images {
                let classification = match image {
                    Ok(raw) => self.classify_isolated(&mut ctx, page, &raw),
                    Err(err) => self.classifier.classify_failed(&mut ctx, page, &err),
                };
                self.tracker.publish_record(&classification.record);
                records.push(classification.record);
            }

            progress = page_progress(page, total);
            self.tracker.update(
                id,
                progress,
                ProgressStatus::Processing,
                format!("Processed page {page}/{total}"),
            );
        }

        self.tracker
            .update(id, 100, ProgressStatus::Done, ctx.completion_message());
        info!(
            records = records.len(),
            qr_like = ctx.qr_like,
            distinct = ctx.dedup.distinct(),
            unsaved = ctx.dropped_writes,
            "run finished"
        );
        Ok(records)
    }

    /// Classify one image, turning a panic into a failed image.
    fn classify_isolated(&self, ctx: &mut RunContext, page: u32, raw: &RawImage) -> Classification {
        match catch_unwind(AssertUnwindSafe(|| self.classifier.classify(ctx, page, raw))) {
            Ok(classification) => classification,
            Err(payload) => {
                let err = QrScanError::ImageProcessing(format!(
                    "classifier panicked: {}",
                    panic_message(&*payload)
                ));
                self.classifier.classify_failed(ctx, page, &err)
            }
        }
    }

    /// Report a fatal error, keeping progress where it was.
    fn fail(&self, id: &SessionId, progress: u8, err: QrScanError) -> QrScanError {
        error!(error = %err, "run failed");
        self.tracker.update(
            id,
            progress,
            ProgressStatus::Error,
            format!("Processing failed: {err}"),
        );
        err
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}
