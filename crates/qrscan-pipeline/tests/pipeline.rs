// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// End-to-end runs of the orchestrator against fake documents and decoders,
// a real SQLite store, and PDFs built with lopdf (including real QR symbols
// rendered with the `qrcode` crate).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use qrscan_core::error::{QrScanError, Result};
use qrscan_core::ports::{BarcodeDecoder, PageImageExtractor, PageSource, RecordStore};
use qrscan_core::types::{ProgressStatus, QrStatus, RawImage, ScanEvent, SessionId};
use qrscan_core::ScanConfig;
use qrscan_document::{LopdfExtractor, PngEncoder, RqrrDecoder};
use qrscan_pipeline::{FollowOutcome, Orchestrator, ProgressTracker, Subscription, follow};
use qrscan_store::QrStore;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// One image slot on a fake page: a raster, or an image the extractor
/// fails to rasterize.
#[derive(Clone)]
enum Slot {
    Image(RawImage),
    Broken,
}

#[derive(Clone, Default)]
struct FakeDocument {
    pages: Vec<Vec<Slot>>,
    fail_open: bool,
    fail_page: Option<u32>,
    panic_open: bool,
    panic_page: Option<u32>,
}

impl PageSource for FakeDocument {
    fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    fn page_images(&self, page: u32) -> Result<Vec<Result<RawImage>>> {
        if self.panic_page == Some(page) {
            panic!("resource walk blew up on page {page}");
        }
        if self.fail_page == Some(page) {
            return Err(QrScanError::PageExtraction {
                page,
                reason: "corrupt resources".into(),
            });
        }
        Ok(self.pages[(page - 1) as usize]
            .iter()
            .map(|slot| match slot {
                Slot::Image(raw) => Ok(raw.clone()),
                Slot::Broken => Err(QrScanError::UnsupportedImage("JPXDecode".into())),
            })
            .collect())
    }
}

impl PageImageExtractor for FakeDocument {
    fn open(&self, _bytes: &[u8]) -> Result<Box<dyn PageSource>> {
        if self.panic_open {
            panic!("parser blew up");
        }
        if self.fail_open {
            return Err(QrScanError::DocumentOpen("not a PDF".into()));
        }
        Ok(Box::new(self.clone()))
    }
}

/// Decodes a payload chosen by the first pixel's red value, and panics on
/// the `panics_on` key.
#[derive(Default)]
struct KeyedDecoder {
    payloads: HashMap<u8, String>,
    panics_on: Option<u8>,
    calls: AtomicUsize,
}

impl KeyedDecoder {
    fn with(entries: &[(u8, &str)]) -> Arc<Self> {
        Arc::new(Self::keyed(entries))
    }

    fn panicking(entries: &[(u8, &str)], key: u8) -> Arc<Self> {
        Arc::new(Self {
            panics_on: Some(key),
            ..Self::keyed(entries)
        })
    }

    fn keyed(entries: &[(u8, &str)]) -> Self {
        Self {
            payloads: entries.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            ..Self::default()
        }
    }
}

impl BarcodeDecoder for KeyedDecoder {
    fn decode(&self, rgba: &[u8], _width: u32, _height: u32) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = rgba.first().copied()?;
        if self.panics_on == Some(key) {
            panic!("decoder blew up on key {key}");
        }
        self.payloads.get(&key).cloned()
    }
}

fn square(level: u8) -> Slot {
    Slot::Image(RawImage::new(vec![level; 40 * 40], 40, 40, 1))
}

fn banner(level: u8) -> Slot {
    Slot::Image(RawImage::new(vec![level; 80 * 20], 80, 20, 1))
}

struct Harness {
    orchestrator: Arc<Orchestrator>,
    tracker: Arc<ProgressTracker>,
    store: Arc<QrStore>,
}

fn harness(
    extractor: Arc<dyn PageImageExtractor>,
    decoder: Arc<dyn BarcodeDecoder>,
    config: ScanConfig,
) -> Harness {
    let store = Arc::new(QrStore::open_in_memory().unwrap());
    let tracker = Arc::new(ProgressTracker::new(config.event_capacity));
    let orchestrator = Arc::new(Orchestrator::new(
        extractor,
        Arc::new(PngEncoder),
        decoder,
        store.clone(),
        tracker.clone(),
        config,
    ));
    Harness {
        orchestrator,
        tracker,
        store,
    }
}

/// Everything already buffered on `sub`.
async fn drain(sub: &mut Subscription) -> Vec<ScanEvent> {
    let mut events = Vec::new();
    while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(50), sub.next()).await {
        events.push(event);
    }
    events
}

fn progress_values(events: &[ScanEvent]) -> Vec<(u8, ProgressStatus)> {
    events
        .iter()
        .filter_map(|e| match e {
            ScanEvent::Progress(p) => Some((p.progress, p.status)),
            ScanEvent::Record(_) => None,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Orchestrator with fakes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_across_pages_and_non_square_image() {
    let doc = FakeDocument {
        pages: vec![vec![square(10)], vec![square(10)], vec![banner(10)]],
        ..FakeDocument::default()
    };
    let decoder = KeyedDecoder::with(&[(10, "abc")]);
    let h = harness(Arc::new(doc), decoder.clone(), ScanConfig::default());
    let id = SessionId::from("scenario-a.pdf");
    let mut sub = h.tracker.subscribe(&id);

    let records = h.orchestrator.spawn(Vec::new(), id.clone()).await.unwrap().unwrap();

    let summary: Vec<_> = records
        .iter()
        .map(|r| (r.status, r.value.as_deref(), r.page_number))
        .collect();
    assert_eq!(
        summary,
        vec![
            (QrStatus::Valid, Some("abc"), 1),
            (QrStatus::Duplicate, Some("abc"), 2),
            (QrStatus::Invalid, None, 3),
        ]
    );
    // The banner is never handed to the decoder.
    assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);

    let snapshot = h.tracker.get(&id);
    assert_eq!(snapshot.status, ProgressStatus::Done);
    assert_eq!(snapshot.progress, 100);
    assert_eq!(snapshot.message, "Finished processing. Found 2 QR codes");

    let events = drain(&mut sub).await;
    let progress = progress_values(&events);
    assert_eq!(progress.first(), Some(&(0, ProgressStatus::Processing)));
    assert_eq!(progress.last(), Some(&(100, ProgressStatus::Done)));
    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(
        progress.iter().filter(|(_, s)| *s == ProgressStatus::Done).count(),
        1
    );
    let record_events = events
        .iter()
        .filter(|e| matches!(e, ScanEvent::Record(_)))
        .count();
    assert_eq!(record_events, 3);

    let stored = h.store.records_for_file(id.as_str()).unwrap();
    assert_eq!(stored.len(), 3);
    assert_eq!(stored[1].status, QrStatus::Duplicate);
}

#[tokio::test]
async fn undecodable_square_is_unreadable() {
    let doc = FakeDocument {
        pages: vec![vec![square(255)]],
        ..FakeDocument::default()
    };
    let h = harness(Arc::new(doc), KeyedDecoder::with(&[]), ScanConfig::default());
    let id = SessionId::from("scenario-b.pdf");

    let records = h.orchestrator.process_document(b"", &id).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, QrStatus::Unreadable);
    assert!(records[0].value.is_none());
    assert!(records[0].image_data_uri.is_some());
}

#[tokio::test]
async fn one_record_per_image_in_document_order() {
    let doc = FakeDocument {
        pages: vec![
            vec![square(1), banner(2)],
            vec![],
            vec![square(3), Slot::Broken, square(1)],
        ],
        ..FakeDocument::default()
    };
    let decoder = KeyedDecoder::with(&[(1, "One"), (3, "three")]);
    let h = harness(Arc::new(doc), decoder, ScanConfig::default());
    let id = SessionId::from("mixed.pdf");

    let records = h.orchestrator.process_document(b"", &id).unwrap();

    let pages: Vec<u32> = records.iter().map(|r| r.page_number).collect();
    assert_eq!(pages, vec![1, 1, 3, 3, 3]);
    let statuses: Vec<QrStatus> = records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            QrStatus::Valid,
            QrStatus::Invalid,
            QrStatus::Valid,
            QrStatus::Invalid,
            QrStatus::Duplicate,
        ]
    );
    assert_eq!(records[0].value.as_deref(), Some("one"));
    assert!(records[3].image_data_uri.is_none());
    assert_eq!(h.store.records_for_file(id.as_str()).unwrap().len(), 5);

    let history = h.store.history().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].qr_count, 5);
    assert_eq!(history[0].valid_count, 2);
    assert_eq!(history[0].invalid_count, 2);
    assert_eq!(history[0].duplicate_count, 1);
}

#[tokio::test]
async fn empty_document_finishes_immediately() {
    let h = harness(
        Arc::new(FakeDocument::default()),
        KeyedDecoder::with(&[]),
        ScanConfig::default(),
    );
    let id = SessionId::from("empty.pdf");

    let records = h.orchestrator.process_document(b"", &id).unwrap();
    assert!(records.is_empty());
    let snapshot = h.tracker.get(&id);
    assert_eq!(snapshot.status, ProgressStatus::Done);
    assert_eq!(snapshot.progress, 100);
}

#[tokio::test]
async fn unopenable_document_reports_error() {
    let doc = FakeDocument {
        fail_open: true,
        ..FakeDocument::default()
    };
    let h = harness(Arc::new(doc), KeyedDecoder::with(&[]), ScanConfig::default());
    let id = SessionId::from("broken.pdf");

    let result = h.orchestrator.process_document(b"junk", &id);
    assert!(matches!(result, Err(QrScanError::DocumentOpen(_))));

    let snapshot = h.tracker.get(&id);
    assert_eq!(snapshot.status, ProgressStatus::Error);
    assert_eq!(snapshot.progress, 0);
    assert!(snapshot.message.starts_with("Processing failed"));
}

#[tokio::test]
async fn page_enumeration_failure_is_fatal_but_keeps_earlier_records() {
    let doc = FakeDocument {
        pages: vec![vec![square(1)], vec![square(1)], vec![square(1)], vec![square(1)]],
        fail_page: Some(3),
        ..FakeDocument::default()
    };
    let h = harness(
        Arc::new(doc),
        KeyedDecoder::with(&[(1, "x")]),
        ScanConfig::default(),
    );
    let id = SessionId::from("partial.pdf");

    let result = h.orchestrator.process_document(b"", &id);
    assert!(matches!(result, Err(QrScanError::PageExtraction { page: 3, .. })));

    let snapshot = h.tracker.get(&id);
    assert_eq!(snapshot.status, ProgressStatus::Error);
    assert_eq!(snapshot.progress, 50);
    assert_eq!(h.store.records_for_file(id.as_str()).unwrap().len(), 2);
}

#[tokio::test]
async fn finished_session_is_forgotten_after_grace_period() {
    let config = ScanConfig {
        grace_period_ms: 20,
        ..ScanConfig::default()
    };
    let doc = FakeDocument {
        pages: vec![vec![square(1)]],
        ..FakeDocument::default()
    };
    let h = harness(Arc::new(doc), KeyedDecoder::with(&[]), config);
    let id = SessionId::from("scenario-c.pdf");

    h.orchestrator.spawn(Vec::new(), id.clone()).await.unwrap().unwrap();
    assert_eq!(h.tracker.get(&id).status, ProgressStatus::Done);

    tokio::time::sleep(Duration::from_millis(300)).await;
    let snapshot = h.tracker.get(&id);
    assert_eq!(snapshot.status, ProgressStatus::Unknown);
    assert_eq!(snapshot.message, "not found");
}

#[tokio::test]
async fn concurrent_sessions_deduplicate_independently() {
    let doc = FakeDocument {
        pages: vec![vec![square(7)], vec![square(7)]],
        ..FakeDocument::default()
    };
    let h = harness(
        Arc::new(doc),
        KeyedDecoder::with(&[(7, "same")]),
        ScanConfig::default(),
    );
    let a = SessionId::from("a.pdf");
    let b = SessionId::from("b.pdf");

    let (ra, rb) = tokio::join!(
        h.orchestrator.spawn(Vec::new(), a.clone()),
        h.orchestrator.spawn(Vec::new(), b.clone()),
    );
    for records in [ra.unwrap().unwrap(), rb.unwrap().unwrap()] {
        assert_eq!(records[0].status, QrStatus::Valid);
        assert_eq!(records[1].status, QrStatus::Duplicate);
    }
    assert_eq!(h.store.history().unwrap().len(), 2);
}

#[tokio::test]
async fn decoder_panic_costs_only_that_image() {
    let doc = FakeDocument {
        pages: vec![vec![square(9), square(1)], vec![square(1)]],
        ..FakeDocument::default()
    };
    let h = harness(
        Arc::new(doc),
        KeyedDecoder::panicking(&[(1, "x")], 9),
        ScanConfig::default(),
    );
    let id = SessionId::from("panicky-decoder.pdf");

    let records = h.orchestrator.spawn(Vec::new(), id.clone()).await.unwrap().unwrap();

    let summary: Vec<_> = records
        .iter()
        .map(|r| (r.page_number, r.status, r.value.as_deref()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (1, QrStatus::Invalid, None),
            (1, QrStatus::Valid, Some("x")),
            (2, QrStatus::Duplicate, Some("x")),
        ]
    );
    assert!(records[0].image_data_uri.is_none());
    assert_eq!(h.tracker.get(&id).status, ProgressStatus::Done);
    assert_eq!(h.store.records_for_file(id.as_str()).unwrap().len(), 3);
}

#[tokio::test]
async fn page_listing_panic_ends_run_with_error() {
    let doc = FakeDocument {
        pages: vec![vec![square(1)], vec![square(1)]],
        panic_page: Some(2),
        ..FakeDocument::default()
    };
    let h = harness(Arc::new(doc), KeyedDecoder::with(&[]), ScanConfig::default());
    let id = SessionId::from("panicky-page.pdf");

    let result = h.orchestrator.spawn(Vec::new(), id.clone()).await.unwrap();
    assert!(matches!(result, Err(QrScanError::PageExtraction { page: 2, .. })));

    let snapshot = h.tracker.get(&id);
    assert_eq!(snapshot.status, ProgressStatus::Error);
    assert_eq!(snapshot.progress, 50);
    assert!(snapshot.message.contains("resource walk blew up on page 2"));
    assert_eq!(h.store.records_for_file(id.as_str()).unwrap().len(), 1);
}

#[tokio::test]
async fn worker_panic_is_reported_and_releases_followers() {
    let config = ScanConfig {
        poll_interval_ms: 10,
        ..ScanConfig::default()
    };
    let doc = FakeDocument {
        panic_open: true,
        ..FakeDocument::default()
    };
    let h = harness(Arc::new(doc), KeyedDecoder::with(&[]), config.clone());
    let id = SessionId::from("panicky-open.pdf");

    let follower = {
        let tracker = Arc::clone(&h.tracker);
        let id = id.clone();
        tokio::spawn(async move { follow(&tracker, &id, &config, |_| {}).await })
    };

    let result = h.orchestrator.spawn(Vec::new(), id.clone()).await.unwrap();
    match result {
        Err(QrScanError::Worker(message)) => assert!(message.contains("parser blew up")),
        other => panic!("expected a worker error, got {other:?}"),
    }

    let snapshot = h.tracker.get(&id);
    assert_eq!(snapshot.status, ProgressStatus::Error);
    assert!(snapshot.message.starts_with("Processing failed"));

    let outcome = tokio::time::timeout(Duration::from_secs(5), follower)
        .await
        .expect("follower finished")
        .unwrap();
    assert_eq!(outcome, FollowOutcome::Error);
}

// ---------------------------------------------------------------------------
// Real PDFs
// ---------------------------------------------------------------------------

fn image_dict(width: i64, height: i64, color_space: &[u8], bpc: i64) -> Dictionary {
    let mut dict = Dictionary::new();
    dict.set("Type", Object::Name(b"XObject".to_vec()));
    dict.set("Subtype", Object::Name(b"Image".to_vec()));
    dict.set("Width", Object::Integer(width));
    dict.set("Height", Object::Integer(height));
    dict.set("ColorSpace", Object::Name(color_space.to_vec()));
    dict.set("BitsPerComponent", Object::Integer(bpc));
    dict
}

fn xobjects(entries: &[(&str, ObjectId)]) -> Dictionary {
    let mut xobjects = Dictionary::new();
    for (name, id) in entries {
        xobjects.set(*name, Object::Reference(*id));
    }
    let mut resources = Dictionary::new();
    resources.set("XObject", Object::Dictionary(xobjects));
    resources
}

/// Assembles a PDF page by page. Each page runs a content stream against
/// its resources.
struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
}

impl PdfBuilder {
    fn new() -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
        }
    }

    fn image(&mut self, dict: Dictionary, content: Vec<u8>) -> ObjectId {
        self.doc.add_object(Object::Stream(Stream::new(dict, content)))
    }

    fn gray(&mut self, width: i64, height: i64, content: Vec<u8>) -> ObjectId {
        self.image(image_dict(width, height, b"DeviceGray", 8), content)
    }

    fn page(&mut self, resources: Object, content: &str) {
        let contents = self.doc.add_object(Object::Stream(Stream::new(
            Dictionary::new(),
            content.as_bytes().to_vec(),
        )));
        let mut page = Dictionary::new();
        page.set("Type", Object::Name(b"Page".to_vec()));
        page.set("Parent", Object::Reference(self.pages_id));
        page.set("Resources", resources);
        page.set("Contents", Object::Reference(contents));
        let page_id = self.doc.add_object(Object::Dictionary(page));
        self.kids.push(Object::Reference(page_id));
    }

    /// A page painting each image once, in order.
    fn page_painting(&mut self, images: &[ObjectId]) {
        let names: Vec<String> = (0..images.len()).map(|i| format!("Im{i}")).collect();
        let entries: Vec<(&str, ObjectId)> = names.iter().map(String::as_str).zip(images.iter().copied()).collect();
        let content: String = names.iter().map(|name| format!("q 100 0 0 100 0 0 cm /{name} Do Q\n")).collect();
        self.page(Object::Dictionary(xobjects(&entries)), &content);
    }

    fn finish(mut self) -> Vec<u8> {
        let mut pages = Dictionary::new();
        pages.set("Type", Object::Name(b"Pages".to_vec()));
        pages.set("Count", Object::Integer(self.kids.len() as i64));
        pages.set("Kids", Object::Array(self.kids));
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));

        let mut catalog = Dictionary::new();
        catalog.set("Type", Object::Name(b"Catalog".to_vec()));
        catalog.set("Pages", Object::Reference(self.pages_id));
        let catalog_id = self.doc.add_object(Object::Dictionary(catalog));
        self.doc.trailer.set("Root", Object::Reference(catalog_id));

        let mut out = Vec::new();
        self.doc.save_to(&mut out).unwrap();
        out
    }
}

/// One page per `(width, height, level)` flat gray image.
fn pdf_with_images(images: &[(i64, i64, u8)]) -> Vec<u8> {
    let mut pdf = PdfBuilder::new();
    for &(width, height, level) in images {
        let image = pdf.gray(width, height, vec![level; (width * height) as usize]);
        pdf.page_painting(&[image]);
    }
    pdf.finish()
}

/// `payload` as 8-bit gray samples, `scale` pixels per module with a
/// four-module quiet zone. Returns the samples and the side length.
fn qr_samples(payload: &str, scale: usize) -> (Vec<u8>, i64) {
    let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
    let modules = code.width();
    let colors = code.to_colors();
    let side = (modules + 8) * scale;
    let mut samples = vec![255u8; side * side];
    for (i, color) in colors.iter().enumerate() {
        if *color != qrcode::Color::Dark {
            continue;
        }
        let (mx, my) = (i % modules + 4, i / modules + 4);
        for y in my * scale..(my + 1) * scale {
            samples[y * side + mx * scale..y * side + (mx + 1) * scale].fill(0);
        }
    }
    (samples, side as i64)
}

#[tokio::test]
async fn real_pdf_runs_through_lopdf_and_rqrr() {
    let bytes = pdf_with_images(&[(40, 40, 255), (80, 20, 0), (40, 40, 128)]);
    let h = harness(
        Arc::new(LopdfExtractor),
        Arc::new(RqrrDecoder),
        ScanConfig::default(),
    );
    let id = SessionId::for_upload("tickets.pdf");

    let records = h.orchestrator.spawn(bytes, id.clone()).await.unwrap().unwrap();

    let summary: Vec<_> = records.iter().map(|r| (r.page_number, r.status)).collect();
    assert_eq!(
        summary,
        vec![
            (1, QrStatus::Unreadable),
            (2, QrStatus::Invalid),
            (3, QrStatus::Invalid),
        ]
    );
    assert!(records.iter().all(|r| r.image_data_uri.is_some()));
    assert_eq!(
        h.tracker.get(&id).message,
        "Finished processing. Found 1 QR codes"
    );
    assert_eq!(h.store.records_for_file(id.as_str()).unwrap().len(), 3);
}

#[tokio::test]
async fn garbage_bytes_fail_through_lopdf() {
    let h = harness(
        Arc::new(LopdfExtractor),
        Arc::new(RqrrDecoder),
        ScanConfig::default(),
    );
    let id = SessionId::from("garbage.pdf");

    let result = h.orchestrator.spawn(b"%PDF-garbage".to_vec(), id.clone()).await.unwrap();
    assert!(matches!(result, Err(QrScanError::DocumentOpen(_))));
    assert_eq!(h.tracker.get(&id).status, ProgressStatus::Error);
    assert!(h.store.records_for_file(id.as_str()).unwrap().is_empty());
}

#[tokio::test]
async fn real_qr_symbol_is_valid_then_duplicate() {
    let (samples, side) = qr_samples("HTTPS://Example.com/Ticket 42", 4);
    let mut pdf = PdfBuilder::new();
    let first = pdf.gray(side, side, samples.clone());
    let second = pdf.gray(side, side, samples);
    pdf.page_painting(&[first]);
    pdf.page_painting(&[second]);
    let bytes = pdf.finish();

    let h = harness(
        Arc::new(LopdfExtractor),
        Arc::new(RqrrDecoder),
        ScanConfig::default(),
    );
    let id = SessionId::for_upload("boarding-passes.pdf");

    let records = h.orchestrator.spawn(bytes, id.clone()).await.unwrap().unwrap();

    let summary: Vec<_> = records
        .iter()
        .map(|r| (r.page_number, r.status, r.value.as_deref()))
        .collect();
    assert_eq!(
        summary,
        vec![
            (1, QrStatus::Valid, Some("https://example.com/ticket42")),
            (2, QrStatus::Duplicate, Some("https://example.com/ticket42")),
        ]
    );
    assert_eq!(
        h.tracker.get(&id).message,
        "Finished processing. Found 2 QR codes"
    );
    let stored = h.store.records_for_file(id.as_str()).unwrap();
    assert_eq!(stored[1].status, QrStatus::Duplicate);
}

#[tokio::test]
async fn shared_resources_yield_one_record_per_paint() {
    let mut pdf = PdfBuilder::new();
    let square = pdf.gray(40, 40, vec![255; 1600]);
    let banner = pdf.gray(80, 20, vec![0; 1600]);
    let shared = pdf
        .doc
        .add_object(Object::Dictionary(xobjects(&[("Im0", square), ("Im1", banner)])));
    pdf.page(Object::Reference(shared), "q /Im1 Do Q q /Im1 Do Q");
    pdf.page(Object::Reference(shared), "q /Im0 Do Q");
    let bytes = pdf.finish();

    let h = harness(
        Arc::new(LopdfExtractor),
        Arc::new(RqrrDecoder),
        ScanConfig::default(),
    );
    let id = SessionId::from("shared.pdf");

    let records = h.orchestrator.spawn(bytes, id).await.unwrap().unwrap();

    let summary: Vec<_> = records.iter().map(|r| (r.page_number, r.status)).collect();
    assert_eq!(
        summary,
        vec![
            (1, QrStatus::Invalid),
            (1, QrStatus::Invalid),
            (2, QrStatus::Unreadable),
        ]
    );
}

#[tokio::test]
async fn oversized_image_is_recorded_and_run_completes() {
    let mut pdf = PdfBuilder::new();
    let huge = pdf.image(
        image_dict(u32::MAX as i64, u32::MAX as i64, b"DeviceCMYK", 16),
        vec![0; 64],
    );
    let normal = pdf.gray(40, 40, vec![255; 1600]);
    pdf.page_painting(&[huge, normal]);
    let bytes = pdf.finish();

    let config = ScanConfig {
        poll_interval_ms: 10,
        ..ScanConfig::default()
    };
    let h = harness(Arc::new(LopdfExtractor), Arc::new(RqrrDecoder), config.clone());
    let id = SessionId::from("huge.pdf");

    let records = h.orchestrator.spawn(bytes, id.clone()).await.unwrap().unwrap();

    let summary: Vec<_> = records.iter().map(|r| (r.page_number, r.status)).collect();
    assert_eq!(summary, vec![(1, QrStatus::Invalid), (1, QrStatus::Unreadable)]);
    assert!(records[0].image_data_uri.is_none());

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        follow(&h.tracker, &id, &config, |_| {}),
    )
    .await
    .expect("follow finished");
    assert_eq!(outcome, FollowOutcome::Done);
}
