// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types: sessions, classified records, progress events, and the
// raw raster handed over by the page-image extractor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of one processing run. Doubles as the `fileName` key under
/// which records are stored and history is aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Build a collision-resistant id for an uploaded document:
    /// `<basename>-<unix millis>-<random>.pdf`.
    pub fn for_upload(original_name: &str) -> Self {
        let base = strip_extension(original_name);
        let millis = Utc::now().timestamp_millis();
        // Random suffix in 0..1_000_000_000.
        let suffix = Uuid::new_v4().as_u128() % 1_000_000_000;
        Self(format!("{base}-{millis}-{suffix}.pdf"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Drop a trailing `.ext` (the last dot followed by at least one character
/// that is neither a dot nor a slash).
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() && !name[idx + 1..].contains('/') => &name[..idx],
        _ => name,
    }
}

/// Classification outcome for one embedded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QrStatus {
    /// First occurrence of a decoded payload within the run.
    Valid,
    /// Not QR-like, or the image could not be processed at all.
    Invalid,
    /// QR-like, but the decoder produced no payload.
    Unreadable,
    /// Payload already seen earlier in the same run.
    Duplicate,
}

impl QrStatus {
    pub const ALL: [QrStatus; 4] = [
        QrStatus::Valid,
        QrStatus::Invalid,
        QrStatus::Unreadable,
        QrStatus::Duplicate,
    ];

    /// Stored keyword (`VALID`, `INVALID`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Unreadable => "UNREADABLE",
            Self::Duplicate => "DUPLICATE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == value)
    }
}

impl std::fmt::Display for QrStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified image. Append-only: never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrRecord {
    pub file_name: SessionId,
    /// 1-indexed page the image was found on.
    pub page_number: u32,
    /// Normalized payload; `None` unless the status is VALID or DUPLICATE.
    #[serde(rename = "qrValue")]
    pub value: Option<String>,
    pub status: QrStatus,
    /// `data:image/png;base64,...`; `None` when the image could not be encoded.
    #[serde(rename = "imageBase64")]
    pub image_data_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl QrRecord {
    pub fn new(
        file_name: SessionId,
        page_number: u32,
        value: Option<String>,
        status: QrStatus,
        image_data_uri: Option<String>,
    ) -> Self {
        Self {
            file_name,
            page_number,
            value,
            status,
            image_data_uri,
            created_at: Utc::now(),
        }
    }

    /// Record emitted when an image failed before it could be classified.
    pub fn invalid_fallback(file_name: SessionId, page_number: u32) -> Self {
        Self::new(file_name, page_number, None, QrStatus::Invalid, None)
    }
}

/// Per-file aggregate of stored records, computed on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub file_name: SessionId,
    pub qr_count: u64,
    pub processed_at: DateTime<Utc>,
    pub valid_count: u64,
    pub invalid_count: u64,
    pub unreadable_count: u64,
    pub duplicate_count: u64,
}

/// Lifecycle status of a processing session as seen by observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Done,
    Error,
    /// Sentinel: no snapshot exists for the requested id.
    Unknown,
    /// Consumer-side outcome: nothing appeared within the follow timeout.
    Timeout,
}

impl ProgressStatus {
    /// Whether no further updates follow this status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Timeout)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
            Self::Unknown => "unknown",
            Self::Timeout => "timeout",
        }
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// In-memory progress snapshot for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingSession {
    pub file_name: SessionId,
    /// Percentage 0..=100.
    pub progress: u8,
    pub status: ProgressStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ProcessingSession {
    /// Sentinel returned for ids the tracker does not know.
    pub fn unknown(file_name: SessionId) -> Self {
        let now = Utc::now();
        Self {
            file_name,
            progress: 0,
            status: ProgressStatus::Unknown,
            message: "not found".to_owned(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn to_event(&self) -> ProgressEvent {
        ProgressEvent {
            file_name: self.file_name.clone(),
            progress: self.progress,
            status: self.status,
            message: self.message.clone(),
            timestamp: self.updated_at,
        }
    }
}

/// Broadcast payload for one progress transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub file_name: SessionId,
    pub progress: u8,
    pub status: ProgressStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast payload announcing a freshly classified record. The encoded
/// image is omitted to keep fan-out cheap; fetch it from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEvent {
    pub file_name: SessionId,
    pub page_number: u32,
    pub qr_value: Option<String>,
    pub status: QrStatus,
    pub timestamp: DateTime<Utc>,
}

impl From<&QrRecord> for RecordEvent {
    fn from(record: &QrRecord) -> Self {
        Self {
            file_name: record.file_name.clone(),
            page_number: record.page_number,
            qr_value: record.value.clone(),
            status: record.status,
            timestamp: record.created_at,
        }
    }
}

/// Everything a session subscriber can receive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    Progress(ProgressEvent),
    Record(RecordEvent),
}

impl ScanEvent {
    pub fn file_name(&self) -> &SessionId {
        match self {
            Self::Progress(event) => &event.file_name,
            Self::Record(event) => &event.file_name,
        }
    }
}

/// Raw raster pulled out of a document page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    /// Interleaved 8-bit samples, row-major, no row padding.
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// 1 = gray, 2 = gray+alpha, 3 = RGB, 4 = RGBA.
    pub channels: u8,
}

impl RawImage {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, channels: u8) -> Self {
        Self {
            pixels,
            width,
            height,
            channels,
        }
    }

    /// Number of bytes a well-formed buffer with these dimensions holds.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }
}
