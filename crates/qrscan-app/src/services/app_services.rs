// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: initialises the record store, progress tracker, and
// orchestrator, and exposes the operations the CLI commands need.
//
// `QrStore` guards its own connection, so one `Arc<QrStore>` serves both the
// pipeline's writes and the read commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use qrscan_core::ScanConfig;
use qrscan_core::error::Result;
use qrscan_core::ports::RecordStore;
use qrscan_core::types::{HistorySummary, ProcessingSession, QrRecord, ScanEvent, SessionId};
use qrscan_document::{LopdfExtractor, PngEncoder, RqrrDecoder};
use qrscan_pipeline::{FollowOutcome, Orchestrator, ProgressTracker, follow};
use qrscan_store::QrStore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::data_dir;

const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "qrscan.db";

/// A submitted run: its id and the worker producing its records.
pub struct Submission {
    pub session_id: SessionId,
    pub handle: JoinHandle<Result<Vec<QrRecord>>>,
}

/// Shared services. Cheap to clone.
#[derive(Clone)]
pub struct ScanServices {
    store: Arc<QrStore>,
    tracker: Arc<ProgressTracker>,
    orchestrator: Arc<Orchestrator>,
    data_dir: PathBuf,
    config: ScanConfig,
}

impl ScanServices {
    /// Initialise against the default data directory.
    pub fn init() -> Result<Self> {
        Self::open(data_dir::data_dir()?)
    }

    /// Initialise against `dir`: load `config.json` if present and open the
    /// record database.
    pub fn open(dir: PathBuf) -> Result<Self> {
        info!(path = %dir.display(), "initialising scan services");
        std::fs::create_dir_all(&dir)?;

        let config = load_config(&dir);
        let store = Arc::new(QrStore::open(dir.join(DATABASE_FILE))?);
        let tracker = Arc::new(ProgressTracker::new(config.event_capacity));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(LopdfExtractor),
            Arc::new(PngEncoder),
            Arc::new(RqrrDecoder),
            store.clone(),
            tracker.clone(),
            config.clone(),
        ));

        info!("scan services initialised");
        Ok(Self {
            store,
            tracker,
            orchestrator,
            data_dir: dir,
            config,
        })
    }

    // -- Runs ----------------------------------------------------------------

    /// Start processing `bytes` in the background under a fresh session id
    /// derived from `original_name`. Returns immediately.
    pub fn submit(&self, bytes: Vec<u8>, original_name: &str) -> Submission {
        let session_id = SessionId::for_upload(original_name);
        info!(session = %session_id, bytes = bytes.len(), "document submitted");
        let handle = self.orchestrator.spawn(bytes, session_id.clone());
        Submission { session_id, handle }
    }

    /// Stream progress and record events for `id` until the run ends.
    pub async fn follow<F>(&self, id: &SessionId, on_event: F) -> FollowOutcome
    where
        F: FnMut(&ScanEvent),
    {
        follow(&self.tracker, id, &self.config, on_event).await
    }

    /// Current progress snapshot, or the `unknown` sentinel.
    pub fn progress(&self, id: &SessionId) -> ProcessingSession {
        self.tracker.get(id)
    }

    // -- Stored results ------------------------------------------------------

    pub fn results(&self, id: &SessionId) -> Result<Vec<QrRecord>> {
        self.store.records_for_file(id.as_str())
    }

    pub fn history(&self) -> Result<Vec<HistorySummary>> {
        self.store.history()
    }

    // -- Configuration -------------------------------------------------------

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Write the effective configuration to `config.json`. Takes effect on
    /// the next start.
    pub fn save_config(&self, config: &ScanConfig) -> Result<PathBuf> {
        persist_config(&self.data_dir, config)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

fn load_config(data_dir: &Path) -> ScanConfig {
    let path = data_dir.join(CONFIG_FILE);
    let Ok(data) = std::fs::read_to_string(&path) else {
        return ScanConfig::default();
    };
    serde_json::from_str(&data).unwrap_or_else(|err| {
        warn!(path = %path.display(), error = %err, "ignoring unreadable config");
        ScanConfig::default()
    })
}

fn persist_config(data_dir: &Path, config: &ScanConfig) -> Result<PathBuf> {
    let path = data_dir.join(CONFIG_FILE);
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, json)?;
    Ok(path)
}
