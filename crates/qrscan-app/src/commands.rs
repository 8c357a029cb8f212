// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command handlers. Progress goes to stderr; results go to stdout.

use std::path::PathBuf;

use qrscan_core::error::{QrScanError, Result};
use qrscan_core::types::{HistorySummary, QrRecord, ScanEvent, SessionId};
use qrscan_pipeline::FollowOutcome;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::cli::{ConfigArgs, OutputArgs, ResultsArgs, ScanArgs};
use crate::services::app_services::ScanServices;

/// Records produced for one input file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScanReport {
    path: PathBuf,
    file_name: SessionId,
    records: Vec<QrRecord>,
}

/// Scan every path concurrently, following each run's progress. Returns
/// whether all runs succeeded.
pub async fn scan(services: &ScanServices, args: &ScanArgs) -> Result<bool> {
    let mut inputs = Vec::with_capacity(args.paths.len());
    for path in &args.paths {
        let bytes = std::fs::read(path).map_err(|err| {
            QrScanError::DocumentOpen(format!("failed to read {}: {err}", path.display()))
        })?;
        inputs.push((path.clone(), bytes));
    }

    let mut runs = Vec::with_capacity(inputs.len());
    for (path, bytes) in inputs {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_owned());
        let submission = services.submit(bytes, &name);

        let follower = {
            let services = services.clone();
            let id = submission.session_id.clone();
            let quiet = args.quiet;
            tokio::spawn(async move {
                services
                    .follow(&id, |event| {
                        if !quiet {
                            print_event(event);
                        }
                    })
                    .await
            })
        };
        runs.push((path, submission, follower));
    }

    let mut all_ok = true;
    let mut reports = Vec::with_capacity(runs.len());
    for (path, submission, follower) in runs {
        let id = submission.session_id;
        let outcome = follower
            .await
            .map_err(|err| QrScanError::Worker(format!("progress follower: {err}")))?;
        let result = submission
            .handle
            .await
            .map_err(|err| QrScanError::Worker(format!("scan worker: {err}")))?;

        match result {
            Ok(records) => {
                if outcome == FollowOutcome::Timeout {
                    warn!(session = %id, "progress stream timed out before the run reported");
                }
                info!(
                    path = %path.display(),
                    session = %id,
                    records = records.len(),
                    "{}",
                    services.progress(&id).message
                );
                reports.push(ScanReport {
                    path,
                    file_name: id,
                    records: prepare(records, args.images),
                });
            }
            Err(err) => {
                error!(path = %path.display(), session = %id, error = %err, "scan failed");
                all_ok = false;
            }
        }
    }

    if args.output.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            println!("== {} ({})", report.path.display(), report.file_name);
            print_records(&report.records);
        }
    }
    Ok(all_ok)
}

/// Print stored records for one session.
pub fn results(services: &ScanServices, args: &ResultsArgs) -> Result<()> {
    let id = SessionId::from(args.session.as_str());
    let records = prepare(services.results(&id)?, args.images);
    if records.is_empty() {
        warn!(session = %id, "no records stored for this session");
    }

    if args.output.json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print_records(&records);
    }
    Ok(())
}

/// Print per-file summaries, most recent first.
pub fn history(services: &ScanServices, args: &OutputArgs) -> Result<()> {
    let summaries = services.history()?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
    } else {
        print_history(&summaries);
    }
    Ok(())
}

/// Print the effective configuration, optionally persisting it.
pub fn config(services: &ScanServices, args: &ConfigArgs) -> Result<()> {
    info!(data_dir = %services.data_dir().display(), "effective configuration");
    println!("{}", serde_json::to_string_pretty(services.config())?);
    if args.write {
        let path = services.save_config(services.config())?;
        info!(path = %path.display(), "configuration written");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Drop image payloads unless asked for them.
fn prepare(mut records: Vec<QrRecord>, images: bool) -> Vec<QrRecord> {
    if !images {
        records.iter_mut().for_each(|r| r.image_data_uri = None);
    }
    records
}

fn print_event(event: &ScanEvent) {
    match event {
        ScanEvent::Progress(p) => {
            eprintln!("{}: [{:>3}%] {:<10} {}", p.file_name, p.progress, p.status.as_str(), p.message);
        }
        ScanEvent::Record(r) => {
            eprintln!(
                "{}:        page {} {} {}",
                r.file_name,
                r.page_number,
                r.status,
                r.qr_value.as_deref().unwrap_or("-")
            );
        }
    }
}

fn print_records(records: &[QrRecord]) {
    println!("{:>4}  {:<10}  VALUE", "PAGE", "STATUS");
    for record in records {
        let mut line = format!(
            "{:>4}  {:<10}  {}",
            record.page_number,
            record.status.as_str(),
            record.value.as_deref().unwrap_or("-")
        );
        if let Some(uri) = &record.image_data_uri {
            line.push_str("  ");
            line.push_str(uri);
        }
        println!("{line}");
    }
}

fn print_history(summaries: &[HistorySummary]) {
    println!(
        "{:<25}  {:>5}  {:>5}  {:>7}  {:>10}  {:>9}  FILE",
        "PROCESSED AT", "TOTAL", "VALID", "INVALID", "UNREADABLE", "DUPLICATE"
    );
    for s in summaries {
        println!(
            "{:<25}  {:>5}  {:>5}  {:>7}  {:>10}  {:>9}  {}",
            s.processed_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            s.qr_count,
            s.valid_count,
            s.invalid_count,
            s.unreadable_count,
            s.duplicate_count,
            s.file_name
        );
    }
}
