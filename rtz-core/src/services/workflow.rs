//! File-level operations shared by the CLI and the JSON-lines protocol.
//! Each one reads its inputs, runs one phase, and writes its outputs.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::error::{LedgerError, Result};
use crate::model::block::BlockId;
use crate::model::entry::{EntryStatus, TranslationEntry};
use crate::model::project::ContainerProfile;
use crate::model::report::{Discrepancy, PassthroughRecord, RunReport};
use crate::parsers::markup;
use crate::services::codec::Codec;
use crate::services::encoding::{self, EncodingDetectionResult};
use crate::services::ledger::store::{self, LoadedLedger};
use crate::services::ledger::matcher;
use crate::services::pipeline::{self, CancelToken};
use crate::services::qa::{self, QaIssue};
use crate::services::rebuild::write_atomic;
use crate::services::verify::verify;

#[derive(Debug, Serialize)]
pub struct ScanSummary {
    pub blocks: usize,
    pub registered: usize,
    pub already_known: usize,
    pub failures: Vec<PassthroughRecord>,
}

#[derive(Debug, Serialize)]
pub struct InjectSummary {
    pub report: RunReport,
    pub discrepancies: Vec<Discrepancy>,
    /// False when verification failed and the output was withheld.
    pub written: bool,
    pub flagged: usize,
}

impl InjectSummary {
    /// 0 clean, 1 rejections, 2 discrepancies.
    pub fn exit_code(&self) -> i32 {
        if !self.discrepancies.is_empty() {
            2
        } else if self.report.rejected().next().is_some() {
            1
        } else {
            0
        }
    }
}

fn container_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Registers every decodable block of `container` in the ledger.
pub fn scan_file(container: &Path, ledger_path: &Path, profile: &ContainerProfile) -> Result<ScanSummary> {
    let blob = fs::read(container)?;
    let LoadedLedger { mut ledger, .. } = store::load(ledger_path, profile)?;

    let outcome = pipeline::scan(&blob, profile, &container_name(container))?;
    let blocks = outcome.entries.len() + outcome.failures.len();
    let mut registered = 0usize;
    let mut already_known = 0usize;
    for entry in outcome.entries {
        if ledger.register(entry) {
            registered += 1;
        } else {
            already_known += 1;
        }
    }

    store::save(ledger_path, &ledger)?;
    info!(registered, already_known, "scan registered entries");

    Ok(ScanSummary {
        blocks,
        registered,
        already_known,
        failures: outcome.failures,
    })
}

/// Injects the ledger into `container` and verifies the result before
/// writing it to `output`. With `flag_review`, rejected completed entries are
/// moved to `needs_review` in the ledger afterwards.
pub fn inject_file(
    container: &Path,
    ledger_path: &Path,
    output: &Path,
    profile: &ContainerProfile,
    flag_review: bool,
    cancel: &CancelToken,
) -> Result<InjectSummary> {
    let blob = fs::read(container)?;
    let LoadedLedger { mut ledger, errors } = store::load(ledger_path, profile)?;

    let mut run = pipeline::inject(&blob, &ledger, profile, cancel)?;
    run.report.ledger_errors = errors.iter().map(ToString::to_string).collect();

    let discrepancies = verify(&run.output, &ledger, profile)?;
    let written = discrepancies.is_empty();
    if written {
        write_atomic(output, &run.output)?;
        info!(path = %output.display(), "patched container written");
    }

    let flagged = if flag_review {
        let n = ledger.flag_rejected(&run.report);
        if n > 0 {
            store::save(ledger_path, &ledger)?;
        }
        n
    } else {
        0
    };

    Ok(InjectSummary {
        report: run.report,
        discrepancies,
        written,
        flagged,
    })
}

pub fn verify_file(patched: &Path, ledger_path: &Path, profile: &ContainerProfile) -> Result<Vec<Discrepancy>> {
    let blob = fs::read(patched)?;
    let loaded = store::load(ledger_path, profile)?;
    verify(&blob, &loaded.ledger, profile)
}

pub fn assign_entry(
    ledger_path: &Path,
    profile: &ContainerProfile,
    id: BlockId,
    target_text: &str,
    status: EntryStatus,
    notes: Option<&str>,
) -> Result<TranslationEntry> {
    let tokens = markup::parse(target_text, profile.target_charset)?;
    let LoadedLedger { mut ledger, .. } = store::load(ledger_path, profile)?;

    ledger.assign(id, tokens, status)?;
    if let Some(notes) = notes {
        ledger.set_notes(id, notes)?;
    }
    store::save(ledger_path, &ledger)?;

    ledger
        .get(id)
        .cloned()
        .ok_or_else(|| LedgerError::UnknownEntry(id.to_string()).into())
}

pub fn qa_file(ledger_path: &Path, profile: &ContainerProfile) -> Result<Vec<QaIssue>> {
    let loaded = store::load(ledger_path, profile)?;
    Ok(qa::run(&loaded.ledger, &Codec::new(profile.target_charset)))
}

pub fn propagate_file(ledger_path: &Path, profile: &ContainerProfile) -> Result<usize> {
    let LoadedLedger { mut ledger, .. } = store::load(ledger_path, profile)?;
    let applied = matcher::propagate(&mut ledger);
    if applied > 0 {
        store::save(ledger_path, &ledger)?;
    }
    Ok(applied)
}

/// Detects the charset of `len` bytes at `offset` (the rest of the file when
/// `len` is absent).
pub fn detect_file(path: &Path, offset: usize, len: Option<usize>) -> Result<EncodingDetectionResult> {
    let blob = fs::read(path)?;
    let start = offset.min(blob.len());
    let end = len.map_or(blob.len(), |l| start.saturating_add(l).min(blob.len()));
    Ok(encoding::detect(&blob[start..end]))
}
