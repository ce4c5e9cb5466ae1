use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{Ledger, Quarantined};
use crate::error::{LedgerError, Result};
use crate::model::block::BlockId;
use crate::model::entry::{ContextTag, EntryStatus, TranslationEntry};
use crate::model::project::ContainerProfile;
use crate::model::token::trim_terminators;
use crate::parsers::markup;
use crate::services::rebuild::write_atomic;

/// One ledger row as stored on disk. Every column is text so that the file
/// stays editable by hand or through a spreadsheet export.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct LedgerRow {
    pub id: String,
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub source_text: String,
    #[serde(default)]
    pub target_text: String,
    #[serde(default)]
    pub notes: String,
}

impl LedgerRow {
    pub fn from_entry(e: &TranslationEntry) -> Self {
        LedgerRow {
            id: e.id.to_string(),
            context: e.context.to_string(),
            status: e.status.to_string(),
            source_text: markup::print(&e.source_tokens),
            target_text: markup::print(&e.target_tokens),
            notes: e.notes.clone(),
        }
    }

    pub fn into_entry(self, row: usize, profile: &ContainerProfile) -> std::result::Result<TranslationEntry, LedgerError> {
        let id: BlockId = self.id.parse().map_err(|_| LedgerError::InvalidId {
            row,
            id: self.id.clone(),
        })?;
        let id_text = id.to_string();

        let context = if self.context.trim().is_empty() {
            profile.default_context.unwrap_or_default()
        } else {
            ContextTag::parse(&self.context).ok_or_else(|| LedgerError::UnknownContext {
                row,
                id: id_text.clone(),
                context: self.context.clone(),
            })?
        };

        let status = EntryStatus::parse(&self.status).ok_or_else(|| LedgerError::UnknownStatus {
            row,
            id: id_text.clone(),
            status: self.status.clone(),
        })?;

        let syntax = |column: &'static str| {
            let id = id_text.clone();
            move |source| LedgerError::Syntax {
                row,
                id,
                column,
                source,
            }
        };
        let source_tokens =
            markup::parse(&self.source_text, profile.source_charset).map_err(syntax("source_text"))?;
        let target_tokens =
            markup::parse(&self.target_text, profile.target_charset).map_err(syntax("target_text"))?;

        if status == EntryStatus::Completed && trim_terminators(&target_tokens).is_empty() {
            return Err(LedgerError::EmptyTarget(id_text));
        }

        Ok(TranslationEntry {
            id,
            context,
            source_tokens,
            target_tokens,
            status,
            notes: self.notes,
        })
    }
}

/// A ledger plus the per-row problems met while reading it.
#[derive(Debug, Default)]
pub struct LoadedLedger {
    pub ledger: Ledger,
    pub errors: Vec<LedgerError>,
}

/// Reads a ledger file. A missing file is an empty ledger; bad rows are
/// logged, quarantined and reported, never fatal.
pub fn load(path: &Path, profile: &ContainerProfile) -> Result<LoadedLedger> {
    if !path.exists() {
        return Ok(LoadedLedger::default());
    }
    let data = fs::read_to_string(path)?;
    let rows: Vec<Value> = serde_json::from_str(&data)?;
    let loaded = from_rows(rows, profile);
    info!(
        path = %path.display(),
        entries = loaded.ledger.len(),
        errors = loaded.errors.len(),
        "loaded ledger"
    );
    Ok(loaded)
}

pub fn from_rows(rows: Vec<Value>, profile: &ContainerProfile) -> LoadedLedger {
    let mut ledger = Ledger::new();
    let mut errors = Vec::new();

    for (index, value) in rows.into_iter().enumerate() {
        // 1-based, like the spreadsheet the rows come from
        let row = index + 1;
        let raw_id = value
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<BlockId>().ok());

        let parsed = serde_json::from_value::<LedgerRow>(value.clone())
            .map_err(|e| LedgerError::MalformedRow {
                row,
                message: e.to_string(),
            })
            .and_then(|r| r.into_entry(row, profile))
            .and_then(|entry| {
                if ledger.is_quarantined(entry.id) {
                    return Err(LedgerError::DuplicateId {
                        row,
                        id: entry.id.to_string(),
                    });
                }
                ledger.insert(entry).map_err(|dup| LedgerError::DuplicateId {
                    row,
                    id: dup.id.to_string(),
                })
            });

        if let Err(error) = parsed {
            warn!(%error, "skipping ledger row");
            ledger.quarantine(Quarantined {
                id: raw_id,
                row: value,
                error: error.clone(),
            });
            errors.push(error);
        }
    }

    LoadedLedger { ledger, errors }
}

pub fn to_rows(ledger: &Ledger) -> Vec<Value> {
    let mut keyed: Vec<(String, Value)> = Vec::with_capacity(ledger.len() + ledger.quarantined().len());

    for e in ledger.entries() {
        let row = LedgerRow::from_entry(e);
        match serde_json::to_value(&row) {
            Ok(v) => keyed.push((row.id, v)),
            Err(error) => warn!(%error, id = %e.id, "failed to serialize ledger row"),
        }
    }
    for q in ledger.quarantined() {
        let key = q
            .row
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        keyed.push((key, q.row.clone()));
    }

    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, v)| v).collect()
}

/// Writes rows sorted by id, quarantined rows included, through a temp file.
pub fn save(path: &Path, ledger: &Ledger) -> Result<()> {
    let json = serde_json::to_string_pretty(&to_rows(ledger))?;
    write_atomic(path, json.as_bytes())?;
    info!(path = %path.display(), entries = ledger.len(), "saved ledger");
    Ok(())
}
