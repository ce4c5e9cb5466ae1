pub mod hash;
pub mod matcher;
pub mod normalize;
pub mod store;

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::error::LedgerError;
use crate::model::block::BlockId;
use crate::model::entry::{EntryStatus, TranslationEntry};
use crate::model::report::RunReport;
use crate::model::token::{trim_terminators, Token};

/// A ledger row that could not be read. It is kept verbatim so that saving
/// never loses a translator's work.
#[derive(Debug, Clone, PartialEq)]
pub struct Quarantined {
    pub id: Option<BlockId>,
    pub row: serde_json::Value,
    pub error: LedgerError,
}

/// Durable store of translation entries, keyed by block id.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: BTreeMap<BlockId, TranslationEntry>,
    quarantined: Vec<Quarantined>,
    quarantined_ids: BTreeSet<BlockId>,
}

impl Ledger {
    pub fn new() -> Self {
        Ledger::default()
    }

    pub fn get(&self, id: BlockId) -> Option<&TranslationEntry> {
        self.entries.get(&id)
    }

    /// Entries in id order.
    pub fn entries(&self) -> impl Iterator<Item = &TranslationEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn quarantined(&self) -> &[Quarantined] {
        &self.quarantined
    }

    pub fn is_quarantined(&self, id: BlockId) -> bool {
        self.quarantined_ids.contains(&id)
    }

    pub(crate) fn quarantine(&mut self, q: Quarantined) {
        if let Some(id) = q.id {
            self.quarantined_ids.insert(id);
        }
        self.quarantined.push(q);
    }

    pub(crate) fn insert(&mut self, entry: TranslationEntry) -> Result<(), TranslationEntry> {
        if self.entries.contains_key(&entry.id) {
            return Err(entry);
        }
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    /// Adds an entry for a newly scanned block. Existing and quarantined ids
    /// are left alone; returns whether the entry was added.
    pub fn register(&mut self, entry: TranslationEntry) -> bool {
        if self.is_quarantined(entry.id) {
            return false;
        }
        self.insert(entry).is_ok()
    }

    pub fn assign(
        &mut self,
        id: BlockId,
        target_tokens: Vec<Token>,
        status: EntryStatus,
    ) -> Result<(), LedgerError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| LedgerError::UnknownEntry(id.to_string()))?;

        if !entry.status.can_transition_to(status) {
            return Err(LedgerError::InvalidTransition {
                id: id.to_string(),
                from: entry.status.to_string(),
                to: status.to_string(),
            });
        }
        if status == EntryStatus::Completed && trim_terminators(&target_tokens).is_empty() {
            return Err(LedgerError::EmptyTarget(id.to_string()));
        }

        entry.target_tokens = target_tokens;
        entry.status = status;
        Ok(())
    }

    pub fn set_notes(&mut self, id: BlockId, notes: impl Into<String>) -> Result<(), LedgerError> {
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| LedgerError::UnknownEntry(id.to_string()))?;
        entry.notes = notes.into();
        Ok(())
    }

    /// Moves completed entries whose target was rejected to `needs_review`.
    pub fn flag_rejected(&mut self, report: &RunReport) -> usize {
        let mut flagged = 0usize;

        for result in report.rejected() {
            let Some(entry) = self.entries.get_mut(&result.entry_id) else {
                continue;
            };
            if entry.status != EntryStatus::Completed {
                continue;
            }

            entry.status = EntryStatus::NeedsReview;
            let reason = result.diagnostic.as_deref().unwrap_or("target rejected");
            if !entry.notes.is_empty() {
                entry.notes.push_str("; ");
            }
            entry.notes.push_str(&format!("injection: {reason}"));
            flagged += 1;
        }

        if flagged > 0 {
            info!(flagged, "flagged rejected entries for review");
        }
        flagged
    }
}
