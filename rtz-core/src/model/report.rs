use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::model::block::BlockId;
use crate::model::entry::EntryStatus;
use crate::model::token::Token;

/// Per-block progress: `Scanned → Decoded → Resolved → Encoded → Constrained → Written`,
/// or `Failed` after any of them.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scanned,
    Decoded,
    Resolved,
    Encoded,
    Constrained,
    Written,
    Failed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatchOutcome {
    Fits,
    Truncated,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PatchResult {
    pub entry_id: BlockId,
    pub offset: usize,
    /// Length of the full target encoding, before padding or truncation.
    pub encoded_length: usize,
    pub allocated_length: usize,
    pub outcome: PatchOutcome,
    pub stage: Stage,

    /// Step that failed when `stage` is `Failed`.
    #[serde(default)]
    pub failed_at: Option<Stage>,

    #[serde(default)]
    pub error_kind: Option<ErrorKind>,

    #[serde(default)]
    pub diagnostic: Option<String>,

    /// Token suffix removed by truncation.
    #[serde(default)]
    pub dropped: Vec<Token>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PassReason {
    NoEntry,
    NotCompleted { status: EntryStatus },
    SourceMismatch,
    FormatError { message: String },
}

/// A block whose original bytes were kept without attempting a substitution.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PassthroughRecord {
    pub entry_id: BlockId,
    pub offset: usize,
    pub stage: Stage,
    #[serde(flatten)]
    pub reason: PassReason,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyKind {
    Mismatch,
    Undecodable,
    MissingBlock,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    pub entry_id: BlockId,
    pub offset: usize,
    pub kind: DiscrepancyKind,
    pub expected: Vec<Token>,
    pub actual: Vec<Token>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub blocks_total: usize,
    pub results: Vec<PatchResult>,
    pub passthrough: Vec<PassthroughRecord>,

    #[serde(default)]
    pub ledger_errors: Vec<String>,

    #[serde(default)]
    pub input_sha256: String,

    #[serde(default)]
    pub output_sha256: String,
}

impl RunReport {
    pub fn count(&self, outcome: PatchOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    /// Only completed entries are ever attempted, so every rejection counts.
    pub fn rejected(&self) -> impl Iterator<Item = &PatchResult> {
        self.results
            .iter()
            .filter(|r| r.outcome == PatchOutcome::Rejected)
    }

    pub fn result_for(&self, id: BlockId) -> Option<&PatchResult> {
        self.results.iter().find(|r| r.entry_id == id)
    }
}
