use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::model::entry::{EntryStatus, TranslationEntry};
use crate::model::token::{display_text, line_breaks, trim_terminators};
use crate::services::codec::Codec;
use crate::services::ledger::Ledger;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct QaIssue {
    pub entry_id: String,
    pub code: String,
    pub message: String,
}

impl QaIssue {
    fn new(entry_id: impl Into<String>, code: &str, message: impl Into<String>) -> Self {
        QaIssue {
            entry_id: entry_id.into(),
            code: code.to_string(),
            message: message.into(),
        }
    }
}

fn japanese_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[\p{Hiragana}\p{Katakana}\p{Han}]").expect("static regex")
    })
}

pub fn run(ledger: &Ledger, target: &Codec) -> Vec<QaIssue> {
    let mut issues: Vec<QaIssue> = Vec::new();

    for q in ledger.quarantined() {
        let id = q.id.map(|id| id.to_string()).unwrap_or_default();
        let code = match q.error {
            LedgerError::EmptyTarget(_) => "COMPLETED_BUT_EMPTY",
            _ => "MALFORMED_ROW",
        };
        issues.push(QaIssue::new(id, code, q.error.to_string()));
    }

    for e in ledger.entries() {
        check_entry(e, target, &mut issues);
    }

    issues
}

fn check_entry(e: &TranslationEntry, target: &Codec, issues: &mut Vec<QaIssue>) {
    let id = e.id.to_string();
    let source = trim_terminators(&e.source_tokens);
    let translation = trim_terminators(&e.target_tokens);

    if translation.is_empty() {
        if e.status == EntryStatus::InProgress {
            issues.push(QaIssue::new(
                id,
                "IN_PROGRESS_BUT_EMPTY",
                "status is in_progress but the target is empty",
            ));
        }
        return;
    }

    let shown = display_text(translation);
    if shown.trim() == display_text(source).trim() {
        issues.push(QaIssue::new(&id, "SAME_AS_SOURCE", "target is identical to the source"));
    }

    if let Err(error) = target.encode(translation) {
        issues.push(QaIssue::new(&id, "UNENCODABLE_TARGET", error.to_string()));
    }

    let (src_breaks, dst_breaks) = (line_breaks(source), line_breaks(translation));
    if src_breaks != dst_breaks {
        issues.push(QaIssue::new(
            &id,
            "LINE_BREAK_MISMATCH",
            format!("source has {src_breaks} line break(s), target has {dst_breaks}"),
        ));
    }

    if japanese_re().is_match(&shown) {
        issues.push(QaIssue::new(&id, "JAPANESE_IN_TARGET", "target still contains Japanese text"));
    }
}
