use std::collections::HashMap;

use tracing::{debug, info};

use super::{hash, normalize, Ledger};
use crate::model::block::BlockId;
use crate::model::entry::EntryStatus;
use crate::model::token::{trim_terminators, Token};
use crate::parsers::markup;

fn source_key(tokens: &[Token]) -> Option<String> {
    let norm = normalize::normalize_tokens(tokens);
    if norm.is_empty() {
        return None;
    }
    Some(hash::hash_norm(&norm))
}

/// Copies completed targets onto untranslated entries with the same source.
/// Copies land as `in_progress` so a translator still signs them off.
pub fn propagate(ledger: &mut Ledger) -> usize {
    let mut donors: HashMap<String, (usize, Vec<Token>)> = HashMap::new();
    for e in ledger.entries().filter(|e| e.status == EntryStatus::Completed) {
        let Some(key) = source_key(&e.source_tokens) else {
            continue;
        };
        let len = markup::print(trim_terminators(&e.target_tokens)).len();
        match donors.get(&key) {
            Some((best, _)) if *best >= len => {}
            _ => {
                donors.insert(key, (len, e.target_tokens.clone()));
            }
        }
    }

    let pending: Vec<(BlockId, Vec<Token>)> = ledger
        .entries()
        .filter(|e| e.status == EntryStatus::Untranslated)
        .filter_map(|e| {
            let key = source_key(&e.source_tokens)?;
            donors.get(&key).map(|(_, target)| (e.id, target.clone()))
        })
        .collect();

    let mut applied = 0usize;
    for (id, target) in pending {
        match ledger.assign(id, target, EntryStatus::InProgress) {
            Ok(()) => applied += 1,
            Err(error) => debug!(%error, "propagation skipped"),
        }
    }

    info!(applied, "propagated duplicate translations");
    applied
}
