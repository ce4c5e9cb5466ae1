use std::collections::HashMap;

use tracing::{info, warn};

use crate::error::Result;
use crate::model::block::{BlockId, TextBlock};
use crate::model::entry::{EntryStatus, TranslationEntry};
use crate::model::project::ContainerProfile;
use crate::model::report::{Discrepancy, DiscrepancyKind};
use crate::model::token::{trim_terminators, Token};
use crate::services::codec::Codec;
use crate::services::constraint::SizeConstraint;
use crate::services::ledger::Ledger;
use crate::services::pipeline::{locate, readback_problem, with_terminator, Located};

/// Checks a patched blob against what the ledger says it should contain.
///
/// The expected content of every entry is derived from the ledger alone, by
/// running the same overflow policy and read-back check the injection used:
/// a target that fits is expected verbatim, a truncated one as truncated, a
/// rejected one falls back to the source. Entries that are not completed must
/// still show their source. Trailing terminators are ignored on both sides.
pub fn verify(patched: &[u8], ledger: &Ledger, profile: &ContainerProfile) -> Result<Vec<Discrepancy>> {
    let Located { blocks, source, target } = locate(patched, profile)?;
    let by_id: HashMap<BlockId, &TextBlock> = blocks.iter().map(|b| (b.id, b)).collect();
    let scanned = profile.layout_is_scan();
    let mut out = Vec::new();

    for entry in ledger.entries() {
        let Some(block) = by_id.get(&entry.id) else {
            if entry.status == EntryStatus::Completed {
                out.push(Discrepancy {
                    entry_id: entry.id,
                    offset: entry.id.offset(),
                    kind: DiscrepancyKind::MissingBlock,
                    expected: entry.target_tokens.clone(),
                    actual: Vec::new(),
                    message: Some("no block at this offset".into()),
                });
            }
            continue;
        };

        let (expected, codec) = expectation(entry, block, profile.allow_truncation, scanned, &source, &target);
        let actual = match codec.decode_block(block) {
            Ok(tokens) => tokens,
            Err(error) => {
                out.push(Discrepancy {
                    entry_id: entry.id,
                    offset: block.offset,
                    kind: DiscrepancyKind::Undecodable,
                    expected,
                    actual: Vec::new(),
                    message: Some(error.to_string()),
                });
                continue;
            }
        };

        if trim_terminators(&actual) != trim_terminators(&expected) {
            out.push(Discrepancy {
                entry_id: entry.id,
                offset: block.offset,
                kind: DiscrepancyKind::Mismatch,
                expected,
                actual,
                message: None,
            });
        }
    }

    if out.is_empty() {
        info!(blocks = blocks.len(), "verification passed");
    } else {
        warn!(discrepancies = out.len(), "verification failed");
    }
    Ok(out)
}

fn expectation<'c>(
    entry: &TranslationEntry,
    block: &TextBlock,
    allow_truncation: bool,
    scanned: bool,
    source: &'c Codec,
    target: &'c Codec,
) -> (Vec<Token>, &'c Codec) {
    let fallback = (entry.source_tokens.clone(), source);
    if entry.status != EntryStatus::Completed {
        return fallback;
    }

    let needed = terminated(entry, block, source, target);
    let constraint = SizeConstraint::for_block(block, target.padding(), allow_truncation);
    let Ok(c) = constraint.fit_tokens(target, &with_terminator(&entry.target_tokens, needed)) else {
        return fallback;
    };
    // a rejection has no bytes
    let written = c
        .bytes
        .as_deref()
        .is_some_and(|bytes| readback_problem(target, bytes, &c.kept, scanned).is_none());
    if !written {
        return fallback;
    }
    (c.kept, target)
}

/// Whether the original string was terminated, recovered without its bytes.
///
/// Zero padding swallows the terminator, so the source length decides, as it
/// does during injection. Otherwise the block tells: while it still holds
/// the source, its own terminator is the original one; once overwritten, the
/// written target carries a terminator exactly when one was needed.
fn terminated(entry: &TranslationEntry, block: &TextBlock, source: &Codec, target: &Codec) -> bool {
    if source.padding().is_zero() {
        return source
            .encode(trim_terminators(&entry.source_tokens))
            .is_ok_and(|bytes| bytes.len() < block.allocated_length);
    }

    let ends_terminated = |tokens: &[Token]| tokens.last().is_some_and(Token::is_terminator);
    if let Ok(found) = source.decode_block(block) {
        if trim_terminators(&found) == trim_terminators(&entry.source_tokens) {
            return ends_terminated(&found);
        }
    }
    match target.decode_block(block) {
        Ok(found) => ends_terminated(&found),
        Err(_) => ends_terminated(&entry.source_tokens),
    }
}
