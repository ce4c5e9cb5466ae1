use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::model::block::{Padding, TextBlock};
use crate::model::entry::{ContextTag, EntryStatus, TranslationEntry};
use crate::model::project::ContainerProfile;
use crate::model::report::{PassReason, PassthroughRecord, PatchOutcome, PatchResult, RunReport, Stage};
use crate::model::token::{canonicalize, display_text, trim_terminators, Token};
use crate::services::codec::{codecs, Codec};
use crate::services::constraint::SizeConstraint;
use crate::services::ledger::hash::sha256_hex;
use crate::services::ledger::Ledger;
use crate::services::locator::Locator;
use crate::services::rebuild::carve;

/// Shared flag checked between blocks. Cancelling discards the whole run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct Injection {
    pub output: Vec<u8>,
    pub report: RunReport,
}

enum BlockOutcome {
    Patched(PatchResult),
    Passed(PassthroughRecord),
}

struct Context<'a> {
    ledger: &'a Ledger,
    source: Codec,
    target: Codec,
    allow_truncation: bool,
    scanned: bool,
}

/// A container resolved against its profile: the blocks and both codecs.
pub(crate) struct Located {
    pub blocks: Vec<TextBlock>,
    pub source: Codec,
    pub target: Codec,
}

pub(crate) fn locate(blob: &[u8], profile: &ContainerProfile) -> Result<Located> {
    profile.validate().map_err(Error::Config)?;
    let (source, target) = codecs(profile).map_err(Error::Config)?;
    let blocks = Locator::for_profile(profile, &source).locate(blob)?;
    Ok(Located { blocks, source, target })
}

/// Substitutes every completed ledger entry into a copy of `blob`. The input
/// is never modified and the output always has the same length.
pub fn inject(
    blob: &[u8],
    ledger: &Ledger,
    profile: &ContainerProfile,
    cancel: &CancelToken,
) -> Result<Injection> {
    let Located { blocks, source, target } = locate(blob, profile)?;
    info!(blocks = blocks.len(), entries = ledger.len(), "injection started");

    let mut output = blob.to_vec();
    let slots = carve(&mut output, &blocks)?;

    let ctx = Context {
        ledger,
        source,
        target,
        allow_truncation: profile.allow_truncation,
        scanned: profile.layout_is_scan(),
    };

    let step = |(block, slot): (&TextBlock, &mut [u8])| {
        if cancel.is_cancelled() {
            return None;
        }
        Some(process_block(&ctx, block, slot))
    };

    let outcomes: Vec<Option<BlockOutcome>> = if profile.parallel {
        blocks.par_iter().zip(slots).map(step).collect()
    } else {
        blocks.iter().zip(slots).map(step).collect()
    };

    if cancel.is_cancelled() {
        warn!("injection cancelled, results discarded");
        return Err(Error::Cancelled);
    }

    let mut report = RunReport {
        blocks_total: blocks.len(),
        ..RunReport::default()
    };
    for outcome in outcomes.into_iter().flatten() {
        match outcome {
            BlockOutcome::Patched(r) => report.results.push(r),
            BlockOutcome::Passed(p) => report.passthrough.push(p),
        }
    }
    report.input_sha256 = sha256_hex(blob);
    report.output_sha256 = sha256_hex(&output);

    info!(
        fits = report.count(PatchOutcome::Fits),
        truncated = report.count(PatchOutcome::Truncated),
        rejected = report.count(PatchOutcome::Rejected),
        passthrough = report.passthrough.len(),
        "injection finished"
    );

    Ok(Injection { output, report })
}

fn passed(block: &TextBlock, stage: Stage, reason: PassReason) -> BlockOutcome {
    BlockOutcome::Passed(PassthroughRecord {
        entry_id: block.id,
        offset: block.offset,
        stage,
        reason,
    })
}

/// `slot` already holds the original bytes; it is only overwritten once the
/// replacement is known to fit and to read back.
fn process_block(ctx: &Context<'_>, block: &TextBlock, slot: &mut [u8]) -> BlockOutcome {
    let source = match ctx.source.decode_block(block) {
        Ok(tokens) => tokens,
        Err(error) => {
            warn!(id = %block.id, %error, "block is not decodable, kept as is");
            return passed(
                block,
                Stage::Scanned,
                PassReason::FormatError {
                    message: error.to_string(),
                },
            );
        }
    };

    let Some(entry) = ctx.ledger.get(block.id) else {
        return passed(block, Stage::Decoded, PassReason::NoEntry);
    };
    if entry.status != EntryStatus::Completed {
        return passed(
            block,
            Stage::Resolved,
            PassReason::NotCompleted {
                status: entry.status,
            },
        );
    }
    if trim_terminators(&entry.source_tokens) != trim_terminators(&source) {
        warn!(id = %block.id, "ledger source differs from container, kept as is");
        return passed(block, Stage::Resolved, PassReason::SourceMismatch);
    }

    let target = with_terminator(
        &entry.target_tokens,
        needs_terminator(block, &source, ctx.source.padding()),
    );
    let constraint = SizeConstraint::for_block(block, ctx.target.padding(), ctx.allow_truncation);

    let mut result = PatchResult {
        entry_id: block.id,
        offset: block.offset,
        encoded_length: 0,
        allocated_length: block.allocated_length,
        outcome: PatchOutcome::Rejected,
        stage: Stage::Failed,
        failed_at: Some(Stage::Encoded),
        error_kind: None,
        diagnostic: None,
        dropped: Vec::new(),
    };

    let constrained = match constraint.fit_tokens(&ctx.target, &target) {
        Ok(c) => c,
        Err(error) => {
            warn!(id = %block.id, %error, "target is not encodable");
            result.error_kind = Some(ErrorKind::Encoding);
            result.diagnostic = Some(error.to_string());
            return BlockOutcome::Patched(result);
        }
    };

    result.failed_at = Some(Stage::Constrained);
    result.encoded_length = constrained.encoded_length;
    if let Some(bytes) = &constrained.bytes {
        if let Some(problem) = readback_problem(&ctx.target, bytes, &constrained.kept, ctx.scanned) {
            warn!(id = %block.id, %problem, "target would not read back, source kept");
            result.error_kind = Some(ErrorKind::Readback);
            result.diagnostic = Some(problem);
            return BlockOutcome::Patched(result);
        }
    }

    result.outcome = constrained.outcome;
    result.dropped = constrained.dropped;
    if let Some(overflow) = constrained.overflow {
        result.error_kind = Some(ErrorKind::Overflow);
        result.diagnostic = Some(overflow.to_string());
    }

    match constrained.bytes {
        Some(bytes) => {
            slot.copy_from_slice(&bytes);
            result.stage = Stage::Written;
            result.failed_at = None;
            if result.outcome == PatchOutcome::Truncated {
                warn!(id = %block.id, dropped = result.dropped.len(), "target truncated");
            }
            debug!(id = %block.id, len = result.encoded_length, "block written");
        }
        None => {
            warn!(
                id = %block.id,
                encoded = result.encoded_length,
                allocated = block.allocated_length,
                "target does not fit, source kept"
            );
        }
    }

    BlockOutcome::Patched(result)
}

/// Whether the original string was terminated. With zero padding the
/// terminator is indistinguishable from padding, so any trimmed tail counts.
pub fn needs_terminator(block: &TextBlock, source: &[Token], padding: &Padding) -> bool {
    if padding.is_zero() {
        return block.content(padding).len() < block.allocated_length;
    }
    source.last().is_some_and(Token::is_terminator)
}

/// The replacement must stay terminated when the original was, or the game
/// reads past the end of the slot.
pub fn with_terminator(target: &[Token], needed: bool) -> Vec<Token> {
    let mut out = target.to_vec();
    if needed && !out.last().is_some_and(Token::is_terminator) {
        out.push(Token::Terminator);
    }
    out
}

/// Why the padded `slot` would not be found again as `kept`, if it would not.
/// A scanned container is split at every terminator, so those may only trail.
pub fn readback_problem(codec: &Codec, slot: &[u8], kept: &[Token], scanned: bool) -> Option<String> {
    let body = trim_terminators(kept);
    if scanned && body.contains(&Token::Terminator) {
        return Some("inner terminator would split the block on the next scan".into());
    }

    let read = match codec.decode_slot(slot) {
        Ok(tokens) => tokens,
        Err(error) => return Some(format!("written slot is not decodable: {error}")),
    };
    if trim_terminators(&read) == &canonicalize(body.to_vec())[..] {
        return None;
    }

    let unit = codec.padding().unit();
    let ends_with_pad = codec
        .encode(body)
        .is_ok_and(|bytes| codec.padding().content_length(&bytes) < bytes.len());
    Some(if ends_with_pad {
        format!("target ends with the pad unit {unit:02X?}, which reads back as padding")
    } else {
        format!("written slot reads back as {:?}", display_text(&read))
    })
}

#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub entries: Vec<TranslationEntry>,
    pub failures: Vec<PassthroughRecord>,
}

/// Decodes every block into a fresh untranslated entry. Blocks that fail to
/// decode are reported and get no entry.
pub fn scan(blob: &[u8], profile: &ContainerProfile, container_name: &str) -> Result<ScanOutcome> {
    let Located {
        blocks, source: codec, ..
    } = locate(blob, profile)?;
    let mut out = ScanOutcome::default();

    for block in &blocks {
        match codec.decode_block(block) {
            Ok(tokens) => {
                let context = profile
                    .default_context
                    .unwrap_or_else(|| ContextTag::infer(container_name, &display_text(&tokens)));
                out.entries.push(TranslationEntry::new(block.id, context, tokens));
            }
            Err(error) => {
                warn!(id = %block.id, %error, "block is not decodable");
                out.failures.push(PassthroughRecord {
                    entry_id: block.id,
                    offset: block.offset,
                    stage: Stage::Scanned,
                    reason: PassReason::FormatError {
                        message: error.to_string(),
                    },
                });
            }
        }
    }

    info!(
        blocks = blocks.len(),
        decoded = out.entries.len(),
        failed = out.failures.len(),
        "scan finished"
    );
    Ok(out)
}
