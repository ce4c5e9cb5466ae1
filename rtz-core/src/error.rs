use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::token::Charset;

/// Malformed source encoding inside one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("malformed ruby annotation at byte {offset}")]
    MalformedRuby { offset: usize },

    #[error("malformed color code at byte {offset}")]
    MalformedColor { offset: usize },

    #[error("invalid {charset} byte sequence at byte {offset}")]
    InvalidSequence { offset: usize, charset: Charset },

    #[error("unexpected control code U+{code:04X} at byte {offset}")]
    UnexpectedControl { offset: usize, code: u32 },

    #[error("dangling partial code unit at byte {offset}")]
    TruncatedUnit { offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodingIssue {
    /// `position` is the char index inside the token's text.
    Unrepresentable { token: usize, position: usize, ch: char },
    Reserved { token: usize, sequence: String },
    CharsetMismatch { token: usize, found: Charset },
    InvalidRuby { token: usize },
    InvalidColor { token: usize, value: u32 },
}

impl fmt::Display for EncodingIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingIssue::Unrepresentable { token, position, ch } => write!(
                f,
                "token {token}: {ch:?} (U+{:04X}) at char {position} has no mapping",
                *ch as u32
            ),
            EncodingIssue::Reserved { token, sequence } => {
                write!(f, "token {token}: reserved sequence {sequence:?} inside text")
            }
            EncodingIssue::CharsetMismatch { token, found } => {
                write!(f, "token {token}: literal recorded as {found}")
            }
            EncodingIssue::InvalidRuby { token } => {
                write!(f, "token {token}: ruby base/reading is empty or contains markup")
            }
            EncodingIssue::InvalidColor { token, value } => {
                write!(f, "token {token}: color 0x{value:X} exceeds 24 bits")
            }
        }
    }
}

/// Target text that cannot be expressed in the target charset. Every
/// offending item is listed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct EncodingError {
    pub charset: Charset,
    pub issues: Vec<EncodingIssue>,
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} issue(s) encoding to {}", self.issues.len(), self.charset)?;
        for issue in &self.issues {
            write!(f, "; {issue}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("encoded target is {encoded} bytes but only {allocated} are allocated")]
pub struct OverflowError {
    pub encoded: usize,
    pub allocated: usize,
}

/// Errors of the ledger text syntax (`<|base|reading|>`, `{$RRGGBB}`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyntaxError {
    #[error("unterminated ruby starting at char {pos}")]
    UnterminatedRuby { pos: usize },

    #[error("ruby at char {pos} has no reading separator")]
    MissingReading { pos: usize },

    #[error("invalid character inside ruby at char {pos}")]
    InvalidRuby { pos: usize },

    #[error("malformed color tag at char {pos}")]
    MalformedColor { pos: usize },

    #[error("unknown escape \\{ch} at char {pos}")]
    UnknownEscape { pos: usize, ch: char },

    #[error("dangling backslash at end of text")]
    DanglingEscape,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("row {row}: {message}")]
    MalformedRow { row: usize, message: String },

    #[error("row {row}: invalid id {id:?}")]
    InvalidId { row: usize, id: String },

    #[error("row {row} ({id}): unknown status {status:?}")]
    UnknownStatus { row: usize, id: String, status: String },

    #[error("row {row} ({id}): unknown context {context:?}")]
    UnknownContext { row: usize, id: String, context: String },

    #[error("row {row} ({id}): {column}: {source}")]
    Syntax {
        row: usize,
        id: String,
        column: &'static str,
        source: SyntaxError,
    },

    #[error("row {row}: duplicate id {id}")]
    DuplicateId { row: usize, id: String },

    #[error("entry {0} not found")]
    UnknownEntry(String),

    #[error("entry {id}: illegal status transition {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("entry {0}: completed entries need a non-empty target")]
    EmptyTarget(String),
}

/// Block coverage cannot be established; offsets are not trustworthy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("block table at {offset} with {count} records runs past end of blob ({len} bytes)")]
    TableTruncated { offset: usize, count: usize, len: usize },

    #[error("block 0x{offset:08X}+{length} runs past end of blob ({len} bytes)")]
    OutOfBounds { offset: usize, length: usize, len: usize },

    #[error("block table record {index} has zero length")]
    EmptyBlock { index: usize },

    #[error("blocks 0x{first:08X} and 0x{second:08X} overlap")]
    Overlap { first: usize, second: usize },

    #[error("block 0x{offset:08X} overlaps the block table")]
    OverlapsTable { offset: usize },

    #[error("scan region {start}..{end} is invalid for a {len}-byte blob")]
    InvalidRegion { start: usize, end: usize, len: usize },

    #[error("write of {length} bytes at 0x{offset:08X} does not fit the {len}-byte blob")]
    WriteOutOfBounds { offset: usize, length: usize, len: usize },
}

/// Why an attempted substitution failed, as tagged in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Encoding,
    Overflow,
    /// The padded slot would not decode back to the target.
    Readback,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("container error: {0}")]
    Container(#[from] ContainerError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("markup error: {0}")]
    Syntax(#[from] SyntaxError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
