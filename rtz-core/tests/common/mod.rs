#![allow(dead_code)]

use rtz_core::model::block::BlockId;
use rtz_core::model::entry::EntryStatus;
use rtz_core::model::project::{BlockTable, ContainerProfile, SegmentStream};
use rtz_core::model::token::{Charset, Token};
use rtz_core::parsers::markup;
use rtz_core::services::codec::{padding_for, Codec};
use rtz_core::services::ledger::Ledger;
use rtz_core::services::pipeline;

pub const SJ: Charset = Charset::ShiftJis;
pub const U: Charset = Charset::Utf16Le;
pub const W: Charset = Charset::Windows1252;

const SEGMENTS_END: [u8; 5] = [0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// Fill applied behind each fixture string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    Byte(u8),
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Counted `(offset, length)` table at 0, blocks back to back after it.
    Table,
    /// Length-prefixed segments at 0, closed by the end marker.
    Segments,
}

/// One block per string. `slack` pad units follow each encoded string.
pub struct Fixture {
    pub blob: Vec<u8>,
    pub profile: ContainerProfile,
    pub ids: Vec<BlockId>,
    pub spans: Vec<(usize, usize)>,
}

pub fn encode(text: &str, charset: Charset) -> Vec<u8> {
    let tokens = markup::parse(text, charset).expect("fixture markup");
    Codec::new(charset).encode(&tokens).expect("fixture encoding")
}

/// A Shift_JIS container with a block table, zero padded, for a
/// Windows-1252 translation.
pub fn fixture(strings: &[(&str, usize)]) -> Fixture {
    build(strings, SJ, W, Fill::Byte(0), Shape::Table)
}

pub fn build(strings: &[(&str, usize)], source: Charset, target: Charset, fill: Fill, shape: Shape) -> Fixture {
    let mut profile = ContainerProfile {
        name: "tuto_001".into(),
        source_charset: source,
        target_charset: target,
        ..ContainerProfile::default()
    };
    match fill {
        Fill::Byte(b) => profile.pad_byte = b,
        Fill::Char(c) => profile.pad_char = Some(c),
    }
    match shape {
        Shape::Table => profile.table = Some(BlockTable { offset: 0, count: None }),
        Shape::Segments => profile.segments = Some(SegmentStream { start: 0 }),
    }

    let padding = padding_for(&profile, source).expect("fixture padding");
    let bodies: Vec<Vec<u8>> = strings
        .iter()
        .map(|(text, slack)| {
            let mut b = encode(text, source);
            let len = b.len() + slack * padding.width();
            padding.fill(&mut b, len);
            b
        })
        .collect();

    let mut blob = Vec::new();
    let mut spans = Vec::new();
    match shape {
        Shape::Table => {
            blob.extend_from_slice(&(strings.len() as u32).to_le_bytes());
            let mut offset = 4 + 8 * strings.len();
            for body in &bodies {
                blob.extend_from_slice(&(offset as u32).to_le_bytes());
                blob.extend_from_slice(&(body.len() as u32).to_le_bytes());
                spans.push((offset, body.len()));
                offset += body.len();
            }
            for body in &bodies {
                blob.extend_from_slice(body);
            }
        }
        Shape::Segments => {
            for body in &bodies {
                let units = u8::try_from(body.len() / source.unit_width()).expect("segment fits a u8 count");
                blob.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, units]);
                spans.push((blob.len(), body.len()));
                blob.extend_from_slice(body);
            }
            blob.extend_from_slice(&SEGMENTS_END);
        }
    }

    let ids = spans.iter().map(|&(offset, _)| BlockId(offset as u32)).collect();
    Fixture {
        blob,
        profile,
        ids,
        spans,
    }
}

impl Fixture {
    /// Ledger holding one untranslated entry per decodable block.
    pub fn ledger(&self) -> Ledger {
        let mut ledger = Ledger::new();
        let scanned = pipeline::scan(&self.blob, &self.profile, "tuto_001.rtz").expect("scan");
        for entry in scanned.entries {
            ledger.register(entry);
        }
        ledger
    }

    pub fn block(&self, bytes: &[u8], index: usize) -> Vec<u8> {
        let (start, len) = self.spans[index];
        bytes[start..start + len].to_vec()
    }
}

pub fn target(text: &str) -> Vec<Token> {
    target_in(text, W)
}

pub fn target_in(text: &str, charset: Charset) -> Vec<Token> {
    markup::parse(text, charset).expect("target markup")
}

pub fn complete(ledger: &mut Ledger, id: BlockId, text: &str) {
    ledger
        .assign(id, target(text), EntryStatus::Completed)
        .expect("assign");
}
