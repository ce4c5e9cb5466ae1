use tracing::debug;

use crate::error::ContainerError;
use crate::model::block::{Padding, TextBlock};
use crate::model::project::{BlockTable, ContainerProfile, ScanRegion};
use crate::services::codec::Codec;

const RECORD_LEN: usize = 8;
const PREFIX_LEN: usize = 5;
const SEGMENTS_END: [u8; PREFIX_LEN] = [0xFF, 0xFF, 0xFF, 0xFF, 0x00];

/// How blocks are found. A table, when present, is authoritative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Table(BlockTable),
    Scan(ScanRegion),
    /// Length-prefixed segments from `start`; see [`crate::model::project::SegmentStream`].
    Prefixed { start: usize },
}

/// `padding` is the source side's: its width is the scan step and the
/// segment length unit, its pattern is what scanning absorbs as slack.
#[derive(Debug, Clone)]
pub struct Locator {
    layout: Layout,
    padding: Padding,
}

impl Locator {
    pub fn new(layout: Layout, padding: Padding) -> Self {
        Locator { layout, padding }
    }

    pub fn for_profile(profile: &ContainerProfile, source: &Codec) -> Self {
        let layout = match (profile.table, profile.segments) {
            (Some(table), _) => Layout::Table(table),
            (None, Some(segments)) => Layout::Prefixed {
                start: segments.start,
            },
            (None, None) => Layout::Scan(profile.scan_region.unwrap_or_default()),
        };
        Locator::new(layout, source.padding().clone())
    }

    /// Blocks sorted by offset, in bounds and pairwise disjoint.
    pub fn locate(&self, blob: &[u8]) -> Result<Vec<TextBlock>, ContainerError> {
        let blocks = match self.layout {
            Layout::Table(table) => self.from_table(blob, table)?,
            Layout::Scan(region) => self.scan(blob, region)?,
            Layout::Prefixed { start } => self.segments(blob, start)?,
        };
        debug!(blocks = blocks.len(), "located text blocks");
        Ok(blocks)
    }

    fn from_table(&self, blob: &[u8], table: BlockTable) -> Result<Vec<TextBlock>, ContainerError> {
        let (count, records_at) = match table.count {
            Some(count) => (count as usize, table.offset),
            None => {
                let count = read_u32(blob, table.offset).ok_or(ContainerError::TableTruncated {
                    offset: table.offset,
                    count: 0,
                    len: blob.len(),
                })?;
                (count as usize, table.offset + 4)
            }
        };

        let table_end = count
            .checked_mul(RECORD_LEN)
            .and_then(|n| n.checked_add(records_at))
            .filter(|&end| end <= blob.len())
            .ok_or(ContainerError::TableTruncated {
                offset: table.offset,
                count,
                len: blob.len(),
            })?;

        let mut ranges = Vec::with_capacity(count);
        for index in 0..count {
            let at = records_at + index * RECORD_LEN;
            let (offset, length) = match (read_u32(blob, at), read_u32(blob, at + 4)) {
                (Some(o), Some(l)) => (o as usize, l as usize),
                _ => {
                    return Err(ContainerError::TableTruncated {
                        offset: table.offset,
                        count,
                        len: blob.len(),
                    })
                }
            };

            if length == 0 {
                return Err(ContainerError::EmptyBlock { index });
            }
            if offset.checked_add(length).map_or(true, |end| end > blob.len()) {
                return Err(ContainerError::OutOfBounds {
                    offset,
                    length,
                    len: blob.len(),
                });
            }
            if offset < table_end && table.offset < offset + length {
                return Err(ContainerError::OverlapsTable { offset });
            }
            ranges.push((offset, length));
        }

        ranges.sort_unstable();
        for pair in ranges.windows(2) {
            let (a, a_len) = pair[0];
            let (b, _) = pair[1];
            if a + a_len > b {
                return Err(ContainerError::Overlap { first: a, second: b });
            }
        }

        Ok(ranges
            .into_iter()
            .map(|(offset, length)| self.block(blob, offset, offset + length))
            .collect())
    }

    fn scan(&self, blob: &[u8], region: ScanRegion) -> Result<Vec<TextBlock>, ContainerError> {
        let start = region.start;
        let end = region.end.unwrap_or(blob.len());
        if start > end || end > blob.len() || end > u32::MAX as usize {
            return Err(ContainerError::InvalidRegion {
                start,
                end,
                len: blob.len(),
            });
        }

        let unit = self.padding.width();
        let is_pad = |at: usize| self.padding.is_unit(&blob[at..at + unit]);
        let is_nul = |at: usize| blob[at..at + unit].iter().all(|&b| b == 0);
        let last_unit = start + (end - start) / unit * unit;

        let mut blocks = Vec::new();
        let mut pos = start;
        while pos < last_unit && is_pad(pos) {
            pos += unit;
        }

        while pos < last_unit {
            let block_start = pos;

            while pos < last_unit && !is_nul(pos) {
                pos += unit;
            }
            if pos < last_unit {
                pos += unit;
            }
            // trailing padding is slack for the translation
            while pos < last_unit && is_pad(pos) {
                pos += unit;
            }

            let block_end = if pos >= last_unit { end } else { pos };
            blocks.push(self.block(blob, block_start, block_end));
        }

        Ok(blocks)
    }

    /// A block is the content after each prefix; the prefixes stay untouched.
    fn segments(&self, blob: &[u8], start: usize) -> Result<Vec<TextBlock>, ContainerError> {
        if start > blob.len() || blob.len() > u32::MAX as usize {
            return Err(ContainerError::InvalidRegion {
                start,
                end: blob.len(),
                len: blob.len(),
            });
        }

        let unit = self.padding.width();
        let mut blocks = Vec::new();
        let mut pos = start;
        while pos + PREFIX_LEN <= blob.len() {
            if blob[pos..pos + PREFIX_LEN] == SEGMENTS_END {
                debug!(at = pos, "segment stream ends");
                break;
            }
            let length = blob[pos + PREFIX_LEN - 1] as usize * unit;
            let content = pos + PREFIX_LEN;
            if content + length > blob.len() {
                return Err(ContainerError::OutOfBounds {
                    offset: content,
                    length,
                    len: blob.len(),
                });
            }
            if length > 0 {
                blocks.push(self.block(blob, content, content + length));
            }
            pos = content + length;
        }

        Ok(blocks)
    }

    fn block(&self, blob: &[u8], start: usize, end: usize) -> TextBlock {
        TextBlock::new(start, blob[start..end].to_vec())
    }
}

fn read_u32(blob: &[u8], at: usize) -> Option<u32> {
    let bytes = blob.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn assert_disjoint(blocks: &[TextBlock]) -> Result<(), ContainerError> {
    for pair in blocks.windows(2) {
        if pair[0].end() > pair[1].offset {
            return Err(ContainerError::Overlap {
                first: pair[0].offset,
                second: pair[1].offset,
            });
        }
    }
    Ok(())
}
