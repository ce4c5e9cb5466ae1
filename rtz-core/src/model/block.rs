use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identity of a block: its byte offset in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn offset(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl FromStr for BlockId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let hex = t
            .strip_prefix("0x")
            .or_else(|| t.strip_prefix("0X"))
            .ok_or_else(|| format!("block id {t:?} must start with 0x"))?;
        u32::from_str_radix(hex, 16)
            .map(BlockId)
            .map_err(|e| format!("block id {t:?}: {e}"))
    }
}

impl Serialize for BlockId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for BlockId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Fixed-offset, fixed-length region holding encoded strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    pub id: BlockId,
    pub offset: usize,
    /// Hard upper bound for replacement content.
    pub allocated_length: usize,
    /// The whole allocated range, padding included.
    pub raw_bytes: Vec<u8>,
}

impl TextBlock {
    pub fn new(offset: usize, raw_bytes: Vec<u8>) -> TextBlock {
        TextBlock {
            id: BlockId(offset as u32),
            offset,
            allocated_length: raw_bytes.len(),
            raw_bytes,
        }
    }

    /// Bytes before the trailing run of `padding`.
    pub fn content(&self, padding: &Padding) -> &[u8] {
        &self.raw_bytes[..padding.content_length(&self.raw_bytes)]
    }

    pub fn end(&self) -> usize {
        self.offset + self.allocated_length
    }
}

/// Fill pattern behind a string: one code unit, repeated. A length that is
/// not a whole number of units ends in a prefix of the unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Padding {
    unit: Vec<u8>,
}

impl Padding {
    pub fn repeated(byte: u8, width: usize) -> Padding {
        Padding {
            unit: vec![byte; width.max(1)],
        }
    }

    pub fn from_unit(unit: Vec<u8>) -> Padding {
        if unit.is_empty() {
            return Padding::repeated(0, 1);
        }
        Padding { unit }
    }

    pub fn unit(&self) -> &[u8] {
        &self.unit
    }

    pub fn width(&self) -> usize {
        self.unit.len()
    }

    /// Zero padding cannot be told apart from a terminator.
    pub fn is_zero(&self) -> bool {
        self.unit.iter().all(|&b| b == 0)
    }

    pub fn is_unit(&self, bytes: &[u8]) -> bool {
        bytes == &self.unit[..]
    }

    /// Extends `out` to `len` bytes.
    pub fn fill(&self, out: &mut Vec<u8>, len: usize) {
        let units = self.unit.iter().copied().cycle();
        let missing = len.saturating_sub(out.len());
        out.extend(units.take(missing));
    }

    /// Length of `bytes` once trailing pad units are removed. An unaligned
    /// tail counts as padding only when it is a prefix of the unit.
    pub fn content_length(&self, bytes: &[u8]) -> usize {
        let width = self.width();
        let mut end = bytes.len();
        let tail = end % width;
        if tail != 0 {
            if bytes[end - tail..] == self.unit[..tail] {
                end -= tail;
            } else {
                return end;
            }
        }
        while end >= width && self.is_unit(&bytes[end - width..end]) {
            end -= width;
        }
        end
    }
}
