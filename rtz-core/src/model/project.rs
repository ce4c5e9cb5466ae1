use serde::{Deserialize, Serialize};

use crate::model::entry::ContextTag;
use crate::model::token::Charset;
use crate::services::codec::codecs;

fn default_source_charset() -> Charset {
    Charset::ShiftJis
}

fn default_target_charset() -> Charset {
    Charset::Windows1252
}

fn default_parallel() -> bool {
    true
}

/// Location of a `(u32 offset, u32 length)` record table inside the container.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BlockTable {
    pub offset: usize,

    /// When absent, a little-endian u32 record count precedes the records.
    #[serde(default)]
    pub count: Option<u32>,
}

/// Run of strings, each behind a 5-byte prefix whose last byte is the
/// string's length in code units. The run ends at `FF FF FF FF 00`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SegmentStream {
    #[serde(default)]
    pub start: usize,
}

/// Byte range scanned for terminator-delimited strings.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanRegion {
    #[serde(default)]
    pub start: usize,

    #[serde(default)]
    pub end: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContainerProfile {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub project_path: String,

    #[serde(default = "default_source_charset", alias = "source_encoding")]
    pub source_charset: Charset,

    #[serde(default = "default_target_charset", alias = "target_encoding")]
    pub target_charset: Charset,

    #[serde(default)]
    pub pad_byte: u8,

    /// Fill character, encoded in each side's charset. Overrides `pad_byte`.
    #[serde(default)]
    pub pad_char: Option<char>,

    #[serde(default)]
    pub allow_truncation: bool,

    #[serde(default)]
    pub table: Option<BlockTable>,

    #[serde(default)]
    pub scan_region: Option<ScanRegion>,

    #[serde(default)]
    pub segments: Option<SegmentStream>,

    #[serde(default)]
    pub default_context: Option<ContextTag>,

    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for ContainerProfile {
    fn default() -> Self {
        ContainerProfile {
            name: String::new(),
            project_path: String::new(),
            source_charset: default_source_charset(),
            target_charset: default_target_charset(),
            pad_byte: 0,
            pad_char: None,
            allow_truncation: false,
            table: None,
            scan_region: None,
            segments: None,
            default_context: None,
            parallel: default_parallel(),
        }
    }
}

impl ContainerProfile {
    /// Neither a table nor a segment stream: blocks are found by scanning.
    pub fn layout_is_scan(&self) -> bool {
        self.table.is_none() && self.segments.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        let layouts = [self.table.is_some(), self.scan_region.is_some(), self.segments.is_some()];
        if layouts.iter().filter(|&&set| set).count() > 1 {
            return Err("table, scan_region and segments are mutually exclusive".into());
        }

        // Scanning the patched blob must find the same boundaries.
        if self.layout_is_scan()
            && self.source_charset.unit_width() != self.target_charset.unit_width()
        {
            return Err(format!(
                "scan mode needs equal unit widths, got {} and {}",
                self.source_charset, self.target_charset
            ));
        }

        if let Some(region) = self.scan_region {
            if let Some(end) = region.end {
                if end < region.start {
                    return Err(format!("scan_region end {end} is before start {}", region.start));
                }
            }
        }

        codecs(self).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let p: ContainerProfile = serde_json::from_str(r#"{ "name": "tuto_001" }"#).unwrap();
        assert_eq!(p.source_charset, Charset::ShiftJis);
        assert_eq!(p.target_charset, Charset::Windows1252);
        assert_eq!(p.pad_byte, 0);
        assert!(!p.allow_truncation);
        assert!(p.parallel);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn scan_mode_rejects_mixed_unit_widths() {
        let p = ContainerProfile {
            source_charset: Charset::Utf16Le,
            ..ContainerProfile::default()
        };
        assert!(p.validate().is_err());

        let with_table = ContainerProfile {
            table: Some(BlockTable { offset: 0, count: None }),
            ..p
        };
        assert!(with_table.validate().is_ok());
    }

    #[test]
    fn only_one_layout_may_be_given() {
        let p: ContainerProfile = serde_json::from_str(
            r#"{ "source_charset": "utf-16le", "target_charset": "utf-16le", "pad_char": " ", "segments": { "start": 16 } }"#,
        )
        .unwrap();
        assert_eq!(p.segments, Some(SegmentStream { start: 16 }));
        assert_eq!(p.pad_char, Some(' '));
        assert!(!p.layout_is_scan());
        assert!(p.validate().is_ok());

        let both = ContainerProfile {
            table: Some(BlockTable { offset: 0, count: None }),
            ..p
        };
        assert!(both.validate().is_err());
    }
}
