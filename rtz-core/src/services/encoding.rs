use chardetng::EncodingDetector;
use encoding_rs::{Encoding, SHIFT_JIS, WINDOWS_1252};
use serde::Serialize;

use crate::error::FormatError;
use crate::model::token::Charset;

#[derive(Debug, Serialize)]
pub struct EncodingCandidate {
    pub name: String,
    pub charset: Option<Charset>,
    pub confidence: f32,
}

#[derive(Debug, Serialize)]
pub struct EncodingDetectionResult {
    pub best: String,
    pub charset: Option<Charset>,
    pub confidence: f32,
    pub candidates: Vec<EncodingCandidate>,
}

fn encoding_for(charset: Charset) -> Option<&'static Encoding> {
    match charset {
        Charset::ShiftJis => Some(SHIFT_JIS),
        Charset::Windows1252 => Some(WINDOWS_1252),
        Charset::Utf16Le => None,
    }
}

/// Splits `bytes` into characters, each tagged with its byte offset.
pub fn decode_chars(bytes: &[u8], charset: Charset) -> Result<Vec<(usize, char)>, FormatError> {
    match charset {
        Charset::Utf16Le => decode_utf16le(bytes),
        Charset::ShiftJis => decode_shift_jis(bytes),
        Charset::Windows1252 => decode_single_byte(bytes, WINDOWS_1252, charset),
    }
}

fn decode_utf16le(bytes: &[u8]) -> Result<Vec<(usize, char)>, FormatError> {
    if bytes.len() % 2 != 0 {
        return Err(FormatError::TruncatedUnit {
            offset: bytes.len() - 1,
        });
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    let mut out = Vec::with_capacity(units.len());
    let mut unit_index = 0usize;
    for decoded in char::decode_utf16(units.iter().copied()) {
        match decoded {
            Ok(ch) => {
                out.push((unit_index * 2, ch));
                unit_index += ch.len_utf16();
            }
            Err(_) => {
                return Err(FormatError::InvalidSequence {
                    offset: unit_index * 2,
                    charset: Charset::Utf16Le,
                })
            }
        }
    }
    Ok(out)
}

fn shift_jis_char_len(lead: u8) -> Option<usize> {
    match lead {
        0x00..=0x7F | 0xA1..=0xDF => Some(1),
        0x81..=0x9F | 0xE0..=0xFC => Some(2),
        _ => None,
    }
}

// Walks lead bytes so that trail bytes like 0x7C ('|') or 0x7B ('{') never
// surface as markup.
fn decode_shift_jis(bytes: &[u8]) -> Result<Vec<(usize, char)>, FormatError> {
    let invalid = |offset| FormatError::InvalidSequence {
        offset,
        charset: Charset::ShiftJis,
    };

    let mut out = Vec::with_capacity(bytes.len());
    let mut pos = 0usize;
    while pos < bytes.len() {
        let len = shift_jis_char_len(bytes[pos]).ok_or_else(|| invalid(pos))?;
        let end = pos + len;
        if end > bytes.len() {
            return Err(invalid(pos));
        }
        let text = SHIFT_JIS
            .decode_without_bom_handling_and_without_replacement(&bytes[pos..end])
            .ok_or_else(|| invalid(pos))?;
        let mut chars = text.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) => out.push((pos, ch)),
            _ => return Err(invalid(pos)),
        }
        pos = end;
    }
    Ok(out)
}

fn decode_single_byte(
    bytes: &[u8],
    encoding: &'static Encoding,
    charset: Charset,
) -> Result<Vec<(usize, char)>, FormatError> {
    let text = encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .ok_or(FormatError::InvalidSequence { offset: 0, charset })?;
    Ok(text.chars().enumerate().collect())
}

/// Encodes one character; false when the charset has no mapping for it.
pub fn encode_char(ch: char, charset: Charset, out: &mut Vec<u8>) -> bool {
    match encoding_for(charset) {
        None => {
            let mut buf = [0u16; 2];
            for unit in ch.encode_utf16(&mut buf) {
                out.extend_from_slice(&unit.to_le_bytes());
            }
            true
        }
        Some(encoding) => {
            let mut tmp = [0u8; 4];
            let (bytes, _, had_errors) = encoding.encode(ch.encode_utf8(&mut tmp));
            if had_errors {
                return false;
            }
            out.extend_from_slice(&bytes);
            true
        }
    }
}

/// Markup is ASCII; every supported charset can express it.
pub fn encode_ascii(text: &str, charset: Charset, out: &mut Vec<u8>) {
    for ch in text.chars() {
        encode_char(ch, charset, out);
    }
}

pub fn detect(bytes: &[u8]) -> EncodingDetectionResult {
    // The game's own containers are mostly UTF-16LE, which chardetng does not guess.
    let zero_ratio = utf16le_zero_ratio(bytes);
    if zero_ratio > 0.3 {
        let confidence = (0.5 + zero_ratio / 2.0).min(0.95);
        return EncodingDetectionResult {
            best: Charset::Utf16Le.name().into(),
            charset: Some(Charset::Utf16Le),
            confidence,
            candidates: vec![EncodingCandidate {
                name: Charset::Utf16Le.name().into(),
                charset: Some(Charset::Utf16Le),
                confidence,
            }],
        };
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);

    let encoding = detector.guess(None, true);
    let best = encoding.name().to_lowercase();
    let confidence = estimate_confidence(bytes, encoding);
    let charset = Charset::from_label(&best);

    let mut candidates = vec![EncodingCandidate {
        name: best.clone(),
        charset,
        confidence,
    }];

    if best == "shift_jis" {
        candidates.push(EncodingCandidate {
            name: "windows-31j".into(),
            charset: Some(Charset::ShiftJis),
            confidence: (confidence - 0.03).max(0.0),
        });
    }

    if charset != Some(Charset::Utf16Le) {
        candidates.push(EncodingCandidate {
            name: Charset::Utf16Le.name().into(),
            charset: Some(Charset::Utf16Le),
            confidence: zero_ratio,
        });
    }

    EncodingDetectionResult {
        best,
        charset,
        confidence,
        candidates,
    }
}

fn utf16le_zero_ratio(bytes: &[u8]) -> f32 {
    let odd = bytes.iter().skip(1).step_by(2).count();
    if odd < 8 {
        return 0.0;
    }
    let zeros = bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
    zeros as f32 / odd as f32
}

fn estimate_confidence(bytes: &[u8], encoding: &'static Encoding) -> f32 {
    let (text, _, had_errors) = encoding.decode(bytes);

    if had_errors {
        return 0.35;
    }

    let len = text.len();
    if len < 64 {
        0.55
    } else if len < 512 {
        0.70
    } else if len < 4096 {
        0.82
    } else {
        0.90
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_jis_trail_byte_is_not_a_pipe() {
        // ポ = 0x83 0x7C; the trail byte is ASCII '|'
        let chars = decode_chars(&[0x83, 0x7C, b'|'], Charset::ShiftJis).unwrap();
        assert_eq!(chars, vec![(0, 'ポ'), (2, '|')]);
    }

    #[test]
    fn shift_jis_rejects_lone_lead_byte() {
        let err = decode_chars(&[b'a', 0x82], Charset::ShiftJis).unwrap_err();
        assert_eq!(
            err,
            FormatError::InvalidSequence {
                offset: 1,
                charset: Charset::ShiftJis
            }
        );
    }

    #[test]
    fn utf16le_offsets_count_bytes() {
        let bytes: Vec<u8> = "aア".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        let chars = decode_chars(&bytes, Charset::Utf16Le).unwrap();
        assert_eq!(chars, vec![(0, 'a'), (2, 'ア')]);
        assert!(matches!(
            decode_chars(&bytes[..3], Charset::Utf16Le),
            Err(FormatError::TruncatedUnit { offset: 2 })
        ));
    }

    #[test]
    fn windows_1252_has_no_kana() {
        let mut out = Vec::new();
        assert!(encode_char('é', Charset::Windows1252, &mut out));
        assert_eq!(out, vec![0xE9]);
        assert!(!encode_char('ア', Charset::Windows1252, &mut out));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn detect_prefers_utf16_for_zero_heavy_data() {
        let bytes: Vec<u8> = "Vanguard attack phase"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let result = detect(&bytes);
        assert_eq!(result.charset, Some(Charset::Utf16Le));
    }
}
