//! Binary text codec.
//!
//! Escape forms, expressed in code units of the block's charset:
//!
//! | token        | bytes                      |
//! |--------------|----------------------------|
//! | ruby         | `<|` base `|` reading `|>` |
//! | color        | `{$` RRGGBB `}`            |
//! | color reset  | `{$}`                      |
//! | line break   | U+000A                     |
//! | terminator   | U+0000                     |
//!
//! Everything else is literal text.

use crate::error::{EncodingError, EncodingIssue, FormatError};
use crate::model::block::{Padding, TextBlock};
use crate::model::project::ContainerProfile;
use crate::model::token::{push_text, Charset, Token};
use crate::services::encoding::{decode_chars, encode_ascii, encode_char};

const RUBY_OPEN: &str = "<|";
const RUBY_SEP: char = '|';
const RUBY_CLOSE: &str = "|>";
const COLOR_OPEN: &str = "{$";
const COLOR_CLOSE: char = '}';
const COLOR_DIGITS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codec {
    charset: Charset,
    padding: Padding,
}

impl Codec {
    /// Codec whose blocks are padded with zero units.
    pub fn new(charset: Charset) -> Self {
        Codec::with_padding(charset, Padding::repeated(0, charset.unit_width()))
    }

    pub fn with_padding(charset: Charset, padding: Padding) -> Self {
        Codec { charset, padding }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn padding(&self) -> &Padding {
        &self.padding
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Vec<Token>, FormatError> {
        let chars = decode_chars(bytes, self.charset)?;
        Scanner {
            chars: &chars,
            pos: 0,
            charset: self.charset,
        }
        .run()
    }

    /// Decodes the block content, ignoring its trailing padding.
    pub fn decode_block(&self, block: &TextBlock) -> Result<Vec<Token>, FormatError> {
        self.decode(block.content(&self.padding))
    }

    /// Decodes a raw slot the way [`Codec::decode_block`] would.
    pub fn decode_slot(&self, slot: &[u8]) -> Result<Vec<Token>, FormatError> {
        self.decode(&slot[..self.padding.content_length(slot)])
    }

    pub fn encode(&self, tokens: &[Token]) -> Result<Vec<u8>, EncodingError> {
        let charset = self.charset;
        let mut out = Vec::new();
        let mut issues = Vec::new();

        for (index, token) in tokens.iter().enumerate() {
            match token {
                Token::Literal { text, charset: c } => {
                    if *c != charset {
                        issues.push(EncodingIssue::CharsetMismatch {
                            token: index,
                            found: *c,
                        });
                        continue;
                    }
                    if let Some(sequence) = reserved_in_literal(text) {
                        issues.push(EncodingIssue::Reserved {
                            token: index,
                            sequence,
                        });
                        continue;
                    }
                    encode_text(text, charset, index, &mut out, &mut issues);
                }
                Token::Ruby { base, reading } => {
                    // `|>` right after the base would close the ruby early
                    if !valid_ruby_part(base) || !valid_ruby_part(reading) || reading.starts_with('>') {
                        issues.push(EncodingIssue::InvalidRuby { token: index });
                        continue;
                    }
                    encode_ascii(RUBY_OPEN, charset, &mut out);
                    encode_text(base, charset, index, &mut out, &mut issues);
                    encode_ascii("|", charset, &mut out);
                    encode_text(reading, charset, index, &mut out, &mut issues);
                    encode_ascii(RUBY_CLOSE, charset, &mut out);
                }
                Token::ColorCode { value } => {
                    if *value > 0xFF_FFFF {
                        issues.push(EncodingIssue::InvalidColor {
                            token: index,
                            value: *value,
                        });
                        continue;
                    }
                    encode_ascii(&format!("{COLOR_OPEN}{value:06X}{COLOR_CLOSE}"), charset, &mut out);
                }
                Token::ColorReset => encode_ascii("{$}", charset, &mut out),
                Token::LineBreak => encode_ascii("\n", charset, &mut out),
                Token::Terminator => encode_ascii("\0", charset, &mut out),
            }
        }

        if issues.is_empty() {
            Ok(out)
        } else {
            Err(EncodingError { charset, issues })
        }
    }
}

/// Pad unit for one side of `profile`: `pad_char` in that charset when set,
/// otherwise `pad_byte` repeated over a code unit.
pub fn padding_for(profile: &ContainerProfile, charset: Charset) -> Result<Padding, String> {
    let width = charset.unit_width();
    let Some(ch) = profile.pad_char else {
        return Ok(Padding::repeated(profile.pad_byte, width));
    };
    let mut unit = Vec::with_capacity(width);
    if !encode_char(ch, charset, &mut unit) {
        return Err(format!("pad_char {ch:?} has no {charset} encoding"));
    }
    if unit.len() != width {
        return Err(format!(
            "pad_char {ch:?} takes {} bytes in {charset}, a code unit is {width}",
            unit.len()
        ));
    }
    Ok(Padding::from_unit(unit))
}

/// Source and target codecs of `profile`.
pub fn codecs(profile: &ContainerProfile) -> Result<(Codec, Codec), String> {
    let source = Codec::with_padding(profile.source_charset, padding_for(profile, profile.source_charset)?);
    let target = Codec::with_padding(profile.target_charset, padding_for(profile, profile.target_charset)?);

    // Scanning the patched blob must find the same boundaries.
    if profile.layout_is_scan() && source.padding() != target.padding() {
        return Err(format!(
            "scan mode needs one pad unit, got {:02X?} in {} and {:02X?} in {}",
            source.padding().unit(),
            profile.source_charset,
            target.padding().unit(),
            profile.target_charset
        ));
    }
    Ok((source, target))
}

fn encode_text(
    text: &str,
    charset: Charset,
    token: usize,
    out: &mut Vec<u8>,
    issues: &mut Vec<EncodingIssue>,
) {
    for (position, ch) in text.chars().enumerate() {
        if !encode_char(ch, charset, out) {
            issues.push(EncodingIssue::Unrepresentable { token, position, ch });
        }
    }
}

fn is_forbidden_control(ch: char) -> bool {
    ch.is_control() && ch != '\t'
}

fn reserved_in_literal(text: &str) -> Option<String> {
    if text.contains(RUBY_OPEN) {
        return Some(RUBY_OPEN.into());
    }
    if text.contains(COLOR_OPEN) {
        return Some(COLOR_OPEN.into());
    }
    text.chars()
        .find(|&c| is_forbidden_control(c))
        .map(|c| c.escape_unicode().to_string())
}

fn valid_ruby_part(part: &str) -> bool {
    !part.is_empty()
        && !part.contains(RUBY_SEP)
        && !part.contains(COLOR_OPEN)
        && !part.contains(RUBY_OPEN)
        && !part.ends_with('<')
        && !part.chars().any(is_forbidden_control)
}

struct Scanner<'a> {
    chars: &'a [(usize, char)],
    pos: usize,
    charset: Charset,
}

impl Scanner<'_> {
    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars.get(self.pos).map(|&(o, _)| o).unwrap_or(0)
    }

    fn at(&self, marker: &str) -> bool {
        marker
            .chars()
            .enumerate()
            .all(|(i, m)| self.peek(i) == Some(m))
    }

    fn run(mut self) -> Result<Vec<Token>, FormatError> {
        let mut tokens = Vec::new();
        let mut literal = String::new();

        while let Some(ch) = self.peek(0) {
            if ch == '\0' || ch == '\n' || self.at(RUBY_OPEN) || self.at(COLOR_OPEN) {
                push_text(&mut tokens, &literal, self.charset);
                literal.clear();
            }

            if ch == '\0' {
                tokens.push(Token::Terminator);
                self.pos += 1;
            } else if ch == '\n' {
                tokens.push(Token::LineBreak);
                self.pos += 1;
            } else if self.at(RUBY_OPEN) {
                tokens.push(self.ruby()?);
            } else if self.at(COLOR_OPEN) {
                tokens.push(self.color()?);
            } else if is_forbidden_control(ch) {
                return Err(FormatError::UnexpectedControl {
                    offset: self.offset(),
                    code: ch as u32,
                });
            } else {
                literal.push(ch);
                self.pos += 1;
            }
        }

        push_text(&mut tokens, &literal, self.charset);
        Ok(tokens)
    }

    fn ruby(&mut self) -> Result<Token, FormatError> {
        let err = FormatError::MalformedRuby {
            offset: self.offset(),
        };
        self.pos += RUBY_OPEN.len();

        let mut base = String::new();
        loop {
            match self.peek(0) {
                Some(RUBY_SEP) if self.peek(1) != Some('>') => {
                    self.pos += 1;
                    break;
                }
                Some(c) if c != RUBY_SEP && self.ruby_char_ok(c) => {
                    base.push(c);
                    self.pos += 1;
                }
                _ => return Err(err),
            }
        }

        let mut reading = String::new();
        loop {
            if self.at(RUBY_CLOSE) {
                self.pos += RUBY_CLOSE.len();
                break;
            }
            match self.peek(0) {
                Some(c) if c != RUBY_SEP && self.ruby_char_ok(c) => {
                    reading.push(c);
                    self.pos += 1;
                }
                _ => return Err(err),
            }
        }

        if base.is_empty() || reading.is_empty() {
            return Err(err);
        }
        Ok(Token::Ruby { base, reading })
    }

    fn ruby_char_ok(&self, c: char) -> bool {
        !is_forbidden_control(c) && !self.at(RUBY_OPEN) && !self.at(COLOR_OPEN)
    }

    fn color(&mut self) -> Result<Token, FormatError> {
        let err = FormatError::MalformedColor {
            offset: self.offset(),
        };
        self.pos += COLOR_OPEN.len();

        let mut digits = String::new();
        loop {
            match self.peek(0) {
                Some(COLOR_CLOSE) => {
                    self.pos += 1;
                    break;
                }
                Some(c) if c.is_ascii_hexdigit() && digits.len() < COLOR_DIGITS => {
                    digits.push(c);
                    self.pos += 1;
                }
                _ => return Err(err),
            }
        }

        match digits.len() {
            0 => Ok(Token::ColorReset),
            COLOR_DIGITS => u32::from_str_radix(&digits, 16)
                .map(|value| Token::ColorCode { value })
                .map_err(|_| err),
            _ => Err(err),
        }
    }
}
