use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Charset {
    #[default]
    #[serde(rename = "shift_jis", alias = "shift-jis", alias = "sjis", alias = "cp932")]
    ShiftJis,

    #[serde(rename = "utf-16le", alias = "utf16le", alias = "utf-16")]
    Utf16Le,

    #[serde(rename = "windows-1252", alias = "cp1252", alias = "latin1")]
    Windows1252,
}

impl Charset {
    /// Width in bytes of one code unit; padding and scanning work in units.
    pub fn unit_width(self) -> usize {
        match self {
            Charset::Utf16Le => 2,
            Charset::ShiftJis | Charset::Windows1252 => 1,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Charset::ShiftJis => "shift_jis",
            Charset::Utf16Le => "utf-16le",
            Charset::Windows1252 => "windows-1252",
        }
    }

    pub fn from_label(label: &str) -> Option<Charset> {
        match label.trim().to_ascii_lowercase().as_str() {
            "shift_jis" | "shift-jis" | "sjis" | "cp932" | "windows-31j" => Some(Charset::ShiftJis),
            "utf-16le" | "utf16le" | "utf-16" => Some(Charset::Utf16Le),
            "windows-1252" | "cp1252" | "latin1" => Some(Charset::Windows1252),
            _ => None,
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One element of displayable game text.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Token {
    Literal { text: String, charset: Charset },
    Ruby { base: String, reading: String },
    ColorCode { value: u32 },
    ColorReset,
    LineBreak,
    Terminator,
}

impl Token {
    pub fn literal(text: impl Into<String>, charset: Charset) -> Token {
        Token::Literal {
            text: text.into(),
            charset,
        }
    }

    pub fn ruby(base: impl Into<String>, reading: impl Into<String>) -> Token {
        Token::Ruby {
            base: base.into(),
            reading: reading.into(),
        }
    }

    pub fn color(value: u32) -> Token {
        Token::ColorCode { value }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(self, Token::Terminator)
    }
}

/// Appends `text` to a trailing literal of the same charset, or starts a new one.
pub fn push_text(tokens: &mut Vec<Token>, text: &str, charset: Charset) {
    if text.is_empty() {
        return;
    }
    if let Some(Token::Literal { text: last, charset: c }) = tokens.last_mut() {
        if *c == charset {
            last.push_str(text);
            return;
        }
    }
    tokens.push(Token::literal(text, charset));
}

/// Drops empty literals and merges adjacent literals of one charset.
pub fn canonicalize(tokens: Vec<Token>) -> Vec<Token> {
    let mut out = Vec::with_capacity(tokens.len());
    for t in tokens {
        match t {
            Token::Literal { text, charset } => push_text(&mut out, &text, charset),
            other => out.push(other),
        }
    }
    out
}

pub fn is_canonical(tokens: &[Token]) -> bool {
    tokens.iter().enumerate().all(|(i, t)| match t {
        Token::Literal { text, charset } => {
            if text.is_empty() {
                return false;
            }
            !matches!(
                i.checked_sub(1).and_then(|p| tokens.get(p)),
                Some(Token::Literal { charset: prev, .. }) if prev == charset
            )
        }
        _ => true,
    })
}

/// Content view of a sequence: trailing terminators are structural and may
/// coincide with zero padding.
pub fn trim_terminators(tokens: &[Token]) -> &[Token] {
    let mut end = tokens.len();
    while end > 0 && tokens[end - 1].is_terminator() {
        end -= 1;
    }
    &tokens[..end]
}

pub fn line_breaks(tokens: &[Token]) -> usize {
    tokens.iter().filter(|t| matches!(t, Token::LineBreak)).count()
}

/// Plain text as displayed: ruby collapses to its base, markup disappears.
pub fn display_text(tokens: &[Token]) -> String {
    let mut out = String::new();
    for t in tokens {
        match t {
            Token::Literal { text, .. } => out.push_str(text),
            Token::Ruby { base, .. } => out.push_str(base),
            Token::LineBreak => out.push('\n'),
            Token::ColorCode { .. } | Token::ColorReset | Token::Terminator => {}
        }
    }
    out
}
