use std::sync::OnceLock;

use regex::Regex;

use crate::error::SyntaxError;
use crate::model::token::{push_text, Charset, Token};

// Human-editable form of a token sequence, as used in ledger rows:
//
//   <|base|reading|>   ruby
//   {$RRGGBB}          color, {$} resets
//   \n                 line break
//   \0                 terminator
//   \\  \<  \{         literal backslash, '<', '{'
//
// A real newline character is also read as a line break.

fn color_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{\$([0-9A-Fa-f]{6})?\}").expect("static regex"))
}

pub fn parse(text: &str, charset: Charset) -> Result<Vec<Token>, SyntaxError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut i = 0usize;

    macro_rules! flush {
        () => {{
            push_text(&mut tokens, &literal, charset);
            literal.clear();
        }};
    }

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match (c, next) {
            ('\\', Some('n')) => {
                flush!();
                tokens.push(Token::LineBreak);
                i += 2;
            }
            ('\\', Some('0')) => {
                flush!();
                tokens.push(Token::Terminator);
                i += 2;
            }
            ('\\', Some(e @ ('\\' | '<' | '{'))) => {
                literal.push(e);
                i += 2;
            }
            ('\\', Some(other)) => return Err(SyntaxError::UnknownEscape { pos: i, ch: other }),
            ('\\', None) => return Err(SyntaxError::DanglingEscape),
            ('\n', _) => {
                flush!();
                tokens.push(Token::LineBreak);
                i += 1;
            }
            ('\r', Some('\n')) => i += 1,
            ('<', Some('|')) => {
                flush!();
                let (token, used) = parse_ruby(&chars[i..], i)?;
                tokens.push(token);
                i += used;
            }
            ('{', Some('$')) => {
                flush!();
                let rest: String = chars[i..chars.len().min(i + 9)].iter().collect();
                let caps = color_re()
                    .captures(&rest)
                    .ok_or(SyntaxError::MalformedColor { pos: i })?;
                match caps.get(1) {
                    Some(hex) => {
                        let value = u32::from_str_radix(hex.as_str(), 16)
                            .map_err(|_| SyntaxError::MalformedColor { pos: i })?;
                        tokens.push(Token::ColorCode { value });
                        i += 9;
                    }
                    None => {
                        tokens.push(Token::ColorReset);
                        i += 3;
                    }
                }
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }

    flush!();
    Ok(tokens)
}

fn parse_ruby(chars: &[char], pos: usize) -> Result<(Token, usize), SyntaxError> {
    let mut i = 2usize;

    let mut base = String::new();
    loop {
        match chars.get(i) {
            None => return Err(SyntaxError::UnterminatedRuby { pos }),
            Some('|') if chars.get(i + 1) == Some(&'>') => {
                return Err(SyntaxError::MissingReading { pos })
            }
            Some('|') => {
                i += 1;
                break;
            }
            Some(&c) if ruby_char_ok(chars, i, c) => {
                base.push(c);
                i += 1;
            }
            Some(_) => return Err(SyntaxError::InvalidRuby { pos: pos + i }),
        }
    }

    let mut reading = String::new();
    loop {
        match chars.get(i) {
            None => return Err(SyntaxError::UnterminatedRuby { pos }),
            Some('|') if chars.get(i + 1) == Some(&'>') => {
                i += 2;
                break;
            }
            Some(&c) if c != '|' && ruby_char_ok(chars, i, c) => {
                reading.push(c);
                i += 1;
            }
            Some(_) => return Err(SyntaxError::InvalidRuby { pos: pos + i }),
        }
    }

    if base.is_empty() || reading.is_empty() {
        return Err(SyntaxError::InvalidRuby { pos });
    }

    Ok((Token::Ruby { base, reading }, i))
}

fn ruby_char_ok(chars: &[char], i: usize, c: char) -> bool {
    let next = chars.get(i + 1).copied();
    !((c.is_control() && c != '\t')
        || (c == '<' && next == Some('|'))
        || (c == '{' && next == Some('$')))
}

pub fn print(tokens: &[Token]) -> String {
    let mut out = String::new();

    for t in tokens {
        match t {
            Token::Literal { text, .. } => {
                let mut chars = text.chars().peekable();
                while let Some(c) = chars.next() {
                    let next = chars.peek().copied();
                    match c {
                        '\\' => out.push_str("\\\\"),
                        '<' if next == Some('|') => out.push_str("\\<"),
                        '{' if next == Some('$') => out.push_str("\\{"),
                        '\n' => out.push_str("\\n"),
                        '\0' => out.push_str("\\0"),
                        _ => out.push(c),
                    }
                }
            }
            Token::Ruby { base, reading } => {
                out.push_str("<|");
                out.push_str(base);
                out.push('|');
                out.push_str(reading);
                out.push_str("|>");
            }
            Token::ColorCode { value } => out.push_str(&format!("{{${value:06X}}}")),
            Token::ColorReset => out.push_str("{$}"),
            Token::LineBreak => out.push_str("\\n"),
            Token::Terminator => out.push_str("\\0"),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SJ: Charset = Charset::ShiftJis;

    #[test]
    fn parses_the_spreadsheet_forms() {
        let tokens = parse("<|ヴァンガード|バンガード|>{$336600}にライド！\\n{$}次へ\\0", SJ).unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::ruby("ヴァンガード", "バンガード"),
                Token::color(0x336600),
                Token::literal("にライド！", SJ),
                Token::LineBreak,
                Token::ColorReset,
                Token::literal("次へ", SJ),
                Token::Terminator,
            ]
        );
    }

    #[test]
    fn unterminated_ruby_is_an_error() {
        assert_eq!(
            parse("ok <|ヴァンガード|バンガード", SJ),
            Err(SyntaxError::UnterminatedRuby { pos: 3 })
        );
        assert_eq!(
            parse("<|ヴァンガード|>", SJ),
            Err(SyntaxError::MissingReading { pos: 0 })
        );
    }

    #[test]
    fn bad_color_and_escape() {
        assert_eq!(parse("{$3366}", SJ), Err(SyntaxError::MalformedColor { pos: 0 }));
        assert_eq!(parse("a\\q", SJ), Err(SyntaxError::UnknownEscape { pos: 1, ch: 'q' }));
        assert_eq!(parse("a\\", SJ), Err(SyntaxError::DanglingEscape));
    }

    #[test]
    fn color_inside_ruby_is_rejected() {
        assert!(matches!(
            parse("<|先導者|{$336600}よみ|>", SJ),
            Err(SyntaxError::InvalidRuby { .. })
        ));
    }

    #[test]
    fn escaped_markup_survives_printing() {
        let tokens = vec![
            Token::literal("a<|b {$ c\\d", Charset::Windows1252),
            Token::LineBreak,
        ];
        let text = print(&tokens);
        assert_eq!(text, "a\\<|b \\{$ c\\\\d\\n");
        assert_eq!(parse(&text, Charset::Windows1252).unwrap(), tokens);
    }

    #[test]
    fn real_newlines_read_as_line_breaks() {
        let tokens = parse("one\r\ntwo\nthree", Charset::Windows1252).unwrap();
        assert_eq!(crate::model::token::line_breaks(&tokens), 2);
        assert_eq!(print(&tokens), "one\\ntwo\\nthree");
    }
}
