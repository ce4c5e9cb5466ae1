use crate::model::token::{trim_terminators, Token};
use crate::parsers::markup;

/// Comparison key for a source string. Markup is kept, so two entries only
/// share a key when a target written for one is valid for the other.
pub fn normalize_tokens(tokens: &[Token]) -> String {
    normalize(&markup::print(trim_terminators(tokens)))
}

pub fn normalize(text: &str) -> String {
    let s = text.replace('\u{3000}', " ").to_lowercase();
    let mut s = s.split_whitespace().collect::<Vec<_>>().join(" ");

    for ch in ['“', '”', '’', '‘', '"', '\'', '「', '」', '『', '』'] {
        s = s.replace(ch, "");
    }

    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::token::Charset;

    #[test]
    fn quotes_and_wide_spaces_fold() {
        assert_eq!(normalize("「ライド！」\u{3000} スタンドアップ"), "ライド！ スタンドアップ");
        assert_eq!(normalize("  Stand  UP "), "stand up");
    }

    #[test]
    fn trailing_terminators_do_not_change_the_key() {
        let a = vec![Token::literal("ドロー", Charset::ShiftJis), Token::Terminator];
        let b = vec![Token::literal("ドロー", Charset::ShiftJis)];
        assert_eq!(normalize_tokens(&a), normalize_tokens(&b));

        let ruby = vec![Token::ruby("先導者", "ヴァンガード")];
        assert_ne!(normalize_tokens(&ruby), normalize("先導者"));
    }
}
