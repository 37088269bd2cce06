//! Rendering for the emitted atoms: string escaping, literal text,
//! builtin-value constants.

use crate::lexer::Token;

/// Produce a C# string literal that compiles to the same character
/// sequence as the VBScript literal's content
pub fn csharp_string(content: &str) -> String {
    let mut out = String::with_capacity(content.len() + 2);
    out.push('"');
    for c in content.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Numeric literal content is already normalised by the lexer
pub fn numeric_text(token: &Token) -> String {
    token.content.clone()
}

/// The text of a builtin-value token (`True`, `Null`, `vbCrLf`, ...);
/// `support` is the facade reference for the sentinel values
pub fn builtin_value_text(token: &Token, support: &str) -> String {
    match token.content.to_ascii_uppercase().as_str() {
        "TRUE" => "true".into(),
        "FALSE" => "false".into(),
        "NULL" => format!("{}.NULL", support),
        "EMPTY" => format!("{}.EMPTY", support),
        "NOTHING" => format!("{}.NOTHING", support),
        "VBCR" => "\"\\r\"".into(),
        "VBCRLF" => "\"\\r\\n\"".into(),
        "VBLF" => "\"\\n\"".into(),
        "VBTAB" => "\"\\t\"".into(),
        "VBNULLSTRING" => "\"\"".into(),
        "VBOBJECTERROR" => "-2147221504".into(),
        // the lexer only tags tokens listed in BUILTIN_VALUES with the
        // BuiltInValue kind; the arms above must cover that table
        other => unreachable!("builtin value outside BUILTIN_VALUES: {}", other),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::{Token, TokenKind};

    #[test]
    fn quotes_and_backslashes_escape() {
        assert_eq!(csharp_string("say \"hi\""), "\"say \\\"hi\\\"\"");
        assert_eq!(csharp_string("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn builtin_values() {
        let t = |content: &str| Token::new(TokenKind::BuiltInValue, content, 0);
        assert_eq!(builtin_value_text(&t("True"), "_"), "true");
        assert_eq!(builtin_value_text(&t("NULL"), "_"), "_.NULL");
        assert_eq!(builtin_value_text(&t("vbCrLf"), "_"), "\"\\r\\n\"");
    }
}
