//! Token-combining normalisations that run before expression parsing:
//! adjacent sign folding, elided-unary-plus literal wrapping, and the
//! merging of comparison operators that arrived split (`>` `=` is one
//! `>=`). The whole pass is idempotent.

use crate::lexer::{Token, TokenKind};

pub fn combine(mut tokens: Vec<Token>) -> Vec<Token> {
    loop {
        let before = tokens.len();
        tokens = fold_adjacent_signs(tokens);
        tokens = merge_split_comparisons(tokens);
        if tokens.len() == before {
            break;
        }
    }
    resolve_unary_plus(tokens)
}

fn is_sign(token: &Token) -> bool {
    token.is_operator("+") || token.is_operator("-")
}

/// `+ -` is `-`, `- -` is `+`, and so on; the second operator of the
/// pair is necessarily unary, so the pair always denotes one sign
fn fold_adjacent_signs(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        match out.last() {
            Some(prev) if is_sign(prev) && is_sign(&token) => {
                let negative = (prev.content == "-") != (token.content == "-");
                let line = prev.line;
                out.pop();
                out.push(Token::new(
                    TokenKind::Operator,
                    if negative { "-" } else { "+" },
                    line,
                ));
            }
            _ => out.push(token),
        }
    }
    out
}

fn merge_split_comparisons(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    for token in tokens {
        let merged = match out.last() {
            Some(prev) if prev.kind == TokenKind::ComparisonOperator => {
                match (prev.content.as_str(), token.content.as_str()) {
                    (">", "=") if token.kind == TokenKind::ComparisonOperator => Some(">="),
                    ("<", "=") if token.kind == TokenKind::ComparisonOperator => Some("<="),
                    ("<", ">") if token.kind == TokenKind::ComparisonOperator => Some("<>"),
                    _ => None,
                }
            }
            _ => None,
        };
        match merged {
            Some(symbol) => {
                let line = out.last().unwrap().line;
                out.pop();
                out.push(Token::new(TokenKind::ComparisonOperator, symbol, line));
            }
            None => out.push(token),
        }
    }
    out
}

/// A token is in unary position at the start of a run or after another
/// operator, an opening brace or an argument separator
fn at_unary_position(out: &[Token]) -> bool {
    match out.last() {
        None => true,
        Some(prev) => matches!(
            prev.kind,
            TokenKind::Operator
                | TokenKind::ComparisonOperator
                | TokenKind::OpenBrace
                | TokenKind::ArgumentSeparator
        ),
    }
}

/// Unary `+` is a no-op, but eliding one in front of a numeric literal
/// would leave a literal where the original had an expression; the
/// literal is wrapped in a value-preserving `CSng` call so that nothing
/// downstream treats it as hard-typed
fn resolve_unary_plus(tokens: Vec<Token>) -> Vec<Token> {
    let mut out: Vec<Token> = Vec::with_capacity(tokens.len());
    let mut pending_plus: Option<Token> = None;
    for token in tokens {
        if let Some(plus) = pending_plus.take() {
            if token.kind == TokenKind::NumericLiteral {
                out.push(Token::new(TokenKind::BuiltInFunction, "CSng", plus.line));
                out.push(Token::new(TokenKind::OpenBrace, "(", plus.line));
                out.push(token);
                out.push(Token::new(TokenKind::CloseBrace, ")", plus.line));
                continue;
            }
            // any other operand: the unary plus simply drops
            out.push(token);
            continue;
        }
        if token.is_operator("+") && at_unary_position(&out) {
            pending_plus = Some(token);
            continue;
        }
        out.push(token);
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::tokenize;

    fn run(source: &str) -> Vec<Token> {
        let tokens: Vec<Token> = tokenize(source)
            .unwrap()
            .into_iter()
            .filter(|t| {
                !matches!(t.kind, TokenKind::Whitespace | TokenKind::EndOfStatement)
            })
            .collect();
        combine(tokens)
    }

    fn text(tokens: &[Token]) -> String {
        tokens
            .iter()
            .map(|t| t.content.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn unary_sign_folds_into_the_binary_operator() {
        assert_eq!(text(&run("1 + - 1")), "1 - 1");
        assert_eq!(text(&run("1 - - 1")), "1 + 1");
        assert_eq!(text(&run("1 - + 1")), "1 - 1");
    }

    #[test]
    fn elided_unary_plus_wraps_the_literal() {
        assert_eq!(text(&run("1 * + 1")), "1 * CSng ( 1 )");
    }

    #[test]
    fn split_comparisons_merge() {
        assert_eq!(text(&run("2 > = 1")), "2 >= 1");
        assert_eq!(text(&run("2 < = 1")), "2 <= 1");
        assert_eq!(text(&run("2 < > 1")), "2 <> 1");
    }

    #[test]
    fn sign_runs_collapse() {
        assert_eq!(text(&run("1 - - - 1")), "1 - 1");
    }

    #[test]
    fn unary_plus_before_a_name_just_drops() {
        assert_eq!(text(&run("+ x")), "x");
    }

    #[test]
    fn combine_is_idempotent() {
        for source in ["1 + - 1", "2 > = 1", "1 * + 1", "a & b", "- x"] {
            let once = run(source);
            let twice = combine(once.clone());
            assert_eq!(once, twice);
        }
    }
}
