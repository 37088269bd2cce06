//! Stage-1 tokenizer: raw VBScript characters to a flat token stream.
//!
//! The lexer is deliberately dumb about grammar. It only knows enough
//! context to keep statements together (newlines inside brackets, `_`
//! continuations) and to tell a decimal point from a member accessor in
//! the clear-cut cases; everything ambiguous is tagged
//! `MemberAccessorOrDecimalPoint` and left for the stage-1 parser.

pub mod token;

pub use self::token::{classify_identifier, Token, TokenKind};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("line {}: {}", .line + 1, .kind)]
pub struct LexError {
    pub kind: LexErrorKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedStringLiteral,
    MalformedNumericLiteral,
    UnexpectedCharacter(char),
}

impl std::fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            LexErrorKind::UnterminatedStringLiteral => write!(f, "unterminated string literal"),
            LexErrorKind::MalformedNumericLiteral => write!(f, "malformed numeric literal"),
            LexErrorKind::UnexpectedCharacter(c) => write!(f, "unexpected character '{}'", c),
        }
    }
}

pub fn tokenize(source: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(source).run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    brace_depth: usize,
    statement_has_content: bool,
    last_significant: Option<TokenKind>,
    tokens: Vec<Token>,
}

impl Lexer {
    fn new(source: &str) -> Lexer {
        Lexer {
            chars: source.chars().collect(),
            pos: 0,
            line: 0,
            brace_depth: 0,
            statement_has_content: false,
            last_significant: None,
            tokens: Vec::new(),
        }
    }

    fn cur(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.pos + ahead).copied()
    }

    fn advance(&mut self) {
        self.pos += 1;
    }

    fn fail(&self, kind: LexErrorKind) -> LexError {
        LexError {
            kind,
            line: self.line,
        }
    }

    fn push(&mut self, kind: TokenKind, content: impl Into<String>) {
        let line = self.line;
        match kind {
            TokenKind::Whitespace | TokenKind::Comment | TokenKind::InlineComment => {}
            TokenKind::EndOfStatement => {
                self.statement_has_content = false;
                self.last_significant = None;
            }
            _ => {
                self.statement_has_content = true;
                self.last_significant = Some(kind);
            }
        }
        self.tokens.push(Token::new(kind, content, line));
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        while let Some(c) = self.cur() {
            match c {
                ' ' | '\t' => self.whitespace(),
                '\r' | '\n' => self.line_break(),
                ':' => {
                    self.advance();
                    self.push(TokenKind::EndOfStatement, ":");
                }
                '\'' => self.comment(),
                '"' => self.string_literal()?,
                '.' => self.dot()?,
                '(' => {
                    self.advance();
                    self.brace_depth += 1;
                    self.push(TokenKind::OpenBrace, "(");
                }
                ')' => {
                    self.advance();
                    self.brace_depth = self.brace_depth.saturating_sub(1);
                    self.push(TokenKind::CloseBrace, ")");
                }
                ',' => {
                    self.advance();
                    self.push(TokenKind::ArgumentSeparator, ",");
                }
                '&' => self.ampersand()?,
                '+' | '-' | '*' | '/' | '\\' | '^' => {
                    self.advance();
                    self.push(TokenKind::Operator, c.to_string());
                }
                '=' => {
                    self.advance();
                    self.push(TokenKind::ComparisonOperator, "=");
                }
                '<' => {
                    self.advance();
                    match self.cur() {
                        Some('=') => {
                            self.advance();
                            self.push(TokenKind::ComparisonOperator, "<=");
                        }
                        Some('>') => {
                            self.advance();
                            self.push(TokenKind::ComparisonOperator, "<>");
                        }
                        _ => self.push(TokenKind::ComparisonOperator, "<"),
                    }
                }
                '>' => {
                    self.advance();
                    if self.cur() == Some('=') {
                        self.advance();
                        self.push(TokenKind::ComparisonOperator, ">=");
                    } else {
                        self.push(TokenKind::ComparisonOperator, ">");
                    }
                }
                '_' => {
                    if self.peek(1).map_or(false, is_identifier_continue) {
                        self.identifier();
                    } else {
                        self.continuation()?;
                    }
                }
                c if c.is_ascii_digit() => self.number(false)?,
                c if is_identifier_start(c) => self.identifier(),
                other => return Err(self.fail(LexErrorKind::UnexpectedCharacter(other))),
            }
        }
        // a trailing statement terminator keeps the parser's statement
        // splitter regular
        self.push(TokenKind::EndOfStatement, "\n");
        Ok(self.tokens)
    }

    fn whitespace(&mut self) {
        let mut run = String::new();
        while let Some(c) = self.cur() {
            if c == ' ' || c == '\t' {
                run.push(c);
                self.advance();
            } else {
                break;
            }
        }
        self.push(TokenKind::Whitespace, run);
    }

    fn line_break(&mut self) {
        if self.cur() == Some('\r') {
            self.advance();
            if self.cur() == Some('\n') {
                self.advance();
            }
        } else {
            self.advance();
        }
        if self.brace_depth > 0 {
            // newlines inside a bracketed expression do not split statements
            self.push(TokenKind::Whitespace, " ");
        } else {
            self.push(TokenKind::EndOfStatement, "\n");
        }
        self.line += 1;
    }

    /// Trailing `_` elides the following line break
    fn continuation(&mut self) -> Result<(), LexError> {
        self.advance();
        while matches!(self.cur(), Some(' ') | Some('\t')) {
            self.advance();
        }
        match self.cur() {
            Some('\r') | Some('\n') => {
                if self.cur() == Some('\r') {
                    self.advance();
                    if self.cur() == Some('\n') {
                        self.advance();
                    }
                } else {
                    self.advance();
                }
                self.line += 1;
                self.push(TokenKind::Whitespace, " ");
                Ok(())
            }
            None => Ok(()),
            _ => Err(self.fail(LexErrorKind::UnexpectedCharacter('_'))),
        }
    }

    fn comment(&mut self) {
        self.advance();
        let mut text = String::new();
        while let Some(c) = self.cur() {
            if c == '\r' || c == '\n' {
                break;
            }
            text.push(c);
            self.advance();
        }
        let kind = if self.statement_has_content {
            TokenKind::InlineComment
        } else {
            TokenKind::Comment
        };
        self.push(kind, text);
    }

    fn string_literal(&mut self) -> Result<(), LexError> {
        self.advance();
        let mut content = String::new();
        loop {
            match self.cur() {
                Some('"') => {
                    self.advance();
                    if self.cur() == Some('"') {
                        content.push('"');
                        self.advance();
                    } else {
                        self.push(TokenKind::StringLiteral, content);
                        return Ok(());
                    }
                }
                Some('\r') | Some('\n') | None => {
                    return Err(self.fail(LexErrorKind::UnterminatedStringLiteral));
                }
                Some(c) => {
                    content.push(c);
                    self.advance();
                }
            }
        }
    }

    fn dot(&mut self) -> Result<(), LexError> {
        let prev_is_value = self.last_significant.map_or(false, TokenKind::is_value_like);
        if !prev_is_value && self.peek(1).map_or(false, |c| c.is_ascii_digit()) {
            // a leading decimal point: .5
            self.number(true)
        } else {
            self.advance();
            self.push(TokenKind::MemberAccessorOrDecimalPoint, ".");
            Ok(())
        }
    }

    fn ampersand(&mut self) -> Result<(), LexError> {
        match self.peek(1) {
            Some('H') | Some('h') => self.radix_literal(16),
            Some('O') | Some('o') => self.radix_literal(8),
            _ => {
                self.advance();
                self.push(TokenKind::Operator, "&");
                Ok(())
            }
        }
    }

    /// `&H1F` / `&O17` forms, normalised to decimal content; a trailing `&`
    /// (the long-type suffix) is consumed
    fn radix_literal(&mut self, radix: u32) -> Result<(), LexError> {
        self.advance();
        self.advance();
        let mut digits = String::new();
        while let Some(c) = self.cur() {
            if c.is_digit(radix) {
                digits.push(c);
                self.advance();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(self.fail(LexErrorKind::MalformedNumericLiteral));
        }
        if self.cur() == Some('&') {
            self.advance();
        }
        if self.cur().map_or(false, is_identifier_continue) {
            return Err(self.fail(LexErrorKind::MalformedNumericLiteral));
        }
        let value = i64::from_str_radix(&digits, radix)
            .map_err(|_| self.fail(LexErrorKind::MalformedNumericLiteral))?;
        self.push(TokenKind::NumericLiteral, value.to_string());
        Ok(())
    }

    fn number(&mut self, leading_dot: bool) -> Result<(), LexError> {
        let mut text = String::new();
        if leading_dot {
            text.push('0');
            text.push('.');
            self.advance();
        }
        while self.cur().map_or(false, |c| c.is_ascii_digit()) {
            text.push(self.cur().unwrap());
            self.advance();
        }
        if !leading_dot
            && self.cur() == Some('.')
            && self.peek(1).map_or(false, |c| c.is_ascii_digit())
        {
            text.push('.');
            self.advance();
            while self.cur().map_or(false, |c| c.is_ascii_digit()) {
                text.push(self.cur().unwrap());
                self.advance();
            }
        }
        if matches!(self.cur(), Some('e') | Some('E'))
            && self
                .peek(1)
                .map_or(false, |c| c.is_ascii_digit() || c == '+' || c == '-')
        {
            text.push('e');
            self.advance();
            if matches!(self.cur(), Some('+') | Some('-')) {
                text.push(self.cur().unwrap());
                self.advance();
            }
            if !self.cur().map_or(false, |c| c.is_ascii_digit()) {
                return Err(self.fail(LexErrorKind::MalformedNumericLiteral));
            }
            while self.cur().map_or(false, |c| c.is_ascii_digit()) {
                text.push(self.cur().unwrap());
                self.advance();
            }
        }
        if self.cur().map_or(false, is_identifier_continue) {
            return Err(self.fail(LexErrorKind::MalformedNumericLiteral));
        }
        self.push(TokenKind::NumericLiteral, text);
        Ok(())
    }

    fn identifier(&mut self) {
        let mut word = String::new();
        while self.cur().map_or(false, is_identifier_continue) {
            word.push(self.cur().unwrap());
            self.advance();
        }
        if word.eq_ignore_ascii_case("Rem") && !self.statement_has_content {
            // leading Rem swallows the rest of the line
            let mut text = String::new();
            while let Some(c) = self.cur() {
                if c == '\r' || c == '\n' {
                    break;
                }
                text.push(c);
                self.advance();
            }
            self.push(TokenKind::Comment, text.trim_start().to_string());
            return;
        }
        let kind = classify_identifier(&word);
        self.push(kind, word);
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_identifier_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[cfg(test)]
mod test {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .filter(|k| *k != TokenKind::Whitespace)
            .collect()
    }

    #[test]
    fn doubled_quotes_escape() {
        let tokens = tokenize("x = \"say \"\"hi\"\"\"").unwrap();
        let lit = tokens
            .iter()
            .find(|t| t.kind == TokenKind::StringLiteral)
            .unwrap();
        assert_eq!(lit.content, "say \"hi\"");
    }

    #[test]
    fn unterminated_string_is_fatal() {
        let err = tokenize("x = \"oops\ny = 1").unwrap_err();
        assert_eq!(err.kind, LexErrorKind::UnterminatedStringLiteral);
        assert_eq!(err.line, 0);
    }

    #[test]
    fn colon_splits_statements() {
        assert_eq!(
            kinds("x = 1: y = 2"),
            vec![
                TokenKind::Name,
                TokenKind::ComparisonOperator,
                TokenKind::NumericLiteral,
                TokenKind::EndOfStatement,
                TokenKind::Name,
                TokenKind::ComparisonOperator,
                TokenKind::NumericLiteral,
                TokenKind::EndOfStatement,
            ]
        );
    }

    #[test]
    fn newline_inside_brackets_does_not_split() {
        let tokens = tokenize("f(1,\n  2)").unwrap();
        let eos: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::EndOfStatement)
            .collect();
        assert_eq!(eos.len(), 1); // only the synthetic trailing one
    }

    #[test]
    fn continuation_elides_the_break() {
        let tokens = tokenize("x = 1 _\n + 2").unwrap();
        let eos: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::EndOfStatement)
            .collect();
        assert_eq!(eos.len(), 1);
    }

    #[test]
    fn comment_kinds_depend_on_preceding_content() {
        let tokens = tokenize("' whole line\nx = 1 ' trailing").unwrap();
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::Comment && t.content == " whole line"));
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::InlineComment && t.content == " trailing"));
    }

    #[test]
    fn rem_comment() {
        let tokens = tokenize("REM old school\nx = 1").unwrap();
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[0].content, "old school");
    }

    #[test]
    fn hex_and_octal_normalise_to_decimal() {
        let tokens = tokenize("x = &H1F + &O17&").unwrap();
        let nums: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::NumericLiteral)
            .map(|t| t.content.clone())
            .collect();
        assert_eq!(nums, vec!["31", "15"]);
    }

    #[test]
    fn dot_between_identifiers_is_an_accessor() {
        let tokens = tokenize("a.b = 1.5").unwrap();
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::MemberAccessorOrDecimalPoint));
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::NumericLiteral && t.content == "1.5"));
    }

    #[test]
    fn leading_dot_number() {
        let tokens = tokenize("x = .5").unwrap();
        assert!(tokens
            .iter()
            .any(|t| t.kind == TokenKind::NumericLiteral && t.content == "0.5"));
    }

    #[test]
    fn split_comparison_tokens_survive_to_the_combiner() {
        assert_eq!(
            kinds("2 > = 1"),
            vec![
                TokenKind::NumericLiteral,
                TokenKind::ComparisonOperator,
                TokenKind::ComparisonOperator,
                TokenKind::NumericLiteral,
                TokenKind::EndOfStatement,
            ]
        );
    }

    #[test]
    fn keyword_operators() {
        assert_eq!(
            kinds("a Mod b"),
            vec![
                TokenKind::Name,
                TokenKind::Operator,
                TokenKind::Name,
                TokenKind::EndOfStatement,
            ]
        );
    }
}
