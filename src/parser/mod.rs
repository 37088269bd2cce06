//! Stage-1 parser: flat token stream to block-structured AST.
//!
//! Statements are recognised by their line-initial keyword; everything
//! else is either a value-setting statement (a top-level `=` shape) or a
//! raw statement run. Token runs handed on to stage 2 are
//! bracket-standardised here: implicit-paren call forms (`F 1, 2`) and
//! explicit forms (`F(1, 2)`) converge, `Call` prefixes are stripped,
//! and every surviving `MemberAccessorOrDecimalPoint` is resolved to a
//! plain `MemberAccessor`.

pub mod combiner;
pub mod expr;

use crate::ast::*;
use crate::lexer::{Token, TokenKind};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("line {}: {}", .line + 1, .kind)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A block construct ran off the end of the source
    UnterminatedBlock(&'static str),
    /// A keyword in a position it cannot occupy
    UnexpectedKeyword(String),
    MalformedStatement(&'static str),
    MalformedExpression(&'static str),
}

impl std::fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ParseErrorKind::UnterminatedBlock(what) => {
                write!(f, "unterminated {} block", what)
            }
            ParseErrorKind::UnexpectedKeyword(word) => {
                write!(f, "keyword '{}' is not valid here", word)
            }
            ParseErrorKind::MalformedStatement(what) => write!(f, "malformed statement: {}", what),
            ParseErrorKind::MalformedExpression(what) => {
                write!(f, "malformed expression: {}", what)
            }
        }
    }
}

pub fn parse(tokens: Vec<Token>) -> Result<Vec<CodeBlock>, ParseError> {
    let mut parser = Parser {
        runs: split_statements(tokens),
        pos: 0,
    };
    let (blocks, terminator) = parser.parse_blocks(|_| false)?;
    debug_assert!(terminator.is_none());
    Ok(blocks)
}

/// One statement's worth of tokens (whitespace stripped, inline comment
/// peeled off)
#[derive(Clone, Debug)]
struct Run {
    tokens: Vec<Token>,
    trailing_comment: Option<Token>,
    line: usize,
}

impl Run {
    fn starts_with_keyword(&self, word: &str) -> bool {
        self.tokens.first().map_or(false, |t| t.is_keyword(word))
    }

    fn starts_with_keywords(&self, words: &[&str]) -> bool {
        words.len() <= self.tokens.len()
            && words
                .iter()
                .zip(&self.tokens)
                .all(|(word, token)| token.is_keyword(word))
    }

    fn fail(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            kind,
            line: self.line,
        }
    }
}

fn split_statements(tokens: Vec<Token>) -> Vec<Run> {
    let mut runs = Vec::new();
    let mut current: Vec<Token> = Vec::new();
    let mut trailing_comment = None;
    for token in tokens {
        match token.kind {
            TokenKind::Whitespace => {}
            TokenKind::EndOfStatement => {
                if !current.is_empty() || trailing_comment.is_some() {
                    let run = finish_run(std::mem::take(&mut current), trailing_comment.take());
                    runs.push(run);
                }
            }
            TokenKind::InlineComment => trailing_comment = Some(token),
            TokenKind::MemberAccessorOrDecimalPoint => {
                // every ambiguous dot that survived the lexer joins a
                // member-access chain
                current.push(Token::new(TokenKind::MemberAccessor, ".", token.line));
            }
            _ => current.push(token),
        }
    }
    if !current.is_empty() || trailing_comment.is_some() {
        runs.push(finish_run(current, trailing_comment));
    }
    runs
}

fn finish_run(tokens: Vec<Token>, trailing_comment: Option<Token>) -> Run {
    let line = tokens
        .first()
        .or(trailing_comment.as_ref())
        .map_or(0, |t| t.line);
    Run {
        tokens,
        trailing_comment,
        line,
    }
}

/// Index of the first depth-zero token satisfying `pred`
fn find_top_level(tokens: &[Token], pred: impl Fn(&Token) -> bool) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::OpenBrace => depth += 1,
            TokenKind::CloseBrace => depth = depth.saturating_sub(1),
            _ => {
                if depth == 0 && pred(token) {
                    return Some(i);
                }
            }
        }
    }
    None
}

/// Split on depth-zero argument separators
fn split_top_level(tokens: &[Token]) -> Vec<Vec<Token>> {
    let mut parts = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;
    for token in tokens {
        match token.kind {
            TokenKind::OpenBrace => {
                depth += 1;
                current.push(token.clone());
            }
            TokenKind::CloseBrace => {
                depth = depth.saturating_sub(1);
                current.push(token.clone());
            }
            TokenKind::ArgumentSeparator if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(token.clone()),
        }
    }
    parts.push(current);
    parts
}

struct Parser {
    runs: Vec<Run>,
    pos: usize,
}

impl Parser {
    fn next_run(&mut self) -> Option<Run> {
        let run = self.runs.get(self.pos).cloned();
        if run.is_some() {
            self.pos += 1;
        }
        run
    }

    /// Parse blocks until a run matches `stop` (the matching run is
    /// consumed and returned) or the source ends
    fn parse_blocks(
        &mut self,
        stop: impl Fn(&Run) -> bool,
    ) -> Result<(Vec<CodeBlock>, Option<Run>), ParseError> {
        let mut blocks = Vec::new();
        while let Some(run) = self.next_run() {
            if stop(&run) {
                return Ok((blocks, Some(run)));
            }
            blocks.extend(self.parse_run(run)?);
        }
        Ok((blocks, None))
    }

    fn parse_blocks_terminated(
        &mut self,
        stop: impl Fn(&Run) -> bool,
        construct: &'static str,
        line: usize,
    ) -> Result<(Vec<CodeBlock>, Run), ParseError> {
        let (blocks, terminator) = self.parse_blocks(stop)?;
        match terminator {
            Some(run) => Ok((blocks, run)),
            None => Err(ParseError {
                kind: ParseErrorKind::UnterminatedBlock(construct),
                line,
            }),
        }
    }

    fn parse_run(&mut self, run: Run) -> Result<Vec<CodeBlock>, ParseError> {
        let first = match run.tokens.first() {
            Some(t) => t.clone(),
            None => {
                // a bare comment line
                let comment = run.trailing_comment.clone().expect("empty run");
                return Ok(vec![CodeBlock::Comment(comment)]);
            }
        };
        if first.kind == TokenKind::Comment {
            return Ok(vec![CodeBlock::Comment(first)]);
        }
        if first.kind != TokenKind::Keyword {
            return Ok(vec![self.parse_plain_statement(run, ValueSettingKind::Let, false)?]);
        }
        let word = first.content.to_ascii_uppercase();
        match word.as_str() {
            "OPTION" => {
                if run.tokens.get(1).map_or(false, |t| t.is_keyword("Explicit")) {
                    Ok(vec![CodeBlock::OptionExplicit(run.line)])
                } else {
                    Err(run.fail(ParseErrorKind::MalformedStatement("Option")))
                }
            }
            "DIM" => Ok(vec![self.parse_dim(&run, Visibility::Public, false)?]),
            "PRIVATE" | "PUBLIC" => {
                let visibility = if word == "PRIVATE" {
                    Visibility::Private
                } else {
                    Visibility::Public
                };
                let second_is_function = run.tokens.get(1).map_or(false, |t| {
                    t.is_keyword("Sub")
                        || t.is_keyword("Function")
                        || t.is_keyword("Property")
                        || t.is_keyword("Default")
                });
                if second_is_function {
                    Ok(vec![self.parse_function(run, visibility, 1)?])
                } else {
                    Ok(vec![self.parse_dim(&run, visibility, true)?])
                }
            }
            "REDIM" => Ok(vec![self.parse_redim(&run)?]),
            "CONST" => self.parse_const(run),
            "IF" => Ok(vec![self.parse_if(run)?]),
            "FOR" => Ok(vec![self.parse_for(run)?]),
            "DO" => Ok(vec![self.parse_do(run)?]),
            "WHILE" => Ok(vec![self.parse_while(run)?]),
            "SELECT" => Ok(vec![self.parse_select(run)?]),
            "SUB" | "FUNCTION" | "PROPERTY" => {
                Ok(vec![self.parse_function(run, Visibility::Public, 0)?])
            }
            "CLASS" => Ok(vec![self.parse_class(run)?]),
            "ON" => {
                if run.starts_with_keywords(&["On", "Error", "Resume", "Next"]) {
                    Ok(vec![CodeBlock::OnErrorResumeNext(run.line)])
                } else if run.starts_with_keywords(&["On", "Error", "GoTo"])
                    && run.tokens.get(3).map_or(false, |t| {
                        t.kind == TokenKind::NumericLiteral && t.content == "0"
                    })
                {
                    Ok(vec![CodeBlock::OnErrorGoto0(run.line)])
                } else {
                    Err(run.fail(ParseErrorKind::MalformedStatement("On Error")))
                }
            }
            "WITH" => Ok(vec![self.parse_with(run)?]),
            "EXIT" => Ok(vec![self.parse_exit(&run)?]),
            "SET" => Ok(vec![self.parse_plain_statement(run, ValueSettingKind::Set, true)?]),
            "LET" => Ok(vec![self.parse_plain_statement(run, ValueSettingKind::Let, true)?]),
            "CALL" => Ok(vec![self.parse_plain_statement(run, ValueSettingKind::Let, true)?]),
            other => Err(run.fail(ParseErrorKind::UnexpectedKeyword(other.to_string()))),
        }
    }

    /// Raw statements and value-setting statements. `skip_first` drops a
    /// leading `Set`/`Let` keyword before looking for the `=`.
    fn parse_plain_statement(
        &mut self,
        run: Run,
        kind: ValueSettingKind,
        skip_first: bool,
    ) -> Result<CodeBlock, ParseError> {
        let tokens: Vec<Token> = if skip_first {
            run.tokens[1..].to_vec()
        } else {
            run.tokens.clone()
        };
        if let Some(eq) = find_top_level(&tokens, |t| t.is_comparison("=")) {
            if eq == 0 || eq + 1 == tokens.len() {
                return Err(run.fail(ParseErrorKind::MalformedStatement("assignment")));
            }
            return Ok(CodeBlock::ValueSetting(ValueSettingStatement {
                target: tokens[..eq].to_vec(),
                value: tokens[eq + 1..].to_vec(),
                kind,
                trailing_comment: run.trailing_comment,
                line: run.line,
            }));
        }
        if kind == ValueSettingKind::Set {
            return Err(run.fail(ParseErrorKind::MalformedStatement("Set")));
        }
        Ok(CodeBlock::Statement(Statement {
            tokens: standardise_call_statement(tokens),
            trailing_comment: run.trailing_comment,
            line: run.line,
        }))
    }

    fn parse_dim(
        &mut self,
        run: &Run,
        visibility: Visibility,
        explicit_visibility: bool,
    ) -> Result<CodeBlock, ParseError> {
        let variables = parse_dim_variables(&run.tokens[1..])
            .ok_or_else(|| run.fail(ParseErrorKind::MalformedStatement("Dim")))?;
        Ok(CodeBlock::Dim(DimStatement {
            visibility,
            explicit_visibility,
            variables,
            line: run.line,
        }))
    }

    fn parse_redim(&mut self, run: &Run) -> Result<CodeBlock, ParseError> {
        let mut rest = &run.tokens[1..];
        let mut preserve = false;
        if rest.first().map_or(false, |t| t.is_keyword("Preserve")) {
            preserve = true;
            rest = &rest[1..];
        }
        let variables = parse_dim_variables(rest)
            .filter(|vars| vars.iter().all(|v| v.dimensions.is_some()))
            .ok_or_else(|| run.fail(ParseErrorKind::MalformedStatement("ReDim")))?;
        Ok(CodeBlock::ReDim(ReDimStatement {
            preserve,
            variables,
            line: run.line,
        }))
    }

    /// `Const x = <literal>` lowers to a declaration plus an assignment
    fn parse_const(&mut self, run: Run) -> Result<Vec<CodeBlock>, ParseError> {
        let name = match run.tokens.get(1) {
            Some(t) if t.kind == TokenKind::Name => t.clone(),
            _ => return Err(run.fail(ParseErrorKind::MalformedStatement("Const"))),
        };
        if !run.tokens.get(2).map_or(false, |t| t.is_comparison("=")) || run.tokens.len() < 4 {
            return Err(run.fail(ParseErrorKind::MalformedStatement("Const")));
        }
        Ok(vec![
            CodeBlock::Dim(DimStatement {
                visibility: Visibility::Public,
                explicit_visibility: false,
                variables: vec![DimVariable {
                    name: name.clone(),
                    dimensions: None,
                }],
                line: run.line,
            }),
            CodeBlock::ValueSetting(ValueSettingStatement {
                target: vec![name],
                value: run.tokens[3..].to_vec(),
                kind: ValueSettingKind::Let,
                trailing_comment: run.trailing_comment,
                line: run.line,
            }),
        ])
    }

    fn parse_if(&mut self, run: Run) -> Result<CodeBlock, ParseError> {
        let tokens = &run.tokens[1..];
        let then_at = find_top_level(tokens, |t| t.is_keyword("Then"))
            .ok_or_else(|| run.fail(ParseErrorKind::MalformedStatement("If without Then")))?;
        if then_at == 0 {
            return Err(run.fail(ParseErrorKind::MalformedStatement("If without condition")));
        }
        let condition = tokens[..then_at].to_vec();
        let rest = &tokens[then_at + 1..];
        if !rest.is_empty() {
            return self.parse_single_line_if(&run, condition, rest);
        }

        // block form
        let mut clauses = Vec::new();
        let mut else_body = None;
        let mut current_condition = condition;
        let mut current_line = run.line;
        loop {
            let (body, terminator) = self.parse_blocks_terminated(
                |r| {
                    r.starts_with_keyword("ElseIf")
                        || r.starts_with_keyword("Else")
                        || r.starts_with_keywords(&["End", "If"])
                },
                "If",
                run.line,
            )?;
            clauses.push(ConditionalClause {
                condition: std::mem::take(&mut current_condition),
                body,
                line: current_line,
            });
            let term = terminator;
            if term.starts_with_keyword("ElseIf") {
                let inner = &term.tokens[1..];
                let then_at = find_top_level(inner, |t| t.is_keyword("Then")).ok_or_else(|| {
                    term.fail(ParseErrorKind::MalformedStatement("ElseIf without Then"))
                })?;
                if then_at == 0 || then_at + 1 != inner.len() {
                    return Err(term.fail(ParseErrorKind::MalformedStatement("ElseIf")));
                }
                current_condition = inner[..then_at].to_vec();
                current_line = term.line;
                continue;
            }
            if term.starts_with_keyword("Else") {
                let (body, _) = self.parse_blocks_terminated(
                    |r| r.starts_with_keywords(&["End", "If"]),
                    "If",
                    term.line,
                )?;
                else_body = Some(body);
                break;
            }
            // End If
            break;
        }
        Ok(CodeBlock::If(IfBlock {
            clauses,
            else_body,
            line: run.line,
        }))
    }

    fn parse_single_line_if(
        &mut self,
        run: &Run,
        condition: Vec<Token>,
        rest: &[Token],
    ) -> Result<CodeBlock, ParseError> {
        let (then_tokens, else_tokens) =
            match find_top_level(rest, |t| t.is_keyword("Else")) {
                Some(at) => (&rest[..at], Some(&rest[at + 1..])),
                None => (rest, None),
            };
        let body = self.parse_inline_body(then_tokens, run.line)?;
        let else_body = match else_tokens {
            Some(tokens) if !tokens.is_empty() => Some(self.parse_inline_body(tokens, run.line)?),
            Some(_) => Some(Vec::new()),
            None => None,
        };
        Ok(CodeBlock::If(IfBlock {
            clauses: vec![ConditionalClause {
                condition,
                body,
                line: run.line,
            }],
            else_body,
            line: run.line,
        }))
    }

    /// The inline body of a single-line `If` is one statement, itself
    /// parsed recursively (it may be another single-line `If`)
    fn parse_inline_body(
        &mut self,
        tokens: &[Token],
        line: usize,
    ) -> Result<Vec<CodeBlock>, ParseError> {
        let run = Run {
            tokens: tokens.to_vec(),
            trailing_comment: None,
            line,
        };
        self.parse_run(run)
    }

    fn parse_for(&mut self, run: Run) -> Result<CodeBlock, ParseError> {
        if run.tokens.get(1).map_or(false, |t| t.is_keyword("Each")) {
            return self.parse_for_each(run);
        }
        let counter = match run.tokens.get(1) {
            Some(t) if t.kind == TokenKind::Name => t.clone(),
            _ => return Err(run.fail(ParseErrorKind::MalformedStatement("For counter"))),
        };
        if !run.tokens.get(2).map_or(false, |t| t.is_comparison("=")) {
            return Err(run.fail(ParseErrorKind::MalformedStatement("For")));
        }
        let rest = &run.tokens[3..];
        let to_at = find_top_level(rest, |t| t.is_keyword("To"))
            .ok_or_else(|| run.fail(ParseErrorKind::MalformedStatement("For without To")))?;
        let from = rest[..to_at].to_vec();
        let after_to = &rest[to_at + 1..];
        let (to, step) = match find_top_level(after_to, |t| t.is_keyword("Step")) {
            Some(at) => (after_to[..at].to_vec(), Some(after_to[at + 1..].to_vec())),
            None => (after_to.to_vec(), None),
        };
        if from.is_empty() || to.is_empty() || step.as_ref().map_or(false, Vec::is_empty) {
            return Err(run.fail(ParseErrorKind::MalformedStatement("For bounds")));
        }
        let (body, _) =
            self.parse_blocks_terminated(|r| r.starts_with_keyword("Next"), "For", run.line)?;
        Ok(CodeBlock::For(ForBlock {
            counter,
            from,
            to,
            step,
            body,
            line: run.line,
        }))
    }

    fn parse_for_each(&mut self, run: Run) -> Result<CodeBlock, ParseError> {
        let variable = match run.tokens.get(2) {
            Some(t) if t.kind == TokenKind::Name => t.clone(),
            _ => return Err(run.fail(ParseErrorKind::MalformedStatement("For Each"))),
        };
        if !run.tokens.get(3).map_or(false, |t| t.is_keyword("In")) || run.tokens.len() < 5 {
            return Err(run.fail(ParseErrorKind::MalformedStatement("For Each without In")));
        }
        let target = run.tokens[4..].to_vec();
        let (body, _) =
            self.parse_blocks_terminated(|r| r.starts_with_keyword("Next"), "For Each", run.line)?;
        Ok(CodeBlock::ForEach(ForEachBlock {
            variable,
            target,
            body,
            line: run.line,
        }))
    }

    fn parse_do(&mut self, run: Run) -> Result<CodeBlock, ParseError> {
        let pre = parse_loop_condition(&run.tokens[1..]);
        if pre.is_none() && run.tokens.len() > 1 {
            return Err(run.fail(ParseErrorKind::MalformedStatement("Do")));
        }
        let (body, terminator) =
            self.parse_blocks_terminated(|r| r.starts_with_keyword("Loop"), "Do", run.line)?;
        let post = parse_loop_condition(&terminator.tokens[1..]);
        if post.is_none() && terminator.tokens.len() > 1 {
            return Err(terminator.fail(ParseErrorKind::MalformedStatement("Loop")));
        }
        let condition = match (pre, post) {
            (Some(_), Some(_)) => {
                return Err(terminator
                    .fail(ParseErrorKind::MalformedStatement("Do and Loop both conditional")))
            }
            (Some((kind, tokens)), None) => {
                Some((LoopConditionPosition::PreCondition, kind, tokens))
            }
            (None, Some((kind, tokens))) => {
                Some((LoopConditionPosition::PostCondition, kind, tokens))
            }
            (None, None) => None,
        };
        Ok(CodeBlock::Do(DoBlock {
            condition,
            body,
            line: run.line,
        }))
    }

    fn parse_while(&mut self, run: Run) -> Result<CodeBlock, ParseError> {
        if run.tokens.len() < 2 {
            return Err(run.fail(ParseErrorKind::MalformedStatement("While")));
        }
        let condition = run.tokens[1..].to_vec();
        let (body, _) =
            self.parse_blocks_terminated(|r| r.starts_with_keyword("Wend"), "While", run.line)?;
        Ok(CodeBlock::While(WhileBlock {
            condition,
            body,
            line: run.line,
        }))
    }

    fn parse_select(&mut self, run: Run) -> Result<CodeBlock, ParseError> {
        if !run.tokens.get(1).map_or(false, |t| t.is_keyword("Case")) || run.tokens.len() < 3 {
            return Err(run.fail(ParseErrorKind::MalformedStatement("Select Case")));
        }
        let target = run.tokens[2..].to_vec();
        let mut cases = Vec::new();
        let mut else_body = None;
        let mut pending = match self.next_run() {
            Some(r) => r,
            None => {
                return Err(run.fail(ParseErrorKind::UnterminatedBlock("Select")));
            }
        };
        loop {
            if pending.starts_with_keywords(&["End", "Select"]) {
                break;
            }
            if pending.tokens.is_empty() || pending.tokens[0].kind == TokenKind::Comment {
                // comments between Select Case and the first Case carry no
                // emission position; drop them
                pending = match self.next_run() {
                    Some(r) => r,
                    None => return Err(run.fail(ParseErrorKind::UnterminatedBlock("Select"))),
                };
                continue;
            }
            if !pending.starts_with_keyword("Case") {
                return Err(pending.fail(ParseErrorKind::UnexpectedKeyword(
                    pending
                        .tokens
                        .first()
                        .map_or_else(String::new, |t| t.content.clone()),
                )));
            }
            let is_else = pending.tokens.get(1).map_or(false, |t| t.is_keyword("Else"));
            let (body, terminator) = self.parse_blocks_terminated(
                |r| r.starts_with_keyword("Case") || r.starts_with_keywords(&["End", "Select"]),
                "Select",
                pending.line,
            )?;
            if is_else {
                if else_body.is_some() {
                    return Err(pending.fail(ParseErrorKind::UnexpectedKeyword("Case".into())));
                }
                else_body = Some(body);
            } else {
                let values = split_top_level(&pending.tokens[1..]);
                if values.iter().any(Vec::is_empty) {
                    return Err(pending.fail(ParseErrorKind::MalformedStatement("Case values")));
                }
                cases.push(SelectCase {
                    values,
                    body,
                    line: pending.line,
                });
            }
            pending = terminator;
        }
        Ok(CodeBlock::Select(SelectBlock {
            target,
            cases,
            else_body,
            line: run.line,
        }))
    }

    fn parse_function(
        &mut self,
        run: Run,
        visibility: Visibility,
        mut at: usize,
    ) -> Result<CodeBlock, ParseError> {
        let mut is_default = false;
        if run.tokens.get(at).map_or(false, |t| t.is_keyword("Default")) {
            is_default = true;
            at += 1;
        }
        let kind = match run.tokens.get(at) {
            Some(t) if t.is_keyword("Sub") => FunctionKind::Sub,
            Some(t) if t.is_keyword("Function") => FunctionKind::Function,
            Some(t) if t.is_keyword("Property") => {
                at += 1;
                match run.tokens.get(at) {
                    Some(t) if t.is_keyword("Get") => FunctionKind::PropertyGet,
                    Some(t) if t.is_keyword("Let") => FunctionKind::PropertyLet,
                    Some(t) if t.is_keyword("Set") => FunctionKind::PropertySet,
                    _ => {
                        return Err(
                            run.fail(ParseErrorKind::MalformedStatement("Property accessor kind"))
                        )
                    }
                }
            }
            _ => return Err(run.fail(ParseErrorKind::MalformedStatement("function"))),
        };
        at += 1;
        let name = match run.tokens.get(at) {
            Some(t) if t.kind == TokenKind::Name => t.clone(),
            _ => return Err(run.fail(ParseErrorKind::MalformedStatement("function name"))),
        };
        at += 1;
        let parameters = parse_parameters(&run.tokens[at..])
            .ok_or_else(|| run.fail(ParseErrorKind::MalformedStatement("parameter list")))?;
        let closing: &[&str] = match kind {
            FunctionKind::Sub => &["End", "Sub"],
            FunctionKind::Function => &["End", "Function"],
            _ => &["End", "Property"],
        };
        let construct = match kind {
            FunctionKind::Sub => "Sub",
            FunctionKind::Function => "Function",
            _ => "Property",
        };
        let (body, _) = self.parse_blocks_terminated(
            |r| r.starts_with_keywords(closing),
            construct,
            run.line,
        )?;
        Ok(CodeBlock::Function(FunctionBlock {
            visibility,
            is_default,
            kind,
            name,
            parameters,
            body,
            line: run.line,
        }))
    }

    fn parse_class(&mut self, run: Run) -> Result<CodeBlock, ParseError> {
        let name = match run.tokens.get(1) {
            Some(t) if t.kind == TokenKind::Name => t.clone(),
            _ => return Err(run.fail(ParseErrorKind::MalformedStatement("Class name"))),
        };
        let (body, _) = self.parse_blocks_terminated(
            |r| r.starts_with_keywords(&["End", "Class"]),
            "Class",
            run.line,
        )?;
        Ok(CodeBlock::Class(ClassBlock {
            name,
            body,
            line: run.line,
        }))
    }

    fn parse_with(&mut self, run: Run) -> Result<CodeBlock, ParseError> {
        if run.tokens.len() < 2 {
            return Err(run.fail(ParseErrorKind::MalformedStatement("With")));
        }
        let target = run.tokens[1..].to_vec();
        let (body, _) = self.parse_blocks_terminated(
            |r| r.starts_with_keywords(&["End", "With"]),
            "With",
            run.line,
        )?;
        Ok(CodeBlock::With(WithBlock {
            target,
            body,
            line: run.line,
        }))
    }

    fn parse_exit(&mut self, run: &Run) -> Result<CodeBlock, ParseError> {
        let kind = match run.tokens.get(1) {
            Some(t) if t.is_keyword("Do") => ExitKind::Do,
            Some(t) if t.is_keyword("For") => ExitKind::For,
            Some(t) if t.is_keyword("Sub") => ExitKind::Sub,
            Some(t) if t.is_keyword("Function") => ExitKind::Function,
            Some(t) if t.is_keyword("Property") => ExitKind::Property,
            _ => return Err(run.fail(ParseErrorKind::MalformedStatement("Exit"))),
        };
        Ok(CodeBlock::Exit(ExitStatement {
            kind,
            line: run.line,
        }))
    }
}

fn parse_loop_condition(tokens: &[Token]) -> Option<(LoopConditionKind, Vec<Token>)> {
    let first = tokens.first()?;
    let kind = if first.is_keyword("While") {
        LoopConditionKind::While
    } else if first.is_keyword("Until") {
        LoopConditionKind::Until
    } else {
        return None;
    };
    if tokens.len() < 2 {
        return None;
    }
    Some((kind, tokens[1..].to_vec()))
}

/// `a, b(5), c(, )`-style declaration lists
fn parse_dim_variables(tokens: &[Token]) -> Option<Vec<DimVariable>> {
    if tokens.is_empty() {
        return None;
    }
    let mut variables = Vec::new();
    for part in split_top_level(tokens) {
        let name = match part.first() {
            Some(t) if t.kind == TokenKind::Name => t.clone(),
            _ => return None,
        };
        let dimensions = match part.get(1) {
            None => None,
            Some(t) if t.kind == TokenKind::OpenBrace => {
                if part.last().map(|t| t.kind) != Some(TokenKind::CloseBrace) {
                    return None;
                }
                let inner = &part[2..part.len() - 1];
                if inner.is_empty() {
                    Some(Vec::new())
                } else {
                    Some(split_top_level(inner))
                }
            }
            Some(_) => return None,
        };
        variables.push(DimVariable { name, dimensions });
    }
    Some(variables)
}

/// Parse an optional parenthesised parameter list
fn parse_parameters(tokens: &[Token]) -> Option<Vec<Parameter>> {
    if tokens.is_empty() {
        return Some(Vec::new());
    }
    if tokens.first()?.kind != TokenKind::OpenBrace
        || tokens.last()?.kind != TokenKind::CloseBrace
    {
        return None;
    }
    let inner = &tokens[1..tokens.len() - 1];
    if inner.is_empty() {
        return Some(Vec::new());
    }
    let mut parameters = Vec::new();
    for part in split_top_level(inner) {
        let (mode, name_at) = match part.first() {
            Some(t) if t.is_keyword("ByRef") => (ParamMode::ByRef, 1),
            Some(t) if t.is_keyword("ByVal") => (ParamMode::ByVal, 1),
            _ => (ParamMode::ByRef, 0),
        };
        match part.get(name_at) {
            Some(t) if t.kind == TokenKind::Name && part.len() == name_at + 1 => {
                parameters.push(Parameter {
                    name: t.clone(),
                    mode,
                });
            }
            _ => return None,
        }
    }
    Some(parameters)
}

/// Give implicit-paren call statements explicit braces: `F 1, 2` and
/// `F(1, 2)` leave stage 1 in the same shape
fn standardise_call_statement(tokens: Vec<Token>) -> Vec<Token> {
    let mut chain_end = 0;
    let mut expect_name = true;
    for (i, token) in tokens.iter().enumerate() {
        if expect_name {
            if token.is_name_like() || (i == 0 && token.kind == TokenKind::MemberAccessor) {
                if token.kind == TokenKind::MemberAccessor {
                    // a leading dot inside a With block; the chain's first
                    // name follows
                    continue;
                }
                chain_end = i + 1;
                expect_name = false;
            } else {
                return tokens;
            }
        } else if token.kind == TokenKind::MemberAccessor {
            expect_name = true;
        } else {
            break;
        }
    }
    if chain_end == 0 || chain_end == tokens.len() {
        return tokens;
    }
    if tokens[chain_end].kind == TokenKind::OpenBrace {
        return tokens;
    }
    let line = tokens[chain_end].line;
    let mut out = tokens;
    out.insert(chain_end, Token::new(TokenKind::OpenBrace, "(", line));
    out.push(Token::new(TokenKind::CloseBrace, ")", line));
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::tokenize;

    fn parse_source(source: &str) -> Vec<CodeBlock> {
        parse(tokenize(source).unwrap()).unwrap()
    }

    #[test]
    fn single_line_and_block_if_normalise_the_same_way() {
        let single = parse_source("If x Then y = 1 Else y = 2");
        let block = parse_source("If x Then\ny = 1\nElse\ny = 2\nEnd If");
        for blocks in [&single, &block] {
            match &blocks[0] {
                CodeBlock::If(b) => {
                    assert_eq!(b.clauses.len(), 1);
                    assert_eq!(b.clauses[0].body.len(), 1);
                    assert_eq!(b.else_body.as_ref().map(Vec::len), Some(1));
                }
                other => panic!("expected IfBlock, got {:?}", other),
            }
        }
    }

    #[test]
    fn elseif_chain() {
        let blocks = parse_source("If a Then\nx = 1\nElseIf b Then\nx = 2\nElse\nx = 3\nEnd If");
        match &blocks[0] {
            CodeBlock::If(b) => {
                assert_eq!(b.clauses.len(), 2);
                assert!(b.else_body.is_some());
            }
            other => panic!("expected IfBlock, got {:?}", other),
        }
    }

    #[test]
    fn unterminated_if_is_fatal() {
        let err = parse(tokenize("If a Then\nx = 1\n").unwrap()).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnterminatedBlock("If"));
    }

    #[test]
    fn do_condition_positions() {
        match &parse_source("Do While a\nLoop")[0] {
            CodeBlock::Do(b) => {
                let (pos, kind, _) = b.condition.as_ref().unwrap();
                assert_eq!(*pos, LoopConditionPosition::PreCondition);
                assert_eq!(*kind, LoopConditionKind::While);
            }
            other => panic!("expected DoBlock, got {:?}", other),
        }
        match &parse_source("Do\nLoop Until a")[0] {
            CodeBlock::Do(b) => {
                let (pos, kind, _) = b.condition.as_ref().unwrap();
                assert_eq!(*pos, LoopConditionPosition::PostCondition);
                assert_eq!(*kind, LoopConditionKind::Until);
            }
            other => panic!("expected DoBlock, got {:?}", other),
        }
    }

    #[test]
    fn for_with_step() {
        match &parse_source("For i = 1 To 10 Step 2\nNext")[0] {
            CodeBlock::For(b) => {
                assert_eq!(b.counter.content, "i");
                assert!(b.step.is_some());
            }
            other => panic!("expected ForBlock, got {:?}", other),
        }
    }

    #[test]
    fn select_case_with_multiple_values() {
        match &parse_source("Select Case x\nCase 1, 2\ny = 1\nCase Else\ny = 2\nEnd Select")[0] {
            CodeBlock::Select(b) => {
                assert_eq!(b.cases.len(), 1);
                assert_eq!(b.cases[0].values.len(), 2);
                assert!(b.else_body.is_some());
            }
            other => panic!("expected SelectBlock, got {:?}", other),
        }
    }

    #[test]
    fn parameters_default_to_byref() {
        match &parse_source("Function F(a, ByVal b, ByRef c)\nEnd Function")[0] {
            CodeBlock::Function(f) => {
                assert_eq!(f.kind, FunctionKind::Function);
                let modes: Vec<_> = f.parameters.iter().map(|p| p.mode).collect();
                assert_eq!(
                    modes,
                    vec![ParamMode::ByRef, ParamMode::ByVal, ParamMode::ByRef]
                );
            }
            other => panic!("expected FunctionBlock, got {:?}", other),
        }
    }

    #[test]
    fn property_accessors_and_default() {
        match &parse_source("Class C\nPublic Default Function F()\nEnd Function\nProperty Let P(v)\nEnd Property\nEnd Class")[0] {
            CodeBlock::Class(c) => {
                assert_eq!(c.name.content, "C");
                match (&c.body[0], &c.body[1]) {
                    (CodeBlock::Function(f), CodeBlock::Function(p)) => {
                        assert!(f.is_default);
                        assert_eq!(p.kind, FunctionKind::PropertyLet);
                    }
                    other => panic!("unexpected class body {:?}", other),
                }
            }
            other => panic!("expected ClassBlock, got {:?}", other),
        }
    }

    #[test]
    fn dim_variants() {
        match &parse_source("Dim a, b(), c(5)")[0] {
            CodeBlock::Dim(d) => {
                assert_eq!(d.variables.len(), 3);
                assert!(d.variables[0].dimensions.is_none());
                assert_eq!(d.variables[1].dimensions.as_ref().unwrap().len(), 0);
                assert_eq!(d.variables[2].dimensions.as_ref().unwrap().len(), 1);
            }
            other => panic!("expected DimStatement, got {:?}", other),
        }
    }

    #[test]
    fn implicit_and_explicit_call_brackets_converge() {
        let implicit = parse_source("F 1, 2");
        let explicit = parse_source("F(1, 2)");
        let call_form = parse_source("Call F(1, 2)");
        let shapes: Vec<Vec<_>> = [implicit, explicit, call_form]
            .iter()
            .map(|blocks| match &blocks[0] {
                CodeBlock::Statement(s) => s.tokens.iter().map(|t| t.kind).collect(),
                other => panic!("expected Statement, got {:?}", other),
            })
            .collect();
        assert_eq!(shapes[0], shapes[1]);
        assert_eq!(shapes[1], shapes[2]);
    }

    #[test]
    fn set_statement() {
        match &parse_source("Set a = b")[0] {
            CodeBlock::ValueSetting(v) => assert_eq!(v.kind, ValueSettingKind::Set),
            other => panic!("expected ValueSetting, got {:?}", other),
        }
    }

    #[test]
    fn on_error_statements() {
        let blocks = parse_source("On Error Resume Next\nOn Error GoTo 0");
        assert!(matches!(blocks[0], CodeBlock::OnErrorResumeNext(_)));
        assert!(matches!(blocks[1], CodeBlock::OnErrorGoto0(_)));
    }

    #[test]
    fn misplaced_keyword_is_fatal() {
        let err = parse(tokenize("Next").unwrap()).unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnexpectedKeyword("NEXT".into()));
    }

    // the canonical renderer normalises on the first pass (single-line
    // If to block form, implicit call brackets made explicit); from
    // then on, render-parse-render is a fixed point
    #[test]
    fn printer_round_trip_is_stable() {
        let source = "\
Option Explicit
Dim a, b(5)
' a comment
If a > 1 Then b = 2 Else b = 3
For i = 1 To 10 Step 2
    F i, a.b(3)
Next
Do While a < 10
    a = a + 1
Loop
Select Case a
Case 1, 2
    b = 1
Case Else
    b = 2
End Select
Class Widget
    Private total
    Public Default Function Amount(ByVal scale)
        Amount = total * scale
    End Function
End Class
With a
    .Total = 5
End With
Sub S(x, ByVal y)
    On Error Resume Next
    Set x = New Widget
    On Error GoTo 0
    Exit Sub
End Sub
";
        let once = render_blocks(&parse_source(source));
        let reparsed = parse(tokenize(&once).unwrap()).unwrap();
        let twice = render_blocks(&reparsed);
        assert_eq!(once, twice);
    }
}
