//! Stage-2 parser: a bracket-standardised token run to an expression
//! tree honouring VBScript's precedence ladder.
//!
//! An expression is an ordered run of segments. Well-formedness is by
//! construction: three segments carry exactly one (middle) operation,
//! two segments a leading unary operation, one segment none. Deeper
//! trees nest inside `Bracketed` segments, so every operator's operands
//! always bind tighter than the operator itself.

use super::combiner;
use super::{split_top_level, ParseError, ParseErrorKind};
use crate::lexer::{Token, TokenKind};

#[derive(Clone, Debug)]
pub struct Expression {
    pub segments: Vec<ExpressionSegment>,
}

#[derive(Clone, Debug)]
pub enum ExpressionSegment {
    Numeric { token: Token },
    VString { token: Token },
    /// `True` / `False` / `Null` / `Empty` / `Nothing` / `vbCrLf` / ...
    Builtin { token: Token },
    /// `New ClassName`
    NewInstance { class_name: Token },
    Call(CallSegment),
    Bracketed(Box<Expression>),
    Operation { token: Token },
}

/// A dotted member-access chain plus arguments. The dots between member
/// tokens are implicit; they are never materialised inside the segment.
#[derive(Clone, Debug)]
pub struct CallSegment {
    pub member_tokens: Vec<Token>,
    pub arguments: Vec<Expression>,
    /// With no arguments, `a()` forces a call where bare `a` may be a
    /// value read; the distinction is semantically significant
    pub brackets_present: bool,
    /// A leading `.` (the chain hangs off the innermost With target)
    pub leading_accessor: bool,
    /// `a(0).b(1)` continues into a further segment
    pub tail: Option<Box<CallSegment>>,
}

impl Expression {
    pub fn single(segment: ExpressionSegment) -> Expression {
        Expression {
            segments: vec![segment],
        }
    }

    pub fn line(&self) -> usize {
        self.segments.first().map_or(0, ExpressionSegment::line)
    }

    /// The token of a bare, unbracketed, argument-free, single-member
    /// name reference, if that is all this expression is
    pub fn as_single_name(&self) -> Option<&Token> {
        match self.segments.as_slice() {
            [ExpressionSegment::Call(call)] => call.as_bare_name(),
            _ => None,
        }
    }
}

impl ExpressionSegment {
    pub fn line(&self) -> usize {
        match self {
            ExpressionSegment::Numeric { token }
            | ExpressionSegment::VString { token }
            | ExpressionSegment::Builtin { token }
            | ExpressionSegment::Operation { token } => token.line,
            ExpressionSegment::NewInstance { class_name } => class_name.line,
            ExpressionSegment::Call(call) => call.member_tokens.first().map_or(0, |t| t.line),
            ExpressionSegment::Bracketed(inner) => inner.line(),
        }
    }
}

impl CallSegment {
    pub fn as_bare_name(&self) -> Option<&Token> {
        if self.member_tokens.len() == 1
            && self.arguments.is_empty()
            && !self.brackets_present
            && !self.leading_accessor
            && self.tail.is_none()
        {
            Some(&self.member_tokens[0])
        } else {
            None
        }
    }
}

/// The precedence ladder, lowest-binding first. Binary levels are
/// left-associative except `^`.
enum Level {
    Binary(&'static [&'static str]),
    BinaryRight(&'static [&'static str]),
    Comparison,
    NotUnary,
    SignUnary,
}

const LEVELS: &[Level] = &[
    Level::Binary(&["Imp"]),
    Level::Binary(&["Eqv"]),
    Level::Binary(&["Xor"]),
    Level::Binary(&["Or"]),
    Level::Binary(&["And"]),
    Level::NotUnary,
    Level::Comparison,
    Level::Binary(&["&"]),
    Level::Binary(&["+", "-"]),
    Level::Binary(&["Mod"]),
    Level::Binary(&["\\"]),
    Level::Binary(&["*", "/"]),
    Level::SignUnary,
    Level::BinaryRight(&["^"]),
];

pub fn parse_expression(tokens: &[Token]) -> Result<Expression, ParseError> {
    let combined = combiner::combine(tokens.to_vec());
    parse_level(&combined, 0)
}

fn fail(tokens: &[Token], what: &'static str) -> ParseError {
    ParseError {
        kind: ParseErrorKind::MalformedExpression(what),
        line: tokens.first().map_or(0, |t| t.line),
    }
}

/// Collapse a sub-expression into a single segment for embedding
fn wrap(expression: Expression) -> ExpressionSegment {
    let mut expression = expression;
    if expression.segments.len() == 1 {
        expression.segments.pop().unwrap()
    } else {
        ExpressionSegment::Bracketed(Box::new(expression))
    }
}

fn parse_level(tokens: &[Token], level: usize) -> Result<Expression, ParseError> {
    if tokens.is_empty() {
        return Err(fail(tokens, "empty expression"));
    }
    let Some(rule) = LEVELS.get(level) else {
        return parse_atom(tokens);
    };
    match rule {
        Level::Binary(ops) => match find_binary_split(tokens, |t| {
            ops.iter().any(|op| t.is_operator(op))
        }, true)
        {
            Some(at) => build_binary(tokens, at, level, level + 1),
            None => parse_level(tokens, level + 1),
        },
        Level::BinaryRight(ops) => match find_binary_split(tokens, |t| {
            ops.iter().any(|op| t.is_operator(op))
        }, false)
        {
            // the right operand re-admits a unary sign (`2 ^ -2`), so it
            // parses from the sign level; right-association falls out of
            // splitting at the leftmost operator
            Some(at) => build_binary(tokens, at, level + 1, level - 1),
            None => parse_level(tokens, level + 1),
        },
        Level::Comparison => {
            match find_binary_split(tokens, |t| t.kind == TokenKind::ComparisonOperator, true) {
                Some(at) => build_binary(tokens, at, level, level + 1),
                None => parse_level(tokens, level + 1),
            }
        }
        Level::NotUnary => {
            if tokens[0].is_operator("Not") {
                let operand = parse_level(&tokens[1..], level)?;
                Ok(Expression {
                    segments: vec![
                        ExpressionSegment::Operation {
                            token: tokens[0].clone(),
                        },
                        wrap(operand),
                    ],
                })
            } else {
                parse_level(tokens, level + 1)
            }
        }
        Level::SignUnary => {
            if tokens[0].is_operator("-") || tokens[0].is_operator("+") {
                let operand = parse_level(&tokens[1..], level)?;
                Ok(Expression {
                    segments: vec![
                        ExpressionSegment::Operation {
                            token: tokens[0].clone(),
                        },
                        wrap(operand),
                    ],
                })
            } else {
                parse_level(tokens, level + 1)
            }
        }
    }
}

fn build_binary(
    tokens: &[Token],
    at: usize,
    left_level: usize,
    right_level: usize,
) -> Result<Expression, ParseError> {
    if at == 0 || at + 1 == tokens.len() {
        return Err(fail(tokens, "operator missing an operand"));
    }
    let left = parse_level(&tokens[..at], left_level)?;
    let right = parse_level(&tokens[at + 1..], right_level)?;
    Ok(Expression {
        segments: vec![
            wrap(left),
            ExpressionSegment::Operation {
                token: tokens[at].clone(),
            },
            wrap(right),
        ],
    })
}

/// Find the top-level operator to split at: the rightmost for
/// left-associative levels, the leftmost for right-associative ones.
/// Sign operators in unary position never split a binary level.
fn find_binary_split(
    tokens: &[Token],
    matches: impl Fn(&Token) -> bool,
    rightmost: bool,
) -> Option<usize> {
    let mut depth = 0usize;
    let mut found = None;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::OpenBrace => depth += 1,
            TokenKind::CloseBrace => depth = depth.saturating_sub(1),
            _ => {
                if depth == 0 && matches(token) && is_binary_position(tokens, i) {
                    found = Some(i);
                    if !rightmost {
                        return found;
                    }
                }
            }
        }
    }
    found
}

/// An operator is binary only when an operand just closed to its left
fn is_binary_position(tokens: &[Token], at: usize) -> bool {
    match at.checked_sub(1).and_then(|i| tokens.get(i)) {
        None => false,
        Some(prev) => prev.kind.is_value_like(),
    }
}

fn parse_atom(tokens: &[Token]) -> Result<Expression, ParseError> {
    if tokens.len() == 1 {
        let token = tokens[0].clone();
        match token.kind {
            TokenKind::NumericLiteral => {
                return Ok(Expression::single(ExpressionSegment::Numeric { token }))
            }
            TokenKind::StringLiteral => {
                return Ok(Expression::single(ExpressionSegment::VString { token }))
            }
            TokenKind::BuiltInValue => {
                return Ok(Expression::single(ExpressionSegment::Builtin { token }))
            }
            _ => {}
        }
    }
    if tokens[0].kind == TokenKind::OpenBrace && brace_spans_whole_run(tokens) {
        let inner = parse_level(&tokens[1..tokens.len() - 1], 0)?;
        return Ok(Expression::single(ExpressionSegment::Bracketed(Box::new(
            inner,
        ))));
    }
    if tokens[0].is_keyword("New") {
        match tokens {
            [_, class_name] if class_name.kind == TokenKind::Name => {
                return Ok(Expression::single(ExpressionSegment::NewInstance {
                    class_name: class_name.clone(),
                }));
            }
            _ => return Err(fail(tokens, "New")),
        }
    }
    let (call, consumed) = parse_call_chain(tokens)?;
    if consumed != tokens.len() {
        return Err(fail(&tokens[consumed..], "trailing content"));
    }
    Ok(Expression::single(ExpressionSegment::Call(call)))
}

fn brace_spans_whole_run(tokens: &[Token]) -> bool {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::OpenBrace => depth += 1,
            TokenKind::CloseBrace => {
                depth -= 1;
                if depth == 0 {
                    return i + 1 == tokens.len();
                }
            }
            _ => {}
        }
    }
    false
}

fn parse_call_chain(tokens: &[Token]) -> Result<(CallSegment, usize), ParseError> {
    let mut at = 0;
    let leading_accessor = tokens
        .first()
        .map_or(false, |t| t.kind == TokenKind::MemberAccessor);
    if leading_accessor {
        at = 1;
    }
    let mut member_tokens = Vec::new();
    loop {
        match tokens.get(at) {
            Some(t) if t.is_name_like() => {
                member_tokens.push(t.clone());
                at += 1;
            }
            _ => return Err(fail(&tokens[at.min(tokens.len().saturating_sub(1))..], "name")),
        }
        match (tokens.get(at), tokens.get(at + 1)) {
            (Some(dot), Some(next))
                if dot.kind == TokenKind::MemberAccessor && next.is_name_like() =>
            {
                at += 1;
            }
            _ => break,
        }
    }
    let mut brackets_present = false;
    let mut arguments = Vec::new();
    if tokens.get(at).map(|t| t.kind) == Some(TokenKind::OpenBrace) {
        let close = matching_close(tokens, at).ok_or_else(|| fail(tokens, "unbalanced brackets"))?;
        let inner = &tokens[at + 1..close];
        if !inner.is_empty() {
            for part in split_top_level(inner) {
                if part.is_empty() {
                    return Err(fail(inner, "missing argument"));
                }
                arguments.push(parse_level(&part, 0)?);
            }
        }
        brackets_present = true;
        at = close + 1;
    }
    let tail = if tokens.get(at).map(|t| t.kind) == Some(TokenKind::MemberAccessor) {
        let (tail, consumed) = parse_call_chain(&tokens[at + 1..])?;
        at += 1 + consumed;
        if tail.leading_accessor {
            return Err(fail(tokens, "member access"));
        }
        Some(Box::new(tail))
    } else {
        None
    };
    Ok((
        CallSegment {
            member_tokens,
            arguments,
            brackets_present,
            leading_accessor,
            tail,
        },
        at,
    ))
}

fn matching_close(tokens: &[Token], open_at: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open_at) {
        match token.kind {
            TokenKind::OpenBrace => depth += 1,
            TokenKind::CloseBrace => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::tokenize;

    fn parse(source: &str) -> Expression {
        let tokens: Vec<Token> = tokenize(source)
            .unwrap()
            .into_iter()
            .filter(|t| {
                !matches!(t.kind, TokenKind::Whitespace | TokenKind::EndOfStatement)
            })
            .map(|t| {
                if t.kind == TokenKind::MemberAccessorOrDecimalPoint {
                    Token::new(TokenKind::MemberAccessor, ".", t.line)
                } else {
                    t
                }
            })
            .collect();
        parse_expression(&tokens).unwrap()
    }

    fn op_of(expression: &Expression) -> String {
        expression
            .segments
            .iter()
            .find_map(|s| match s {
                ExpressionSegment::Operation { token } => Some(token.content.clone()),
                _ => None,
            })
            .expect("no operation segment")
    }

    #[test]
    fn well_formedness_by_segment_count() {
        assert_eq!(parse("1").segments.len(), 1);
        assert_eq!(parse("-1").segments.len(), 2);
        assert_eq!(parse("1 + 2").segments.len(), 3);
    }

    #[test]
    fn lowest_binding_operator_sits_at_the_root() {
        // + binds looser than *
        let e = parse("1 + 2 * 3");
        assert_eq!(op_of(&e), "+");
        // & binds looser than +
        let e = parse("a & b + c");
        assert_eq!(op_of(&e), "&");
        // comparisons bind looser than &
        let e = parse("a & b = c");
        assert_eq!(op_of(&e), "=");
        // And binds looser than =
        let e = parse("a = b And c = d");
        assert_eq!(op_of(&e).to_ascii_uppercase(), "AND");
    }

    #[test]
    fn left_associativity() {
        let e = parse("1 - 2 - 3");
        // root is the rightmost -, left operand is (1 - 2)
        assert_eq!(e.segments.len(), 3);
        match &e.segments[0] {
            ExpressionSegment::Bracketed(inner) => assert_eq!(op_of(inner), "-"),
            other => panic!("expected nested subtraction, got {:?}", other),
        }
    }

    #[test]
    fn power_is_right_associative() {
        let e = parse("2 ^ 3 ^ 2");
        assert_eq!(e.segments.len(), 3);
        match &e.segments[2] {
            ExpressionSegment::Bracketed(inner) => assert_eq!(op_of(inner), "^"),
            other => panic!("expected nested power on the right, got {:?}", other),
        }
    }

    #[test]
    fn unary_not_and_minus() {
        let e = parse("Not a");
        assert_eq!(e.segments.len(), 2);
        let e = parse("-a * b");
        // unary minus binds tighter than *
        assert_eq!(op_of(&e), "*");
    }

    #[test]
    fn brackets_force_precedence() {
        let e = parse("(1 + 2) * 3");
        assert_eq!(op_of(&e), "*");
        match &e.segments[0] {
            ExpressionSegment::Bracketed(inner) => assert_eq!(op_of(inner), "+"),
            other => panic!("expected bracketed sum, got {:?}", other),
        }
    }

    #[test]
    fn call_chain_with_arguments() {
        let e = parse("a.b.c(1, x)");
        match &e.segments[0] {
            ExpressionSegment::Call(call) => {
                let names: Vec<_> = call.member_tokens.iter().map(|t| &t.content).collect();
                assert_eq!(names, vec!["a", "b", "c"]);
                assert_eq!(call.arguments.len(), 2);
                assert!(call.brackets_present);
            }
            other => panic!("expected Call, got {:?}", other),
        }
    }

    #[test]
    fn forced_call_brackets_are_recorded() {
        let bare = parse("a");
        let forced = parse("a()");
        match (&bare.segments[0], &forced.segments[0]) {
            (ExpressionSegment::Call(b), ExpressionSegment::Call(f)) => {
                assert!(!b.brackets_present);
                assert!(f.brackets_present);
            }
            other => panic!("expected two calls, got {:?}", other),
        }
    }

    #[test]
    fn chained_call_sets() {
        let e = parse("a(0).b(1)");
        match &e.segments[0] {
            ExpressionSegment::Call(call) => {
                assert_eq!(call.member_tokens.len(), 1);
                assert_eq!(call.arguments.len(), 1);
                let tail = call.tail.as_ref().unwrap();
                assert_eq!(tail.member_tokens[0].content, "b");
                assert_eq!(tail.arguments.len(), 1);
            }
            other => panic!("expected Call, got {:?}", other),
        }
    }

    #[test]
    fn new_instance() {
        let e = parse("New Widget");
        assert!(matches!(
            &e.segments[0],
            ExpressionSegment::NewInstance { class_name } if class_name.content == "Widget"
        ));
    }

    #[test]
    fn bare_name_detection() {
        assert!(parse("a").as_single_name().is_some());
        assert!(parse("a()").as_single_name().is_none());
        assert!(parse("(a)").as_single_name().is_none());
        assert!(parse("a.b").as_single_name().is_none());
    }

    #[test]
    fn empty_argument_is_rejected() {
        let tokens: Vec<Token> = tokenize("f(1, )")
            .unwrap()
            .into_iter()
            .filter(|t| {
                !matches!(t.kind, TokenKind::Whitespace | TokenKind::EndOfStatement)
            })
            .collect();
        assert!(parse_expression(&tokens).is_err());
    }
}
