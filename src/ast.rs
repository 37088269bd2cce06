//! curbside's block-structured representation of VBScript source.
//!
//! Stage 1 groups the flat token stream into these blocks; expression
//! token runs inside them stay as raw (bracket-standardised) token
//! vectors until the stage-2 expression parser is invoked per statement
//! during code generation. Parents are never stored on children: scope
//! information flows top-down as an immutable record at each descent.

use crate::lexer::Token;

#[derive(Clone, Debug)]
pub enum CodeBlock {
    /// A raw statement: a call, a lone expression, anything without a
    /// leading keyword and without a top-level assignment shape
    Statement(Statement),
    ValueSetting(ValueSettingStatement),
    If(IfBlock),
    For(ForBlock),
    ForEach(ForEachBlock),
    Do(DoBlock),
    While(WhileBlock),
    Select(SelectBlock),
    Function(FunctionBlock),
    Dim(DimStatement),
    ReDim(ReDimStatement),
    OnErrorResumeNext(usize),
    OnErrorGoto0(usize),
    Comment(Token),
    Exit(ExitStatement),
    Class(ClassBlock),
    With(WithBlock),
    /// `Option Explicit`; recognised and consumed, emitted as nothing
    OptionExplicit(usize),
}

impl CodeBlock {
    /// First source line covered by the block
    pub fn line(&self) -> usize {
        match self {
            CodeBlock::Statement(s) => s.line,
            CodeBlock::ValueSetting(s) => s.line,
            CodeBlock::If(b) => b.line,
            CodeBlock::For(b) => b.line,
            CodeBlock::ForEach(b) => b.line,
            CodeBlock::Do(b) => b.line,
            CodeBlock::While(b) => b.line,
            CodeBlock::Select(b) => b.line,
            CodeBlock::Function(b) => b.line,
            CodeBlock::Dim(s) => s.line,
            CodeBlock::ReDim(s) => s.line,
            CodeBlock::OnErrorResumeNext(line) => *line,
            CodeBlock::OnErrorGoto0(line) => *line,
            CodeBlock::Comment(t) => t.line,
            CodeBlock::Exit(s) => s.line,
            CodeBlock::Class(b) => b.line,
            CodeBlock::With(b) => b.line,
            CodeBlock::OptionExplicit(line) => *line,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Statement {
    /// Bracket-standardised token run (no whitespace tokens)
    pub tokens: Vec<Token>,
    /// An inline comment that trailed the statement on its line
    pub trailing_comment: Option<Token>,
    pub line: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ValueSettingKind {
    /// plain `=` assignment
    Let,
    /// `Set ... = ...` object-reference assignment
    Set,
}

#[derive(Clone, Debug)]
pub struct ValueSettingStatement {
    pub target: Vec<Token>,
    pub value: Vec<Token>,
    pub kind: ValueSettingKind,
    pub trailing_comment: Option<Token>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct ConditionalClause {
    pub condition: Vec<Token>,
    pub body: Vec<CodeBlock>,
    pub line: usize,
}

/// Single-line and block `If` forms both normalise to this
#[derive(Clone, Debug)]
pub struct IfBlock {
    pub clauses: Vec<ConditionalClause>,
    pub else_body: Option<Vec<CodeBlock>>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct ForBlock {
    pub counter: Token,
    pub from: Vec<Token>,
    pub to: Vec<Token>,
    pub step: Option<Vec<Token>>,
    pub body: Vec<CodeBlock>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct ForEachBlock {
    pub variable: Token,
    pub target: Vec<Token>,
    pub body: Vec<CodeBlock>,
    pub line: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopConditionPosition {
    PreCondition,
    PostCondition,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LoopConditionKind {
    While,
    Until,
}

#[derive(Clone, Debug)]
pub struct DoBlock {
    /// absent for a bare `Do ... Loop`
    pub condition: Option<(LoopConditionPosition, LoopConditionKind, Vec<Token>)>,
    pub body: Vec<CodeBlock>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct WhileBlock {
    pub condition: Vec<Token>,
    pub body: Vec<CodeBlock>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct SelectCase {
    /// the comma-separated value expressions of one `Case`
    pub values: Vec<Vec<Token>>,
    pub body: Vec<CodeBlock>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct SelectBlock {
    pub target: Vec<Token>,
    pub cases: Vec<SelectCase>,
    pub else_body: Option<Vec<CodeBlock>>,
    pub line: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FunctionKind {
    Sub,
    Function,
    PropertyGet,
    PropertyLet,
    PropertySet,
}

impl FunctionKind {
    /// Functions and property getters return a value through their name
    pub fn has_return_value(self) -> bool {
        matches!(self, FunctionKind::Function | FunctionKind::PropertyGet)
    }
}

/// Parameter passing modes; VBScript defaults to by-ref
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ParamMode {
    ByRef,
    ByVal,
}

#[derive(Clone, Debug)]
pub struct Parameter {
    pub name: Token,
    pub mode: ParamMode,
}

#[derive(Clone, Debug)]
pub struct FunctionBlock {
    pub visibility: Visibility,
    /// `Public Default` on a function or property-get marks the class's
    /// default member
    pub is_default: bool,
    pub kind: FunctionKind,
    pub name: Token,
    pub parameters: Vec<Parameter>,
    pub body: Vec<CodeBlock>,
    pub line: usize,
}

/// One declared variable: scalar (`Dim a`), uninitialised array
/// (`Dim a()`) or sized array (`Dim a(5, 4)`)
#[derive(Clone, Debug)]
pub struct DimVariable {
    pub name: Token,
    pub dimensions: Option<Vec<Vec<Token>>>,
}

#[derive(Clone, Debug)]
pub struct DimStatement {
    pub visibility: Visibility,
    /// true for `Private x` / `Public x` forms (class fields or module
    /// globals), false for plain `Dim`
    pub explicit_visibility: bool,
    pub variables: Vec<DimVariable>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct ReDimStatement {
    pub preserve: bool,
    pub variables: Vec<DimVariable>,
    pub line: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExitKind {
    Do,
    For,
    Sub,
    Function,
    Property,
}

#[derive(Clone, Debug)]
pub struct ExitStatement {
    pub kind: ExitKind,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct ClassBlock {
    pub name: Token,
    pub body: Vec<CodeBlock>,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct WithBlock {
    pub target: Vec<Token>,
    pub body: Vec<CodeBlock>,
    pub line: usize,
}

/// Canonical renderer: blocks back to VBScript text. Used by the
/// parser round-trip tests; re-parsing the rendering reproduces the
/// same rendering.
pub fn render_blocks(blocks: &[CodeBlock]) -> String {
    let mut out = String::new();
    render_into(blocks, 0, &mut out);
    out
}

fn line(out: &mut String, depth: usize, text: &str) {
    for _ in 0..depth {
        out.push_str("    ");
    }
    out.push_str(text);
    out.push('\n');
}

fn render_into(blocks: &[CodeBlock], depth: usize, out: &mut String) {
    for block in blocks {
        match block {
            CodeBlock::Statement(s) => line(out, depth, &tokens_text(&s.tokens)),
            CodeBlock::ValueSetting(v) => {
                let prefix = match v.kind {
                    ValueSettingKind::Let => "",
                    ValueSettingKind::Set => "Set ",
                };
                line(
                    out,
                    depth,
                    &format!("{}{} = {}", prefix, tokens_text(&v.target), tokens_text(&v.value)),
                );
            }
            CodeBlock::If(b) => {
                for (i, clause) in b.clauses.iter().enumerate() {
                    let keyword = if i == 0 { "If" } else { "ElseIf" };
                    line(
                        out,
                        depth,
                        &format!("{} {} Then", keyword, tokens_text(&clause.condition)),
                    );
                    render_into(&clause.body, depth + 1, out);
                }
                if let Some(else_body) = &b.else_body {
                    line(out, depth, "Else");
                    render_into(else_body, depth + 1, out);
                }
                line(out, depth, "End If");
            }
            CodeBlock::For(b) => {
                let mut header = format!(
                    "For {} = {} To {}",
                    b.counter.content,
                    tokens_text(&b.from),
                    tokens_text(&b.to)
                );
                if let Some(step) = &b.step {
                    header.push_str(&format!(" Step {}", tokens_text(step)));
                }
                line(out, depth, &header);
                render_into(&b.body, depth + 1, out);
                line(out, depth, "Next");
            }
            CodeBlock::ForEach(b) => {
                line(
                    out,
                    depth,
                    &format!(
                        "For Each {} In {}",
                        b.variable.content,
                        tokens_text(&b.target)
                    ),
                );
                render_into(&b.body, depth + 1, out);
                line(out, depth, "Next");
            }
            CodeBlock::Do(b) => {
                let condition_text = |kind: &LoopConditionKind, tokens: &[Token]| {
                    let word = match kind {
                        LoopConditionKind::While => "While",
                        LoopConditionKind::Until => "Until",
                    };
                    format!("{} {}", word, tokens_text(tokens))
                };
                match &b.condition {
                    Some((LoopConditionPosition::PreCondition, kind, tokens)) => {
                        line(out, depth, &format!("Do {}", condition_text(kind, tokens)));
                        render_into(&b.body, depth + 1, out);
                        line(out, depth, "Loop");
                    }
                    Some((LoopConditionPosition::PostCondition, kind, tokens)) => {
                        line(out, depth, "Do");
                        render_into(&b.body, depth + 1, out);
                        line(out, depth, &format!("Loop {}", condition_text(kind, tokens)));
                    }
                    None => {
                        line(out, depth, "Do");
                        render_into(&b.body, depth + 1, out);
                        line(out, depth, "Loop");
                    }
                }
            }
            CodeBlock::While(b) => {
                line(out, depth, &format!("While {}", tokens_text(&b.condition)));
                render_into(&b.body, depth + 1, out);
                line(out, depth, "Wend");
            }
            CodeBlock::Select(b) => {
                line(out, depth, &format!("Select Case {}", tokens_text(&b.target)));
                for case in &b.cases {
                    let values: Vec<String> =
                        case.values.iter().map(|v| tokens_text(v)).collect();
                    line(out, depth, &format!("Case {}", values.join(", ")));
                    render_into(&case.body, depth + 1, out);
                }
                if let Some(else_body) = &b.else_body {
                    line(out, depth, "Case Else");
                    render_into(else_body, depth + 1, out);
                }
                line(out, depth, "End Select");
            }
            CodeBlock::Function(f) => {
                let mut header = String::new();
                if f.visibility == Visibility::Private {
                    header.push_str("Private ");
                }
                if f.is_default {
                    header.push_str("Public Default ");
                }
                header.push_str(match f.kind {
                    FunctionKind::Sub => "Sub",
                    FunctionKind::Function => "Function",
                    FunctionKind::PropertyGet => "Property Get",
                    FunctionKind::PropertyLet => "Property Let",
                    FunctionKind::PropertySet => "Property Set",
                });
                header.push(' ');
                header.push_str(&f.name.content);
                let parameters: Vec<String> = f
                    .parameters
                    .iter()
                    .map(|p| match p.mode {
                        ParamMode::ByRef => format!("ByRef {}", p.name.content),
                        ParamMode::ByVal => format!("ByVal {}", p.name.content),
                    })
                    .collect();
                header.push_str(&format!("({})", parameters.join(", ")));
                line(out, depth, &header);
                render_into(&f.body, depth + 1, out);
                line(
                    out,
                    depth,
                    match f.kind {
                        FunctionKind::Sub => "End Sub",
                        FunctionKind::Function => "End Function",
                        _ => "End Property",
                    },
                );
            }
            CodeBlock::Dim(d) => {
                let keyword = if d.explicit_visibility {
                    match d.visibility {
                        Visibility::Public => "Public",
                        Visibility::Private => "Private",
                    }
                } else {
                    "Dim"
                };
                line(out, depth, &format!("{} {}", keyword, dim_vars_text(&d.variables)));
            }
            CodeBlock::ReDim(r) => {
                let keyword = if r.preserve {
                    "ReDim Preserve"
                } else {
                    "ReDim"
                };
                line(out, depth, &format!("{} {}", keyword, dim_vars_text(&r.variables)));
            }
            CodeBlock::OnErrorResumeNext(_) => line(out, depth, "On Error Resume Next"),
            CodeBlock::OnErrorGoto0(_) => line(out, depth, "On Error GoTo 0"),
            CodeBlock::Comment(token) => line(out, depth, &format!("'{}", token.content)),
            CodeBlock::Exit(e) => line(
                out,
                depth,
                match e.kind {
                    ExitKind::Do => "Exit Do",
                    ExitKind::For => "Exit For",
                    ExitKind::Sub => "Exit Sub",
                    ExitKind::Function => "Exit Function",
                    ExitKind::Property => "Exit Property",
                },
            ),
            CodeBlock::Class(c) => {
                line(out, depth, &format!("Class {}", c.name.content));
                render_into(&c.body, depth + 1, out);
                line(out, depth, "End Class");
            }
            CodeBlock::With(w) => {
                line(out, depth, &format!("With {}", tokens_text(&w.target)));
                render_into(&w.body, depth + 1, out);
                line(out, depth, "End With");
            }
            CodeBlock::OptionExplicit(_) => line(out, depth, "Option Explicit"),
        }
    }
}

fn dim_vars_text(variables: &[DimVariable]) -> String {
    let parts: Vec<String> = variables
        .iter()
        .map(|v| match &v.dimensions {
            None => v.name.content.clone(),
            Some(dims) => {
                let dims: Vec<String> = dims.iter().map(|d| tokens_text(d)).collect();
                format!("{}({})", v.name.content, dims.join(", "))
            }
        })
        .collect();
    parts.join(", ")
}

/// Join a token run back into source text with canonical spacing
pub fn tokens_text(tokens: &[Token]) -> String {
    use crate::lexer::TokenKind;
    let mut out = String::new();
    for (i, token) in tokens.iter().enumerate() {
        let glued = matches!(
            token.kind,
            TokenKind::CloseBrace | TokenKind::ArgumentSeparator | TokenKind::MemberAccessor
        ) || matches!(
            tokens.get(i.wrapping_sub(1)).map(|t| t.kind),
            Some(TokenKind::OpenBrace) | Some(TokenKind::MemberAccessor)
        ) || token.kind == TokenKind::OpenBrace
            && tokens
                .get(i.wrapping_sub(1))
                .map_or(false, |t| t.is_value_like());
        if i > 0 && !glued {
            out.push(' ');
        }
        match token.kind {
            TokenKind::StringLiteral => {
                out.push('"');
                out.push_str(&token.content.replace('"', "\"\""));
                out.push('"');
            }
            _ => out.push_str(&token.content),
        }
    }
    out
}
