//! curbside's token model: the flat output of the first tokenizing stage

use std::fmt;

/// A single source token, tagged with the (zero-based) line it started on.
///
/// Names keep their original casing in `content`; all identity comparisons
/// in later stages go through the host's name rewriter, never through the
/// raw content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub content: String,
    pub line: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// An identifier that matched none of the fixed tables
    Name,
    /// An identifier from the builtin-function table (`Len`, `CInt`, ...)
    BuiltInFunction,
    /// An identifier from the builtin-value table (`True`, `Null`, `vbCrLf`)
    BuiltInValue,
    /// An identifier from the keyword table (`If`, `Dim`, `End`, ...)
    Keyword,
    /// A numeric literal; hex and octal forms are normalised to decimal
    NumericLiteral,
    /// The unescaped content of a `"`-delimited literal
    StringLiteral,
    /// `+ - * / \ ^ &` or the keyword operators `Mod And Or Xor Not Eqv Imp`
    Operator,
    /// `= <> < > <= >=` or the keyword operator `Is`
    ComparisonOperator,
    /// A `.` whose role the lexer could not pin down; the stage-1 parser
    /// resolves every one of these before stage 2 runs
    MemberAccessorOrDecimalPoint,
    /// A `.` known to join a member-access chain
    MemberAccessor,
    OpenBrace,
    CloseBrace,
    ArgumentSeparator,
    /// A line break or `:` outside any bracketed region
    EndOfStatement,
    /// A `'` comment preceded by other content on its line
    InlineComment,
    /// A `'` or `Rem` comment that owns its line
    Comment,
    Whitespace,
}

impl TokenKind {
    pub fn is_value_like(self) -> bool {
        matches!(
            self,
            TokenKind::Name
                | TokenKind::BuiltInFunction
                | TokenKind::BuiltInValue
                | TokenKind::NumericLiteral
                | TokenKind::StringLiteral
                | TokenKind::CloseBrace
        )
    }
}

impl Token {
    pub fn new(kind: TokenKind, content: impl Into<String>, line: usize) -> Token {
        Token {
            kind,
            content: content.into(),
            line,
        }
    }

    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    /// Case-insensitive keyword test
    pub fn is_keyword(&self, word: &str) -> bool {
        self.kind == TokenKind::Keyword && self.content.eq_ignore_ascii_case(word)
    }

    pub fn is_operator(&self, symbol: &str) -> bool {
        self.kind == TokenKind::Operator && self.content.eq_ignore_ascii_case(symbol)
    }

    pub fn is_comparison(&self, symbol: &str) -> bool {
        self.kind == TokenKind::ComparisonOperator && self.content.eq_ignore_ascii_case(symbol)
    }

    pub fn is_builtin_value(&self, word: &str) -> bool {
        self.kind == TokenKind::BuiltInValue && self.content.eq_ignore_ascii_case(word)
    }

    /// Tokens that can begin a member-access chain
    pub fn is_name_like(&self) -> bool {
        matches!(self.kind, TokenKind::Name | TokenKind::BuiltInFunction)
    }

    /// Tokens that may legally precede a decimal point belonging to a
    /// member access rather than a numeric literal
    pub fn is_value_like(&self) -> bool {
        self.kind.is_value_like()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.kind {
            TokenKind::StringLiteral => write!(f, "\"{}\"", self.content.replace('"', "\"\"")),
            TokenKind::EndOfStatement => write!(f, "<eos>"),
            _ => write!(f, "{}", self.content),
        }
    }
}

/// Statement and block keywords. `Rem` is handled inside the lexer (it
/// swallows the rest of the line) and never reaches this table at runtime,
/// but sits here so `is_identifier_keyword` stays the single source of truth.
pub const KEYWORDS: &[&str] = &[
    "ByRef", "ByVal", "Call", "Case", "Class", "Const", "Default", "Dim", "Do", "Each", "Else",
    "ElseIf", "End", "Error", "Exit", "Explicit", "For", "Function", "Get", "GoTo", "If", "In",
    "Let", "Loop", "New", "Next", "On", "Option", "Preserve", "Private", "Property", "Public",
    "ReDim", "Rem", "Resume", "Select", "Set", "Step", "Sub", "Then", "To", "Until", "Wend",
    "While", "With",
];

/// Identifier-shaped operators (all at `Operator` kind except `Is`)
pub const OPERATOR_KEYWORDS: &[&str] = &["And", "Eqv", "Imp", "Mod", "Not", "Or", "Xor"];

/// The builtin functions the translator recognises; calls to these dispatch
/// straight onto the runtime facade rather than through `CALL`.
pub const BUILTIN_FUNCTIONS: &[&str] = &[
    "Abs", "Array", "Asc", "CBool", "CByte", "CCur", "CDate", "CDbl", "Chr", "CInt", "CLng",
    "CSng", "CStr", "Date", "DateAdd", "DateDiff", "Day", "Fix", "Hex", "Hour", "InStr", "Int",
    "IsArray", "IsDate", "IsEmpty", "IsNull", "IsNumeric", "IsObject", "LBound", "LCase", "Left",
    "Len", "LTrim", "Mid", "Minute", "Month", "Now", "Oct", "Replace", "Right", "Rnd", "Round",
    "RTrim", "Second", "Sgn", "Space", "Split", "StrComp", "String", "Time", "Timer", "Trim",
    "TypeName", "UBound", "UCase", "VarType", "Year",
];

pub const BUILTIN_VALUES: &[&str] = &[
    "Empty",
    "False",
    "Nothing",
    "Null",
    "True",
    "vbCr",
    "vbCrLf",
    "vbLf",
    "vbNullString",
    "vbObjectError",
    "vbTab",
];

fn table_contains(table: &[&str], word: &str) -> bool {
    table.iter().any(|entry| entry.eq_ignore_ascii_case(word))
}

/// Classify an identifier against the fixed tables
pub fn classify_identifier(word: &str) -> TokenKind {
    if word.eq_ignore_ascii_case("Is") {
        TokenKind::ComparisonOperator
    } else if table_contains(OPERATOR_KEYWORDS, word) {
        TokenKind::Operator
    } else if table_contains(KEYWORDS, word) {
        TokenKind::Keyword
    } else if table_contains(BUILTIN_FUNCTIONS, word) {
        TokenKind::BuiltInFunction
    } else if table_contains(BUILTIN_VALUES, word) {
        TokenKind::BuiltInValue
    } else {
        TokenKind::Name
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify_identifier("dim"), TokenKind::Keyword);
        assert_eq!(classify_identifier("DIM"), TokenKind::Keyword);
        assert_eq!(classify_identifier("mOd"), TokenKind::Operator);
        assert_eq!(classify_identifier("is"), TokenKind::ComparisonOperator);
        assert_eq!(classify_identifier("len"), TokenKind::BuiltInFunction);
        assert_eq!(classify_identifier("NULL"), TokenKind::BuiltInValue);
        assert_eq!(classify_identifier("frobnicate"), TokenKind::Name);
    }

    #[test]
    fn keyword_test_ignores_case_but_not_kind() {
        let t = Token::new(TokenKind::Keyword, "If", 0);
        assert!(t.is_keyword("IF"));
        let n = Token::new(TokenKind::Name, "If", 0);
        assert!(!n.is_keyword("If"));
    }
}
