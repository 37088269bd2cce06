//! Code generator: emit C# statement text from the block AST.
//!
//! The output is a flat sequence of `(indent, text)` tuples; the host
//! joins them with its own line terminator. All VBScript semantics are
//! realised by dispatching onto a runtime support facade whose
//! reference name is configurable (`_` by default).

use std::collections::HashSet;

use crate::analysis::{declared_names_in, dim_declared_names_in, requires_error_token,
    FunctionTable, ScopeAccessInformation};
use crate::ast::CodeBlock;
use crate::lexer::LexError;
use crate::parser::ParseError;
use crate::transform::TempNameGenerator;

pub mod bits;
mod expr;
mod stmt;

/// Spaces per indent level when rendering to text
pub const INDENT: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslatedStatement {
    pub indent: usize,
    pub text: String,
}

impl TranslatedStatement {
    pub fn new(indent: usize, text: impl Into<String>) -> TranslatedStatement {
        TranslatedStatement {
            indent,
            text: text.into(),
        }
    }

    /// Join statements into a single newline-terminated buffer
    pub fn render(statements: &[TranslatedStatement]) -> String {
        let mut out = String::new();
        for statement in statements {
            for _ in 0..statement.indent * INDENT {
                out.push(' ');
            }
            out.push_str(&statement.text);
            out.push('\n');
        }
        out
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TranslationError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("line {}: cannot lower {}", .line + 1, .what)]
    Unsupported { what: String, line: usize },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationWarning {
    pub message: String,
    pub line: usize,
}

pub struct TranslatorConfig {
    /// Host identifier-normalisation policy; the translator never
    /// interprets it beyond byte-equality of its outputs
    pub name_rewriter: Box<dyn Fn(&str) -> String>,
    /// Name of the runtime facade reference in emitted code
    pub support_class_name: String,
}

impl Default for TranslatorConfig {
    fn default() -> TranslatorConfig {
        TranslatorConfig {
            name_rewriter: Box::new(default_name_rewriter),
            support_class_name: "_".into(),
        }
    }
}

/// Lowercases (VBScript identity is case-folded identity) and steps
/// around C# keywords
pub fn default_name_rewriter(name: &str) -> String {
    const RESERVED: &[&str] = &[
        "abstract", "base", "bool", "break", "byte", "case", "catch", "char", "checked", "class",
        "const", "continue", "decimal", "default", "delegate", "do", "double", "else", "enum",
        "event", "explicit", "extern", "false", "finally", "fixed", "float", "for", "foreach",
        "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock", "long",
        "namespace", "new", "null", "object", "operator", "out", "override", "params", "private",
        "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short", "sizeof",
        "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true", "try",
        "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual", "void",
        "volatile", "while",
    ];
    let lowered = name.to_ascii_lowercase();
    if RESERVED.contains(&lowered.as_str()) {
        format!("{}_", lowered)
    } else {
        lowered
    }
}

#[derive(Debug)]
pub struct TranslationOutput {
    pub statements: Vec<TranslatedStatement>,
    pub warnings: Vec<TranslationWarning>,
}

/// Translate a complete VBScript source text
pub fn translate(
    source: &str,
    config: &TranslatorConfig,
) -> Result<TranslationOutput, TranslationError> {
    let tokens = crate::lexer::tokenize(source)?;
    let blocks = crate::parser::parse(tokens)?;
    let mut translator = Translator::new(config, &blocks);
    translator.translate_program(&blocks)
}

pub(crate) struct Translator<'a> {
    config: &'a TranslatorConfig,
    functions: FunctionTable,
    temps: TempNameGenerator,
    warnings: Vec<TranslationWarning>,
    /// undeclared names met while emitting the current function body;
    /// they become implicit local declarations at its top
    implicit_locals: HashSet<String>,
    /// innermost-first record of enclosing emitted loops, for `Exit`
    loop_stack: Vec<LoopKind>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum LoopKind {
    For,
    Do,
}

impl<'a> Translator<'a> {
    fn new(config: &'a TranslatorConfig, blocks: &[CodeBlock]) -> Translator<'a> {
        let functions = FunctionTable::build(blocks, &*config.name_rewriter);
        Translator {
            config,
            functions,
            temps: TempNameGenerator::new(),
            warnings: Vec::new(),
            implicit_locals: HashSet::new(),
            loop_stack: Vec::new(),
        }
    }

    pub(crate) fn rewrite(&self, name: &str) -> String {
        (self.config.name_rewriter)(name)
    }

    pub(crate) fn support(&self) -> &str {
        &self.config.support_class_name
    }

    pub(crate) fn warn(&mut self, message: String, line: usize) {
        self.warnings.push(TranslationWarning { message, line });
    }

    fn translate_program(
        &mut self,
        blocks: &[CodeBlock],
    ) -> Result<TranslationOutput, TranslationError> {
        let mut scope = ScopeAccessInformation {
            declared_names: declared_names_in(blocks, &*self.config.name_rewriter),
            ..ScopeAccessInformation::default()
        };
        let top_level: Vec<&CodeBlock> = blocks
            .iter()
            .filter(|b| !matches!(b, CodeBlock::Function(_) | CodeBlock::Class(_)))
            .collect();
        let needs_token = top_level
            .iter()
            .any(|b| requires_error_token(std::slice::from_ref(*b)));
        let error_token = if needs_token {
            Some(self.temps.next("errOn"))
        } else {
            None
        };
        scope.error_token = error_token.clone();
        scope.may_trap = error_token.is_some();

        self.implicit_locals.clear();
        let mut body = Vec::new();
        self.translate_blocks(blocks, &scope, 0, &mut body)?;

        let mut statements = Vec::new();
        if let Some(token) = &error_token {
            statements.push(TranslatedStatement::new(
                0,
                format!("var {} = {}.GETERRORTRAPPINGTOKEN();", token, self.support()),
            ));
        }
        // top-level declarations hoist just like function-level ones
        let hoisted = dim_declared_names_in(blocks, &*self.config.name_rewriter);
        for name in sorted(&hoisted) {
            statements.push(TranslatedStatement::new(
                0,
                format!("object {} = null;", name),
            ));
        }
        for name in sorted(&self.implicit_locals) {
            statements.push(TranslatedStatement::new(
                0,
                format!("object {} = null;", name),
            ));
        }
        statements.append(&mut body);
        if let Some(token) = &error_token {
            statements.push(TranslatedStatement::new(
                0,
                format!("{}.RELEASEERRORTRAPPINGTOKEN({});", self.support(), token),
            ));
        }
        Ok(TranslationOutput {
            statements,
            warnings: std::mem::take(&mut self.warnings),
        })
    }
}

pub(crate) fn sorted(names: &HashSet<String>) -> Vec<String> {
    let mut out: Vec<String> = names.iter().cloned().collect();
    out.sort();
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rendering_applies_indentation() {
        let statements = vec![
            TranslatedStatement::new(0, "if (x)"),
            TranslatedStatement::new(0, "{"),
            TranslatedStatement::new(1, "y = 1;"),
            TranslatedStatement::new(0, "}"),
        ];
        assert_eq!(
            TranslatedStatement::render(&statements),
            "if (x)\n{\n    y = 1;\n}\n"
        );
    }

    #[test]
    fn default_rewriter_folds_case_and_avoids_reserved_words() {
        assert_eq!(default_name_rewriter("Foo"), "foo");
        assert_eq!(default_name_rewriter("FOO"), "foo");
        assert_eq!(default_name_rewriter("Class"), "class_");
    }
}
