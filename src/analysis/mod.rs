//! Scope analysis: the immutable access record that flows top-down
//! through translation, and the pre-pass symbol table of function
//! signatures that the by-ref mapper consults.

use std::collections::HashSet;

use crate::ast::*;

pub mod symtab;
pub use self::symtab::FunctionTable;

/// Everything the translator may consult at one point of the descent.
/// Never mutated in place: each scope boundary derives a new record.
#[derive(Clone, Debug, Default)]
pub struct ScopeAccessInformation {
    /// rewritten name of the enclosing class, if any
    pub class_name: Option<String>,
    /// rewritten name of the enclosing function / sub / property
    pub function_name: Option<String>,
    /// the local that collects the enclosing function's return value
    pub function_return_slot: Option<String>,
    /// rewritten names declared as variables (or functions) in scope
    pub declared_names: HashSet<String>,
    /// rewritten names of the enclosing function's by-ref parameters
    pub byref_parameters: HashSet<String>,
    /// the emitted error-trapping token local, when the enclosing
    /// function registered one
    pub error_token: Option<String>,
    /// whether statements at this point may run under an active
    /// `On Error Resume Next` region
    pub may_trap: bool,
    /// the temporary holding the innermost `With` target
    pub with_target: Option<String>,
}

impl ScopeAccessInformation {
    pub fn is_declared(&self, rewritten_name: &str) -> bool {
        self.declared_names.contains(rewritten_name)
    }

    /// Derive the scope for a function body
    pub fn enter_function(
        &self,
        block: &FunctionBlock,
        return_slot: Option<String>,
        error_token: Option<String>,
        rewrite: &dyn Fn(&str) -> String,
    ) -> ScopeAccessInformation {
        let mut declared = self.declared_names.clone();
        let mut byref = HashSet::new();
        for parameter in &block.parameters {
            let name = rewrite(&parameter.name.content);
            if parameter.mode == ParamMode::ByRef {
                byref.insert(name.clone());
            }
            declared.insert(name);
        }
        declared.extend(declared_names_in(&block.body, rewrite));
        let may_trap = error_token.is_some();
        ScopeAccessInformation {
            class_name: self.class_name.clone(),
            function_name: Some(rewrite(&block.name.content)),
            function_return_slot: return_slot,
            declared_names: declared,
            byref_parameters: byref,
            error_token,
            may_trap,
            with_target: None,
        }
    }

    pub fn enter_class(
        &self,
        block: &ClassBlock,
        rewrite: &dyn Fn(&str) -> String,
    ) -> ScopeAccessInformation {
        let mut declared = self.declared_names.clone();
        declared.extend(declared_names_in(&block.body, rewrite));
        ScopeAccessInformation {
            class_name: Some(rewrite(&block.name.content)),
            function_name: None,
            function_return_slot: None,
            declared_names: declared,
            byref_parameters: HashSet::new(),
            error_token: None,
            may_trap: false,
            with_target: None,
        }
    }

    pub fn enter_with(&self, target_temp: String) -> ScopeAccessInformation {
        let mut scope = self.clone();
        scope.with_target = Some(target_temp);
        scope
    }
}

/// Names declared as variables (or callable members) directly within a
/// body. VBScript scoping is function-level: declarations inside nested
/// control-flow blocks count, declarations inside nested functions and
/// classes do not.
pub fn declared_names_in(body: &[CodeBlock], rewrite: &dyn Fn(&str) -> String) -> HashSet<String> {
    let mut names = HashSet::new();
    collect_declared(body, rewrite, &mut names);
    names
}

fn collect_declared(
    body: &[CodeBlock],
    rewrite: &dyn Fn(&str) -> String,
    names: &mut HashSet<String>,
) {
    for block in body {
        match block {
            CodeBlock::Dim(dim) => {
                for variable in &dim.variables {
                    names.insert(rewrite(&variable.name.content));
                }
            }
            CodeBlock::ReDim(redim) => {
                for variable in &redim.variables {
                    names.insert(rewrite(&variable.name.content));
                }
            }
            CodeBlock::Function(function) => {
                names.insert(rewrite(&function.name.content));
            }
            CodeBlock::Class(class) => {
                names.insert(rewrite(&class.name.content));
            }
            // loop counters are uses, not declarations; an undimmed
            // counter surfaces as an implicit local with a warning
            CodeBlock::For(b) => collect_declared(&b.body, rewrite, names),
            CodeBlock::ForEach(b) => collect_declared(&b.body, rewrite, names),
            CodeBlock::If(b) => {
                for clause in &b.clauses {
                    collect_declared(&clause.body, rewrite, names);
                }
                if let Some(else_body) = &b.else_body {
                    collect_declared(else_body, rewrite, names);
                }
            }
            CodeBlock::Do(b) => collect_declared(&b.body, rewrite, names),
            CodeBlock::While(b) => collect_declared(&b.body, rewrite, names),
            CodeBlock::Select(b) => {
                for case in &b.cases {
                    collect_declared(&case.body, rewrite, names);
                }
                if let Some(else_body) = &b.else_body {
                    collect_declared(else_body, rewrite, names);
                }
            }
            CodeBlock::With(b) => collect_declared(&b.body, rewrite, names),
            _ => {}
        }
    }
}

/// The subset of declared names introduced by `Dim`/`ReDim` directly in
/// a body (function-level scope, so nested control flow counts). The
/// emitter hoists these to one `object x = null;` run at the top of the
/// enclosing function, because a declaration emitted inside a C# block
/// would not be visible to uses outside it.
pub fn dim_declared_names_in(
    body: &[CodeBlock],
    rewrite: &dyn Fn(&str) -> String,
) -> HashSet<String> {
    let mut names = HashSet::new();
    collect_dim_declared(body, rewrite, &mut names);
    names
}

fn collect_dim_declared(
    body: &[CodeBlock],
    rewrite: &dyn Fn(&str) -> String,
    names: &mut HashSet<String>,
) {
    for block in body {
        match block {
            CodeBlock::Dim(dim) => {
                for variable in &dim.variables {
                    names.insert(rewrite(&variable.name.content));
                }
            }
            CodeBlock::ReDim(redim) => {
                for variable in &redim.variables {
                    names.insert(rewrite(&variable.name.content));
                }
            }
            CodeBlock::If(b) => {
                for clause in &b.clauses {
                    collect_dim_declared(&clause.body, rewrite, names);
                }
                if let Some(else_body) = &b.else_body {
                    collect_dim_declared(else_body, rewrite, names);
                }
            }
            CodeBlock::For(b) => collect_dim_declared(&b.body, rewrite, names),
            CodeBlock::ForEach(b) => collect_dim_declared(&b.body, rewrite, names),
            CodeBlock::Do(b) => collect_dim_declared(&b.body, rewrite, names),
            CodeBlock::While(b) => collect_dim_declared(&b.body, rewrite, names),
            CodeBlock::Select(b) => {
                for case in &b.cases {
                    collect_dim_declared(&case.body, rewrite, names);
                }
                if let Some(else_body) = &b.else_body {
                    collect_dim_declared(else_body, rewrite, names);
                }
            }
            CodeBlock::With(b) => collect_dim_declared(&b.body, rewrite, names),
            _ => {}
        }
    }
}

/// Whether a body (not descending into nested functions) contains any
/// `On Error` statement; such a body needs an error-trapping token
pub fn requires_error_token(body: &[CodeBlock]) -> bool {
    body.iter().any(|block| match block {
        CodeBlock::OnErrorResumeNext(_) | CodeBlock::OnErrorGoto0(_) => true,
        CodeBlock::If(b) => {
            b.clauses.iter().any(|c| requires_error_token(&c.body))
                || b.else_body.as_deref().map_or(false, requires_error_token)
        }
        CodeBlock::For(b) => requires_error_token(&b.body),
        CodeBlock::ForEach(b) => requires_error_token(&b.body),
        CodeBlock::Do(b) => requires_error_token(&b.body),
        CodeBlock::While(b) => requires_error_token(&b.body),
        CodeBlock::Select(b) => {
            b.cases.iter().any(|c| requires_error_token(&c.body))
                || b.else_body.as_deref().map_or(false, requires_error_token)
        }
        CodeBlock::With(b) => requires_error_token(&b.body),
        _ => false,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn lower(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    #[test]
    fn declarations_collect_through_control_flow_but_not_functions() {
        let blocks = parse(
            tokenize(
                "Dim a\nIf x Then\nDim b\nEnd If\nFunction F(p)\nDim hidden\nEnd Function",
            )
            .unwrap(),
        )
        .unwrap();
        let names = declared_names_in(&blocks, &lower);
        assert!(names.contains("a"));
        assert!(names.contains("b"));
        assert!(names.contains("f"));
        assert!(!names.contains("hidden"));
    }

    #[test]
    fn function_scope_records_byref_parameters() {
        let blocks =
            parse(tokenize("Function F(a, ByVal b)\nEnd Function").unwrap()).unwrap();
        let function = match &blocks[0] {
            CodeBlock::Function(f) => f.clone(),
            other => panic!("expected function, got {:?}", other),
        };
        let scope = ScopeAccessInformation::default().enter_function(
            &function,
            Some("retval1".into()),
            None,
            &lower,
        );
        assert!(scope.byref_parameters.contains("a"));
        assert!(!scope.byref_parameters.contains("b"));
        assert!(scope.is_declared("b"));
        assert_eq!(scope.function_name.as_deref(), Some("f"));
    }

    #[test]
    fn error_token_requirement_sees_through_nesting() {
        let blocks = parse(
            tokenize("If x Then\nOn Error Resume Next\nEnd If").unwrap(),
        )
        .unwrap();
        assert!(requires_error_token(&blocks));
        let clean = parse(tokenize("x = 1").unwrap()).unwrap();
        assert!(!requires_error_token(&clean));
    }
}
