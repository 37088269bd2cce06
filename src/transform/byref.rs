//! The by-ref alias mapper.
//!
//! VBScript parameters default to by-ref. When a nested call receives
//! the caller's own by-ref parameter in a slot the callee also wants
//! by-ref, the emitted C# would have to capture a `ref` parameter
//! inside a lambda (an argument provider or an error-trap wrapper),
//! which C# forbids. Each such expression is instead emitted as a
//! triple: declare an alias local and copy the parameter in, evaluate
//! the expression with every occurrence of the parameter substituted by
//! the alias, then copy the alias back out. The write-back runs
//! strictly after the call returns, including when that return is a
//! swallowed trapped error.

use std::collections::HashMap;

use crate::analysis::{FunctionTable, ScopeAccessInformation};
use crate::ast::ParamMode;
use crate::parser::expr::{CallSegment, Expression, ExpressionSegment};
use crate::transform::TempNameGenerator;

/// One planned rewrite: `from` is the rewritten parameter name, `to`
/// the alias local that stands in for it during evaluation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ByRefMapping {
    pub from: String,
    pub to: String,
}

/// Substitution table used while emitting the rewritten expression:
/// rewritten parameter name to alias local
pub type AliasMap = HashMap<String, String>;

/// Inspect an expression and plan the alias set it needs. One alias per
/// parameter name, however many times the parameter appears.
pub fn plan_mappings(
    expression: &Expression,
    scope: &ScopeAccessInformation,
    functions: &FunctionTable,
    temps: &mut TempNameGenerator,
    rewrite: &dyn Fn(&str) -> String,
) -> Vec<ByRefMapping> {
    let mut mappings: Vec<ByRefMapping> = Vec::new();
    visit_expression(expression, scope, functions, rewrite, &mut |name| {
        if mappings.iter().any(|m| m.from == name) {
            return;
        }
        let to = temps.next("byRefAlias");
        mappings.push(ByRefMapping { from: name, to });
    });
    mappings
}

impl ByRefMapping {
    pub fn alias_map(mappings: &[ByRefMapping]) -> AliasMap {
        mappings
            .iter()
            .map(|m| (m.from.clone(), m.to.clone()))
            .collect()
    }
}

fn visit_expression(
    expression: &Expression,
    scope: &ScopeAccessInformation,
    functions: &FunctionTable,
    rewrite: &dyn Fn(&str) -> String,
    record: &mut dyn FnMut(String),
) {
    for segment in &expression.segments {
        match segment {
            ExpressionSegment::Call(call) => {
                visit_call(call, scope, functions, rewrite, record);
            }
            ExpressionSegment::Bracketed(inner) => {
                visit_expression(inner, scope, functions, rewrite, record);
            }
            _ => {}
        }
    }
}

fn visit_call(
    call: &CallSegment,
    scope: &ScopeAccessInformation,
    functions: &FunctionTable,
    rewrite: &dyn Fn(&str) -> String,
    record: &mut dyn FnMut(String),
) {
    // only a direct single-name callee can resolve to a known signature;
    // member invocations go through the runtime and marshal by value
    let callee = if call.member_tokens.len() == 1 && !call.leading_accessor {
        Some(rewrite(&call.member_tokens[0].content))
    } else {
        None
    };
    for (index, argument) in call.arguments.iter().enumerate() {
        let wants_byref = callee
            .as_deref()
            .and_then(|name| functions.param_mode(name, index))
            == Some(ParamMode::ByRef);
        if wants_byref {
            // an intervening bracket (`F((p))`) forces by-value and
            // needs no alias; `as_single_name` rejects that shape
            if let Some(token) = argument.as_single_name() {
                let name = rewrite(&token.content);
                if scope.byref_parameters.contains(&name) {
                    record(name);
                    continue;
                }
            }
        }
        visit_expression(argument, scope, functions, rewrite, record);
    }
    if let Some(tail) = &call.tail {
        visit_call(tail, scope, functions, rewrite, record);
    }
}
