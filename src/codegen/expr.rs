//! Expression translation: segment trees to C# expression text.
//!
//! Three call shapes are emitted. Builtin functions dispatch straight
//! onto the facade (`_.LEN(x)`); known user functions become direct
//! method calls (`f(ref p)`), which is what makes the by-ref alias
//! rewriting necessary inside closures; everything else routes through
//! the runtime's polymorphic `CALL` with an argument-provider chain
//! that carries write-back lambdas for by-ref-compatible arguments.

use super::{TranslationError, Translator};
use crate::analysis::ScopeAccessInformation;
use crate::ast::ParamMode;
use crate::lexer::{Token, TokenKind};
use crate::parser::expr::{CallSegment, Expression, ExpressionSegment};
use crate::transform::AliasMap;

pub(crate) struct ExprCtx<'a> {
    pub scope: &'a ScopeAccessInformation,
    pub aliases: &'a AliasMap,
}

/// Facade operator for a binary/unary operator token
fn operator_name(content: &str) -> Option<&'static str> {
    Some(match content.to_ascii_uppercase().as_str() {
        "^" => "POW",
        "/" => "DIV",
        "*" => "MULT",
        "\\" => "INTDIV",
        "MOD" => "MOD",
        "+" => "ADD",
        "-" => "SUBT",
        "&" => "CONCAT",
        "AND" => "AND",
        "OR" => "OR",
        "XOR" => "XOR",
        "EQV" => "EQV",
        "IMP" => "IMP",
        "NOT" => "NOT",
        "=" => "EQ",
        "<>" => "NOTEQ",
        "<" => "LT",
        ">" => "GT",
        "<=" => "LTE",
        ">=" => "GTE",
        "IS" => "IS",
        _ => return None,
    })
}

impl<'a> Translator<'a> {
    /// Expression in value position
    pub(crate) fn translate_expression(
        &mut self,
        expression: &Expression,
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
    ) -> Result<String, TranslationError> {
        self.translate_expression_inner(expression, ctx, pre, false)
    }

    /// Expression in statement position: a bare or member read becomes a
    /// forced call
    pub(crate) fn translate_statement_expression(
        &mut self,
        expression: &Expression,
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
    ) -> Result<String, TranslationError> {
        self.translate_expression_inner(expression, ctx, pre, true)
    }

    fn translate_expression_inner(
        &mut self,
        expression: &Expression,
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
        force_call: bool,
    ) -> Result<String, TranslationError> {
        match expression.segments.as_slice() {
            [single] => self.translate_segment(single, ctx, pre, force_call),
            [op, operand] => {
                let operand = self.translate_segment(operand, ctx, pre, false)?;
                let symbol = operation_symbol(op)
                    .ok_or_else(|| malformed_tree(expression.line(), "unary shape"))?;
                if symbol == "+" {
                    // a surviving unary plus is the identity
                    return Ok(operand);
                }
                let name = operator_name(symbol)
                    .ok_or_else(|| malformed_tree(expression.line(), "unary operator"))?;
                Ok(format!("{}.{}({})", self.support(), name, operand))
            }
            [left, op, right] => {
                let left = self.translate_segment(left, ctx, pre, false)?;
                let right = self.translate_segment(right, ctx, pre, false)?;
                let symbol = operation_symbol(op)
                    .ok_or_else(|| malformed_tree(expression.line(), "binary shape"))?;
                let name = operator_name(symbol)
                    .ok_or_else(|| malformed_tree(expression.line(), "binary operator"))?;
                Ok(format!("{}.{}({}, {})", self.support(), name, left, right))
            }
            _ => Err(malformed_tree(expression.line(), "segment count")),
        }
    }

    fn translate_segment(
        &mut self,
        segment: &ExpressionSegment,
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
        force_call: bool,
    ) -> Result<String, TranslationError> {
        match segment {
            ExpressionSegment::Numeric { token } => Ok(super::bits::numeric_text(token)),
            ExpressionSegment::VString { token } => Ok(super::bits::csharp_string(&token.content)),
            ExpressionSegment::Builtin { token } => {
                Ok(super::bits::builtin_value_text(token, self.support()))
            }
            ExpressionSegment::NewInstance { class_name } => Ok(format!(
                "{}.NEW(new {}({}))",
                self.support(),
                self.rewrite(&class_name.content),
                self.support()
            )),
            ExpressionSegment::Bracketed(inner) => {
                let inner = self.translate_expression(inner, ctx, pre)?;
                Ok(format!("({})", inner))
            }
            ExpressionSegment::Call(call) => self.translate_call(call, ctx, pre, force_call),
            ExpressionSegment::Operation { token } => {
                Err(malformed_tree(token.line, "stray operation"))
            }
        }
    }

    fn translate_call(
        &mut self,
        call: &CallSegment,
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
        force_call: bool,
    ) -> Result<String, TranslationError> {
        let line = call.member_tokens.first().map_or(0, |t| t.line);
        let mut text = if call.leading_accessor {
            let target =
                ctx.scope
                    .with_target
                    .clone()
                    .ok_or_else(|| TranslationError::Unsupported {
                        what: "a leading member accessor outside any With block".into(),
                        line,
                    })?;
            self.runtime_call(&target, &call.member_tokens, &call.arguments, ctx, pre)?
        } else {
            let first = call.member_tokens[0].clone();
            let rest = &call.member_tokens[1..];
            let rewritten = self.rewrite(&first.content);
            if first.kind == TokenKind::BuiltInFunction && rest.is_empty() {
                self.builtin_call(&first.content, &call.arguments, ctx, pre)?
            } else if rest.is_empty()
                && !ctx.aliases.contains_key(&rewritten)
                && self.functions.is_known(&rewritten)
            {
                self.known_function_call(&rewritten, call, ctx, pre)?
            } else {
                let base = self.resolve_value_name(&first, ctx);
                if rest.is_empty() && call.arguments.is_empty() {
                    if call.brackets_present || force_call {
                        format!("{}.CALL({})", self.support(), base)
                    } else {
                        base
                    }
                } else {
                    self.runtime_call(&base, rest, &call.arguments, ctx, pre)?
                }
            }
        };
        let mut tail = call.tail.as_deref();
        while let Some(next) = tail {
            text = self.runtime_call(&text, &next.member_tokens, &next.arguments, ctx, pre)?;
            tail = next.tail.as_deref();
        }
        Ok(text)
    }

    /// `_.CALL(base, "Member", ..., _.ARGS()...)`
    fn runtime_call(
        &mut self,
        base: &str,
        members: &[Token],
        arguments: &[Expression],
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
    ) -> Result<String, TranslationError> {
        let mut parts: Vec<String> = vec![base.to_string()];
        for member in members {
            parts.push(format!("\"{}\"", self.rewrite(&member.content)));
        }
        if !arguments.is_empty() {
            parts.push(self.argument_provider(arguments, ctx, pre)?);
        }
        Ok(format!("{}.CALL({})", self.support(), parts.join(", ")))
    }

    /// `_.ARGS().Val(x).Ref(y, update1 => { y = update1; })`
    fn argument_provider(
        &mut self,
        arguments: &[Expression],
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
    ) -> Result<String, TranslationError> {
        let mut text = format!("{}.ARGS()", self.support());
        for argument in arguments {
            let settable = match argument.as_single_name() {
                Some(token) if !self.functions.is_known(&self.rewrite(&token.content)) => {
                    Some(token.clone())
                }
                _ => None,
            };
            match settable {
                Some(token) => {
                    let resolved = self.resolve_value_name(&token, ctx);
                    let update = self.temps.next("update");
                    text.push_str(&format!(
                        ".Ref({}, {} => {{ {} = {}; }})",
                        resolved, update, resolved, update
                    ));
                }
                None => {
                    let value = self.translate_expression(argument, ctx, pre)?;
                    text.push_str(&format!(".Val({})", value));
                }
            }
        }
        Ok(text)
    }

    fn builtin_call(
        &mut self,
        name: &str,
        arguments: &[Expression],
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
    ) -> Result<String, TranslationError> {
        let mut args = Vec::with_capacity(arguments.len());
        for argument in arguments {
            args.push(self.translate_expression(argument, ctx, pre)?);
        }
        Ok(format!(
            "{}.{}({})",
            self.support(),
            name.to_ascii_uppercase(),
            args.join(", ")
        ))
    }

    /// Direct call onto a translated function: by-ref slots take `ref`
    /// arguments, which is what the alias rewriting exists to permit
    fn known_function_call(
        &mut self,
        rewritten: &str,
        call: &CallSegment,
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
    ) -> Result<String, TranslationError> {
        let mut args = Vec::with_capacity(call.arguments.len());
        for (index, argument) in call.arguments.iter().enumerate() {
            let mode = self
                .functions
                .param_mode(rewritten, index)
                .unwrap_or(ParamMode::ByVal);
            if mode == ParamMode::ByRef {
                if let Some(token) = argument.as_single_name() {
                    let token = token.clone();
                    let resolved = self.resolve_value_name(&token, ctx);
                    args.push(format!("ref {}", resolved));
                    continue;
                }
                // not an lvalue: evaluate into a discarded temporary to
                // preserve the forced-by-value semantics
                let value = self.translate_expression(argument, ctx, pre)?;
                let temp = self.temps.next("refArg");
                pre.push(format!("var {} = {};", temp, value));
                args.push(format!("ref {}", temp));
            } else {
                args.push(self.translate_expression(argument, ctx, pre)?);
            }
        }
        Ok(format!("{}({})", rewritten, args.join(", ")))
    }

    /// Resolve a name in value position: alias substitution first, then
    /// declared names, then implicit declaration with a warning
    pub(crate) fn resolve_value_name(&mut self, token: &Token, ctx: &ExprCtx) -> String {
        let rewritten = self.rewrite(&token.content);
        if let Some(alias) = ctx.aliases.get(&rewritten) {
            return alias.clone();
        }
        if ctx.scope.is_declared(&rewritten) || self.implicit_locals.contains(&rewritten) {
            return rewritten;
        }
        self.warn(
            format!("undeclared variable '{}'", token.content),
            token.line,
        );
        self.implicit_locals.insert(rewritten.clone());
        rewritten
    }
}

fn operation_symbol(segment: &ExpressionSegment) -> Option<&str> {
    match segment {
        ExpressionSegment::Operation { token } => Some(token.content.as_str()),
        _ => None,
    }
}

fn malformed_tree(line: usize, what: &str) -> TranslationError {
    TranslationError::Unsupported {
        what: format!("malformed expression tree ({})", what),
        line,
    }
}
