//! Statement and block translation: control-flow skeletons, error-trap
//! wrapping, by-ref alias open/evaluate/close sequences, and the
//! declaration hoisting that reconciles VBScript's function-level scope
//! with C#'s block scope.

use super::expr::ExprCtx;
use super::{sorted, LoopKind, TranslatedStatement, TranslationError, Translator};
use crate::analysis::{dim_declared_names_in, requires_error_token, ScopeAccessInformation};
use crate::ast::*;
use crate::lexer::Token;
use crate::parser::expr::{parse_expression, CallSegment, Expression, ExpressionSegment};
use crate::transform::{plan_mappings, AliasMap, ByRefMapping};

/// A condition prepared for emission: any pre/post statement lines plus
/// the expression text to test
struct BuiltCondition {
    pre: Vec<String>,
    text: String,
    post: Vec<String>,
}

impl BuiltCondition {
    fn is_inline(&self) -> bool {
        self.pre.is_empty() && self.post.is_empty()
    }

    /// Whether the by-ref mapper had to rewrite this condition
    fn required_rewriting(&self) -> bool {
        !self.post.is_empty()
    }
}

impl<'a> Translator<'a> {
    pub(crate) fn translate_blocks(
        &mut self,
        blocks: &[CodeBlock],
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        for block in blocks {
            self.translate_block(block, scope, indent, out)?;
        }
        Ok(())
    }

    fn translate_block(
        &mut self,
        block: &CodeBlock,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        match block {
            CodeBlock::Statement(s) => self.translate_raw_statement(s, scope, indent, out),
            CodeBlock::ValueSetting(v) => self.translate_value_setting(v, scope, indent, out),
            CodeBlock::If(b) => self.translate_if(b, scope, indent, out),
            CodeBlock::For(b) => self.translate_for(b, scope, indent, out),
            CodeBlock::ForEach(b) => self.translate_for_each(b, scope, indent, out),
            CodeBlock::Do(b) => self.translate_do(b, scope, indent, out),
            CodeBlock::While(b) => self.translate_while(b, scope, indent, out),
            CodeBlock::Select(b) => self.translate_select(b, scope, indent, out),
            CodeBlock::Function(f) => self.translate_function(f, scope, indent, out),
            CodeBlock::Dim(d) => self.translate_dim(d, scope, indent, out),
            CodeBlock::ReDim(r) => self.translate_redim(r, scope, indent, out),
            CodeBlock::OnErrorResumeNext(line) => {
                let token = self.expect_error_token(scope, *line)?;
                out.push(TranslatedStatement::new(
                    indent,
                    format!(
                        "{}.STARTERRORTRAPPINGANDCLEARANYERROR({});",
                        self.support(),
                        token
                    ),
                ));
                Ok(())
            }
            CodeBlock::OnErrorGoto0(line) => {
                let token = self.expect_error_token(scope, *line)?;
                out.push(TranslatedStatement::new(
                    indent,
                    format!(
                        "{}.STOPERRORTRAPPINGANDCLEARANYERROR({});",
                        self.support(),
                        token
                    ),
                ));
                Ok(())
            }
            CodeBlock::Comment(token) => {
                out.push(TranslatedStatement::new(
                    indent,
                    format!("//{}", token.content),
                ));
                Ok(())
            }
            CodeBlock::Exit(e) => self.translate_exit(e, scope, indent, out),
            CodeBlock::Class(c) => self.translate_class(c, scope, indent, out),
            CodeBlock::With(w) => self.translate_with(w, scope, indent, out),
            CodeBlock::OptionExplicit(_) => Ok(()),
        }
    }

    fn expect_error_token(
        &self,
        scope: &ScopeAccessInformation,
        line: usize,
    ) -> Result<String, TranslationError> {
        scope
            .error_token
            .clone()
            .ok_or_else(|| TranslationError::Unsupported {
                what: "On Error outside a statement context".into(),
                line,
            })
    }

    fn translate_raw_statement(
        &mut self,
        statement: &Statement,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let expression = parse_expression(&statement.tokens)?;
        let mappings = self.plan(&expression, scope);
        let aliases = ByRefMapping::alias_map(&mappings);
        let ctx = ExprCtx {
            scope,
            aliases: &aliases,
        };
        let mut pre = Vec::new();
        let core = self.translate_statement_expression(&expression, &ctx, &mut pre)?;
        self.emit_action(
            format!("{};", core),
            &mappings,
            pre,
            scope,
            indent,
            statement.trailing_comment.as_ref(),
            out,
        );
        Ok(())
    }

    fn translate_value_setting(
        &mut self,
        setting: &ValueSettingStatement,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let value_expression = parse_expression(&setting.value)?;
        let mappings = self.plan(&value_expression, scope);
        let aliases = ByRefMapping::alias_map(&mappings);
        let ctx = ExprCtx {
            scope,
            aliases: &aliases,
        };
        let mut pre = Vec::new();
        let mut value = self.translate_expression(&value_expression, &ctx, &mut pre)?;
        if setting.kind == ValueSettingKind::Set {
            value = format!("{}.OBJ({})", self.support(), value);
        }
        let core = self.translate_assignment(&setting.target, &value, &ctx, &mut pre, setting.line)?;
        self.emit_action(
            core,
            &mappings,
            pre,
            scope,
            indent,
            setting.trailing_comment.as_ref(),
            out,
        );
        Ok(())
    }

    /// Build the assignment statement text for a target token run
    fn translate_assignment(
        &mut self,
        target: &[Token],
        value: &str,
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
        line: usize,
    ) -> Result<String, TranslationError> {
        let target_expression = parse_expression(target)?;
        let call = match target_expression.segments.as_slice() {
            [ExpressionSegment::Call(call)] => call.clone(),
            _ => {
                return Err(TranslationError::Unsupported {
                    what: "assignment target shape".into(),
                    line,
                })
            }
        };
        if let Some(token) = call.as_bare_name() {
            let rewritten = self.rewrite(&token.content);
            if ctx.scope.function_name.as_deref() == Some(rewritten.as_str()) {
                if let Some(slot) = &ctx.scope.function_return_slot {
                    return Ok(format!("{} = {};", slot, value));
                }
            }
            let token = token.clone();
            let resolved = self.resolve_value_name(&token, ctx);
            return Ok(format!("{} = {};", resolved, value));
        }

        // an indexed or member destination lowers to SET; peel the final
        // member-with-arguments off the chain, the rest is the base
        let (base, member, arguments) = self.decompose_set_target(&call, ctx, pre, line)?;
        let mut args_text = format!("{}.ARGS()", self.support());
        for argument in &arguments {
            let text = self.translate_expression(argument, ctx, pre)?;
            args_text.push_str(&format!(".Val({})", text));
        }
        let member = match member {
            Some(name) => format!("\"{}\"", name),
            None => "null".into(),
        };
        Ok(format!(
            "{}.SET({}, {}, {}, {});",
            self.support(),
            value,
            base,
            member,
            args_text
        ))
    }

    fn decompose_set_target(
        &mut self,
        call: &CallSegment,
        ctx: &ExprCtx,
        pre: &mut Vec<String>,
        line: usize,
    ) -> Result<(String, Option<String>, Vec<Expression>), TranslationError> {
        // split the chain into everything-but-last and the last segment
        let mut head = call.clone();
        let last = detach_last_segment(&mut head);
        match last {
            Some(last) => {
                // the chain had a tail: translate the head as a value read
                if last.member_tokens.len() > 1 {
                    return Err(TranslationError::Unsupported {
                        what: "a multi-member trailing segment in an assignment target".into(),
                        line,
                    });
                }
                let head_expression = Expression::single(ExpressionSegment::Call(head));
                let mut base_pre = Vec::new();
                let base = self.translate_expression(&head_expression, ctx, &mut base_pre)?;
                pre.extend(base_pre);
                let member = last
                    .member_tokens
                    .last()
                    .map(|t| self.rewrite(&t.content));
                Ok((base, member, last.arguments))
            }
            None => {
                // single segment: `a(i) = v`, `a.b = v`, `a.b(i) = v` or
                // `.b = v` under With
                let mut members = call.member_tokens.clone();
                if call.leading_accessor {
                    let target = ctx.scope.with_target.clone().ok_or_else(|| {
                        TranslationError::Unsupported {
                            what: "a leading member accessor outside any With block".into(),
                            line,
                        }
                    })?;
                    let member = members.pop().map(|t| self.rewrite(&t.content));
                    if !members.is_empty() {
                        let base = self.chain_read(&target, &members);
                        return Ok((base, member, call.arguments.clone()));
                    }
                    return Ok((target, member, call.arguments.clone()));
                }
                let first = members.remove(0);
                let base = self.resolve_value_name(&first, ctx);
                if members.is_empty() {
                    // `a(i) = v`
                    return Ok((base, None, call.arguments.clone()));
                }
                let member = members.pop().map(|t| self.rewrite(&t.content));
                if members.is_empty() {
                    return Ok((base, member, call.arguments.clone()));
                }
                let base = self.chain_read(&base, &members);
                Ok((base, member, call.arguments.clone()))
            }
        }
    }

    /// Read a member chain off an already-resolved base
    fn chain_read(&mut self, base: &str, members: &[Token]) -> String {
        let mut parts = vec![base.to_string()];
        for member in members {
            parts.push(format!("\"{}\"", self.rewrite(&member.content)));
        }
        format!("{}.CALL({})", self.support(), parts.join(", "))
    }

    fn plan(
        &mut self,
        expression: &Expression,
        scope: &ScopeAccessInformation,
    ) -> Vec<ByRefMapping> {
        plan_mappings(
            expression,
            scope,
            &self.functions,
            &mut self.temps,
            &*self.config.name_rewriter,
        )
    }

    /// Emit one action statement with its alias open/close lines and,
    /// when the statement may run under an active trap, the
    /// `HANDLEERROR` wrapper
    #[allow(clippy::too_many_arguments)]
    fn emit_action(
        &mut self,
        core: String,
        mappings: &[ByRefMapping],
        pre: Vec<String>,
        scope: &ScopeAccessInformation,
        indent: usize,
        comment: Option<&Token>,
        out: &mut Vec<TranslatedStatement>,
    ) {
        for mapping in mappings {
            out.push(TranslatedStatement::new(
                indent,
                format!("var {} = {};", mapping.to, mapping.from),
            ));
        }
        for line in pre {
            out.push(TranslatedStatement::new(indent, line));
        }
        let core = match comment {
            Some(token) => format!("{} //{}", core, token.content),
            None => core,
        };
        match (&scope.error_token, scope.may_trap) {
            (Some(token), true) => {
                out.push(TranslatedStatement::new(
                    indent,
                    format!("{}.HANDLEERROR({}, () => {{", self.support(), token),
                ));
                out.push(TranslatedStatement::new(indent + 1, core));
                out.push(TranslatedStatement::new(indent, "});"));
            }
            _ => out.push(TranslatedStatement::new(indent, core)),
        }
        for mapping in mappings {
            out.push(TranslatedStatement::new(
                indent,
                format!("{} = {};", mapping.from, mapping.to),
            ));
        }
    }

    /// Prepare a boolean-test position: the three emission forms of the
    /// condition cascade
    fn build_condition(
        &mut self,
        tokens: &[Token],
        scope: &ScopeAccessInformation,
    ) -> Result<BuiltCondition, TranslationError> {
        let expression = parse_expression(tokens)?;
        let mappings = self.plan(&expression, scope);
        let aliases = ByRefMapping::alias_map(&mappings);
        let ctx = ExprCtx {
            scope,
            aliases: &aliases,
        };
        let mut pre = Vec::new();
        let value = self.translate_expression(&expression, &ctx, &mut pre)?;
        let trapped = match (&scope.error_token, scope.may_trap) {
            (Some(token), true) => Some(token.clone()),
            _ => None,
        };
        if mappings.is_empty() {
            let text = match trapped {
                Some(token) => format!("{}.IF(() => {}, {})", self.support(), value, token),
                None => format!("{}.IF({})", self.support(), value),
            };
            return Ok(BuiltCondition {
                pre,
                text,
                post: Vec::new(),
            });
        }
        // by-ref rewriting: open aliases, evaluate into a local, close
        let mut lines: Vec<String> = mappings
            .iter()
            .map(|m| format!("var {} = {};", m.to, m.from))
            .collect();
        lines.extend(pre);
        let result = self.temps.next("ifResult");
        let evaluated = match trapped {
            Some(token) => format!("{}.IF(() => {}, {})", self.support(), value, token),
            None => format!("{}.IF({})", self.support(), value),
        };
        lines.push(format!("var {} = {};", result, evaluated));
        let post = mappings
            .iter()
            .map(|m| format!("{} = {};", m.from, m.to))
            .collect();
        Ok(BuiltCondition {
            pre: lines,
            text: result,
            post,
        })
    }

    fn translate_if(
        &mut self,
        block: &IfBlock,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let mut nested = 0usize;
        let mut chain_broken = false;
        let mut cursor = indent;
        for (i, clause) in block.clauses.iter().enumerate() {
            let condition = self.build_condition(&clause.condition, scope)?;
            if i == 0 {
                for line in &condition.pre {
                    out.push(TranslatedStatement::new(cursor, line.clone()));
                }
                for line in &condition.post {
                    out.push(TranslatedStatement::new(cursor, line.clone()));
                }
                out.push(TranslatedStatement::new(
                    cursor,
                    format!("if ({})", condition.text),
                ));
            } else if chain_broken || !condition.is_inline() {
                // a predecessor (or this clause) required rewriting: the
                // alias sequence must only run when control reaches it
                out.push(TranslatedStatement::new(cursor, "}"));
                out.push(TranslatedStatement::new(cursor, "else"));
                out.push(TranslatedStatement::new(cursor, "{"));
                nested += 1;
                cursor = indent + nested;
                for line in &condition.pre {
                    out.push(TranslatedStatement::new(cursor, line.clone()));
                }
                for line in &condition.post {
                    out.push(TranslatedStatement::new(cursor, line.clone()));
                }
                out.push(TranslatedStatement::new(
                    cursor,
                    format!("if ({})", condition.text),
                ));
            } else {
                out.push(TranslatedStatement::new(cursor, "}"));
                out.push(TranslatedStatement::new(
                    cursor,
                    format!("else if ({})", condition.text),
                ));
            }
            chain_broken = chain_broken || condition.required_rewriting();
            out.push(TranslatedStatement::new(cursor, "{"));
            self.translate_blocks(&clause.body, scope, cursor + 1, out)?;
        }
        if let Some(else_body) = &block.else_body {
            out.push(TranslatedStatement::new(cursor, "}"));
            out.push(TranslatedStatement::new(cursor, "else"));
            out.push(TranslatedStatement::new(cursor, "{"));
            self.translate_blocks(else_body, scope, cursor + 1, out)?;
        }
        out.push(TranslatedStatement::new(cursor, "}"));
        for level in (0..nested).rev() {
            out.push(TranslatedStatement::new(indent + level, "}"));
        }
        Ok(())
    }

    fn translate_for(
        &mut self,
        block: &ForBlock,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let aliases = AliasMap::new();
        let ctx = ExprCtx {
            scope,
            aliases: &aliases,
        };
        let counter = self.resolve_value_name(&block.counter, &ctx);
        let mut pre = Vec::new();
        let from = {
            let e = parse_expression(&block.from)?;
            self.translate_expression(&e, &ctx, &mut pre)?
        };
        let to = {
            let e = parse_expression(&block.to)?;
            self.translate_expression(&e, &ctx, &mut pre)?
        };
        let step = match &block.step {
            Some(tokens) => {
                let e = parse_expression(tokens)?;
                Some(self.translate_expression(&e, &ctx, &mut pre)?)
            }
            None => None,
        };
        for line in pre {
            out.push(TranslatedStatement::new(indent, line));
        }
        let support = self.support().to_string();
        let start = self.temps.next("loopStart");
        let end = self.temps.next("loopEnd");
        let step_name = self.temps.next("loopStep");
        out.push(TranslatedStatement::new(
            indent,
            format!("var {} = {}.NUM({});", start, support, from),
        ));
        out.push(TranslatedStatement::new(
            indent,
            format!("var {} = {}.NUM({});", end, support, to),
        ));
        out.push(TranslatedStatement::new(
            indent,
            format!(
                "var {} = {}.NUM({});",
                step_name,
                support,
                step.as_deref().unwrap_or("1")
            ),
        ));
        out.push(TranslatedStatement::new(
            indent,
            format!("{} = {};", counter, start),
        ));
        // a positive step counts up to the end bound, a negative one
        // counts down; both live in one guard
        out.push(TranslatedStatement::new(
            indent,
            format!(
                "while ({s}.IF({s}.OR({s}.AND({s}.GTE({st}, 0), {s}.LTE({c}, {e})), \
                 {s}.AND({s}.LT({st}, 0), {s}.GTE({c}, {e})))))",
                s = support,
                st = step_name,
                c = counter,
                e = end
            ),
        ));
        out.push(TranslatedStatement::new(indent, "{"));
        self.loop_stack.push(LoopKind::For);
        let body = self.translate_blocks(&block.body, scope, indent + 1, out);
        self.loop_stack.pop();
        body?;
        out.push(TranslatedStatement::new(
            indent + 1,
            format!("{c} = {s}.ADD({c}, {st});", c = counter, s = support, st = step_name),
        ));
        out.push(TranslatedStatement::new(indent, "}"));
        Ok(())
    }

    fn translate_for_each(
        &mut self,
        block: &ForEachBlock,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let aliases = AliasMap::new();
        let ctx = ExprCtx {
            scope,
            aliases: &aliases,
        };
        let variable = self.resolve_value_name(&block.variable, &ctx);
        let mut pre = Vec::new();
        let target = {
            let e = parse_expression(&block.target)?;
            self.translate_expression(&e, &ctx, &mut pre)?
        };
        for line in pre {
            out.push(TranslatedStatement::new(indent, line));
        }
        let element = self.temps.next("enumVal");
        out.push(TranslatedStatement::new(
            indent,
            format!(
                "foreach (var {} in {}.ENUMERABLE({}))",
                element,
                self.support(),
                target
            ),
        ));
        out.push(TranslatedStatement::new(indent, "{"));
        out.push(TranslatedStatement::new(
            indent + 1,
            format!("{} = {};", variable, element),
        ));
        self.loop_stack.push(LoopKind::For);
        let body = self.translate_blocks(&block.body, scope, indent + 1, out);
        self.loop_stack.pop();
        body?;
        out.push(TranslatedStatement::new(indent, "}"));
        Ok(())
    }

    fn translate_do(
        &mut self,
        block: &DoBlock,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        match &block.condition {
            Some((LoopConditionPosition::PreCondition, kind, tokens)) => {
                self.emit_pre_condition_loop(tokens, *kind, &block.body, scope, indent, out)
            }
            Some((LoopConditionPosition::PostCondition, kind, tokens)) => {
                let condition = self.build_condition(tokens, scope)?;
                if condition.is_inline() {
                    out.push(TranslatedStatement::new(indent, "do"));
                    out.push(TranslatedStatement::new(indent, "{"));
                    self.loop_stack.push(LoopKind::Do);
                    let body = self.translate_blocks(&block.body, scope, indent + 1, out);
                    self.loop_stack.pop();
                    body?;
                    let negate = if *kind == LoopConditionKind::Until {
                        "!"
                    } else {
                        ""
                    };
                    out.push(TranslatedStatement::new(
                        indent,
                        format!("}} while ({}{});", negate, condition.text),
                    ));
                    Ok(())
                } else {
                    out.push(TranslatedStatement::new(indent, "while (true)"));
                    out.push(TranslatedStatement::new(indent, "{"));
                    self.loop_stack.push(LoopKind::Do);
                    let body = self.translate_blocks(&block.body, scope, indent + 1, out);
                    self.loop_stack.pop();
                    body?;
                    self.emit_condition_break(&condition, *kind, indent + 1, out);
                    out.push(TranslatedStatement::new(indent, "}"));
                    Ok(())
                }
            }
            None => {
                out.push(TranslatedStatement::new(indent, "while (true)"));
                out.push(TranslatedStatement::new(indent, "{"));
                self.loop_stack.push(LoopKind::Do);
                let body = self.translate_blocks(&block.body, scope, indent + 1, out);
                self.loop_stack.pop();
                body?;
                out.push(TranslatedStatement::new(indent, "}"));
                Ok(())
            }
        }
    }

    fn translate_while(
        &mut self,
        block: &WhileBlock,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        self.emit_pre_condition_loop(
            &block.condition,
            LoopConditionKind::While,
            &block.body,
            scope,
            indent,
            out,
        )
    }

    fn emit_pre_condition_loop(
        &mut self,
        tokens: &[Token],
        kind: LoopConditionKind,
        body: &[CodeBlock],
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let condition = self.build_condition(tokens, scope)?;
        if condition.is_inline() {
            let negate = if kind == LoopConditionKind::Until {
                "!"
            } else {
                ""
            };
            out.push(TranslatedStatement::new(
                indent,
                format!("while ({}{})", negate, condition.text),
            ));
            out.push(TranslatedStatement::new(indent, "{"));
            self.loop_stack.push(LoopKind::Do);
            let result = self.translate_blocks(body, scope, indent + 1, out);
            self.loop_stack.pop();
            result?;
            out.push(TranslatedStatement::new(indent, "}"));
            return Ok(());
        }
        // the alias open/evaluate/close sequence must re-run on every
        // iteration, so the test moves inside the loop
        out.push(TranslatedStatement::new(indent, "while (true)"));
        out.push(TranslatedStatement::new(indent, "{"));
        self.emit_condition_break(&condition, kind, indent + 1, out);
        self.loop_stack.push(LoopKind::Do);
        let result = self.translate_blocks(body, scope, indent + 1, out);
        self.loop_stack.pop();
        result?;
        out.push(TranslatedStatement::new(indent, "}"));
        Ok(())
    }

    /// Inside a `while (true)`: evaluate the condition and break out
    /// when the loop should end
    fn emit_condition_break(
        &mut self,
        condition: &BuiltCondition,
        kind: LoopConditionKind,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) {
        for line in &condition.pre {
            out.push(TranslatedStatement::new(indent, line.clone()));
        }
        for line in &condition.post {
            out.push(TranslatedStatement::new(indent, line.clone()));
        }
        let test = match kind {
            LoopConditionKind::While => format!("if (!{})", condition.text),
            LoopConditionKind::Until => format!("if ({})", condition.text),
        };
        out.push(TranslatedStatement::new(indent, test));
        out.push(TranslatedStatement::new(indent, "{"));
        out.push(TranslatedStatement::new(indent + 1, "break;"));
        out.push(TranslatedStatement::new(indent, "}"));
    }

    fn translate_select(
        &mut self,
        block: &SelectBlock,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let aliases = AliasMap::new();
        let ctx = ExprCtx {
            scope,
            aliases: &aliases,
        };
        let mut pre = Vec::new();
        let target = {
            let e = parse_expression(&block.target)?;
            self.translate_expression(&e, &ctx, &mut pre)?
        };
        for line in pre {
            out.push(TranslatedStatement::new(indent, line));
        }
        let temp = self.temps.next("selectTarget");
        out.push(TranslatedStatement::new(
            indent,
            format!("var {} = {};", temp, target),
        ));
        let support = self.support().to_string();
        for (i, case) in block.cases.iter().enumerate() {
            let mut tests = Vec::with_capacity(case.values.len());
            for value_tokens in &case.values {
                let e = parse_expression(value_tokens)?;
                let mut value_pre = Vec::new();
                let value = self.translate_expression(&e, &ctx, &mut value_pre)?;
                for line in value_pre {
                    out.push(TranslatedStatement::new(indent, line));
                }
                tests.push(format!("{s}.IF({s}.EQ({t}, {v}))", s = support, t = temp, v = value));
            }
            let keyword = if i == 0 { "if" } else { "else if" };
            if i > 0 {
                out.push(TranslatedStatement::new(indent, "}"));
            }
            out.push(TranslatedStatement::new(
                indent,
                format!("{} ({})", keyword, tests.join(" || ")),
            ));
            out.push(TranslatedStatement::new(indent, "{"));
            self.translate_blocks(&case.body, scope, indent + 1, out)?;
        }
        if let Some(else_body) = &block.else_body {
            if block.cases.is_empty() {
                self.translate_blocks(else_body, scope, indent, out)?;
            } else {
                out.push(TranslatedStatement::new(indent, "}"));
                out.push(TranslatedStatement::new(indent, "else"));
                out.push(TranslatedStatement::new(indent, "{"));
                self.translate_blocks(else_body, scope, indent + 1, out)?;
                out.push(TranslatedStatement::new(indent, "}"));
            }
        } else if !block.cases.is_empty() {
            out.push(TranslatedStatement::new(indent, "}"));
        }
        Ok(())
    }

    fn translate_function(
        &mut self,
        function: &FunctionBlock,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let visibility = match function.visibility {
            Visibility::Public => "public",
            Visibility::Private => "private",
        };
        let name = self.rewrite(&function.name.content);
        let method_name = match function.kind {
            FunctionKind::Sub | FunctionKind::Function | FunctionKind::PropertyGet => name.clone(),
            FunctionKind::PropertyLet => format!("set_{}", name),
            FunctionKind::PropertySet => format!("setref_{}", name),
        };
        let return_type = if function.kind.has_return_value() {
            "object"
        } else {
            "void"
        };
        let parameters: Vec<String> = function
            .parameters
            .iter()
            .map(|p| {
                let rewritten = self.rewrite(&p.name.content);
                match p.mode {
                    ParamMode::ByVal => format!("object {}", rewritten),
                    ParamMode::ByRef => format!("ref object {}", rewritten),
                }
            })
            .collect();
        if function.is_default {
            out.push(TranslatedStatement::new(indent, "// default member"));
        }
        out.push(TranslatedStatement::new(
            indent,
            format!(
                "{} {} {}({})",
                visibility,
                return_type,
                method_name,
                parameters.join(", ")
            ),
        ));
        out.push(TranslatedStatement::new(indent, "{"));

        let return_slot = if function.kind.has_return_value() {
            Some(self.temps.next("retVal"))
        } else {
            None
        };
        let error_token = if requires_error_token(&function.body) {
            Some(self.temps.next("errOn"))
        } else {
            None
        };
        let inner = scope.enter_function(
            function,
            return_slot.clone(),
            error_token.clone(),
            &*self.config.name_rewriter,
        );

        let saved_implicit = std::mem::take(&mut self.implicit_locals);
        let saved_loops = std::mem::take(&mut self.loop_stack);
        let mut body = Vec::new();
        let result = self.translate_blocks(&function.body, &inner, indent + 1, &mut body);
        let implicit = std::mem::replace(&mut self.implicit_locals, saved_implicit);
        self.loop_stack = saved_loops;
        result?;

        if let Some(slot) = &return_slot {
            out.push(TranslatedStatement::new(
                indent + 1,
                format!("object {} = null;", slot),
            ));
        }
        if let Some(token) = &error_token {
            out.push(TranslatedStatement::new(
                indent + 1,
                format!(
                    "var {} = {}.GETERRORTRAPPINGTOKEN();",
                    token,
                    self.support()
                ),
            ));
        }
        let hoisted = dim_declared_names_in(&function.body, &*self.config.name_rewriter);
        for name in sorted(&hoisted) {
            out.push(TranslatedStatement::new(
                indent + 1,
                format!("object {} = null;", name),
            ));
        }
        for name in sorted(&implicit) {
            out.push(TranslatedStatement::new(
                indent + 1,
                format!("object {} = null;", name),
            ));
        }
        out.extend(body);
        if let Some(token) = &error_token {
            out.push(TranslatedStatement::new(
                indent + 1,
                format!("{}.RELEASEERRORTRAPPINGTOKEN({});", self.support(), token),
            ));
        }
        if let Some(slot) = &return_slot {
            out.push(TranslatedStatement::new(
                indent + 1,
                format!("return {};", slot),
            ));
        }
        out.push(TranslatedStatement::new(indent, "}"));
        Ok(())
    }

    fn translate_dim(
        &mut self,
        dim: &DimStatement,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let class_level = scope.class_name.is_some() && scope.function_name.is_none();
        let aliases = AliasMap::new();
        let ctx = ExprCtx {
            scope,
            aliases: &aliases,
        };
        for variable in &dim.variables {
            let name = self.rewrite(&variable.name.content);
            if class_level {
                let visibility = match dim.visibility {
                    Visibility::Public => "public",
                    Visibility::Private => "private",
                };
                out.push(TranslatedStatement::new(
                    indent,
                    format!("{} object {} = null;", visibility, name),
                ));
                // array fields get their storage in the constructor; a
                // sized class-level array is rare enough to go through
                // ReDim instead
                if let Some(dimensions) = &variable.dimensions {
                    if !dimensions.is_empty() {
                        return Err(TranslationError::Unsupported {
                            what: "a sized array field (use ReDim in Class_Initialize)".into(),
                            line: dim.line,
                        });
                    }
                }
                continue;
            }
            // scalars were hoisted; only array storage is allocated here
            if let Some(dimensions) = &variable.dimensions {
                let mut args = Vec::with_capacity(dimensions.len());
                let mut pre = Vec::new();
                for tokens in dimensions {
                    let e = parse_expression(tokens)?;
                    args.push(self.translate_expression(&e, &ctx, &mut pre)?);
                }
                for line in pre {
                    out.push(TranslatedStatement::new(indent, line));
                }
                out.push(TranslatedStatement::new(
                    indent,
                    format!(
                        "{} = {}.NEWARRAY({});",
                        name,
                        self.support(),
                        args.join(", ")
                    ),
                ));
            }
        }
        Ok(())
    }

    fn translate_redim(
        &mut self,
        redim: &ReDimStatement,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let aliases = AliasMap::new();
        let ctx = ExprCtx {
            scope,
            aliases: &aliases,
        };
        for variable in &redim.variables {
            let name = self.resolve_value_name(&variable.name, &ctx);
            let dimensions = variable.dimensions.as_deref().unwrap_or_default();
            let mut args = Vec::with_capacity(dimensions.len());
            let mut pre = Vec::new();
            for tokens in dimensions {
                let e = parse_expression(tokens)?;
                args.push(self.translate_expression(&e, &ctx, &mut pre)?);
            }
            for line in pre {
                out.push(TranslatedStatement::new(indent, line));
            }
            let mut call_args = vec![
                name.clone(),
                if redim.preserve { "true" } else { "false" }.to_string(),
            ];
            call_args.extend(args);
            out.push(TranslatedStatement::new(
                indent,
                format!(
                    "{} = {}.RESIZEARRAY({});",
                    name,
                    self.support(),
                    call_args.join(", ")
                ),
            ));
        }
        Ok(())
    }

    fn translate_exit(
        &mut self,
        exit: &ExitStatement,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        match exit.kind {
            ExitKind::For | ExitKind::Do => {
                let expected = if exit.kind == ExitKind::For {
                    LoopKind::For
                } else {
                    LoopKind::Do
                };
                if self.loop_stack.last() != Some(&expected) {
                    return Err(TranslationError::Unsupported {
                        what: format!(
                            "Exit {} that does not target the innermost loop",
                            if exit.kind == ExitKind::For { "For" } else { "Do" }
                        ),
                        line: exit.line,
                    });
                }
                out.push(TranslatedStatement::new(indent, "break;"));
                Ok(())
            }
            ExitKind::Sub | ExitKind::Function | ExitKind::Property => {
                if let Some(token) = &scope.error_token {
                    out.push(TranslatedStatement::new(
                        indent,
                        format!("{}.RELEASEERRORTRAPPINGTOKEN({});", self.support(), token),
                    ));
                }
                match &scope.function_return_slot {
                    Some(slot) => out.push(TranslatedStatement::new(
                        indent,
                        format!("return {};", slot),
                    )),
                    None => out.push(TranslatedStatement::new(indent, "return;")),
                }
                Ok(())
            }
        }
    }

    fn translate_class(
        &mut self,
        class: &ClassBlock,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let name = self.rewrite(&class.name.content);
        out.push(TranslatedStatement::new(
            indent,
            format!("public class {}", name),
        ));
        out.push(TranslatedStatement::new(indent, "{"));
        out.push(TranslatedStatement::new(
            indent + 1,
            format!("private readonly dynamic {};", self.support()),
        ));
        out.push(TranslatedStatement::new(
            indent + 1,
            format!("public {}(dynamic support)", name),
        ));
        out.push(TranslatedStatement::new(indent + 1, "{"));
        out.push(TranslatedStatement::new(
            indent + 2,
            format!("{} = support;", self.support()),
        ));
        out.push(TranslatedStatement::new(indent + 1, "}"));
        let inner = scope.enter_class(class, &*self.config.name_rewriter);
        for member in &class.body {
            match member {
                CodeBlock::Dim(_) | CodeBlock::Function(_) | CodeBlock::Comment(_) => {
                    self.translate_block(member, &inner, indent + 1, out)?;
                }
                other => {
                    return Err(TranslationError::Unsupported {
                        what: "a statement at class level".into(),
                        line: other.line(),
                    })
                }
            }
        }
        out.push(TranslatedStatement::new(indent, "}"));
        Ok(())
    }

    fn translate_with(
        &mut self,
        with: &WithBlock,
        scope: &ScopeAccessInformation,
        indent: usize,
        out: &mut Vec<TranslatedStatement>,
    ) -> Result<(), TranslationError> {
        let aliases = AliasMap::new();
        let ctx = ExprCtx {
            scope,
            aliases: &aliases,
        };
        let mut pre = Vec::new();
        let target = {
            let e = parse_expression(&with.target)?;
            self.translate_expression(&e, &ctx, &mut pre)?
        };
        out.push(TranslatedStatement::new(indent, "{"));
        for line in pre {
            out.push(TranslatedStatement::new(indent + 1, line));
        }
        let temp = self.temps.next("withTarget");
        out.push(TranslatedStatement::new(
            indent + 1,
            format!("var {} = {};", temp, target),
        ));
        let inner = scope.enter_with(temp);
        self.translate_blocks(&with.body, &inner, indent + 1, out)?;
        out.push(TranslatedStatement::new(indent, "}"));
        Ok(())
    }
}

/// Remove and return the last link of a call-segment chain, leaving the
/// rest in place; `None` when the segment has no tail at all
fn detach_last_segment(head: &mut CallSegment) -> Option<CallSegment> {
    head.tail.as_ref()?;
    let mut cursor = head;
    loop {
        let has_grandchild = cursor
            .tail
            .as_ref()
            .map_or(false, |next| next.tail.is_some());
        if has_grandchild {
            cursor = cursor.tail.as_mut().unwrap();
        } else {
            return cursor.tail.take().map(|boxed| *boxed);
        }
    }
}
