//! Pre-pass symbol table: every function, sub and property signature in
//! the source, keyed by rewritten name. The by-ref mapper consults this
//! to learn which argument slots of a callee want by-ref.

use std::collections::HashMap;

use crate::ast::*;

#[derive(Clone, Debug, Default)]
pub struct FunctionTable {
    entries: HashMap<String, Vec<ParamMode>>,
}

impl FunctionTable {
    pub fn build(blocks: &[CodeBlock], rewrite: &dyn Fn(&str) -> String) -> FunctionTable {
        let mut table = FunctionTable::default();
        table.collect(blocks, rewrite);
        table
    }

    fn collect(&mut self, blocks: &[CodeBlock], rewrite: &dyn Fn(&str) -> String) {
        for block in blocks {
            match block {
                CodeBlock::Function(function) => {
                    let modes = function.parameters.iter().map(|p| p.mode).collect();
                    // property accessors share a name; the getter is the
                    // call-position signature, so first registration wins
                    self.entries
                        .entry(rewrite(&function.name.content))
                        .or_insert(modes);
                    self.collect(&function.body, rewrite);
                }
                CodeBlock::Class(class) => self.collect(&class.body, rewrite),
                _ => {}
            }
        }
    }

    pub fn is_known(&self, rewritten_name: &str) -> bool {
        self.entries.contains_key(rewritten_name)
    }

    /// The passing mode of argument `index` of the named callee, if the
    /// callee and slot are known
    pub fn param_mode(&self, rewritten_name: &str, index: usize) -> Option<ParamMode> {
        self.entries.get(rewritten_name)?.get(index).copied()
    }
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
    fn signatures_are_collected_including_class_members() {
        let blocks = parse(
            tokenize(
                "Sub S(a, ByVal b)\nEnd Sub\nClass C\nFunction M(ByRef x)\nEnd Function\nEnd Class",
            )
            .unwrap(),
        )
        .unwrap();
        let table = FunctionTable::build(&blocks, &lower);
        assert_eq!(table.param_mode("s", 0), Some(ParamMode::ByRef));
        assert_eq!(table.param_mode("s", 1), Some(ParamMode::ByVal));
        assert_eq!(table.param_mode("m", 0), Some(ParamMode::ByRef));
        assert_eq!(table.param_mode("s", 2), None);
        assert!(!table.is_known("absent"));
    }
}
