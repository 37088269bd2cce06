//! curbside: a source-to-source translator that hauls legacy VBScript
//! off to C#, emitting statement text against a runtime support facade,
//! plus the Rust implementation of that facade's operator semantics.

pub mod analysis;
pub mod ast;
pub mod codegen;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod transform;

pub use codegen::{
    default_name_rewriter, translate, TranslatedStatement, TranslationError, TranslationOutput,
    TranslationWarning, TranslatorConfig,
};
