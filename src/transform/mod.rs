//! Pre-emission rewriting tools: the per-session temporary-name
//! allocator and the by-ref alias mapper.

pub mod byref;
pub mod tempname;

pub use self::byref::{plan_mappings, AliasMap, ByRefMapping};
pub use self::tempname::TempNameGenerator;
