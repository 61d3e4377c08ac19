//! Socio.io Rule List Compiler
//!
//! This crate compiles plain-text keyword lists into the [`RuleSet`] used by
//! the local classifier.
//!
//! [`RuleSet`]: socio_core::classifier::RuleSet

pub mod parser;
pub mod optimizer;
pub mod builder;

pub use builder::{build_rule_set, compile_rule_lists, compile_rule_texts, CompileStats, RuleError};
pub use optimizer::{optimize_entries, OptimizeStats};
pub use parser::{parse_rule_list, parse_rule_list_with_id, RuleEntry, RuleValue};
