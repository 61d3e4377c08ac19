use std::path::Path;
use std::time::Instant;

use socio_core::classifier::{RuleCounts, RuleSet, RuleSetBuilder, RuleSetError};

use crate::optimizer::{optimize_entries, OptimizeStats};
use crate::parser::{parse_rule_list_with_id, RuleEntry, RuleValue};

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("failed to read rule list {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("too many rule lists ({0})")]
    TooManyLists(usize),
    #[error(transparent)]
    Compile(#[from] RuleSetError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileStats {
    pub lists: usize,
    pub optimize: OptimizeStats,
    pub counts: RuleCounts,
    pub total_ms: f64,
}

/// Fold optimized entries into `base` and compile the result.
pub fn build_rule_set(entries: &[RuleEntry], mut base: RuleSetBuilder) -> Result<RuleSet, RuleError> {
    for entry in entries {
        if entry.is_disable {
            if !base.remove(entry.category, entry.value.as_str()) {
                log::debug!("disable entry {:?} matched nothing", entry.value.as_str());
            }
            continue;
        }
        match &entry.value {
            RuleValue::Word(word) => base.add_word(entry.category, word),
            RuleValue::Pattern(pattern) => base.add_pattern(entry.category, pattern),
        };
    }
    Ok(base.build()?)
}

/// Parse, optimize and compile a set of rule list texts on top of `base`.
pub fn compile_rule_texts(texts: &[String], base: RuleSetBuilder) -> Result<(RuleSet, CompileStats), RuleError> {
    let start = Instant::now();
    if texts.len() > u16::MAX as usize {
        return Err(RuleError::TooManyLists(texts.len()));
    }

    let mut entries = Vec::new();
    for (list_id, text) in texts.iter().enumerate() {
        entries.extend(parse_rule_list_with_id(text, list_id as u16));
    }

    let optimize = optimize_entries(&mut entries);
    let rules = build_rule_set(&entries, base)?;
    let counts = rules.counts();

    let stats = CompileStats {
        lists: texts.len(),
        optimize,
        counts,
        total_ms: start.elapsed().as_secs_f64() * 1000.0,
    };
    log::info!(
        "compiled {} rule list(s): {} -> {} entries ({} deduped, {} disabled)",
        stats.lists,
        optimize.before,
        optimize.after,
        optimize.deduped,
        optimize.disabled_rules
    );
    Ok((rules, stats))
}

/// Read rule list files and compile them on top of `base`.
pub fn compile_rule_lists<P: AsRef<Path>>(paths: &[P], base: RuleSetBuilder) -> Result<(RuleSet, CompileStats), RuleError> {
    let mut texts = Vec::with_capacity(paths.len());
    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| RuleError::Io {
            path: path.display().to_string(),
            source,
        })?;
        texts.push(text);
    }
    compile_rule_texts(&texts, base)
}
