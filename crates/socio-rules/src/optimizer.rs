use std::collections::HashSet;

use socio_core::classifier::RuleCategory;

use crate::parser::{RuleEntry, RuleValue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptimizeStats {
    pub before: usize,
    pub after: usize,
    pub deduped: usize,
    pub disable_rules: usize,
    pub disabled_rules: usize,
}

/// Remove duplicates and entries cancelled by a `~entry` from the same or a
/// later list.
///
/// Disable entries that cancelled nothing are kept at the end: they target
/// the built-in tables and are applied by the builder.
pub fn optimize_entries(entries: &mut Vec<RuleEntry>) -> OptimizeStats {
    let before = entries.len();

    let mut disables: Vec<(EntryKey, u16)> = Vec::new();
    for entry in entries.iter().filter(|e| e.is_disable) {
        disables.push((EntryKey::from(entry), entry.list_id));
    }
    let disable_rules = disables.len();

    let mut used: HashSet<EntryKey> = HashSet::new();
    let mut disabled_rules = 0usize;
    let mut leftover = Vec::new();

    entries.retain(|entry| {
        if entry.is_disable {
            leftover.push(entry.clone());
            return false;
        }
        let key = EntryKey::from(entry);
        let cancelled = disables
            .iter()
            .any(|(disable, list_id)| *disable == key && *list_id >= entry.list_id);
        if cancelled {
            disabled_rules += 1;
            used.insert(key);
            return false;
        }
        true
    });

    let mut seen: HashSet<EntryKey> = HashSet::new();
    let mut deduped = 0usize;
    entries.retain(|entry| {
        if seen.insert(EntryKey::from(entry)) {
            true
        } else {
            deduped += 1;
            false
        }
    });

    let mut seen_leftover: HashSet<EntryKey> = HashSet::new();
    for entry in leftover {
        let key = EntryKey::from(&entry);
        if !used.contains(&key) && seen_leftover.insert(key) {
            entries.push(entry);
        }
    }

    OptimizeStats {
        before,
        after: entries.len(),
        deduped,
        disable_rules,
        disabled_rules,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EntryKey {
    category: RuleCategory,
    value: RuleValue,
}

impl From<&RuleEntry> for EntryKey {
    fn from(entry: &RuleEntry) -> Self {
        Self {
            category: entry.category,
            value: entry.value.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_rule_list, parse_rule_list_with_id};

    #[test]
    fn dedupes_entries() {
        let mut entries = parse_rule_list("heck\nHECK\n/h[e3]ck/\n/h[e3]ck/\n[hate_speech]\nheck\n");
        let stats = optimize_entries(&mut entries);
        assert_eq!(stats.before, 5);
        assert_eq!(stats.deduped, 2);
        assert_eq!(stats.after, 3);
    }

    #[test]
    fn disable_cancels_earlier_lists_only() {
        let mut entries = parse_rule_list_with_id("heck\ndarn\n", 0);
        entries.extend(parse_rule_list_with_id("~heck\n", 1));
        entries.extend(parse_rule_list_with_id("heck\n", 2));

        let stats = optimize_entries(&mut entries);
        assert_eq!(stats.disable_rules, 1);
        assert_eq!(stats.disabled_rules, 1);

        let words: Vec<_> = entries.iter().map(|e| (e.value.as_str().to_string(), e.list_id)).collect();
        assert_eq!(words, vec![("darn".to_string(), 0), ("heck".to_string(), 2)]);
    }

    #[test]
    fn unmatched_disable_is_kept_for_builtins() {
        let mut entries = parse_rule_list("~damn\n~damn\n");
        let stats = optimize_entries(&mut entries);
        assert_eq!(stats.after, 1);
        assert!(entries[0].is_disable);
    }
}
