use socio_core::classifier::RuleCategory;

/// Literal or regex entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleValue {
    Word(String),
    Pattern(String),
}

impl RuleValue {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Word(w) => w,
            Self::Pattern(p) => p,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    pub category: RuleCategory,
    pub value: RuleValue,
    /// `~entry`: removes a matching entry instead of adding one
    pub is_disable: bool,
    pub list_id: u16,
    pub line: usize,
}

/// Section used before the first header.
pub const DEFAULT_SECTION: RuleCategory = RuleCategory::Profanity;

pub fn parse_rule_list(text: &str) -> Vec<RuleEntry> {
    parse_rule_list_with_id(text, 0)
}

pub fn parse_rule_list_with_id(text: &str, list_id: u16) -> Vec<RuleEntry> {
    let mut entries = Vec::new();
    let mut category = Some(DEFAULT_SECTION);

    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || is_comment_line(line) {
            continue;
        }

        if let Some(section) = parse_section_header(line) {
            category = RuleCategory::from_section(section);
            if category.is_none() {
                log::warn!("line {}: unknown section [{}], skipping its entries", idx + 1, section);
            }
            continue;
        }

        let Some(category) = category else {
            continue;
        };

        let (is_disable, body) = match line.strip_prefix('~') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, line),
        };

        let Some(value) = parse_value(body, category) else {
            log::debug!("line {}: ignoring malformed entry {:?}", idx + 1, line);
            continue;
        };

        entries.push(RuleEntry {
            category,
            value,
            is_disable,
            list_id,
            line: idx + 1,
        });
    }

    entries
}

fn is_comment_line(line: &str) -> bool {
    line.starts_with('!') || line.starts_with('#')
}

fn parse_section_header(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']').map(str::trim)
}

fn parse_value(body: &str, category: RuleCategory) -> Option<RuleValue> {
    if body.len() >= 2 && body.starts_with('/') && body.ends_with('/') {
        let pattern = &body[1..body.len() - 1];
        if pattern.is_empty() {
            return None;
        }
        return if category.is_text() {
            Some(RuleValue::Pattern(pattern.to_string()))
        } else {
            normalize_word(pattern, category).map(RuleValue::Word)
        };
    }

    normalize_word(body, category).map(RuleValue::Word)
}

fn normalize_word(word: &str, category: RuleCategory) -> Option<String> {
    let word = word.trim();
    if word.is_empty() {
        return None;
    }

    match category {
        RuleCategory::AllowedHost => normalize_host(word),
        _ => {
            let collapsed = word.split_whitespace().collect::<Vec<_>>().join(" ");
            Some(collapsed.to_lowercase())
        }
    }
}

fn normalize_host(host: &str) -> Option<String> {
    let trimmed = host.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }

    if !trimmed
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || b == b'-')
    {
        return None;
    }

    Some(trimmed.to_ascii_lowercase())
}
