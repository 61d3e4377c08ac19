//! Sensitive information detection
//!
//! Fixed patterns for phone numbers, email addresses, national identifiers and
//! payment card numbers. Unlike the keyword tables these are not pluggable:
//! they decide whether content is hidden recoverably instead of redacted.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::Categories;

/// A byte range of `text` holding sensitive information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensitiveSpan {
    pub start: usize,
    pub end: usize,
    pub category: Categories,
}

const CARD_PATTERN: &str = r"\b\d(?:[ -]?\d){12,18}\b";
const SSN_PATTERN: &str = r"\b\d{3}-\d{2}-\d{4}\b";
const AADHAAR_PATTERN: &str = r"\b\d{4}[ -]\d{4}[ -]\d{4}\b";
const EMAIL_PATTERN: &str = r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b";
const PHONE_PATTERN: &str = r"(?:\+\d{1,3}[\s.-]?)?\b\d{3}[\s.-]?\d{3}[\s.-]?\d{4}\b";

fn patterns() -> &'static [(Categories, Regex)] {
    static PATTERNS: OnceLock<Vec<(Categories, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (Categories::CARD_NUMBER, CARD_PATTERN),
            (Categories::NATIONAL_ID, SSN_PATTERN),
            (Categories::NATIONAL_ID, AADHAAR_PATTERN),
            (Categories::EMAIL, EMAIL_PATTERN),
            (Categories::PHONE, PHONE_PATTERN),
        ]
        .into_iter()
        .filter_map(|(category, pattern)| match Regex::new(pattern) {
            Ok(re) => Some((category, re)),
            Err(e) => {
                log::error!("sensitive pattern {:?} failed to compile: {}", pattern, e);
                None
            }
        })
        .collect()
    })
}

/// Find non-overlapping sensitive spans, ordered by position.
///
/// Where matches overlap the longer one wins, so a grouped card number is
/// reported once as a card rather than as an id plus a phone number.
pub fn find_sensitive(text: &str) -> Vec<SensitiveSpan> {
    let mut found = Vec::new();
    for (category, re) in patterns() {
        for m in re.find_iter(text) {
            if *category == Categories::CARD_NUMBER && !luhn_valid(m.as_str()) {
                continue;
            }
            found.push(SensitiveSpan {
                start: m.start(),
                end: m.end(),
                category: *category,
            });
        }
    }

    found.sort_by(|a, b| a.start.cmp(&b.start).then((b.end - b.start).cmp(&(a.end - a.start))));

    let mut spans: Vec<SensitiveSpan> = Vec::with_capacity(found.len());
    for span in found {
        match spans.last() {
            Some(last) if span.start < last.end => continue,
            _ => spans.push(span),
        }
    }
    spans
}

/// Union of the sensitive categories present in `text`.
pub fn sensitive_categories(text: &str) -> Categories {
    find_sensitive(text)
        .iter()
        .fold(Categories::empty(), |acc, span| acc | span.category)
}

/// Luhn checksum over the digits of `candidate`, ignoring separators.
pub fn luhn_valid(candidate: &str) -> bool {
    let digits: Vec<u32> = candidate.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() < 13 {
        return false;
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    sum % 10 == 0
}
