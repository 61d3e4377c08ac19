//! Local Content Classifier
//!
//! Pure, synchronous heuristics used whenever the remote service is slow,
//! down, or returns garbage. Text runs through the keyword tables and the
//! sensitive-information patterns; images are judged on their URL alone.
//!
//! The classifier never fails: anything it cannot judge is `Keep`.

use std::hash::Hasher;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::pii::sensitive_categories;
use crate::types::{Action, Categories, ContentKind, ContentNode, Verdict, VerdictSource};
use crate::url::{extract_host, host_matches_suffix, is_inline_url, tokenize_url};

// =============================================================================
// Built-in Tables
// =============================================================================

const BUILTIN_PROFANITY: &[&str] = &[
    "fuck", "fucking", "fucked", "motherfucker", "shit", "bullshit", "bitch", "bastard",
    "asshole", "dick", "cunt", "piss", "slut", "whore", "crap", "damn", "obscene", "vulgar",
    "offensive", "swear", "bad",
];

const BUILTIN_HATE_SPEECH: &[&str] = &[
    "racist", "sexist", "nazi", "bigot", "subhuman", "white power", "ethnic cleansing",
    "kill yourself", "go back to your country",
];

const BUILTIN_IMAGE_KEYWORDS: &[&str] = &["nsfw", "adult", "xxx", "porn", "explicit", "nude"];

const BUILTIN_ALLOWED_HOSTS: &[&str] = &[
    "wikipedia.org",
    "wikimedia.org",
    "gstatic.com",
    "githubusercontent.com",
    "gravatar.com",
];

// =============================================================================
// Rule Sets
// =============================================================================

/// Table a rule entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleCategory {
    Profanity,
    HateSpeech,
    ImageKeyword,
    AllowedHost,
}

impl RuleCategory {
    /// Parse a rule-list section name.
    pub fn from_section(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "profanity" => Some(Self::Profanity),
            "hate_speech" | "hate-speech" | "hate" => Some(Self::HateSpeech),
            "image_keywords" | "image-keywords" | "images" => Some(Self::ImageKeyword),
            "allowed_hosts" | "allowed-hosts" | "allowlist" => Some(Self::AllowedHost),
            _ => None,
        }
    }

    /// Whether entries are matched against text (and may be regexes).
    pub fn is_text(self) -> bool {
        matches!(self, Self::Profanity | Self::HateSpeech)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Boundary-aware matcher over one text category.
#[derive(Debug, Clone, Default)]
struct WordMatcher {
    words: Option<Regex>,
    patterns: Vec<Regex>,
    count: usize,
}

impl WordMatcher {
    fn build(words: &[String], patterns: &[String]) -> Result<Self, RuleSetError> {
        let words_re = if words.is_empty() {
            None
        } else {
            let alternation = words
                .iter()
                .map(|w| regex::escape(w).replace(' ', r"\s+"))
                .collect::<Vec<_>>()
                .join("|");
            let source = format!(r"\b(?:{})\b", alternation);
            let re = RegexBuilder::new(&source)
                .case_insensitive(true)
                .build()
                .map_err(|e| RuleSetError::InvalidPattern {
                    pattern: source.clone(),
                    source: e,
                })?;
            Some(re)
        };

        let mut compiled = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let re = RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|e| RuleSetError::InvalidPattern {
                    pattern: pattern.clone(),
                    source: e,
                })?;
            compiled.push(re);
        }

        Ok(Self {
            words: words_re,
            patterns: compiled,
            count: words.len() + patterns.len(),
        })
    }

    fn is_match(&self, text: &str) -> bool {
        self.words.as_ref().map_or(false, |re| re.is_match(text))
            || self.patterns.iter().any(|re| re.is_match(text))
    }
}

/// Entry counts per table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCounts {
    pub profanity: usize,
    pub hate_speech: usize,
    pub image_keywords: usize,
    pub allowed_hosts: usize,
}

/// Compiled keyword tables consumed by [`LocalClassifier`].
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    profanity: WordMatcher,
    hate_speech: WordMatcher,
    image_keywords: Vec<String>,
    allowed_hosts: Vec<String>,
}

impl RuleSet {
    /// A rule set that matches nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The tables shipped with the extension.
    pub fn builtin() -> Self {
        match RuleSetBuilder::with_builtin().build() {
            Ok(rules) => rules,
            Err(e) => {
                log::error!("built-in rule tables failed to compile: {}", e);
                Self::empty()
            }
        }
    }

    pub fn counts(&self) -> RuleCounts {
        RuleCounts {
            profanity: self.profanity.count,
            hate_speech: self.hate_speech.count,
            image_keywords: self.image_keywords.len(),
            allowed_hosts: self.allowed_hosts.len(),
        }
    }

    /// Categories of the keyword tables matched by `text`.
    pub fn text_categories(&self, text: &str) -> Categories {
        let mut cats = Categories::empty();
        if self.profanity.is_match(text) {
            cats |= Categories::PROFANITY;
        }
        if self.hate_speech.is_match(text) {
            cats |= Categories::HATE_SPEECH;
        }
        cats
    }

    pub fn is_allowed_host(&self, host: &str) -> bool {
        self.allowed_hosts.iter().any(|suffix| host_matches_suffix(host, suffix))
    }

    /// Whether any URL token starts with an explicit keyword.
    pub fn has_explicit_keyword(&self, url: &str) -> bool {
        tokenize_url(url)
            .iter()
            .any(|token| self.image_keywords.iter().any(|kw| token.starts_with(kw.as_str())))
    }
}

/// Accumulates table entries before compiling them into a [`RuleSet`].
#[derive(Debug, Clone, Default)]
pub struct RuleSetBuilder {
    profanity_words: Vec<String>,
    profanity_patterns: Vec<String>,
    hate_words: Vec<String>,
    hate_patterns: Vec<String>,
    image_keywords: Vec<String>,
    allowed_hosts: Vec<String>,
}

impl RuleSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the built-in tables.
    pub fn with_builtin() -> Self {
        let mut builder = Self::new();
        for word in BUILTIN_PROFANITY {
            builder.add_word(RuleCategory::Profanity, word);
        }
        for word in BUILTIN_HATE_SPEECH {
            builder.add_word(RuleCategory::HateSpeech, word);
        }
        for word in BUILTIN_IMAGE_KEYWORDS {
            builder.add_word(RuleCategory::ImageKeyword, word);
        }
        for host in BUILTIN_ALLOWED_HOSTS {
            builder.add_word(RuleCategory::AllowedHost, host);
        }
        builder
    }

    /// Add a literal entry. Duplicates are ignored.
    pub fn add_word(&mut self, category: RuleCategory, word: &str) -> &mut Self {
        let word = word.trim().to_lowercase();
        if word.is_empty() {
            return self;
        }
        let list = match category {
            RuleCategory::Profanity => &mut self.profanity_words,
            RuleCategory::HateSpeech => &mut self.hate_words,
            RuleCategory::ImageKeyword => &mut self.image_keywords,
            RuleCategory::AllowedHost => &mut self.allowed_hosts,
        };
        if !list.contains(&word) {
            list.push(word);
        }
        self
    }

    /// Add a regex entry. Only text tables take patterns; anything else is
    /// treated as a literal.
    pub fn add_pattern(&mut self, category: RuleCategory, pattern: &str) -> &mut Self {
        let list = match category {
            RuleCategory::Profanity => &mut self.profanity_patterns,
            RuleCategory::HateSpeech => &mut self.hate_patterns,
            _ => return self.add_word(category, pattern),
        };
        if !pattern.is_empty() && !list.iter().any(|p| p == pattern) {
            list.push(pattern.to_string());
        }
        self
    }

    /// Drop an entry (literal or pattern) from a table. Returns whether
    /// anything was removed.
    pub fn remove(&mut self, category: RuleCategory, entry: &str) -> bool {
        let word = entry.trim().to_lowercase();
        let (words, patterns) = match category {
            RuleCategory::Profanity => (&mut self.profanity_words, Some(&mut self.profanity_patterns)),
            RuleCategory::HateSpeech => (&mut self.hate_words, Some(&mut self.hate_patterns)),
            RuleCategory::ImageKeyword => (&mut self.image_keywords, None),
            RuleCategory::AllowedHost => (&mut self.allowed_hosts, None),
        };
        let before = words.len();
        words.retain(|w| *w != word);
        let mut removed = before != words.len();
        if let Some(patterns) = patterns {
            let before = patterns.len();
            patterns.retain(|p| p != entry);
            removed |= before != patterns.len();
        }
        removed
    }

    pub fn build(&self) -> Result<RuleSet, RuleSetError> {
        Ok(RuleSet {
            profanity: WordMatcher::build(&self.profanity_words, &self.profanity_patterns)?,
            hate_speech: WordMatcher::build(&self.hate_words, &self.hate_patterns)?,
            image_keywords: self.image_keywords.clone(),
            allowed_hosts: self.allowed_hosts.clone(),
        })
    }
}

// =============================================================================
// Sampling Policy
// =============================================================================

/// Deterministic sampling for QA/demo builds.
///
/// A payload is selected when its seeded xxHash64 falls below `rate` of the
/// hash space, so the same payload always gets the same answer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingPolicy {
    pub rate: f64,
    #[serde(default)]
    pub seed: u64,
}

impl SamplingPolicy {
    pub fn new(rate: f64, seed: u64) -> Self {
        Self {
            rate: rate.clamp(0.0, 1.0),
            seed,
        }
    }

    pub fn selects(&self, payload: &str) -> bool {
        if self.rate <= 0.0 {
            return false;
        }
        if self.rate >= 1.0 {
            return true;
        }
        let mut hasher = XxHash64::with_seed(self.seed);
        hasher.write(payload.as_bytes());
        let bucket = hasher.finish() as f64 / u64::MAX as f64;
        bucket < self.rate
    }
}

// =============================================================================
// Classifier
// =============================================================================

/// Thresholds for the local classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierSettings {
    /// Text shorter than this (in chars, after trim) is always kept
    pub min_text_len: usize,
    /// Text at least this long is never sampled
    pub long_text_threshold: usize,
    /// Images smaller than this on either axis are always kept
    pub min_image_dimension: u32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            min_text_len: 3,
            long_text_threshold: 1000,
            min_image_dimension: 50,
        }
    }
}

const LOCAL_CONFIDENCE: f32 = 0.9;
const SAMPLED_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone)]
pub struct LocalClassifier {
    rules: RuleSet,
    settings: ClassifierSettings,
    sampling: Option<SamplingPolicy>,
}

impl Default for LocalClassifier {
    fn default() -> Self {
        Self::new(RuleSet::builtin(), ClassifierSettings::default())
    }
}

impl LocalClassifier {
    pub fn new(rules: RuleSet, settings: ClassifierSettings) -> Self {
        Self {
            rules,
            settings,
            sampling: None,
        }
    }

    pub fn with_sampling(mut self, sampling: Option<SamplingPolicy>) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// Classify a payload of the given kind.
    pub fn classify(&self, kind: ContentKind, payload: &str) -> Verdict {
        match kind {
            ContentKind::Text => self.classify_text(payload),
            ContentKind::Image => self.classify_image(payload, None),
        }
    }

    /// Classify a discovered node, using its dimensions for images.
    pub fn classify_node(&self, node: &ContentNode) -> Verdict {
        match node.kind {
            ContentKind::Text => self.classify_text(&node.payload),
            ContentKind::Image => self.classify_image(&node.payload, node.dimensions),
        }
    }

    /// Whether text is too short to be worth classifying.
    pub fn is_trivial_text(&self, text: &str) -> bool {
        text.trim().chars().count() < self.settings.min_text_len
    }

    /// Categories matched by `text`, sensitive information included.
    pub fn text_categories(&self, text: &str) -> Categories {
        self.rules.text_categories(text) | sensitive_categories(text)
    }

    pub fn classify_text(&self, text: &str) -> Verdict {
        let text = text.trim();
        if self.is_trivial_text(text) {
            return Verdict::keep(VerdictSource::Local);
        }

        let mut cats = self.text_categories(text);
        if cats.is_empty() {
            if let Some(policy) = &self.sampling {
                if text.chars().count() < self.settings.long_text_threshold && policy.selects(text) {
                    cats |= Categories::SAMPLED;
                }
            }
        }

        verdict_for(cats)
    }

    /// Images that are never filtered: inline data, allow-listed hosts and
    /// tiny images such as icons and spacers.
    pub fn is_exempt_image(&self, url: &str, dimensions: Option<(u32, u32)>) -> bool {
        let url = url.trim();
        if url.is_empty() || is_inline_url(url) {
            return true;
        }
        if let Some(host) = extract_host(url) {
            if self.rules.is_allowed_host(host) {
                return true;
            }
        }
        if let Some((w, h)) = dimensions {
            let min = self.settings.min_image_dimension;
            if w < min || h < min {
                return true;
            }
        }
        false
    }

    pub fn classify_image(&self, url: &str, dimensions: Option<(u32, u32)>) -> Verdict {
        if self.is_exempt_image(url, dimensions) {
            return Verdict::keep(VerdictSource::Local);
        }

        let mut cats = Categories::empty();
        if self.rules.has_explicit_keyword(url) {
            cats |= Categories::EXPLICIT_URL;
        } else if let Some(policy) = &self.sampling {
            if policy.selects(url) {
                cats |= Categories::SAMPLED;
            }
        }

        verdict_for(cats)
    }
}

fn verdict_for(cats: Categories) -> Verdict {
    if cats.is_empty() {
        return Verdict::keep(VerdictSource::Local);
    }

    // Sensitive content stays recoverable even when it is also offensive
    let (action, confidence) = if cats.intersects(Categories::SENSITIVE) {
        (Action::Encrypt, LOCAL_CONFIDENCE)
    } else if cats.intersects(Categories::OFFENSIVE | Categories::EXPLICIT_URL) {
        (Action::Mask, LOCAL_CONFIDENCE)
    } else {
        (Action::Mask, SAMPLED_CONFIDENCE)
    };

    Verdict::new(action, cats.reasons(), VerdictSource::Local).with_confidence(confidence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> LocalClassifier {
        LocalClassifier::default()
    }

    #[test]
    fn test_phone_number_is_encrypted() {
        let verdict = classifier().classify(ContentKind::Text, "Please call me at 9876543210");
        assert_eq!(verdict.action, Action::Encrypt);
        assert_eq!(verdict.reasons, vec!["sensitive_info".to_string()]);
        assert_eq!(verdict.source, VerdictSource::Local);
    }

    #[test]
    fn test_profanity_is_masked() {
        let verdict = classifier().classify_text("what the fuck is this");
        assert_eq!(verdict.action, Action::Mask);
        assert_eq!(verdict.reasons, vec!["profanity".to_string()]);
    }

    #[test]
    fn test_word_boundaries() {
        // "class" contains no flagged word; "Scunthorpe" must not match inside a word
        let c = classifier();
        assert_eq!(c.classify_text("A classic assessment of Scunthorpe").action, Action::Keep);
        assert_eq!(c.classify_text("you are a NAZI").action, Action::Mask);
        assert_eq!(c.classify_text("just go back   to your country").action, Action::Mask);
    }

    #[test]
    fn test_builder_remove() {
        let mut builder = RuleSetBuilder::with_builtin();
        assert!(builder.remove(RuleCategory::Profanity, "Damn"));
        assert!(!builder.remove(RuleCategory::Profanity, "damn"));
        let c = LocalClassifier::new(builder.build().unwrap(), ClassifierSettings::default());
        assert_eq!(c.classify_text("damn that was close").action, Action::Keep);
    }

    #[test]
    fn test_pii_beats_profanity() {
        let verdict = classifier().classify_text("shit, my email is me@example.com");
        assert_eq!(verdict.action, Action::Encrypt);
        assert_eq!(verdict.reasons, vec!["profanity".to_string(), "sensitive_info".to_string()]);
    }

    #[test]
    fn test_short_and_clean_text_kept() {
        let c = classifier();
        assert_eq!(c.classify_text("ok").action, Action::Keep);
        assert_eq!(c.classify_text("   ").action, Action::Keep);
        assert_eq!(c.classify_text("A perfectly pleasant sentence.").action, Action::Keep);
    }

    #[test]
    fn test_allow_listed_image_kept() {
        let verdict = classifier().classify(ContentKind::Image, "https://good.wikipedia.org/img.png");
        assert_eq!(verdict.action, Action::Keep);
    }

    #[test]
    fn test_explicit_image_url_masked() {
        let c = classifier();
        let verdict = c.classify_image("https://cdn.example.com/nsfw/pic01.jpg", Some((640, 480)));
        assert_eq!(verdict.action, Action::Mask);
        assert_eq!(verdict.reasons, vec!["explicit_image_url".to_string()]);
        assert!(verdict.confidence.unwrap() >= 0.8);

        // Allow list beats keywords, tiny images are exempt
        assert_eq!(c.classify_image("https://upload.wikimedia.org/nsfw.png", None).action, Action::Keep);
        assert_eq!(c.classify_image("https://cdn.example.com/xxx.png", Some((16, 16))).action, Action::Keep);
        assert_eq!(c.classify_image("data:image/png;base64,AAAA", None).action, Action::Keep);
    }

    #[test]
    fn test_sampling_is_deterministic_and_skips_long_text() {
        let always = LocalClassifier::default().with_sampling(Some(SamplingPolicy::new(1.0, 7)));
        let verdict = always.classify_text("a harmless line of text");
        assert_eq!(verdict.action, Action::Mask);
        assert_eq!(verdict.reasons, vec!["sampled".to_string()]);

        let long_text = "word ".repeat(400);
        assert_eq!(always.classify_text(&long_text).action, Action::Keep);

        let half = SamplingPolicy::new(0.5, 42);
        let first = half.selects("same payload");
        for _ in 0..10 {
            assert_eq!(half.selects("same payload"), first);
        }
        assert!(!SamplingPolicy::new(0.0, 1).selects("anything"));
    }

    #[test]
    fn test_custom_rules() {
        let mut builder = RuleSetBuilder::new();
        builder
            .add_word(RuleCategory::Profanity, "Frak")
            .add_pattern(RuleCategory::HateSpeech, r"\btoaster\s+scum\b")
            .add_word(RuleCategory::AllowedHost, "images.example.com");
        let rules = builder.build().unwrap();
        assert_eq!(rules.counts().profanity, 1);

        let c = LocalClassifier::new(rules, ClassifierSettings::default());
        assert_eq!(c.classify_text("oh frak").reasons, vec!["profanity".to_string()]);
        assert_eq!(c.classify_text("Toaster   SCUM everywhere").reasons, vec!["hate_speech".to_string()]);
        assert!(c.is_exempt_image("https://images.example.com/a.png", None));
    }

    #[test]
    fn test_invalid_pattern_reported() {
        let mut builder = RuleSetBuilder::new();
        builder.add_pattern(RuleCategory::Profanity, "(unclosed");
        assert!(matches!(builder.build(), Err(RuleSetError::InvalidPattern { .. })));
    }

    #[test]
    fn test_section_names() {
        assert_eq!(RuleCategory::from_section("Profanity"), Some(RuleCategory::Profanity));
        assert_eq!(RuleCategory::from_section("allowed_hosts"), Some(RuleCategory::AllowedHost));
        assert_eq!(RuleCategory::from_section("misc"), None);
    }
}
