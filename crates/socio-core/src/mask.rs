//! Redaction formatting
//!
//! Turns original content into what the page shows while it is moderated.
//! Lengths are counted in chars so multi-byte text is never split mid-char.

use crate::pii::SensitiveSpan;
use crate::types::Categories;

/// Shown in place of short filtered text.
pub const PLACEHOLDER_TEXT: &str = "[Content filtered by Socio.io]";
/// Separates head and tail of medium-length filtered text.
pub const MIDDLE_MARKER: &str = " [...filtered...] ";
/// Appended to the preview of long filtered text.
pub const MORE_FILTERED_MARKER: &str = " [More content filtered by Socio.io - click to view]";
/// Shown in place of images that are hidden rather than blurred.
pub const PLACEHOLDER_IMAGE_URL: &str = "https://via.placeholder.com/400x300?text=Content+Filtered";

pub const SHORT_TEXT_MAX: usize = 40;
pub const MEDIUM_TEXT_MAX: usize = 200;
const HEAD_TAIL_CHARS: usize = 10;
const PREVIEW_MAX_CHARS: usize = 100;

/// Length-aware redaction of filtered text.
///
/// - up to 40 chars: generic placeholder
/// - up to 200 chars: first and last 10 chars around a marker
/// - longer: first sentence (at most 100 chars) plus a "click to view" marker
pub fn mask_text(text: &str) -> String {
    let text = text.trim();
    let len = text.chars().count();

    if len <= SHORT_TEXT_MAX {
        return PLACEHOLDER_TEXT.to_string();
    }

    if len <= MEDIUM_TEXT_MAX {
        let head: String = text.chars().take(HEAD_TAIL_CHARS).collect();
        let tail: String = text.chars().skip(len - HEAD_TAIL_CHARS).collect();
        return format!("{}{}{}", head, MIDDLE_MARKER, tail);
    }

    format!("{}{}", first_sentence(text), MORE_FILTERED_MARKER)
}

/// First sentence of `text`, terminator included, capped at 100 chars.
fn first_sentence(text: &str) -> String {
    let mut preview = String::new();
    for (count, c) in text.chars().enumerate() {
        if count >= PREVIEW_MAX_CHARS {
            break;
        }
        preview.push(c);
        if matches!(c, '.' | '!' | '?') {
            break;
        }
    }
    preview.trim_end().to_string()
}

/// Whether `text` is output of [`mask_text`] rather than page content.
pub fn is_placeholder(text: &str) -> bool {
    let text = text.trim();
    text == PLACEHOLDER_TEXT || text.contains(MIDDLE_MARKER.trim()) || text.ends_with(MORE_FILTERED_MARKER.trim())
}

/// Star out sensitive spans. Card numbers keep their last four chars.
pub fn redact_sensitive(text: &str, spans: &[SensitiveSpan]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    for span in spans {
        if span.start < cursor || span.end > text.len() || !text.is_char_boundary(span.start) || !text.is_char_boundary(span.end) {
            continue;
        }
        out.push_str(&text[cursor..span.start]);

        let secret = &text[span.start..span.end];
        let count = secret.chars().count();
        let keep = if span.category == Categories::CARD_NUMBER { 4.min(count) } else { 0 };
        out.extend(std::iter::repeat('*').take(count - keep));
        out.extend(secret.chars().skip(count - keep));

        cursor = span.end;
    }

    out.push_str(&text[cursor..]);
    out
}

/// Blur radius in pixels for a given classifier confidence.
pub fn blur_radius(confidence: Option<f32>) -> u32 {
    match confidence {
        Some(c) if c >= 0.8 => 30,
        Some(c) if c >= 0.5 => 15,
        Some(_) => 8,
        None => 15,
    }
}

/// CSS filter value for a blur radius.
pub fn blur_filter(radius: u32) -> String {
    format!("blur({}px)", radius)
}
