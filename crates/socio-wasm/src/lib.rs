//! WebAssembly bindings for the Socio.io local classifier

use std::sync::OnceLock;

use socio_core::{
    mask,
    pii::{self, find_sensitive},
    types::{ContentKind, Verdict},
    LocalClassifier, ModerationConfig, RuleSetBuilder,
};
use socio_rules::compile_rule_texts;
use wasm_bindgen::prelude::*;

static CLASSIFIER: OnceLock<LocalClassifier> = OnceLock::new();

fn classifier() -> &'static LocalClassifier {
    CLASSIFIER.get_or_init(LocalClassifier::default)
}

fn set(target: &js_sys::Object, key: &str, value: &JsValue) {
    let _ = js_sys::Reflect::set(target, &key.into(), value);
}

/// Configure the classifier from a JSON config and extra rule lists.
///
/// Calling any classify function first locks in the built-in tables.
#[wasm_bindgen]
pub fn init(config_json: Option<String>, rule_lists: JsValue) -> Result<JsValue, JsValue> {
    if CLASSIFIER.get().is_some() {
        return Err(JsValue::from_str("Already initialized. Reload the page to reinitialize."));
    }

    let config = match config_json.as_deref() {
        Some(json) => ModerationConfig::from_json_str(json)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?,
        None => ModerationConfig::default(),
    };

    let mut texts = Vec::new();
    if !rule_lists.is_undefined() && !rule_lists.is_null() {
        for value in js_sys::Array::from(&rule_lists).iter() {
            let text = value
                .as_string()
                .ok_or_else(|| JsValue::from_str("Rule list must be a string"))?;
            texts.push(text);
        }
    }

    let mut base = RuleSetBuilder::with_builtin();
    config.extend_rules(&mut base);
    let (rules, stats) =
        compile_rule_texts(&texts, base).map_err(|e| JsValue::from_str(&format!("Failed to compile rules: {}", e)))?;

    web_sys::console::log_1(&JsValue::from_str(&format!(
        "socio: {} rule lists, {} entries kept, {} disabled",
        stats.lists, stats.optimize.after, stats.optimize.disabled_rules
    )));

    CLASSIFIER
        .set(config.local_classifier(rules))
        .map_err(|_| JsValue::from_str("Failed to set classifier state"))?;

    let result = js_sys::Object::new();
    set(&result, "lists", &JsValue::from(stats.lists as u32));
    set(&result, "rulesBefore", &JsValue::from(stats.optimize.before as u32));
    set(&result, "rulesAfter", &JsValue::from(stats.optimize.after as u32));
    set(&result, "profanity", &JsValue::from(stats.counts.profanity as u32));
    set(&result, "hateSpeech", &JsValue::from(stats.counts.hate_speech as u32));
    set(&result, "imageKeywords", &JsValue::from(stats.counts.image_keywords as u32));
    set(&result, "allowedHosts", &JsValue::from(stats.counts.allowed_hosts as u32));
    Ok(result.into())
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    CLASSIFIER.get().is_some()
}

fn verdict_to_js(verdict: &Verdict) -> JsValue {
    let result = js_sys::Object::new();
    set(&result, "action", &JsValue::from_str(verdict.action.as_str()));

    let reasons = js_sys::Array::new();
    for reason in &verdict.reasons {
        reasons.push(&JsValue::from_str(reason));
    }
    set(&result, "reasons", &reasons);

    if let Some(confidence) = verdict.confidence {
        set(&result, "confidence", &JsValue::from(confidence));
    }
    result.into()
}

#[wasm_bindgen]
pub fn classify_text(text: &str) -> JsValue {
    verdict_to_js(&classifier().classify_text(text))
}

#[wasm_bindgen]
pub fn classify_image(url: &str, width: Option<u32>, height: Option<u32>) -> JsValue {
    let dimensions = width.zip(height);
    verdict_to_js(&classifier().classify_image(url, dimensions))
}

/// Wire-format verdict, the same JSON the engine persists.
#[wasm_bindgen]
pub fn classify_json(kind: &str, payload: &str) -> Result<String, JsValue> {
    let kind = match kind {
        "text" => ContentKind::Text,
        "image" => ContentKind::Image,
        other => return Err(JsValue::from_str(&format!("Unknown content kind: {}", other))),
    };
    serde_json::to_string(&classifier().classify(kind, payload)).map_err(|e| JsValue::from_str(&e.to_string()))
}

#[wasm_bindgen]
pub fn mask_text(text: &str) -> String {
    mask::mask_text(text)
}

/// Replace phone numbers, emails and card numbers; other text is kept.
#[wasm_bindgen]
pub fn redact_sensitive(text: &str) -> String {
    mask::redact_sensitive(text, &find_sensitive(text))
}

#[wasm_bindgen]
pub fn sensitive_reasons(text: &str) -> JsValue {
    let reasons = js_sys::Array::new();
    for reason in pii::sensitive_categories(text).reasons() {
        reasons.push(&JsValue::from_str(&reason));
    }
    reasons.into()
}

#[wasm_bindgen]
pub fn blur_filter(confidence: Option<f32>) -> String {
    mask::blur_filter(mask::blur_radius(confidence))
}
