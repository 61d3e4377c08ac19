//! Transform & Recovery Store
//!
//! Applies a verdict to an element and keeps the record that undoes it.
//! Every element that shows transformed content has exactly one live record;
//! recovery consumes it, and `restore_all` rolls every one of them back.

use std::collections::HashMap;

use chrono::Utc;

use crate::dom::{
    node_id_of, Document, DomError, ElementRef, ATTR_FILTERED, ATTR_NODE_ID, ATTR_RECORD, ATTR_REVEAL, ATTR_SKIP,
    STYLE_FILTER,
};
use crate::history::History;
use crate::mask::{blur_filter, blur_radius, mask_text, redact_sensitive, PLACEHOLDER_IMAGE_URL};
use crate::pii::find_sensitive;
use crate::types::{Action, ContentKind, ContentNode, NodeId, TransformRecord, Verdict};
use crate::url::extract_host;

/// Value of [`ATTR_REVEAL`] on masked elements.
pub const REVEAL_HINT: &str = "click-to-view";
/// Value of [`ATTR_SKIP`] on elements the user chose to reveal.
pub const SKIP_REVEALED: &str = "revealed";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("node {0} was removed before it could be transformed")]
    Detached(NodeId),
    #[error("node {node} kind changed since discovery")]
    KindChanged { node: NodeId },
    #[error(transparent)]
    Dom(#[from] DomError),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecoverError {
    #[error("no transform record for node {0}")]
    NotFound(NodeId),
    #[error("node {0} has a record but its element is gone from the page")]
    ElementGone(NodeId),
    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Outcome of a full rollback.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    /// Records whose element could not be found. They stay live so a
    /// re-rendered copy can still be recovered later.
    pub missing: Vec<NodeId>,
    /// Elements that still carried a marker without a live record
    pub stale_markers: usize,
}

#[derive(Debug)]
pub struct TransformStore {
    live: HashMap<NodeId, TransformRecord>,
    history: History<TransformRecord>,
}

impl TransformStore {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            live: HashMap::new(),
            history: History::new(history_capacity),
        }
    }

    /// Restore persisted history (oldest first). Live records are never
    /// persisted; they describe the current page only.
    pub fn with_history(mut self, entries: Vec<TransformRecord>) -> Self {
        self.history = History::from_entries(self.history.capacity(), entries);
        self
    }

    pub fn history(&self) -> &History<TransformRecord> {
        &self.history
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn record(&self, node_id: NodeId) -> Option<&TransformRecord> {
        self.live.get(&node_id)
    }

    /// Most recent record for `node_id` in history, live or not.
    pub fn history_record(&self, node_id: NodeId) -> Option<&TransformRecord> {
        self.history.iter().rev().find(|r| r.node_id == node_id)
    }

    /// Apply a verdict to a node. Returns the new record for Mask/Encrypt,
    /// `None` for Keep or when the node already shows transformed content.
    pub fn apply(
        &mut self,
        doc: &dyn Document,
        node: &ContentNode,
        verdict: &Verdict,
    ) -> Result<Option<TransformRecord>, TransformError> {
        let element = node.element;
        if !doc.is_connected(element) {
            return Err(TransformError::Detached(node.node_id));
        }
        if doc.kind(element) != Some(node.kind) {
            return Err(TransformError::KindChanged { node: node.node_id });
        }

        if !verdict.action.is_transform() {
            return Ok(None);
        }

        // Transforming twice would record the placeholder as the original
        if self.live.contains_key(&node.node_id) {
            log::debug!("node {} already transformed, skipping", node.node_id);
            return Ok(None);
        }

        let (original, displayed) = match node.kind {
            ContentKind::Text => {
                let original = doc.text(element).ok_or(TransformError::Detached(node.node_id))?;
                let displayed = display_text(&original, verdict);
                doc.set_text(element, &displayed)?;
                (original, displayed)
            }
            ContentKind::Image => {
                let original = doc
                    .image(element)
                    .ok_or(TransformError::Detached(node.node_id))?
                    .src;
                let displayed = match verdict.action {
                    Action::Encrypt => {
                        let placeholder = verdict
                            .processed_payload
                            .clone()
                            .unwrap_or_else(|| PLACEHOLDER_IMAGE_URL.to_string());
                        doc.set_image_src(element, &placeholder)?;
                        placeholder
                    }
                    // A remote placeholder replaces the image; otherwise blur it in place
                    _ => match &verdict.processed_payload {
                        Some(placeholder) if *placeholder != original => {
                            doc.set_image_src(element, placeholder)?;
                            placeholder.clone()
                        }
                        _ => {
                            let filter = blur_filter(blur_radius(verdict.confidence));
                            doc.set_style(element, STYLE_FILTER, Some(&filter))?;
                            original.clone()
                        }
                    },
                };
                (original, displayed)
            }
        };

        mark(doc, element, verdict.action, node.node_id)?;

        let page_url = doc.page_url();
        let record = TransformRecord {
            node_id: node.node_id,
            kind: node.kind,
            original_payload: original,
            displayed_payload: displayed,
            applied_action: verdict.action,
            reasons: verdict.reasons.clone(),
            timestamp_utc: Utc::now(),
            domain: extract_host(&page_url).unwrap_or_default().to_string(),
            page_url,
            encrypted_token: verdict.encrypted_token.clone(),
        };

        self.live.insert(node.node_id, record.clone());
        self.history.push(record.clone());
        Ok(Some(record))
    }

    /// Restore one node's original content and return it.
    ///
    /// The element stays revealed: it is tagged so discovery leaves it alone.
    pub fn recover(&mut self, doc: &dyn Document, node_id: NodeId) -> Result<String, RecoverError> {
        let record = self.live.get(&node_id).ok_or(RecoverError::NotFound(node_id))?;
        let element = locate(doc, record, &self.live).ok_or(RecoverError::ElementGone(node_id))?;

        restore_element(doc, element, record)?;
        doc.set_attribute(element, ATTR_SKIP, SKIP_REVEALED)?;

        let original = record.original_payload.clone();
        self.live.remove(&node_id);
        Ok(original)
    }

    /// Roll back every live record, then strip any marker left behind.
    pub fn restore_all(&mut self, doc: &dyn Document) -> RestoreReport {
        let mut report = RestoreReport::default();

        let mut ids: Vec<NodeId> = self.live.keys().copied().collect();
        ids.sort();

        for node_id in ids {
            let Some(record) = self.live.get(&node_id) else {
                continue;
            };
            match locate(doc, record, &self.live) {
                Some(element) => match restore_element(doc, element, record) {
                    Ok(()) => {
                        self.live.remove(&node_id);
                        report.restored += 1;
                    }
                    Err(e) => {
                        log::warn!("failed to restore node {}: {}", node_id, e);
                        report.missing.push(node_id);
                    }
                },
                None => report.missing.push(node_id),
            }
        }

        for element in doc.find_by_attribute(ATTR_FILTERED, None) {
            if clear_markers(doc, element).is_ok() {
                report.stale_markers += 1;
            }
        }

        if !report.missing.is_empty() {
            log::info!("restore_all: {} record(s) had no element left", report.missing.len());
        }
        report
    }

    /// Adopt a re-rendered element that still shows the transformed content
    /// of a record whose own element is gone. The element gets that record's
    /// markers back and the record's id is returned; such a node must not be
    /// classified again, since its text is the placeholder and not the original.
    pub fn reattach(&self, doc: &dyn Document, node: &ContentNode) -> Result<Option<NodeId>, DomError> {
        if doc.attribute(node.element, ATTR_FILTERED).is_some() {
            return Ok(None);
        }
        let orphan = self
            .live
            .values()
            .filter(|record| {
                record.kind == node.kind
                    && record.displayed_payload.trim() == node.payload
                    && record.displayed_payload != record.original_payload
            })
            .filter(|record| !is_placed(doc, record.node_id))
            .min_by_key(|record| record.node_id);

        let Some(record) = orphan else {
            return Ok(None);
        };
        mark(doc, node.element, record.applied_action, record.node_id)?;
        log::debug!("node {} re-rendered as {}, markers restored", record.node_id, node.node_id);
        Ok(Some(record.node_id))
    }
}

fn display_text(original: &str, verdict: &Verdict) -> String {
    if let Some(processed) = &verdict.processed_payload {
        return processed.clone();
    }
    match verdict.action {
        Action::Encrypt => {
            let spans = find_sensitive(original);
            if spans.is_empty() {
                mask_text(original)
            } else {
                redact_sensitive(original, &spans)
            }
        }
        _ => mask_text(original),
    }
}

fn mark(doc: &dyn Document, element: ElementRef, action: Action, node_id: NodeId) -> Result<(), DomError> {
    doc.set_attribute(element, ATTR_FILTERED, action.as_str())?;
    doc.set_attribute(element, ATTR_RECORD, &node_id.to_string())?;
    doc.set_attribute(element, ATTR_REVEAL, REVEAL_HINT)
}

fn is_placed(doc: &dyn Document, node_id: NodeId) -> bool {
    let id = node_id.to_string();
    !doc.find_by_attribute(ATTR_NODE_ID, Some(&id)).is_empty()
        || !doc.find_by_attribute(ATTR_RECORD, Some(&id)).is_empty()
}

/// Find the element a record belongs to: by id, then by record marker, then
/// by what the element currently displays (for re-rendered nodes). A
/// re-rendered node may already carry a fresh id; it still qualifies as long
/// as that id owns no live record.
fn locate(doc: &dyn Document, record: &TransformRecord, live: &HashMap<NodeId, TransformRecord>) -> Option<ElementRef> {
    let id = record.node_id.to_string();

    if let Some(element) = doc.find_by_attribute(ATTR_NODE_ID, Some(&id)).into_iter().next() {
        return Some(element);
    }
    if let Some(element) = doc.find_by_attribute(ATTR_RECORD, Some(&id)).into_iter().next() {
        return Some(element);
    }

    doc.candidates().into_iter().find(|&element| {
        if doc.kind(element) != Some(record.kind) || doc.attribute(element, ATTR_RECORD).is_some() {
            return false;
        }
        if node_id_of(doc, element).is_some_and(|other| live.contains_key(&other)) {
            return false;
        }
        match record.kind {
            ContentKind::Text => doc.text(element).as_deref() == Some(record.displayed_payload.as_str()),
            ContentKind::Image => {
                doc.image(element).map(|info| info.src) == Some(record.displayed_payload.clone())
                    && (record.displayed_payload != record.original_payload || doc.style(element, STYLE_FILTER).is_some())
            }
        }
    })
}

fn restore_element(doc: &dyn Document, element: ElementRef, record: &TransformRecord) -> Result<(), DomError> {
    match record.kind {
        ContentKind::Text => doc.set_text(element, &record.original_payload)?,
        ContentKind::Image => {
            doc.set_image_src(element, &record.original_payload)?;
            doc.set_style(element, STYLE_FILTER, None)?;
        }
    }
    clear_markers(doc, element)
}

fn clear_markers(doc: &dyn Document, element: ElementRef) -> Result<(), DomError> {
    doc.remove_attribute(element, ATTR_FILTERED)?;
    doc.remove_attribute(element, ATTR_RECORD)?;
    doc.remove_attribute(element, ATTR_REVEAL)?;
    if doc.kind(element) == Some(ContentKind::Image) {
        doc.set_style(element, STYLE_FILTER, None)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::LocalClassifier;
    use crate::memory::MemoryDocument;
    use crate::registry::ElementRegistry;
    use crate::types::VerdictSource;

    fn node_for(doc: &MemoryDocument, registry: &mut ElementRegistry, element: ElementRef) -> ContentNode {
        let (kind, payload, dimensions) = crate::dom::extract_payload(doc, element).unwrap();
        ContentNode {
            element,
            node_id: registry.identify(doc, element).unwrap(),
            kind,
            payload,
            dimensions,
        }
    }

    #[test]
    fn test_encrypt_and_recover_phone_number() {
        let doc = MemoryDocument::new("https://news.example.com/story");
        let el = doc.push_text("Please call me at 9876543210");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);

        let verdict = LocalClassifier::default().classify_node(&node);
        assert_eq!(verdict.action, Action::Encrypt);

        let mut store = TransformStore::new(10);
        let record = store.apply(&doc, &node, &verdict).unwrap().unwrap();
        assert_eq!(record.domain, "news.example.com");
        assert_eq!(doc.text(el).as_deref(), Some("Please call me at **********"));
        assert_eq!(doc.attribute(el, ATTR_FILTERED).as_deref(), Some("encrypt"));

        let original = store.recover(&doc, node.node_id).unwrap();
        assert_eq!(original, "Please call me at 9876543210");
        assert_eq!(doc.text(el).as_deref(), Some("Please call me at 9876543210"));
        assert_eq!(doc.attribute(el, ATTR_FILTERED), None);
        assert_eq!(doc.attribute(el, ATTR_SKIP).as_deref(), Some(SKIP_REVEALED));
        assert_eq!(store.live_count(), 0);
        assert_eq!(store.history().len(), 1);
    }

    #[test]
    fn test_mask_short_text() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_text("This is a bad test");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = LocalClassifier::default().classify_node(&node);
        assert_eq!(verdict.action, Action::Mask);
        assert_eq!(verdict.reasons, vec!["profanity".to_string()]);

        let mut store = TransformStore::new(10);
        store.apply(&doc, &node, &verdict).unwrap();
        assert_eq!(doc.text(el).as_deref(), Some("[Content filtered by Socio.io]"));
        assert_eq!(store.recover(&doc, node.node_id).unwrap(), "This is a bad test");
    }

    #[test]
    fn test_keep_creates_no_record() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_image("https://good.wikipedia.org/img.png", Some(300), Some(200));
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = LocalClassifier::default().classify_node(&node);
        assert_eq!(verdict.action, Action::Keep);

        let mut store = TransformStore::new(10);
        assert_eq!(store.apply(&doc, &node, &verdict).unwrap(), None);
        assert_eq!(store.live_count(), 0);
        assert!(store.history().is_empty());
        assert_eq!(doc.style(el, STYLE_FILTER), None);
    }

    #[test]
    fn test_image_blur_and_restore() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_image("https://cdn.example.com/nsfw/a.jpg", Some(400), Some(300));
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = LocalClassifier::default().classify_node(&node);

        let mut store = TransformStore::new(10);
        store.apply(&doc, &node, &verdict).unwrap();
        assert_eq!(doc.style(el, STYLE_FILTER).as_deref(), Some("blur(30px)"));
        assert_eq!(doc.attribute(el, ATTR_REVEAL).as_deref(), Some(REVEAL_HINT));

        assert_eq!(store.recover(&doc, node.node_id).unwrap(), "https://cdn.example.com/nsfw/a.jpg");
        assert_eq!(doc.style(el, STYLE_FILTER), None);
    }

    #[test]
    fn test_encrypted_image_uses_placeholder() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_image("https://cdn.example.com/id-card.jpg", None, None);
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = Verdict::new(Action::Encrypt, vec!["sensitive_info".into()], VerdictSource::Remote)
            .with_encrypted_token(Some("tok".into()));

        let mut store = TransformStore::new(10);
        let record = store.apply(&doc, &node, &verdict).unwrap().unwrap();
        assert_eq!(doc.image(el).unwrap().src, PLACEHOLDER_IMAGE_URL);
        assert_eq!(record.encrypted_token.as_deref(), Some("tok"));
        store.recover(&doc, node.node_id).unwrap();
        assert_eq!(doc.image(el).unwrap().src, "https://cdn.example.com/id-card.jpg");
    }

    #[test]
    fn test_remote_processed_text_is_displayed() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_text("some damn text");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = Verdict::new(Action::Mask, vec!["profanity".into()], VerdictSource::Remote)
            .with_processed_payload(Some("some **** text".into()));

        let mut store = TransformStore::new(10);
        store.apply(&doc, &node, &verdict).unwrap();
        assert_eq!(doc.text(el).as_deref(), Some("some **** text"));
    }

    #[test]
    fn test_recover_not_found() {
        let doc = MemoryDocument::new("https://example.com");
        let mut store = TransformStore::new(10);
        assert_eq!(store.recover(&doc, NodeId(99)), Err(RecoverError::NotFound(NodeId(99))));
    }

    #[test]
    fn test_recover_recreated_node_by_displayed_text() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_text("what the fuck");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = LocalClassifier::default().classify_node(&node);

        let mut store = TransformStore::new(10);
        store.apply(&doc, &node, &verdict).unwrap();
        let fresh = doc.recreate(el).unwrap();

        assert_eq!(store.recover(&doc, node.node_id).unwrap(), "what the fuck");
        assert_eq!(doc.text(fresh).as_deref(), Some("what the fuck"));
    }

    #[test]
    fn test_recover_element_gone_keeps_record() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_text("what the fuck");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = LocalClassifier::default().classify_node(&node);

        let mut store = TransformStore::new(10);
        store.apply(&doc, &node, &verdict).unwrap();
        doc.remove(el);
        assert_eq!(store.recover(&doc, node.node_id), Err(RecoverError::ElementGone(node.node_id)));
        assert!(store.record(node.node_id).is_some());
    }

    #[test]
    fn test_recover_recreated_node_with_fresh_id() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_text("Please call me at 9876543210");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = LocalClassifier::default().classify_node(&node);

        let mut store = TransformStore::new(10);
        store.apply(&doc, &node, &verdict).unwrap();
        let fresh = doc.recreate(el).unwrap();
        let fresh_id = registry.identify(&doc, fresh).unwrap();
        assert_ne!(fresh_id, node.node_id);

        assert_eq!(store.recover(&doc, node.node_id).unwrap(), "Please call me at 9876543210");
        assert_eq!(doc.text(fresh).as_deref(), Some("Please call me at 9876543210"));
    }

    #[test]
    fn test_reattach_recreated_encrypted_node() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_text("Please call me at 9876543210");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = LocalClassifier::default().classify_node(&node);

        let mut store = TransformStore::new(10);
        store.apply(&doc, &node, &verdict).unwrap();
        let fresh = doc.recreate(el).unwrap();
        let fresh_node = node_for(&doc, &mut registry, fresh);
        assert_eq!(fresh_node.payload, "Please call me at **********");

        assert_eq!(store.reattach(&doc, &fresh_node).unwrap(), Some(node.node_id));
        assert_eq!(doc.attribute(fresh, ATTR_FILTERED).as_deref(), Some("encrypt"));
        assert_eq!(doc.attribute(fresh, ATTR_RECORD), Some(node.node_id.to_string()));
        // Already marked, nothing left to adopt
        assert_eq!(store.reattach(&doc, &fresh_node).unwrap(), None);

        assert_eq!(store.recover(&doc, node.node_id).unwrap(), "Please call me at 9876543210");
        assert_eq!(doc.text(fresh).as_deref(), Some("Please call me at 9876543210"));
        assert_eq!(store.live_count(), 0);
    }

    #[test]
    fn test_reattach_ignores_placed_records_and_plain_text() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_text("Please call me at 9876543210");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let mut store = TransformStore::new(10);
        store.apply(&doc, &node, &LocalClassifier::default().classify_node(&node)).unwrap();

        // Same displayed text, but the record's element is still on the page
        let copy = doc.push_text("Please call me at **********");
        let copy_node = node_for(&doc, &mut registry, copy);
        assert_eq!(store.reattach(&doc, &copy_node).unwrap(), None);

        let other = doc.push_text("nothing to see here");
        let other_node = node_for(&doc, &mut registry, other);
        assert_eq!(store.reattach(&doc, &other_node).unwrap(), None);
        assert_eq!(doc.attribute(copy, ATTR_FILTERED), None);
    }

    #[test]
    fn test_restore_all_keeps_unplaced_records() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_text("Please call me at 9876543210");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let mut store = TransformStore::new(10);
        store.apply(&doc, &node, &LocalClassifier::default().classify_node(&node)).unwrap();

        doc.remove(el);
        let report = store.restore_all(&doc);
        assert_eq!(report.restored, 0);
        assert_eq!(report.missing, vec![node.node_id]);
        assert!(store.record(node.node_id).is_some());

        // The node comes back later, still showing the redacted text
        let back = doc.push_text("Please call me at **********");
        assert_eq!(store.recover(&doc, node.node_id).unwrap(), "Please call me at 9876543210");
        assert_eq!(doc.text(back).as_deref(), Some("Please call me at 9876543210"));
    }

    #[test]
    fn test_remote_image_placeholder_replaces_src() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_image("https://cdn.example.com/a.jpg", Some(400), Some(300));
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = Verdict::new(Action::Mask, vec!["nsfw".into()], VerdictSource::Remote)
            .with_processed_payload(Some("https://backend.example.com/placeholder.png".into()));

        let mut store = TransformStore::new(10);
        let record = store.apply(&doc, &node, &verdict).unwrap().unwrap();
        assert_eq!(doc.image(el).unwrap().src, "https://backend.example.com/placeholder.png");
        assert_eq!(doc.style(el, STYLE_FILTER), None);
        assert_eq!(record.displayed_payload, "https://backend.example.com/placeholder.png");
        assert_eq!(record.original_payload, "https://cdn.example.com/a.jpg");

        // Re-rendered with the placeholder still showing
        let fresh = doc.recreate(el).unwrap();
        assert_eq!(store.recover(&doc, node.node_id).unwrap(), "https://cdn.example.com/a.jpg");
        assert_eq!(doc.image(fresh).unwrap().src, "https://cdn.example.com/a.jpg");
    }

    #[test]
    fn test_remote_image_echoing_src_is_blurred() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_image("https://cdn.example.com/a.jpg", Some(400), Some(300));
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = Verdict::new(Action::Mask, vec!["nsfw".into()], VerdictSource::Remote)
            .with_processed_payload(Some("https://cdn.example.com/a.jpg".into()));

        let mut store = TransformStore::new(10);
        store.apply(&doc, &node, &verdict).unwrap();
        assert_eq!(doc.image(el).unwrap().src, "https://cdn.example.com/a.jpg");
        assert!(doc.style(el, STYLE_FILTER).is_some());
    }

    #[test]
    fn test_detached_before_apply() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_text("what the fuck");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        doc.remove(el);
        let verdict = LocalClassifier::default().classify_node(&node);
        let mut store = TransformStore::new(10);
        assert_eq!(store.apply(&doc, &node, &verdict), Err(TransformError::Detached(node.node_id)));
    }

    #[test]
    fn test_restore_all_leaves_no_markers() {
        let doc = MemoryDocument::new("https://example.com");
        let texts = ["what the fuck", "mail me at a@b.io", "a calm sentence"];
        let mut registry = ElementRegistry::new();
        let classifier = LocalClassifier::default();
        let mut store = TransformStore::new(10);

        let mut elements = Vec::new();
        for text in texts {
            let el = doc.push_text(text);
            let node = node_for(&doc, &mut registry, el);
            store.apply(&doc, &node, &classifier.classify_node(&node)).unwrap();
            elements.push(el);
        }
        let img = doc.push_image("https://x.example.com/porn.jpg", None, None);
        let node = node_for(&doc, &mut registry, img);
        store.apply(&doc, &node, &classifier.classify_node(&node)).unwrap();
        assert_eq!(store.live_count(), 3);

        let report = store.restore_all(&doc);
        assert_eq!(report.restored, 3);
        assert!(report.missing.is_empty());
        assert!(doc.find_by_attribute(ATTR_FILTERED, None).is_empty());
        assert_eq!(doc.style(img, STYLE_FILTER), None);
        for (el, text) in elements.iter().zip(texts) {
            assert_eq!(doc.text(*el).as_deref(), Some(text));
        }
    }

    #[test]
    fn test_double_apply_is_ignored() {
        let doc = MemoryDocument::new("https://example.com");
        let el = doc.push_text("what the fuck");
        let mut registry = ElementRegistry::new();
        let node = node_for(&doc, &mut registry, el);
        let verdict = LocalClassifier::default().classify_node(&node);
        let mut store = TransformStore::new(10);
        assert!(store.apply(&doc, &node, &verdict).unwrap().is_some());
        assert!(store.apply(&doc, &node, &verdict).unwrap().is_none());
        assert_eq!(store.recover(&doc, node.node_id).unwrap(), "what the fuck");
    }
}
