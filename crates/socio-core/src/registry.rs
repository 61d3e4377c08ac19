//! Element Registry
//!
//! Tracks which elements were admitted for processing in the current epoch.
//! Keys are synthetic ids written onto the element itself, so two elements
//! with identical text are tracked independently and a recovery always targets
//! one specific element.

use std::collections::HashMap;

use crate::dom::{Document, ElementRef, ATTR_NODE_ID};
use crate::types::NodeId;

/// Mark left on an admitted node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessedMarker {
    pub epoch: u64,
}

#[derive(Debug)]
pub struct ElementRegistry {
    epoch: u64,
    marks: HashMap<NodeId, ProcessedMarker>,
    next_id: u64,
}

impl Default for ElementRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ElementRegistry {
    pub fn new() -> Self {
        Self {
            epoch: 0,
            marks: HashMap::new(),
            next_id: 1,
        }
    }

    /// Current epoch.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Number of nodes marked in the current epoch.
    pub fn len(&self) -> usize {
        self.marks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.marks.is_empty()
    }

    /// Return the element's synthetic id, tagging it on first sight.
    ///
    /// Returns `None` only if the element is gone.
    pub fn identify(&mut self, doc: &dyn Document, element: ElementRef) -> Option<NodeId> {
        if let Some(existing) = doc.attribute(element, ATTR_NODE_ID) {
            if let Ok(id) = existing.parse::<NodeId>() {
                // Never hand out an id an element already carries
                self.next_id = self.next_id.max(id.0 + 1);
                return Some(id);
            }
        }

        let id = NodeId(self.next_id);
        doc.set_attribute(element, ATTR_NODE_ID, &id.to_string()).ok()?;
        self.next_id += 1;
        Some(id)
    }

    /// Mark a node for this epoch. Returns false if it was already marked.
    pub fn admit(&mut self, node_id: NodeId) -> bool {
        match self.marks.get(&node_id) {
            Some(marker) if marker.epoch == self.epoch => false,
            _ => {
                self.marks.insert(node_id, ProcessedMarker { epoch: self.epoch });
                true
            }
        }
    }

    pub fn is_marked(&self, node_id: NodeId) -> bool {
        self.marks
            .get(&node_id)
            .map_or(false, |marker| marker.epoch == self.epoch)
    }

    /// Whether a result for a node admitted in `epoch` may still be applied.
    pub fn is_current(&self, node_id: NodeId, epoch: u64) -> bool {
        epoch == self.epoch && self.is_marked(node_id)
    }

    /// Drop every mark and start a new epoch. Must not be interleaved with a
    /// sweep's admits; callers run it synchronously on the event loop.
    pub fn reset_epoch(&mut self) -> u64 {
        let cleared = self.marks.len();
        self.marks.clear();
        self.epoch += 1;
        log::debug!("registry epoch {} started ({} marks cleared)", self.epoch, cleared);
        self.epoch
    }

    /// Forget a single node, allowing it to be admitted again.
    pub fn forget(&mut self, node_id: NodeId) {
        self.marks.remove(&node_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDocument;

    #[test]
    fn test_admit_is_idempotent_within_epoch() {
        let mut registry = ElementRegistry::new();
        let id = NodeId(1);
        assert!(registry.admit(id));
        assert!(!registry.admit(id));
        assert!(registry.is_marked(id));
    }

    #[test]
    fn test_reset_epoch_allows_readmission() {
        let mut registry = ElementRegistry::new();
        let id = NodeId(3);
        assert!(registry.admit(id));
        let old_epoch = registry.epoch();
        registry.reset_epoch();
        assert!(!registry.is_current(id, old_epoch));
        assert!(registry.admit(id));
        assert!(registry.is_current(id, registry.epoch()));
    }

    #[test]
    fn test_identical_text_gets_distinct_ids() {
        let doc = MemoryDocument::new("https://example.com");
        let a = doc.push_text("same words");
        let b = doc.push_text("same words");
        let mut registry = ElementRegistry::new();

        let id_a = registry.identify(&doc, a).unwrap();
        let id_b = registry.identify(&doc, b).unwrap();
        assert_ne!(id_a, id_b);

        // Stable on second sight
        assert_eq!(registry.identify(&doc, a), Some(id_a));
        assert!(registry.admit(id_a));
        assert!(registry.admit(id_b));
    }

    #[test]
    fn test_identify_respects_existing_ids() {
        let doc = MemoryDocument::new("https://example.com");
        let a = doc.push_text("tagged elsewhere");
        doc.set_attribute(a, ATTR_NODE_ID, "41").unwrap();
        let b = doc.push_text("fresh");

        let mut registry = ElementRegistry::new();
        assert_eq!(registry.identify(&doc, a), Some(NodeId(41)));
        assert_eq!(registry.identify(&doc, b), Some(NodeId(42)));
    }

    #[test]
    fn test_identify_detached() {
        let doc = MemoryDocument::new("https://example.com");
        let a = doc.push_text("gone soon");
        doc.remove(a);
        let mut registry = ElementRegistry::new();
        assert_eq!(registry.identify(&doc, a), None);
    }

    #[test]
    fn test_forget() {
        let mut registry = ElementRegistry::new();
        assert!(registry.admit(NodeId(9)));
        registry.forget(NodeId(9));
        assert!(registry.admit(NodeId(9)));
    }
}
