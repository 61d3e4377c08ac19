//! Discovery Engine
//!
//! Finds content that still needs a verdict. Mutation notifications are
//! debounced into one sweep; a periodic sweep catches whatever the
//! notifications missed.

use std::time::Duration;

use socio_core::dom::{extract_payload, Document, ElementRef, ATTR_FILTERED, ATTR_SKIP};
use socio_core::mask::is_placeholder;
use socio_core::registry::ElementRegistry;
use socio_core::types::{ContentKind, ContentNode, ProcessingTask, ScanKinds};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct Discovery {
    kinds: ScanKinds,
    min_text_len: usize,
}

impl Discovery {
    pub fn new(kinds: ScanKinds, min_text_len: usize) -> Self {
        Self { kinds, min_text_len }
    }

    /// Walk the page in document order and admit every element that needs a
    /// verdict in the current epoch.
    pub fn sweep(&self, doc: &dyn Document, registry: &mut ElementRegistry) -> Vec<ProcessingTask> {
        let candidates = doc.candidates();
        let mut tasks = Vec::new();
        for element in candidates {
            if let Some(task) = self.admit_element(doc, registry, element) {
                tasks.push(task);
            }
        }
        if !tasks.is_empty() {
            log::debug!("sweep admitted {} node(s) in epoch {}", tasks.len(), registry.epoch());
        }
        tasks
    }

    /// Admit one element, returning its task if it needs a verdict.
    pub fn admit_element(
        &self,
        doc: &dyn Document,
        registry: &mut ElementRegistry,
        element: ElementRef,
    ) -> Option<ProcessingTask> {
        let node = self.inspect(doc, registry, element)?;
        if !registry.admit(node.node_id) {
            return None;
        }
        Some(ProcessingTask::new(node, registry.epoch()))
    }

    /// Build the content node for an element without admitting it.
    pub fn inspect(&self, doc: &dyn Document, registry: &mut ElementRegistry, element: ElementRef) -> Option<ContentNode> {
        if doc.attribute(element, ATTR_SKIP).is_some() || doc.attribute(element, ATTR_FILTERED).is_some() {
            return None;
        }

        let (kind, payload, dimensions) = extract_payload(doc, element)?;
        if !self.kinds.includes(kind) {
            return None;
        }
        if kind == ContentKind::Text && (payload.chars().count() < self.min_text_len || is_placeholder(&payload)) {
            return None;
        }

        let node_id = registry.identify(doc, element)?;
        Some(ContentNode {
            element,
            node_id,
            kind,
            payload,
            dimensions,
        })
    }
}

/// Trailing-edge debounce: each notification pushes the deadline out.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, deadline: None }
    }

    pub fn notify(&mut self) {
        self.deadline = Some(Instant::now() + self.delay);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }
}
