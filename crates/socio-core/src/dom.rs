//! Host DOM capability
//!
//! The pipeline never owns the page. It talks to it through [`Document`], a
//! narrow view of the handful of DOM operations moderation needs: walk the
//! candidate elements in document order, read and replace their content, and
//! read/write `data-*` markers and inline styles.
//!
//! Handles behave like DOM references: cheap to copy, and possibly stale.
//! Every mutating call fails with [`DomError::Detached`] once the element has
//! left the page.

use serde::{Deserialize, Serialize};

use crate::types::{ContentKind, NodeId};

// =============================================================================
// Marker Attributes
// =============================================================================

/// Synthetic node identity, assigned by the registry.
pub const ATTR_NODE_ID: &str = "data-socio-id";
/// Set while an element shows transformed content; value is the action.
pub const ATTR_FILTERED: &str = "data-socio-filtered";
/// Points at the transform record that can restore the element.
pub const ATTR_RECORD: &str = "data-socio-record";
/// Reveal affordance ("click to view") on masked content.
pub const ATTR_REVEAL: &str = "data-socio-reveal";
/// Elements carrying this are never scanned.
pub const ATTR_SKIP: &str = "data-socio-skip";

/// Inline style property used for image blur.
pub const STYLE_FILTER: &str = "filter";

/// Handle to an element owned by the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementRef(pub usize);

/// Image source plus its rendered size, if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    pub src: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ImageInfo {
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomError {
    #[error("element {0:?} is no longer attached to the document")]
    Detached(ElementRef),
    #[error("element {element:?} is not a {expected} element")]
    WrongKind {
        element: ElementRef,
        expected: &'static str,
    },
}

// =============================================================================
// Document Capability
// =============================================================================

/// Operations the pipeline performs on the host page.
///
/// Implementations use interior mutability, the same way a DOM handle does:
/// the page may change underneath the pipeline at any suspension point.
pub trait Document: Send + Sync {
    /// URL of the page being moderated.
    fn page_url(&self) -> String;

    /// Text and image elements in document order.
    fn candidates(&self) -> Vec<ElementRef>;

    /// Content kind of an attached element.
    fn kind(&self, element: ElementRef) -> Option<ContentKind>;

    fn is_connected(&self, element: ElementRef) -> bool;

    fn text(&self, element: ElementRef) -> Option<String>;

    fn set_text(&self, element: ElementRef, text: &str) -> Result<(), DomError>;

    fn image(&self, element: ElementRef) -> Option<ImageInfo>;

    fn set_image_src(&self, element: ElementRef, src: &str) -> Result<(), DomError>;

    fn style(&self, element: ElementRef, property: &str) -> Option<String>;

    /// Set an inline style property, or remove it with `None`.
    fn set_style(&self, element: ElementRef, property: &str, value: Option<&str>) -> Result<(), DomError>;

    fn attribute(&self, element: ElementRef, name: &str) -> Option<String>;

    fn set_attribute(&self, element: ElementRef, name: &str, value: &str) -> Result<(), DomError>;

    fn remove_attribute(&self, element: ElementRef, name: &str) -> Result<(), DomError>;

    /// Attached elements carrying `name`, optionally with an exact value.
    fn find_by_attribute(&self, name: &str, value: Option<&str>) -> Vec<ElementRef>;
}

/// Extract the payload the classifiers see: trimmed text or image URL.
pub fn extract_payload(doc: &dyn Document, element: ElementRef) -> Option<(ContentKind, String, Option<(u32, u32)>)> {
    match doc.kind(element)? {
        ContentKind::Text => {
            let text = doc.text(element)?;
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some((ContentKind::Text, trimmed.to_string(), None))
        }
        ContentKind::Image => {
            let info = doc.image(element)?;
            let src = info.src.trim();
            if src.is_empty() {
                return None;
            }
            Some((ContentKind::Image, src.to_string(), info.dimensions()))
        }
    }
}

/// Read the synthetic id attached to an element, if any.
pub fn node_id_of(doc: &dyn Document, element: ElementRef) -> Option<NodeId> {
    doc.attribute(element, ATTR_NODE_ID)?.parse().ok()
}

/// Whether the element currently shows moderated content.
pub fn is_filtered(doc: &dyn Document, element: ElementRef) -> bool {
    doc.attribute(element, ATTR_FILTERED).is_some()
}
