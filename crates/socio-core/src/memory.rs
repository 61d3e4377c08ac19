//! In-memory document
//!
//! A flat arena of text and image elements with attributes and inline styles.
//! Used by the CLI to moderate page fixtures and by tests to simulate a live,
//! mutating page. Clones share the same underlying page.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::dom::{Document, DomError, ElementRef, ImageInfo};
use crate::types::ContentKind;

#[derive(Debug, Clone)]
enum Content {
    Text(String),
    Image {
        src: String,
        width: Option<u32>,
        height: Option<u32>,
    },
}

#[derive(Debug, Clone)]
struct Node {
    content: Content,
    attributes: BTreeMap<String, String>,
    style: BTreeMap<String, String>,
    connected: bool,
}

impl Node {
    fn new(content: Content) -> Self {
        Self {
            content,
            attributes: BTreeMap::new(),
            style: BTreeMap::new(),
            connected: true,
        }
    }
}

#[derive(Debug, Default)]
struct Tree {
    url: String,
    nodes: Vec<Node>,
    /// Document order, as arena indices
    order: Vec<usize>,
}

impl Tree {
    fn live(&self, element: ElementRef) -> Option<&Node> {
        self.nodes.get(element.0).filter(|n| n.connected)
    }

    fn live_mut(&mut self, element: ElementRef) -> Result<&mut Node, DomError> {
        self.nodes
            .get_mut(element.0)
            .filter(|n| n.connected)
            .ok_or(DomError::Detached(element))
    }

    fn insert(&mut self, position: Option<usize>, node: Node) -> ElementRef {
        let idx = self.nodes.len();
        self.nodes.push(node);
        match position {
            Some(pos) if pos <= self.order.len() => self.order.insert(pos, idx),
            _ => self.order.push(idx),
        }
        ElementRef(idx)
    }
}

/// Shared, thread-safe page model.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    tree: Arc<Mutex<Tree>>,
}

impl MemoryDocument {
    pub fn new(url: &str) -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree {
                url: url.to_string(),
                ..Tree::default()
            })),
        }
    }

    /// Build a document from a page fixture.
    pub fn from_fixture(fixture: &PageFixture) -> Self {
        let doc = Self::new(&fixture.url);
        for element in &fixture.elements {
            match element {
                FixtureElement::Text { text } => {
                    doc.push_text(text);
                }
                FixtureElement::Image { src, width, height } => {
                    doc.push_image(src, *width, *height);
                }
            }
        }
        doc
    }

    /// Append a text element at the end of the document.
    pub fn push_text(&self, text: &str) -> ElementRef {
        self.tree.lock().insert(None, Node::new(Content::Text(text.to_string())))
    }

    /// Append an image element at the end of the document.
    pub fn push_image(&self, src: &str, width: Option<u32>, height: Option<u32>) -> ElementRef {
        let content = Content::Image {
            src: src.to_string(),
            width,
            height,
        };
        self.tree.lock().insert(None, Node::new(content))
    }

    /// Detach an element, as a page script removing it would.
    pub fn remove(&self, element: ElementRef) {
        let mut tree = self.tree.lock();
        if let Some(node) = tree.nodes.get_mut(element.0) {
            node.connected = false;
        }
        tree.order.retain(|&idx| idx != element.0);
    }

    /// Replace an element with a fresh copy of its current content, dropping
    /// every attribute and style. Mimics frameworks that re-render nodes.
    pub fn recreate(&self, element: ElementRef) -> Option<ElementRef> {
        let mut tree = self.tree.lock();
        let content = tree.live(element)?.content.clone();
        let position = tree.order.iter().position(|&idx| idx == element.0);
        tree.nodes[element.0].connected = false;
        tree.order.retain(|&idx| idx != element.0);
        Some(tree.insert(position, Node::new(content)))
    }

    /// Number of attached elements.
    pub fn len(&self) -> usize {
        self.tree.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serializable view of the page in document order.
    pub fn snapshot(&self) -> Vec<ElementSnapshot> {
        let tree = self.tree.lock();
        tree.order
            .iter()
            .map(|&idx| {
                let node = &tree.nodes[idx];
                let (kind, content) = match &node.content {
                    Content::Text(text) => (ContentKind::Text, text.clone()),
                    Content::Image { src, .. } => (ContentKind::Image, src.clone()),
                };
                ElementSnapshot {
                    element: ElementRef(idx),
                    kind,
                    content,
                    attributes: node.attributes.clone(),
                    style: node.style.clone(),
                }
            })
            .collect()
    }
}

impl Document for MemoryDocument {
    fn page_url(&self) -> String {
        self.tree.lock().url.clone()
    }

    fn candidates(&self) -> Vec<ElementRef> {
        self.tree.lock().order.iter().map(|&idx| ElementRef(idx)).collect()
    }

    fn kind(&self, element: ElementRef) -> Option<ContentKind> {
        let tree = self.tree.lock();
        tree.live(element).map(|node| match node.content {
            Content::Text(_) => ContentKind::Text,
            Content::Image { .. } => ContentKind::Image,
        })
    }

    fn is_connected(&self, element: ElementRef) -> bool {
        self.tree.lock().live(element).is_some()
    }

    fn text(&self, element: ElementRef) -> Option<String> {
        let tree = self.tree.lock();
        match &tree.live(element)?.content {
            Content::Text(text) => Some(text.clone()),
            Content::Image { .. } => None,
        }
    }

    fn set_text(&self, element: ElementRef, text: &str) -> Result<(), DomError> {
        let mut tree = self.tree.lock();
        match &mut tree.live_mut(element)?.content {
            Content::Text(current) => {
                *current = text.to_string();
                Ok(())
            }
            Content::Image { .. } => Err(DomError::WrongKind {
                element,
                expected: "text",
            }),
        }
    }

    fn image(&self, element: ElementRef) -> Option<ImageInfo> {
        let tree = self.tree.lock();
        match &tree.live(element)?.content {
            Content::Image { src, width, height } => Some(ImageInfo {
                src: src.clone(),
                width: *width,
                height: *height,
            }),
            Content::Text(_) => None,
        }
    }

    fn set_image_src(&self, element: ElementRef, new_src: &str) -> Result<(), DomError> {
        let mut tree = self.tree.lock();
        match &mut tree.live_mut(element)?.content {
            Content::Image { src, .. } => {
                *src = new_src.to_string();
                Ok(())
            }
            Content::Text(_) => Err(DomError::WrongKind {
                element,
                expected: "image",
            }),
        }
    }

    fn style(&self, element: ElementRef, property: &str) -> Option<String> {
        self.tree.lock().live(element)?.style.get(property).cloned()
    }

    fn set_style(&self, element: ElementRef, property: &str, value: Option<&str>) -> Result<(), DomError> {
        let mut tree = self.tree.lock();
        let node = tree.live_mut(element)?;
        match value {
            Some(value) => {
                node.style.insert(property.to_string(), value.to_string());
            }
            None => {
                node.style.remove(property);
            }
        }
        Ok(())
    }

    fn attribute(&self, element: ElementRef, name: &str) -> Option<String> {
        self.tree.lock().live(element)?.attributes.get(name).cloned()
    }

    fn set_attribute(&self, element: ElementRef, name: &str, value: &str) -> Result<(), DomError> {
        let mut tree = self.tree.lock();
        tree.live_mut(element)?
            .attributes
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn remove_attribute(&self, element: ElementRef, name: &str) -> Result<(), DomError> {
        let mut tree = self.tree.lock();
        tree.live_mut(element)?.attributes.remove(name);
        Ok(())
    }

    fn find_by_attribute(&self, name: &str, value: Option<&str>) -> Vec<ElementRef> {
        let tree = self.tree.lock();
        tree.order
            .iter()
            .filter(|&&idx| match tree.nodes[idx].attributes.get(name) {
                Some(actual) => value.map_or(true, |expected| actual == expected),
                None => false,
            })
            .map(|&idx| ElementRef(idx))
            .collect()
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// JSON description of a page: its URL and elements in document order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFixture {
    pub url: String,
    #[serde(default)]
    pub elements: Vec<FixtureElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FixtureElement {
    Text {
        text: String,
    },
    Image {
        src: String,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
    },
}

/// One element as reported by [`MemoryDocument::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementSnapshot {
    pub element: ElementRef,
    pub kind: ContentKind,
    pub content: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub style: BTreeMap<String, String>,
}
