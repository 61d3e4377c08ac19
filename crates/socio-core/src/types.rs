//! Core type definitions for the moderation pipeline
//!
//! These types flow between the classifiers, the transform store and the
//! host-facing status API. Anything that crosses into the extension UI is
//! serialized in camelCase.

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dom::ElementRef;

// =============================================================================
// Content Kinds
// =============================================================================

/// What a content node holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum ContentKind {
    Text,
    Image,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

bitflags::bitflags! {
    /// Content kinds the discovery engine is allowed to pick up.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ScanKinds: u8 {
        const TEXT = 1 << 0;
        const IMAGE = 1 << 1;
        const ALL = Self::TEXT.bits() | Self::IMAGE.bits();
    }
}

impl ScanKinds {
    #[inline]
    pub fn includes(self, kind: ContentKind) -> bool {
        match kind {
            ContentKind::Text => self.contains(Self::TEXT),
            ContentKind::Image => self.contains(Self::IMAGE),
        }
    }
}

impl Default for ScanKinds {
    fn default() -> Self {
        Self::ALL
    }
}

// =============================================================================
// Node Identity
// =============================================================================

/// Synthetic identifier attached to a DOM element at first sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(NodeId)
    }
}

/// A discovered element together with the payload extracted from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentNode {
    pub element: ElementRef,
    pub node_id: NodeId,
    pub kind: ContentKind,
    /// Trimmed text, or the resolved image URL
    pub payload: String,
    /// Rendered image size, when the host knows it
    pub dimensions: Option<(u32, u32)>,
}

/// A unit of work for the scheduler. Consumed exactly once.
#[derive(Debug, Clone)]
pub struct ProcessingTask {
    pub node: ContentNode,
    pub enqueued_at: Instant,
    /// Registry epoch the node was admitted in
    pub epoch: u64,
}

impl ProcessingTask {
    pub fn new(node: ContentNode, epoch: u64) -> Self {
        Self {
            node,
            enqueued_at: Instant::now(),
            epoch,
        }
    }

    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.node.node_id
    }

    #[inline]
    pub fn kind(&self) -> ContentKind {
        self.node.kind
    }
}

// =============================================================================
// Verdicts
// =============================================================================

/// Action to take for a classified node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum Action {
    /// Leave the node untouched
    Keep,
    /// Redact text / blur image; the original lives in the transform record
    Mask,
    /// Replace with a recoverable placeholder
    Encrypt,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Keep => "keep",
            Self::Mask => "mask",
            Self::Encrypt => "encrypt",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "keep" => Some(Self::Keep),
            "mask" => Some(Self::Mask),
            "encrypt" => Some(Self::Encrypt),
            _ => None,
        }
    }

    /// Whether applying this action changes the page.
    #[inline]
    pub fn is_transform(self) -> bool {
        !matches!(self, Self::Keep)
    }
}

/// Which classifier produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub enum VerdictSource {
    Local,
    Remote,
}

/// Classifier output for one node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Verdict {
    pub action: Action,
    pub reasons: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    pub source: VerdictSource,
    /// Already-processed replacement supplied by the remote service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_payload: Option<String>,
    /// Opaque token the remote service can decrypt back to the original
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_token: Option<String>,
}

impl Verdict {
    pub fn new(action: Action, reasons: Vec<String>, source: VerdictSource) -> Self {
        Self {
            action,
            reasons,
            confidence: None,
            source,
            processed_payload: None,
            encrypted_token: None,
        }
    }

    pub fn keep(source: VerdictSource) -> Self {
        Self::new(Action::Keep, Vec::new(), source)
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    pub fn with_processed_payload(mut self, payload: Option<String>) -> Self {
        self.processed_payload = payload.filter(|p| !p.is_empty());
        self
    }

    pub fn with_encrypted_token(mut self, token: Option<String>) -> Self {
        self.encrypted_token = token.filter(|t| !t.is_empty());
        self
    }
}

// =============================================================================
// Detection Categories
// =============================================================================

bitflags::bitflags! {
    /// Categories a local rule matched.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Categories: u16 {
        const PROFANITY = 1 << 0;
        const HATE_SPEECH = 1 << 1;
        const PHONE = 1 << 2;
        const EMAIL = 1 << 3;
        const NATIONAL_ID = 1 << 4;
        const CARD_NUMBER = 1 << 5;
        const EXPLICIT_URL = 1 << 6;
        const SAMPLED = 1 << 7;

        /// Personally identifiable information
        const SENSITIVE = Self::PHONE.bits()
            | Self::EMAIL.bits()
            | Self::NATIONAL_ID.bits()
            | Self::CARD_NUMBER.bits();
        /// Content that is hidden for good
        const OFFENSIVE = Self::PROFANITY.bits() | Self::HATE_SPEECH.bits();
    }
}

impl Categories {
    /// Reason strings reported in verdicts, in a stable order.
    pub fn reasons(self) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.contains(Self::PROFANITY) {
            reasons.push("profanity".to_string());
        }
        if self.contains(Self::HATE_SPEECH) {
            reasons.push("hate_speech".to_string());
        }
        if self.intersects(Self::SENSITIVE) {
            reasons.push("sensitive_info".to_string());
        }
        if self.contains(Self::EXPLICIT_URL) {
            reasons.push("explicit_image_url".to_string());
        }
        if self.contains(Self::SAMPLED) {
            reasons.push("sampled".to_string());
        }
        reasons
    }
}

// =============================================================================
// Transform Records
// =============================================================================

/// Everything needed to put a transformed node back the way it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct TransformRecord {
    pub node_id: NodeId,
    pub kind: ContentKind,
    pub original_payload: String,
    /// What the element shows while transformed
    pub displayed_payload: String,
    pub applied_action: Action,
    pub reasons: Vec<String>,
    pub timestamp_utc: DateTime<Utc>,
    pub page_url: String,
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_token: Option<String>,
}

// =============================================================================
// Status & Events
// =============================================================================

/// Answer to the host's status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct PipelineStatus {
    pub enabled: bool,
    pub backend_reachable: bool,
    pub queue_length: usize,
    pub processed_count: u64,
}

/// Emitted once per successful Mask/Encrypt transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct FilterEvent {
    pub kind: ContentKind,
    pub action: Action,
    pub node_id: NodeId,
    pub domain: String,
}

impl From<&TransformRecord> for FilterEvent {
    fn from(record: &TransformRecord) -> Self {
        Self {
            kind: record.kind,
            action: record.applied_action,
            node_id: record.node_id,
            domain: record.domain.clone(),
        }
    }
}
