//! Filter counters and the outbound event sink.

use serde::{Deserialize, Serialize};
use socio_core::types::{ContentKind, FilterEvent};
use tokio::sync::mpsc;

/// Running totals, persisted between sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCounters {
    pub text_filtered: u64,
    pub images_filtered: u64,
    /// Every verdict a classifier produced, including verdicts discarded
    /// before they reached the page. Compare with `processed`.
    pub total_classified: u64,
    /// Tasks whose verdict was applied this session
    #[serde(skip)]
    pub processed: u64,
    /// Tasks discarded (stale epoch, disabled, element gone) this session
    #[serde(skip)]
    pub skipped: u64,
}

impl FilterCounters {
    pub fn record_filtered(&mut self, kind: ContentKind) {
        match kind {
            ContentKind::Text => self.text_filtered += 1,
            ContentKind::Image => self.images_filtered += 1,
        }
    }
}

/// Messages the pipeline sends to the host UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    Filtered(FilterEvent),
    BackendDegraded,
}

pub trait EventSink: Send + Sync {
    /// One call per successful Mask/Encrypt transform.
    fn item_filtered(&self, event: &FilterEvent);

    /// The backend became unreachable; shown to the user at most once.
    fn backend_degraded(&self);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn item_filtered(&self, _event: &FilterEvent) {}

    fn backend_degraded(&self) {}
}

/// Forwards events over a channel. A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PipelineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PipelineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn item_filtered(&self, event: &FilterEvent) {
        let _ = self.tx.send(PipelineEvent::Filtered(event.clone()));
    }

    fn backend_degraded(&self) {
        let _ = self.tx.send(PipelineEvent::BackendDegraded);
    }
}
