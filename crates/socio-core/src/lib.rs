//! Socio.io Core Library
//!
//! Synchronous building blocks of the Socio.io content filter: everything
//! that decides what to hide and how, without touching the network or a
//! runtime. The async pipeline lives in `socio-engine`.
//!
//! # Architecture
//!
//! Content is discovered as [`ContentNode`]s on a [`Document`], judged by the
//! [`LocalClassifier`] (or a remote verdict), and transformed through the
//! [`TransformStore`], which keeps one record per transformed element so every
//! change can be undone.
//!
//! # Modules
//!
//! - `types`: Shared type definitions
//! - `dom`: Document capability and marker attributes
//! - `memory`: In-memory document used by the CLI and tests
//! - `url`: Allocation-light URL helpers
//! - `pii`: Sensitive information patterns
//! - `classifier`: Local rule tables and classifier
//! - `mask`: Redaction formatting
//! - `registry`: Per-epoch element registry
//! - `history`: Bounded audit log
//! - `store`: Transform and recovery store
//! - `state`: Moderation state machine
//! - `config`: Pipeline configuration

pub mod classifier;
pub mod config;
pub mod dom;
pub mod history;
pub mod mask;
pub mod memory;
pub mod pii;
pub mod registry;
pub mod state;
pub mod store;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use classifier::{ClassifierSettings, LocalClassifier, RuleCategory, RuleSet, RuleSetBuilder, SamplingPolicy};
pub use config::{ConfigError, ModerationConfig};
pub use dom::{Document, DomError, ElementRef};
pub use memory::{MemoryDocument, PageFixture};
pub use registry::ElementRegistry;
pub use state::{Effect, Phase, Signal, StateMachine};
pub use store::{RecoverError, RestoreReport, TransformError, TransformStore};
pub use types::{
    Action, Categories, ContentKind, ContentNode, FilterEvent, NodeId, PipelineStatus, ProcessingTask, ScanKinds,
    TransformRecord, Verdict, VerdictSource,
};
