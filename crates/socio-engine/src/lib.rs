//! Socio.io Moderation Engine
//!
//! Async pipeline around the `socio-core` building blocks: discovers content
//! on a page, classifies it with the remote service (falling back to the local
//! classifier), applies the verdicts and answers host messages.
//!
//! # Modules
//!
//! - `remote`: HTTP client for the classification service
//! - `classify`: Remote-first classification with local fallback
//! - `discovery`: Page sweeps and mutation debouncing
//! - `queue`: Task queue and batch execution
//! - `pipeline`: The event loop and its handle
//! - `messages`: Host message protocol
//! - `health`: Backend reachability checks
//! - `persist`: Key-value persistence
//! - `stats`: Counters and event sink

pub mod classify;
pub mod discovery;
pub mod error;
pub mod health;
pub mod messages;
pub mod persist;
pub mod pipeline;
pub mod queue;
pub mod remote;
pub mod stats;

pub use error::{PipelineError, StoreError};
pub use health::check_backend;
pub use messages::{HostMessage, HostReply};
pub use persist::{JsonFileStore, KeyValueStore, MemoryStore};
pub use pipeline::{Pipeline, PipelineBuilder, PipelineContext, PipelineHandle};
pub use remote::{HttpRemote, NullRemote, RemoteClassifier, RemoteError};
pub use stats::{ChannelSink, EventSink, FilterCounters, NullSink, PipelineEvent};
