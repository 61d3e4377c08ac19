//! Moderation pipeline
//!
//! One task owns all mutable state and multiplexes host commands, the
//! in-flight batch, image fast-path lookups, backend health checks and the
//! timers with `tokio::select!`. Nothing here is shared, so nothing here is
//! locked.

use std::future::pending;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::{json, Value};
use socio_core::config::ModerationConfig;
use socio_core::dom::{extract_payload, node_id_of, Document, ElementRef, ATTR_FILTERED};
use socio_core::registry::ElementRegistry;
use socio_core::state::{Effect, Signal, StateMachine};
use socio_core::store::{RecoverError, RestoreReport, TransformStore};
use socio_core::types::{ContentNode, FilterEvent, NodeId, PipelineStatus, TransformRecord};
use socio_core::RuleSet;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};

use crate::classify::ClassifierChain;
use crate::discovery::{Debouncer, Discovery};
use crate::error::PipelineError;
use crate::health::check_backend;
use crate::persist::{
    KeyValueStore, MemoryStore, KEY_ENABLED, KEY_HISTORY, KEY_IMAGES_FILTERED, KEY_TEXT_FILTERED, KEY_TOTAL_CLASSIFIED,
};
use crate::queue::{run_batch, TaskQueue, TaskResult};
use crate::remote::{HttpRemote, RemoteClassifier};
use crate::stats::{EventSink, FilterCounters, NullSink};

// =============================================================================
// Commands & Handle
// =============================================================================

pub(crate) enum Command {
    Mutated,
    ImageChanged(ElementRef),
    Signal(Signal, Option<oneshot::Sender<()>>),
    Status(oneshot::Sender<PipelineStatus>),
    Recover(NodeId, oneshot::Sender<Result<String, PipelineError>>),
    RestoreAll(oneshot::Sender<RestoreReport>),
    Idle(oneshot::Sender<()>),
    Shutdown,
}

/// Cloneable sender side of a running pipeline.
#[derive(Clone)]
pub struct PipelineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl PipelineHandle {
    fn send(&self, command: Command) -> Result<(), PipelineError> {
        self.tx.send(command).map_err(|_| PipelineError::Closed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, PipelineError> {
        let (tx, rx) = oneshot::channel();
        self.send(make(tx))?;
        rx.await.map_err(|_| PipelineError::Closed)
    }

    /// The host saw DOM mutations; a debounced sweep follows.
    pub fn notify_mutation(&self) -> Result<(), PipelineError> {
        self.send(Command::Mutated)
    }

    /// An image finished loading or changed its source.
    pub fn image_changed(&self, element: ElementRef) -> Result<(), PipelineError> {
        self.send(Command::ImageChanged(element))
    }

    /// Toggle moderation; resolves once the resulting effects have run.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), PipelineError> {
        self.request(|tx| Command::Signal(Signal::Toggle(enabled), Some(tx))).await
    }

    pub fn backend_status(&self, reachable: bool) -> Result<(), PipelineError> {
        self.send(Command::Signal(Signal::BackendStatus(reachable), None))
    }

    pub async fn status(&self) -> Result<PipelineStatus, PipelineError> {
        self.request(Command::Status).await
    }

    pub async fn recover(&self, node_id: NodeId) -> Result<String, PipelineError> {
        self.request(|tx| Command::Recover(node_id, tx)).await?
    }

    pub async fn restore_all(&self) -> Result<RestoreReport, PipelineError> {
        self.request(Command::RestoreAll).await
    }

    /// Resolves when no work is queued, pending or in flight.
    pub async fn idle(&self) -> Result<(), PipelineError> {
        self.request(Command::Idle).await
    }

    pub fn shutdown(&self) -> Result<(), PipelineError> {
        self.send(Command::Shutdown)
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Everything the event loop mutates.
pub struct PipelineContext {
    pub config: ModerationConfig,
    pub state: StateMachine,
    pub registry: ElementRegistry,
    pub store: TransformStore,
    pub queue: TaskQueue,
    pub counters: FilterCounters,
}

pub struct PipelineBuilder<D> {
    doc: D,
    config: ModerationConfig,
    rules: Option<RuleSet>,
    remote: Option<Arc<dyn RemoteClassifier>>,
    kv: Option<Arc<dyn KeyValueStore>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl<D: Document + 'static> PipelineBuilder<D> {
    pub fn new(doc: D, config: ModerationConfig) -> Self {
        Self {
            doc,
            config,
            rules: None,
            remote: None,
            kv: None,
            sink: None,
        }
    }

    /// Rule tables for the local classifier (default: built-in plus
    /// configured hosts).
    pub fn rules(mut self, rules: RuleSet) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Remote service (default: HTTP client for `backend_url`).
    pub fn remote(mut self, remote: Arc<dyn RemoteClassifier>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn store(mut self, kv: Arc<dyn KeyValueStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Validate the config and restore persisted state.
    pub async fn build(self) -> Result<(Pipeline<D>, PipelineHandle), PipelineError> {
        let config = self.config;
        config.validate()?;

        let remote: Arc<dyn RemoteClassifier> = match self.remote {
            Some(remote) => remote,
            None => Arc::new(HttpRemote::new(&config.backend_url, config.request_timeout())?),
        };
        let kv: Arc<dyn KeyValueStore> = self.kv.unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let sink: Arc<dyn EventSink> = self.sink.unwrap_or_else(|| Arc::new(NullSink));

        let rules = self.rules.unwrap_or_else(|| config.default_rules());
        let chain = ClassifierChain::new(config.local_classifier(rules), remote, config.request_timeout());

        let enabled = load_value::<bool>(kv.as_ref(), KEY_ENABLED).await.unwrap_or(true);
        let counters = FilterCounters {
            text_filtered: load_value(kv.as_ref(), KEY_TEXT_FILTERED).await.unwrap_or(0),
            images_filtered: load_value(kv.as_ref(), KEY_IMAGES_FILTERED).await.unwrap_or(0),
            total_classified: load_value(kv.as_ref(), KEY_TOTAL_CLASSIFIED).await.unwrap_or(0),
            ..FilterCounters::default()
        };
        let history: Vec<TransformRecord> = load_value(kv.as_ref(), KEY_HISTORY).await.unwrap_or_default();

        let (tx, rx) = mpsc::unbounded_channel();
        let pipeline = Pipeline {
            doc: self.doc,
            discovery: Discovery::new(config.scan_kinds, config.min_text_len),
            debouncer: Debouncer::new(config.debounce()),
            ctx: PipelineContext {
                state: StateMachine::new(enabled),
                registry: ElementRegistry::new(),
                store: TransformStore::new(config.history_capacity).with_history(history),
                queue: TaskQueue::new(),
                counters,
                config,
            },
            chain,
            kv,
            sink,
            rx,
            idle_waiters: Vec::new(),
            next_batch_at: None,
            fast_path: FuturesUnordered::new(),
        };
        log::info!("pipeline ready (enabled: {})", enabled);
        Ok((pipeline, PipelineHandle { tx }))
    }
}

/// Best-effort read; storage problems fall back to defaults.
async fn load_value<T: serde::de::DeserializeOwned>(kv: &dyn KeyValueStore, key: &str) -> Option<T> {
    match kv.get(key).await {
        Ok(Some(value)) => match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                log::warn!("ignoring stored {}: {}", key, e);
                None
            }
        },
        Ok(None) => None,
        Err(e) => {
            log::warn!("failed to read {}: {}", key, e);
            None
        }
    }
}

// =============================================================================
// Event Loop
// =============================================================================

pub struct Pipeline<D> {
    doc: D,
    ctx: PipelineContext,
    chain: ClassifierChain,
    discovery: Discovery,
    debouncer: Debouncer,
    kv: Arc<dyn KeyValueStore>,
    sink: Arc<dyn EventSink>,
    rx: mpsc::UnboundedReceiver<Command>,
    idle_waiters: Vec<oneshot::Sender<()>>,
    next_batch_at: Option<Instant>,
    /// Image lookups that bypass the queue; polled alongside the batch
    fast_path: FuturesUnordered<BoxFuture<'static, Vec<TaskResult>>>,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending().await,
    }
}

impl<D: Document + 'static> Pipeline<D> {
    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Run until shut down or every handle is dropped.
    pub async fn run(mut self) {
        let sweep_period = self.ctx.config.sweep_interval();
        let mut sweep_timer = interval_at(Instant::now() + sweep_period, sweep_period);
        sweep_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let epoch_period = self.ctx.config.epoch_interval();
        let mut epoch_timer = interval_at(Instant::now() + epoch_period, epoch_period);
        epoch_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let health_period = self.ctx.config.probe_interval();
        let mut health_timer = interval_at(Instant::now() + health_period, health_period);
        health_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut health_check: Option<BoxFuture<'static, bool>> = None;

        // Initial sweep, before any command can observe an empty queue
        self.sweep();
        let mut in_flight: Option<BoxFuture<'static, Vec<TaskResult>>> = self.start_batch();

        loop {
            let debounce_at = self.debouncer.deadline();
            let batch_at = self.next_batch_at;

            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command).await,
                },
                results = async {
                    match in_flight.as_mut() {
                        Some(batch) => batch.await,
                        None => pending().await,
                    }
                }, if in_flight.is_some() => {
                    in_flight = None;
                    self.apply_results(results).await;
                    if !self.ctx.queue.is_empty() {
                        self.next_batch_at = Some(Instant::now() + self.ctx.config.batch_delay());
                    }
                }
                Some(results) = self.fast_path.next(), if !self.fast_path.is_empty() => {
                    self.apply_results(results).await;
                }
                _ = sleep_until_opt(batch_at), if batch_at.is_some() && in_flight.is_none() => {
                    self.next_batch_at = None;
                    in_flight = self.start_batch();
                }
                _ = sleep_until_opt(debounce_at), if debounce_at.is_some() => {
                    self.debouncer.cancel();
                    self.sweep();
                }
                _ = sweep_timer.tick() => {
                    self.sweep();
                }
                _ = epoch_timer.tick() => {
                    self.ctx.registry.reset_epoch();
                }
                _ = health_timer.tick(), if health_check.is_none() => {
                    health_check = Some(check_backend(self.chain.remote().clone(), self.ctx.config.request_timeout()));
                }
                reachable = async {
                    match health_check.as_mut() {
                        Some(check) => check.await,
                        None => pending().await,
                    }
                }, if health_check.is_some() => {
                    health_check = None;
                    self.signal(Signal::BackendStatus(reachable)).await;
                }
            }

            if in_flight.is_none() && self.next_batch_at.is_none() {
                in_flight = self.start_batch();
            }
            if in_flight.is_none() && self.is_idle() {
                for waiter in self.idle_waiters.drain(..) {
                    let _ = waiter.send(());
                }
            }
        }

        log::info!("pipeline stopped");
    }

    fn is_idle(&self) -> bool {
        self.ctx.queue.is_empty()
            && self.next_batch_at.is_none()
            && !self.debouncer.is_pending()
            && self.fast_path.is_empty()
    }

    fn start_batch(&mut self) -> Option<BoxFuture<'static, Vec<TaskResult>>> {
        if !self.ctx.state.is_enabled() || self.ctx.queue.is_empty() {
            return None;
        }
        let tasks = self.ctx.queue.take_batch(self.ctx.config.batch_size);
        log::debug!("starting batch of {} ({} queued)", tasks.len(), self.ctx.queue.len());
        Some(run_batch(
            self.chain.clone(),
            tasks,
            self.doc.page_url(),
            self.ctx.state.backend_reachable(),
            self.ctx.config.task_timeout(),
        ))
    }

    fn sweep(&mut self) {
        if !self.ctx.state.is_enabled() {
            return;
        }
        let mut tasks = self.discovery.sweep(&self.doc, &mut self.ctx.registry);
        tasks.retain(|task| !self.reattached(&task.node));
        self.ctx.queue.extend(tasks);
    }

    /// A re-rendered node still showing transformed content belongs to an
    /// existing record and must not be classified as if it were new.
    fn reattached(&self, node: &ContentNode) -> bool {
        match self.ctx.store.reattach(&self.doc, node) {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                log::debug!("could not mark re-rendered node {}: {}", node.node_id, e);
                false
            }
        }
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Mutated => {
                if self.ctx.state.is_enabled() {
                    self.debouncer.notify();
                }
            }
            Command::ImageChanged(element) => self.fast_path_image(element),
            Command::Signal(signal, reply) => {
                self.signal(signal).await;
                if let Some(reply) = reply {
                    let _ = reply.send(());
                }
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Recover(node_id, reply) => {
                let result = self.recover(node_id).await;
                let _ = reply.send(result);
            }
            Command::RestoreAll(reply) => {
                let report = self.restore_all();
                let _ = reply.send(report);
            }
            Command::Idle(reply) => self.idle_waiters.push(reply),
            Command::Shutdown => {}
        }
    }

    fn status(&self) -> PipelineStatus {
        PipelineStatus {
            enabled: self.ctx.state.is_enabled(),
            backend_reachable: self.ctx.state.backend_reachable(),
            queue_length: self.ctx.queue.len(),
            processed_count: self.ctx.counters.processed,
        }
    }

    async fn signal(&mut self, signal: Signal) {
        let effects = self.ctx.state.handle(signal);
        for effect in effects {
            self.perform(effect);
        }
        if let Signal::Toggle(enabled) = signal {
            if let Err(e) = self.kv.set(KEY_ENABLED, json!(enabled)).await {
                log::warn!("failed to persist enabled flag: {}", e);
            }
        }
    }

    fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::ResumeDiscovery => log::debug!("discovery resumed"),
            Effect::SweepNow => self.sweep(),
            Effect::RestoreAll => {
                self.restore_all();
            }
            Effect::HaltDiscovery => {
                let dropped = self.ctx.queue.clear();
                self.debouncer.cancel();
                self.next_batch_at = None;
                log::debug!("discovery halted, {} queued task(s) dropped", dropped);
            }
            Effect::NotifyDegraded => self.sink.backend_degraded(),
        }
    }

    /// Roll back every transform and start a fresh epoch so the page can be
    /// moderated again later.
    fn restore_all(&mut self) -> RestoreReport {
        let report = self.ctx.store.restore_all(&self.doc);
        self.ctx.queue.clear();
        self.ctx.registry.reset_epoch();
        log::info!("restored {} element(s)", report.restored);
        report
    }

    /// Local record first; for records from an earlier page load, ask the
    /// service to decrypt the stored token.
    async fn recover(&mut self, node_id: NodeId) -> Result<String, PipelineError> {
        match self.ctx.store.recover(&self.doc, node_id) {
            Ok(original) => {
                self.ctx.registry.forget(node_id);
                Ok(original)
            }
            Err(RecoverError::NotFound(id)) => {
                let token = self
                    .ctx
                    .store
                    .history_record(id)
                    .and_then(|record| record.encrypted_token.clone());
                let Some(token) = token else {
                    return Err(RecoverError::NotFound(id).into());
                };
                let bounded = tokio::time::timeout(self.ctx.config.request_timeout(), self.chain.remote().decrypt(&token));
                match bounded.await {
                    Ok(Ok(original)) => Ok(original),
                    Ok(Err(e)) => {
                        log::warn!("server-assisted recovery of node {} failed: {}", id, e);
                        Err(RecoverError::NotFound(id).into())
                    }
                    Err(_) => {
                        log::warn!("server-assisted recovery of node {} timed out", id);
                        Err(RecoverError::NotFound(id).into())
                    }
                }
            }
            Err(e) => {
                log::warn!("recovery of node {} failed: {}", node_id, e);
                Err(e.into())
            }
        }
    }

    /// Images are classified as soon as they load, without waiting for the
    /// queue. The lookup runs next to the current batch; its result is
    /// applied when it lands.
    fn fast_path_image(&mut self, element: ElementRef) {
        if !self.ctx.state.is_enabled() || self.doc.attribute(element, ATTR_FILTERED).is_some() {
            return;
        }
        if let Some(node_id) = node_id_of(&self.doc, element) {
            self.ctx.registry.forget(node_id);
        }
        let Some(task) = self.discovery.admit_element(&self.doc, &mut self.ctx.registry, element) else {
            return;
        };
        if self.reattached(&task.node) {
            return;
        }

        self.fast_path.push(run_batch(
            self.chain.clone(),
            vec![task],
            self.doc.page_url(),
            self.ctx.state.backend_reachable(),
            self.ctx.config.task_timeout(),
        ));
    }

    async fn apply_results(&mut self, results: Vec<TaskResult>) {
        let mut remote_failed = false;
        let mut transformed = 0usize;
        let mut skipped = 0usize;
        let classified = results.len();
        self.ctx.counters.total_classified += classified as u64;

        for result in results {
            remote_failed |= result.remote_failure.is_some();

            let node = &result.task.node;
            if !self.ctx.state.is_enabled() || !self.ctx.registry.is_current(node.node_id, result.task.epoch) {
                skipped += 1;
                continue;
            }

            // The page changed the content while it was being classified
            let current = extract_payload(&self.doc, node.element).map(|(_, payload, _)| payload);
            if current.as_deref() != Some(node.payload.as_str()) {
                self.ctx.registry.forget(node.node_id);
                skipped += 1;
                continue;
            }

            match self.ctx.store.apply(&self.doc, node, &result.verdict) {
                Ok(Some(record)) => {
                    self.ctx.counters.record_filtered(record.kind);
                    self.sink.item_filtered(&FilterEvent::from(&record));
                    self.ctx.counters.processed += 1;
                    transformed += 1;
                }
                Ok(None) => self.ctx.counters.processed += 1,
                Err(e) => {
                    log::debug!("discarding result for node {}: {}", node.node_id, e);
                    self.ctx.registry.forget(node.node_id);
                    skipped += 1;
                }
            }
        }

        self.ctx.counters.skipped += skipped as u64;
        log::info!(
            "batch settled: {} classified, {} transformed, {} skipped",
            classified,
            transformed,
            skipped
        );

        if remote_failed {
            self.signal(Signal::BackendStatus(false)).await;
        }
        if classified > 0 {
            self.persist_stats(transformed > 0).await;
        }
    }

    fn persist_stats(&self, with_history: bool) -> impl std::future::Future<Output = ()> + Send + 'static {
        let counters = &self.ctx.counters;
        let mut writes: Vec<(&'static str, Value)> = vec![
            (KEY_TEXT_FILTERED, json!(counters.text_filtered)),
            (KEY_IMAGES_FILTERED, json!(counters.images_filtered)),
            (KEY_TOTAL_CLASSIFIED, json!(counters.total_classified)),
        ];
        if with_history {
            match serde_json::to_value(self.ctx.store.history().to_vec()) {
                Ok(history) => writes.push((KEY_HISTORY, history)),
                Err(e) => log::warn!("failed to serialize history: {}", e),
            }
        }
        let kv = Arc::clone(&self.kv);
        async move {
            for (key, value) in writes {
                if let Err(e) = kv.set(key, value).await {
                    log::warn!("failed to persist {}: {}", key, e);
                }
            }
        }
    }
}
