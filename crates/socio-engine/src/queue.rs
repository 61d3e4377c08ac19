//! Processing queue and batch execution
//!
//! The queue itself is a plain FIFO owned by the event loop. A batch is a
//! `'static` future so the loop can keep polling it alongside timers and
//! commands; at most one exists at a time.

use std::collections::VecDeque;
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use socio_core::types::{ProcessingTask, Verdict};

use crate::classify::ClassifierChain;
use crate::remote::RemoteError;

/// Unbounded FIFO of pending tasks.
#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<ProcessingTask>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: ProcessingTask) {
        self.tasks.push_back(task);
    }

    pub fn extend(&mut self, tasks: impl IntoIterator<Item = ProcessingTask>) {
        self.tasks.extend(tasks);
    }

    /// Remove up to `max` tasks from the front.
    pub fn take_batch(&mut self, max: usize) -> Vec<ProcessingTask> {
        let n = max.min(self.tasks.len());
        self.tasks.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let dropped = self.tasks.len();
        self.tasks.clear();
        dropped
    }
}

/// Classification result for one task, not yet applied.
#[derive(Debug)]
pub struct TaskResult {
    pub task: ProcessingTask,
    pub verdict: Verdict,
    pub remote_failure: Option<RemoteError>,
    /// The per-task bound fired and the local verdict was used
    pub timed_out: bool,
}

/// Classify a batch concurrently. Each task is bounded by `task_timeout`;
/// on expiry the local verdict stands in, so one stuck call never holds the
/// batch past that bound.
pub fn run_batch(
    chain: ClassifierChain,
    tasks: Vec<ProcessingTask>,
    page_url: String,
    prefer_remote: bool,
    task_timeout: Duration,
) -> BoxFuture<'static, Vec<TaskResult>> {
    async move {
        let futures = tasks.into_iter().map(|task| {
            let chain = chain.clone();
            let page_url = page_url.clone();
            async move {
                let bounded = tokio::time::timeout(task_timeout, chain.classify(&task.node, &page_url, prefer_remote));
                match bounded.await {
                    Ok(outcome) => TaskResult {
                        verdict: outcome.verdict,
                        remote_failure: outcome.remote_failure,
                        task,
                        timed_out: false,
                    },
                    Err(_) => {
                        log::warn!("task for node {} exceeded {:?}, using local verdict", task.node_id(), task_timeout);
                        TaskResult {
                            verdict: chain.classify_local(&task.node),
                            remote_failure: Some(RemoteError::Timeout),
                            task,
                            timed_out: true,
                        }
                    }
                }
            }
        });
        join_all(futures).await
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use socio_core::classifier::LocalClassifier;
    use socio_core::dom::ElementRef;
    use socio_core::types::{Action, ContentKind, ContentNode, NodeId};
    use tokio::time::Instant;

    use super::*;
    use crate::classify::fakes::{FailingRemote, HangingRemote};

    fn task(id: u64, text: &str) -> ProcessingTask {
        ProcessingTask::new(
            ContentNode {
                element: ElementRef(id as usize),
                node_id: NodeId(id),
                kind: ContentKind::Text,
                payload: text.to_string(),
                dimensions: None,
            },
            0,
        )
    }

    #[test]
    fn test_take_batch_is_fifo() {
        let mut queue = TaskQueue::new();
        queue.extend((1..=12).map(|i| task(i, "text")));
        let batch = queue.take_batch(10);
        assert_eq!(batch.len(), 10);
        assert_eq!(batch[0].node_id(), NodeId(1));
        assert_eq!(batch[9].node_id(), NodeId(10));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.take_batch(10).len(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_failing_remote_every_task_gets_verdict() {
        let chain = ClassifierChain::new(
            LocalClassifier::default(),
            Arc::new(FailingRemote::default()),
            Duration::from_secs(1),
        );
        let tasks = vec![task(1, "what the fuck"), task(2, "call 9876543210"), task(3, "hello world")];
        let results = run_batch(chain, tasks, "https://e.com".into(), true, Duration::from_secs(5)).await;

        let actions: Vec<_> = results.iter().map(|r| r.verdict.action).collect();
        assert_eq!(actions, vec![Action::Mask, Action::Encrypt, Action::Keep]);
        assert!(results.iter().all(|r| r.remote_failure.is_some() && !r.timed_out));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_task_bounded_by_timeout() {
        // request timeout is longer than the task bound so the task bound fires
        let chain = ClassifierChain::new(
            LocalClassifier::default(),
            Arc::new(HangingRemote { hang_on: "stuck" }),
            Duration::from_secs(60),
        );
        let tasks = vec![task(1, "a stuck damn request"), task(2, "quick one"), task(3, "another quick one")];

        let start = Instant::now();
        let results = run_batch(chain, tasks, "https://e.com".into(), true, Duration::from_millis(500)).await;
        assert!(start.elapsed() <= Duration::from_millis(600));

        assert!(results[0].timed_out);
        assert_eq!(results[0].verdict.action, Action::Mask);
        assert!(!results[1].timed_out);
        assert!(!results[2].timed_out);
    }
}
