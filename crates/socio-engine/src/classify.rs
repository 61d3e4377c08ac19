//! Remote-first classification with local fallback.

use std::sync::Arc;
use std::time::Duration;

use socio_core::classifier::LocalClassifier;
use socio_core::types::{ContentKind, ContentNode, Verdict};

use crate::remote::{RemoteClassifier, RemoteError};

/// Verdict for one node plus whatever went wrong on the way.
#[derive(Debug)]
pub struct ChainOutcome {
    pub verdict: Verdict,
    /// Set when the remote call failed and the local classifier answered
    pub remote_failure: Option<RemoteError>,
}

/// One remote attempt, then the local classifier. Never fails.
#[derive(Clone)]
pub struct ClassifierChain {
    local: Arc<LocalClassifier>,
    remote: Arc<dyn RemoteClassifier>,
    request_timeout: Duration,
}

impl ClassifierChain {
    pub fn new(local: LocalClassifier, remote: Arc<dyn RemoteClassifier>, request_timeout: Duration) -> Self {
        Self {
            local: Arc::new(local),
            remote,
            request_timeout,
        }
    }

    pub fn local(&self) -> &LocalClassifier {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteClassifier> {
        &self.remote
    }

    /// Classify locally only.
    pub fn classify_local(&self, node: &ContentNode) -> Verdict {
        self.local.classify_node(node)
    }

    /// Classify a node. With `prefer_remote` false (backend believed down)
    /// the remote service is not contacted at all.
    pub async fn classify(&self, node: &ContentNode, page_url: &str, prefer_remote: bool) -> ChainOutcome {
        if !prefer_remote || self.skips_remote(node) {
            return ChainOutcome {
                verdict: self.classify_local(node),
                remote_failure: None,
            };
        }

        let call = async {
            match node.kind {
                ContentKind::Text => self.remote.classify_text(&node.payload, page_url).await,
                ContentKind::Image => self.remote.classify_image(&node.payload).await,
            }
        };

        let result = match tokio::time::timeout(self.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        };

        match result {
            Ok(verdict) => ChainOutcome {
                verdict,
                remote_failure: None,
            },
            Err(err) => {
                log::warn!("remote classification of node {} failed, using local: {}", node.node_id, err);
                ChainOutcome {
                    verdict: self.classify_local(node),
                    remote_failure: Some(err),
                }
            }
        }
    }

    /// Content the local classifier always keeps is not worth a round trip.
    fn skips_remote(&self, node: &ContentNode) -> bool {
        match node.kind {
            ContentKind::Text => self.local.is_trivial_text(&node.payload),
            ContentKind::Image => self.local.is_exempt_image(&node.payload, node.dimensions),
        }
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use socio_core::types::{Action, Verdict, VerdictSource};

    use crate::remote::{PingResponse, RemoteClassifier, RemoteError};

    /// Fails every call.
    #[derive(Default)]
    pub struct FailingRemote {
        pub calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteClassifier for FailingRemote {
        async fn classify_text(&self, _text: &str, _page_url: &str) -> Result<Verdict, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Status(503))
        }

        async fn classify_image(&self, _url: &str) -> Result<Verdict, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(RemoteError::Status(503))
        }

        async fn ping(&self) -> Result<PingResponse, RemoteError> {
            Err(RemoteError::Status(503))
        }

        async fn decrypt(&self, _token: &str) -> Result<String, RemoteError> {
            Err(RemoteError::Status(503))
        }
    }

    /// Never answers payloads containing `hang_on`; answers Keep otherwise.
    pub struct HangingRemote {
        pub hang_on: &'static str,
    }

    #[async_trait]
    impl RemoteClassifier for HangingRemote {
        async fn classify_text(&self, text: &str, _page_url: &str) -> Result<Verdict, RemoteError> {
            if text.contains(self.hang_on) {
                std::future::pending::<()>().await;
            }
            Ok(Verdict::keep(VerdictSource::Remote))
        }

        async fn classify_image(&self, url: &str) -> Result<Verdict, RemoteError> {
            if url.contains(self.hang_on) {
                std::future::pending::<()>().await;
            }
            Ok(Verdict::keep(VerdictSource::Remote))
        }

        async fn ping(&self) -> Result<PingResponse, RemoteError> {
            Ok(PingResponse {
                status: "ok".into(),
                message: "pong".into(),
            })
        }

        async fn decrypt(&self, _token: &str) -> Result<String, RemoteError> {
            Err(RemoteError::Unavailable)
        }
    }

    /// Answers from a script keyed by payload substring; records what it saw.
    #[derive(Default)]
    pub struct ScriptedRemote {
        pub script: Vec<(&'static str, Verdict)>,
        pub decrypted: Vec<(&'static str, &'static str)>,
        pub seen: Mutex<Vec<String>>,
        pub up: Mutex<bool>,
    }

    impl ScriptedRemote {
        pub fn new() -> Self {
            Self {
                up: Mutex::new(true),
                ..Default::default()
            }
        }

        pub fn answer(mut self, needle: &'static str, action: Action, reason: &str) -> Self {
            self.script
                .push((needle, Verdict::new(action, vec![reason.to_string()], VerdictSource::Remote)));
            self
        }

        pub fn answer_with(mut self, needle: &'static str, verdict: Verdict) -> Self {
            self.script.push((needle, verdict));
            self
        }

        pub fn decrypts(mut self, token: &'static str, original: &'static str) -> Self {
            self.decrypted.push((token, original));
            self
        }

        fn lookup(&self, payload: &str) -> Result<Verdict, RemoteError> {
            if !*self.up.lock() {
                return Err(RemoteError::Status(502));
            }
            self.seen.lock().push(payload.to_string());
            Ok(self
                .script
                .iter()
                .find(|(needle, _)| payload.contains(needle))
                .map(|(_, verdict)| verdict.clone())
                .unwrap_or_else(|| Verdict::keep(VerdictSource::Remote)))
        }
    }

    #[async_trait]
    impl RemoteClassifier for ScriptedRemote {
        async fn classify_text(&self, text: &str, _page_url: &str) -> Result<Verdict, RemoteError> {
            self.lookup(text)
        }

        async fn classify_image(&self, url: &str) -> Result<Verdict, RemoteError> {
            self.lookup(url)
        }

        async fn ping(&self) -> Result<PingResponse, RemoteError> {
            if *self.up.lock() {
                Ok(PingResponse {
                    status: "ok".into(),
                    message: "pong".into(),
                })
            } else {
                Err(RemoteError::Status(502))
            }
        }

        async fn decrypt(&self, token: &str) -> Result<String, RemoteError> {
            self.decrypted
                .iter()
                .find(|(t, _)| *t == token)
                .map(|(_, original)| original.to_string())
                .ok_or_else(|| RemoteError::Malformed("unknown token".into()))
        }
    }
}
