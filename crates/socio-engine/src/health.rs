//! Backend reachability checks.
//!
//! The pipeline runs one of these on a fixed interval and feeds the answer
//! to the state machine, so a backend that went down is picked up again
//! once it answers.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};

use crate::remote::RemoteClassifier;

/// Ping the service once. Resolves to `false` on any error or when no
/// answer arrives within `timeout`.
pub fn check_backend(remote: Arc<dyn RemoteClassifier>, timeout: Duration) -> BoxFuture<'static, bool> {
    async move {
        match tokio::time::timeout(timeout, remote.ping()).await {
            Ok(Ok(ping)) => {
                log::debug!("backend ping: {} {}", ping.status, ping.message);
                true
            }
            Ok(Err(e)) => {
                log::debug!("backend ping failed: {}", e);
                false
            }
            Err(_) => {
                log::debug!("backend ping timed out after {:?}", timeout);
                false
            }
        }
    }
    .boxed()
}
