//! Host message protocol
//!
//! JSON messages from the extension UI, tagged by `action`, and their replies.

use serde::{Deserialize, Serialize};
use socio_core::types::{NodeId, PipelineStatus};

use crate::error::PipelineError;
use crate::pipeline::PipelineHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum HostMessage {
    SetEnabled {
        enabled: bool,
    },
    BackendStatusChanged {
        running: bool,
    },
    GetStatus,
    #[serde(rename_all = "camelCase")]
    Recover {
        node_id: NodeId,
    },
    RestoreAll,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HostReply {
    Status(PipelineStatus),
    Outcome {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        original: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl HostReply {
    pub fn ok() -> Self {
        Self::Outcome {
            success: true,
            original: None,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self::Outcome {
            success: false,
            original: None,
            error: Some(error.to_string()),
        }
    }
}

impl PipelineHandle {
    /// Route one host message. Only a closed pipeline is an `Err`; request
    /// failures are reported in the reply.
    pub async fn dispatch(&self, message: HostMessage) -> Result<HostReply, PipelineError> {
        let reply = match message {
            HostMessage::SetEnabled { enabled } => {
                self.set_enabled(enabled).await?;
                HostReply::ok()
            }
            HostMessage::BackendStatusChanged { running } => {
                self.backend_status(running)?;
                HostReply::ok()
            }
            HostMessage::GetStatus => HostReply::Status(self.status().await?),
            HostMessage::Recover { node_id } => match self.recover(node_id).await {
                Ok(original) => HostReply::Outcome {
                    success: true,
                    original: Some(original),
                    error: None,
                },
                Err(PipelineError::Closed) => return Err(PipelineError::Closed),
                Err(e) => HostReply::failed(e),
            },
            HostMessage::RestoreAll => {
                self.restore_all().await?;
                HostReply::ok()
            }
        };
        Ok(reply)
    }

    /// Parse, route and serialize a raw JSON message.
    pub async fn dispatch_json(&self, raw: &str) -> Result<String, PipelineError> {
        let reply = match serde_json::from_str::<HostMessage>(raw) {
            Ok(message) => self.dispatch(message).await?,
            Err(e) => HostReply::failed(format!("invalid message: {}", e)),
        };
        Ok(serde_json::to_string(&reply).unwrap_or_else(|_| r#"{"success":false}"#.to_string()))
    }
}
