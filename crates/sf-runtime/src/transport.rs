use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;
use sf_core::{MessageRef, OutputOptions, ScenarioError};

pub const TRANSPORT_MESSAGE_GONE: &str = "TRANSPORT_MESSAGE_GONE";

/// Outbound half of a chat-platform adapter.
///
/// Implementations report a message that no longer exists with the
/// `TRANSPORT_MESSAGE_GONE` code so edit/delete actions can tolerate it.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        session_id: &str,
        text: &str,
        options: &OutputOptions,
    ) -> Result<MessageRef, ScenarioError>;

    async fn edit(
        &self,
        session_id: &str,
        message: &MessageRef,
        text: &str,
        options: &OutputOptions,
    ) -> Result<(), ScenarioError>;

    async fn delete(&self, session_id: &str, message: &MessageRef) -> Result<(), ScenarioError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundRecord {
    Sent {
        session_id: String,
        message: MessageRef,
        text: String,
        options: OutputOptions,
    },
    Edited {
        session_id: String,
        message: MessageRef,
        text: String,
        options: OutputOptions,
    },
    Deleted {
        session_id: String,
        message: MessageRef,
    },
}

/// In-process transport that records traffic. Backs tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryTransportState>,
}

#[derive(Debug, Default)]
struct MemoryTransportState {
    next_id: u64,
    records: Vec<OutboundRecord>,
    live: BTreeSet<MessageRef>,
    fail_sends: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<OutboundRecord> {
        self.lock().records.clone()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.lock()
            .records
            .iter()
            .filter_map(|record| match record {
                OutboundRecord::Sent { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn last_sent(&self) -> Option<(MessageRef, String, OutputOptions)> {
        self.lock().records.iter().rev().find_map(|record| match record {
            OutboundRecord::Sent {
                message,
                text,
                options,
                ..
            } => Some((message.clone(), text.clone(), options.clone())),
            _ => None,
        })
    }

    /// Makes later edits/deletes of `message` fail as "already gone".
    pub fn forget(&self, message: &MessageRef) {
        self.lock().live.remove(message);
    }

    pub fn fail_sends(&self, fail: bool) {
        self.lock().fail_sends = fail;
    }

    pub fn clear(&self) {
        self.lock().records.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryTransportState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn message_gone(message: &MessageRef) -> ScenarioError {
    ScenarioError::transport(
        TRANSPORT_MESSAGE_GONE,
        format!("Message \"{}\" no longer exists.", message),
    )
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(
        &self,
        session_id: &str,
        text: &str,
        options: &OutputOptions,
    ) -> Result<MessageRef, ScenarioError> {
        let mut state = self.lock();
        if state.fail_sends {
            return Err(ScenarioError::transport(
                "TRANSPORT_SEND",
                "Send rejected by memory transport.",
            ));
        }
        state.next_id += 1;
        let message = MessageRef::new(state.next_id.to_string());
        state.live.insert(message.clone());
        state.records.push(OutboundRecord::Sent {
            session_id: session_id.to_string(),
            message: message.clone(),
            text: text.to_string(),
            options: options.clone(),
        });
        Ok(message)
    }

    async fn edit(
        &self,
        session_id: &str,
        message: &MessageRef,
        text: &str,
        options: &OutputOptions,
    ) -> Result<(), ScenarioError> {
        let mut state = self.lock();
        if !state.live.contains(message) {
            return Err(message_gone(message));
        }
        state.records.push(OutboundRecord::Edited {
            session_id: session_id.to_string(),
            message: message.clone(),
            text: text.to_string(),
            options: options.clone(),
        });
        Ok(())
    }

    async fn delete(&self, session_id: &str, message: &MessageRef) -> Result<(), ScenarioError> {
        let mut state = self.lock();
        if !state.live.remove(message) {
            return Err(message_gone(message));
        }
        state.records.push(OutboundRecord::Deleted {
            session_id: session_id.to_string(),
            message: message.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod transport_tests {
    use super::*;

    #[tokio::test]
    async fn memory_transport_tracks_live_messages() {
        let transport = MemoryTransport::new();
        let options = OutputOptions::default();
        let message = transport.send("s", "hello", &options).await.expect("send");
        transport
            .edit("s", &message, "edited", &options)
            .await
            .expect("edit");
        transport.delete("s", &message).await.expect("delete");

        let error = transport
            .delete("s", &message)
            .await
            .expect_err("second delete should fail");
        assert_eq!(error.code, TRANSPORT_MESSAGE_GONE);
        assert_eq!(transport.records().len(), 3);
        assert_eq!(transport.sent_texts(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn fail_sends_reports_transport_error() {
        let transport = MemoryTransport::new();
        transport.fail_sends(true);
        let error = transport
            .send("s", "x", &OutputOptions::default())
            .await
            .expect_err("send should fail");
        assert!(error.is_transport());
    }
}
