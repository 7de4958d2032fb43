use std::time::Duration;

use serde_json::Value;
use sf_core::{InboundKind, InputKind};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct PendingInput {
    pub key: String,
    pub input_kind: InputKind,
    pub on_done: Value,
    pub on_cancel: Value,
    pub allow_attachments: bool,
    pub clear_after: bool,
    pub timeout: Option<Duration>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) generation: u64,
}

impl PendingInput {
    pub fn new(key: impl Into<String>, input_kind: InputKind, on_done: Value) -> Self {
        Self {
            key: key.into(),
            input_kind,
            on_done,
            on_cancel: Value::Null,
            allow_attachments: false,
            clear_after: false,
            timeout: None,
            deadline: None,
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, PartialEq)]
pub enum InputMatch {
    Idle,
    /// Wrong kind of event; the wait stays armed.
    Mismatch,
    Matched(PendingInput),
}

/// IDLE or WAITING; at most one pending record per session.
#[derive(Debug, Clone, Default)]
pub struct AwaitingInput {
    pending: Option<PendingInput>,
    generation: u64,
}

impl AwaitingInput {
    pub fn pending(&self) -> Option<&PendingInput> {
        self.pending.as_ref()
    }

    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    /// Last writer wins: a previous wait is returned, never executed.
    pub fn arm(&mut self, mut input: PendingInput) -> (u64, Option<PendingInput>) {
        self.generation += 1;
        input.generation = self.generation;
        input.deadline = input
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        (self.generation, self.pending.replace(input))
    }

    pub fn offer(&mut self, inbound: InboundKind) -> InputMatch {
        let Some(pending) = &self.pending else {
            return InputMatch::Idle;
        };
        if !pending.input_kind.accepts(inbound, pending.allow_attachments) {
            return InputMatch::Mismatch;
        }
        match self.pending.take() {
            Some(pending) => InputMatch::Matched(pending),
            None => InputMatch::Idle,
        }
    }

    pub fn cancel(&mut self) -> Option<PendingInput> {
        self.pending.take()
    }

    /// Clears the wait armed as `generation`, if it is still the current one.
    pub fn expire(&mut self, generation: u64) -> Option<PendingInput> {
        if self.pending.as_ref()?.generation != generation {
            return None;
        }
        self.pending.take()
    }

    pub fn expire_if_due(&mut self, now: Instant) -> Option<PendingInput> {
        let deadline = self.pending.as_ref()?.deadline?;
        if now < deadline {
            return None;
        }
        self.pending.take()
    }
}
