use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Unknown function or action name. Never aborts a session.
    Resolution,
    /// Bad operand, missing field, invalid date. Aborts the remaining siblings.
    Evaluation,
    /// Send/edit/delete failure reported by the transport adapter.
    Transport,
    /// An external call exceeded its deadline.
    Timeout,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{code}: {message}")]
pub struct ScenarioError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl ScenarioError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn resolution(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resolution, code, message)
    }

    pub fn evaluation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Evaluation, code, message)
    }

    pub fn transport(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport, code, message)
    }

    pub fn timeout(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, code, message)
    }

    pub fn is_resolution(&self) -> bool {
        self.kind == ErrorKind::Resolution
    }

    pub fn is_transport(&self) -> bool {
        self.kind == ErrorKind::Transport
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn display_includes_code_and_message() {
        let error = ScenarioError::evaluation("FUNCTION_DIVISION_BY_ZERO", "division by zero");
        assert_eq!(error.to_string(), "FUNCTION_DIVISION_BY_ZERO: division by zero");
        assert_eq!(error.kind, ErrorKind::Evaluation);
    }

    #[test]
    fn constructors_set_kind() {
        assert!(ScenarioError::resolution("X", "y").is_resolution());
        assert!(ScenarioError::transport("X", "y").is_transport());
        assert_eq!(ScenarioError::timeout("X", "y").kind, ErrorKind::Timeout);
    }
}
