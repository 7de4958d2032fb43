use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(pub String);

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub kind: String,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl Attachment {
    pub fn to_value(&self) -> Value {
        json!({
            "kind": self.kind,
            "fileId": self.file_id,
            "fileName": self.file_name,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub phone: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InboundKind {
    Text,
    Document,
    Contact,
    Callback,
}

/// What an awaiting-input record is willing to capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    #[default]
    Text,
    Document,
    Contact,
    Any,
}

impl InputKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" => Some(Self::Text),
            "document" | "file" => Some(Self::Document),
            "contact" | "phone" => Some(Self::Contact),
            "any" | "*" => Some(Self::Any),
            _ => None,
        }
    }

    pub fn accepts(self, inbound: InboundKind, allow_attachments: bool) -> bool {
        match (self, inbound) {
            (_, InboundKind::Callback) => false,
            (Self::Any, _) => true,
            (Self::Text, InboundKind::Text) => true,
            (Self::Text, InboundKind::Document) => allow_attachments,
            (Self::Document, InboundKind::Document) => true,
            (Self::Contact, InboundKind::Contact) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InboundPayload {
    Text {
        text: String,
    },
    Document {
        attachment: Attachment,
        #[serde(default)]
        caption: Option<String>,
    },
    Contact {
        contact: Contact,
    },
    #[serde(rename_all = "camelCase")]
    Callback {
        data: String,
        #[serde(default)]
        message_ref: Option<MessageRef>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub session_id: String,
    pub payload: InboundPayload,
}

impl InboundEvent {
    pub fn text(session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            payload: InboundPayload::Text { text: text.into() },
        }
    }

    pub fn callback(session_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            payload: InboundPayload::Callback {
                data: data.into(),
                message_ref: None,
            },
        }
    }

    pub fn document(
        session_id: impl Into<String>,
        attachment: Attachment,
        caption: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            payload: InboundPayload::Document {
                attachment,
                caption,
            },
        }
    }

    pub fn contact(session_id: impl Into<String>, contact: Contact) -> Self {
        Self {
            session_id: session_id.into(),
            payload: InboundPayload::Contact { contact },
        }
    }

    pub fn kind(&self) -> InboundKind {
        match self.payload {
            InboundPayload::Text { .. } => InboundKind::Text,
            InboundPayload::Document { .. } => InboundKind::Document,
            InboundPayload::Contact { .. } => InboundKind::Contact,
            InboundPayload::Callback { .. } => InboundKind::Callback,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChoiceButton {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputOptions {
    #[serde(default)]
    pub buttons: Vec<Vec<ChoiceButton>>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parse_mode: Option<String>,
}
