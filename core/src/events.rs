use serde::{Deserialize, Serialize};

use crate::{ChatId, MessageId, UserId};

/// A single inbound chat event, already stripped of platform envelope.
/// The service crate builds these from webhook updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundEvent {
    Text {
        user_id: UserId,
        chat_id: ChatId,
        text: String,
    },
    Photo {
        user_id: UserId,
        chat_id: ChatId,
        /// Platform file reference of the largest available size.
        file_ref: String,
    },
    Voice {
        user_id: UserId,
        chat_id: ChatId,
        file_ref: String,
    },
    Document {
        user_id: UserId,
        chat_id: ChatId,
        file_ref: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
    },
    /// Button tap. `callback_id` must be acknowledged promptly.
    Callback {
        user_id: UserId,
        chat_id: ChatId,
        message_id: MessageId,
        callback_id: String,
        data: String,
    },
}

impl InboundEvent {
    pub fn user_id(&self) -> UserId {
        match self {
            InboundEvent::Text { user_id, .. }
            | InboundEvent::Photo { user_id, .. }
            | InboundEvent::Voice { user_id, .. }
            | InboundEvent::Document { user_id, .. }
            | InboundEvent::Callback { user_id, .. } => *user_id,
        }
    }

    pub fn chat_id(&self) -> ChatId {
        match self {
            InboundEvent::Text { chat_id, .. }
            | InboundEvent::Photo { chat_id, .. }
            | InboundEvent::Voice { chat_id, .. }
            | InboundEvent::Document { chat_id, .. }
            | InboundEvent::Callback { chat_id, .. } => *chat_id,
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            InboundEvent::Text { .. } => "text",
            InboundEvent::Photo { .. } => "photo",
            InboundEvent::Voice { .. } => "voice",
            InboundEvent::Document { .. } => "document",
            InboundEvent::Callback { .. } => "callback",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_events_are_tagged_by_kind() {
        let event = InboundEvent::Voice {
            user_id: 5,
            chat_id: 6,
            file_ref: "AwACAgI".into(),
        };
        let json = serde_json::to_value(&event).expect("serializable");
        assert_eq!(json["kind"], "voice");
        assert_eq!(event.user_id(), 5);
        assert_eq!(event.chat_id(), 6);

        let doc: InboundEvent = serde_json::from_value(serde_json::json!({
            "kind": "document",
            "user_id": 1,
            "chat_id": 1,
            "file_ref": "BQAC",
        }))
        .expect("optional fields default");
        assert!(matches!(doc, InboundEvent::Document { mime_type: None, .. }));
    }
}
