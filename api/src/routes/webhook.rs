use axum::extract::State;
use axum::http::StatusCode;
use axum::{Router, routing::post};
use healthmate_core::events::InboundEvent;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::auth::VerifiedWebhook;
use crate::error::AppError;
use crate::extract::AppJson;
use crate::middleware::rate_limit;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhook/telegram", post(telegram_webhook))
        .layer(rate_limit::webhook_layer())
}

/// Subset of a Telegram Bot API `Update` the assistant reacts to.
#[derive(Debug, Deserialize, ToSchema)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TelegramMessage {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<TelegramUser>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub voice: Option<FileRef>,
    #[serde(default)]
    pub document: Option<TelegramDocument>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TelegramUser {
    pub id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PhotoSize {
    pub file_id: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TelegramDocument {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Translate an update into the core event it carries. `None` for update kinds the
/// assistant does not handle (stickers, edits, channel posts, ...).
pub fn to_event(update: Update) -> Option<InboundEvent> {
    if let Some(query) = update.callback_query {
        let (chat_id, message_id) = query
            .message
            .as_ref()
            .map_or((query.from.id, 0), |message| (message.chat.id, message.message_id));
        return Some(InboundEvent::Callback {
            user_id: query.from.id,
            chat_id,
            message_id,
            callback_id: query.id,
            data: query.data.unwrap_or_default(),
        });
    }

    let message = update.message?;
    let user_id = message.from.as_ref()?.id;
    let chat_id = message.chat.id;

    if let Some(text) = message.text {
        return Some(InboundEvent::Text {
            user_id,
            chat_id,
            text,
        });
    }
    if let Some(largest) = message
        .photo
        .unwrap_or_default()
        .into_iter()
        .max_by_key(|size| u64::from(size.width) * u64::from(size.height))
    {
        return Some(InboundEvent::Photo {
            user_id,
            chat_id,
            file_ref: largest.file_id,
        });
    }
    if let Some(voice) = message.voice {
        return Some(InboundEvent::Voice {
            user_id,
            chat_id,
            file_ref: voice.file_id,
        });
    }
    message.document.map(|document| InboundEvent::Document {
        user_id,
        chat_id,
        file_ref: document.file_id,
        mime_type: document.mime_type,
        file_name: document.file_name,
    })
}

/// Telegram webhook. Answers 200 at once and handles the update in the background
#[utoipa::path(
    post,
    path = "/webhook/telegram",
    request_body = Update,
    params(
        ("X-Telegram-Bot-Api-Secret-Token" = String, Header, description = "Secret registered with setWebhook")
    ),
    responses(
        (status = 200, description = "Update accepted"),
        (status = 400, description = "Body is not an update", body = healthmate_core::error::ApiError),
        (status = 401, description = "Missing or invalid secret", body = healthmate_core::error::ApiError),
        (status = 429, description = "Rate limited", body = healthmate_core::error::ApiError)
    ),
    tag = "webhook"
)]
pub async fn telegram_webhook(
    State(state): State<AppState>,
    _verified: VerifiedWebhook,
    AppJson(update): AppJson<Update>,
) -> Result<StatusCode, AppError> {
    let update_id = update.update_id;
    let Some(event) = to_event(update) else {
        tracing::debug!(update_id, "ignoring unsupported update");
        return Ok(StatusCode::OK);
    };

    tracing::debug!(update_id, kind = event.kind(), user_id = event.user_id(), "update accepted");
    let dispatcher = state.dispatcher.clone();
    let handle = tokio::spawn(async move { dispatcher.dispatch(event).await });
    tokio::spawn(async move {
        if let Err(err) = handle.await {
            tracing::error!(update_id, error = %err, "dispatch task failed");
        }
    });
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Option<InboundEvent> {
        to_event(serde_json::from_value(value).expect("valid update"))
    }

    #[test]
    fn text_message_becomes_text_event() {
        let event = parse(json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "from": { "id": 42, "is_bot": false, "first_name": "Ann" },
                "chat": { "id": 42, "type": "private" },
                "date": 1700000000,
                "text": "/start"
            }
        }));
        assert_eq!(
            event,
            Some(InboundEvent::Text {
                user_id: 42,
                chat_id: 42,
                text: "/start".into()
            })
        );
    }

    #[test]
    fn largest_photo_size_is_used() {
        let event = parse(json!({
            "update_id": 2,
            "message": {
                "message_id": 11,
                "from": { "id": 42 },
                "chat": { "id": 42 },
                "photo": [
                    { "file_id": "small", "width": 90, "height": 90 },
                    { "file_id": "large", "width": 1280, "height": 960 },
                    { "file_id": "medium", "width": 320, "height": 240 }
                ],
                "caption": "lunch"
            }
        }));
        assert!(matches!(event, Some(InboundEvent::Photo { file_ref, .. }) if file_ref == "large"));
    }

    #[test]
    fn voice_and_document_messages_are_mapped() {
        let voice = parse(json!({
            "update_id": 3,
            "message": {
                "message_id": 12,
                "from": { "id": 7 },
                "chat": { "id": 7 },
                "voice": { "file_id": "AwAC", "duration": 3 }
            }
        }));
        assert!(matches!(voice, Some(InboundEvent::Voice { file_ref, .. }) if file_ref == "AwAC"));

        let document = parse(json!({
            "update_id": 4,
            "message": {
                "message_id": 13,
                "from": { "id": 7 },
                "chat": { "id": 7 },
                "document": { "file_id": "BQAC", "mime_type": "image/png", "file_name": "labs.png" }
            }
        }));
        assert!(matches!(
            document,
            Some(InboundEvent::Document { mime_type: Some(mime), .. }) if mime == "image/png"
        ));
    }

    #[test]
    fn callback_query_keeps_message_reference() {
        let event = parse(json!({
            "update_id": 5,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 42 },
                "message": { "message_id": 99, "chat": { "id": 43 } },
                "data": "menu_report"
            }
        }));
        assert_eq!(
            event,
            Some(InboundEvent::Callback {
                user_id: 42,
                chat_id: 43,
                message_id: 99,
                callback_id: "cb-1".into(),
                data: "menu_report".into()
            })
        );
    }

    #[test]
    fn unsupported_updates_are_ignored() {
        assert_eq!(
            parse(json!({
                "update_id": 6,
                "message": {
                    "message_id": 14,
                    "from": { "id": 42 },
                    "chat": { "id": 42 },
                    "sticker": { "file_id": "CAAC" }
                }
            })),
            None
        );
        assert_eq!(parse(json!({ "update_id": 7, "edited_message": {} })), None);
    }
}
