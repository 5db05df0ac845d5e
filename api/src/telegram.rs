//! Telegram Bot API client implementing the core `Messenger` contract.

use async_trait::async_trait;
use healthmate_core::collaborators::{
    Keyboard, Messenger, OutgoingDocument, TextFormat, TransportError,
};
use healthmate_core::{ChatId, MessageId};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct BotResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: MessageId,
}

#[derive(Debug, Deserialize)]
struct FileInfo {
    file_path: Option<String>,
}

#[derive(Clone)]
pub struct TelegramMessenger {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramMessenger {
    pub fn new(api_base: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base, self.token)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, TransportError> {
        let response = self
            .http
            .post(self.method_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|err| TransportError::Network(format!("{method}: {err}")))?;
        read_response(method, response).await
    }
}

async fn read_response<T: DeserializeOwned>(
    method: &str,
    response: reqwest::Response,
) -> Result<T, TransportError> {
    let status = response.status();
    let body: BotResponse<T> = response
        .json()
        .await
        .map_err(|err| TransportError::Api(format!("{method}: unreadable response ({status}): {err}")))?;
    unwrap_bot_response(method, body)
}

fn unwrap_bot_response<T>(method: &str, body: BotResponse<T>) -> Result<T, TransportError> {
    match body {
        BotResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        BotResponse { description, .. } => Err(TransportError::Api(format!(
            "{method}: {}",
            description.unwrap_or_else(|| "request failed".to_string())
        ))),
    }
}

/// Bot API `reply_markup` for an inline keyboard.
pub fn reply_markup(keyboard: &Keyboard) -> Value {
    let rows: Vec<Vec<Value>> = keyboard
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| json!({ "text": button.label, "callback_data": button.data }))
                .collect()
        })
        .collect();
    json!({ "inline_keyboard": rows })
}

fn message_body(chat_id: ChatId, text: &str, format: TextFormat, keyboard: Option<&Keyboard>) -> Value {
    let mut body = json!({ "chat_id": chat_id, "text": text });
    if format == TextFormat::Markdown {
        body["parse_mode"] = json!("Markdown");
    }
    if let Some(keyboard) = keyboard {
        body["reply_markup"] = reply_markup(keyboard);
    }
    body
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn send_message(
        &self,
        chat_id: ChatId,
        text: &str,
        format: TextFormat,
        keyboard: Option<&Keyboard>,
    ) -> Result<MessageId, TransportError> {
        let body = message_body(chat_id, text, format, keyboard);
        match self.call::<SentMessage>("sendMessage", body).await {
            Ok(sent) => Ok(sent.message_id),
            // Model output is not always valid Markdown; resend as plain text.
            Err(TransportError::Api(detail))
                if format == TextFormat::Markdown && detail.contains("can't parse entities") =>
            {
                tracing::debug!(chat_id, "markdown rejected; resending as plain text");
                let body = message_body(chat_id, text, TextFormat::Plain, keyboard);
                self.call::<SentMessage>("sendMessage", body)
                    .await
                    .map(|sent| sent.message_id)
            }
            Err(err) => Err(err),
        }
    }

    async fn edit_message(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "chat_id": chat_id, "message_id": message_id, "text": text });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = reply_markup(keyboard);
        }
        self.call::<Value>("editMessageText", body).await.map(|_| ())
    }

    async fn send_document(
        &self,
        chat_id: ChatId,
        document: &OutgoingDocument,
    ) -> Result<(), TransportError> {
        let part = reqwest::multipart::Part::bytes(document.content.clone())
            .file_name(document.filename.clone())
            .mime_str("text/markdown")
            .map_err(|err| TransportError::Api(format!("sendDocument: {err}")))?;
        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .part("document", part);
        if let Some(caption) = &document.caption {
            form = form.text("caption", caption.clone());
        }
        let response = self
            .http
            .post(self.method_url("sendDocument"))
            .multipart(form)
            .send()
            .await
            .map_err(|err| TransportError::Network(format!("sendDocument: {err}")))?;
        read_response::<Value>("sendDocument", response).await.map(|_| ())
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<(), TransportError> {
        self.call::<Value>("sendChatAction", json!({ "chat_id": chat_id, "action": "typing" }))
            .await
            .map(|_| ())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call::<Value>("answerCallbackQuery", body).await.map(|_| ())
    }

    async fn download_file(&self, file_ref: &str) -> Result<Vec<u8>, TransportError> {
        let info: FileInfo = self.call("getFile", json!({ "file_id": file_ref })).await?;
        let path = info
            .file_path
            .ok_or_else(|| TransportError::Api("getFile: no file_path in response".to_string()))?;
        let url = format!("{}/file/bot{}/{path}", self.api_base, self.token);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|err| TransportError::Network(format!("download: {err}")))?;
        if !response.status().is_success() {
            return Err(TransportError::Api(format!("download: HTTP {}", response.status())));
        }
        response
            .bytes()
            .await
            .map(|bytes| bytes.to_vec())
            .map_err(|err| TransportError::Network(format!("download: {err}")))
    }

    async fn probe(&self) -> Result<(), TransportError> {
        self.call::<Value>("getMe", json!({})).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use healthmate_core::callback::{CallbackAction, MenuItem};
    use healthmate_core::collaborators::Button;

    #[test]
    fn keyboard_becomes_inline_markup() {
        let keyboard = Keyboard::default()
            .row([Button::new("Report", CallbackAction::Menu(MenuItem::Report))])
            .row([
                Button::new("Water", CallbackAction::Menu(MenuItem::Water)),
                Button::new("Steps", CallbackAction::Menu(MenuItem::Steps)),
            ]);
        let markup = reply_markup(&keyboard);
        let rows = markup["inline_keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].as_array().unwrap().len(), 2);
        assert_eq!(rows[0][0]["text"], "Report");
        assert_eq!(
            rows[0][0]["callback_data"],
            CallbackAction::Menu(MenuItem::Report).encode()
        );
    }

    #[test]
    fn markdown_sets_parse_mode() {
        let plain = message_body(1, "hi", TextFormat::Plain, None);
        assert!(plain.get("parse_mode").is_none());
        let markdown = message_body(1, "*hi*", TextFormat::Markdown, None);
        assert_eq!(markdown["parse_mode"], "Markdown");
    }

    #[test]
    fn failed_bot_response_carries_description() {
        let body: BotResponse<SentMessage> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        }))
        .unwrap();
        let err = unwrap_bot_response("sendMessage", body).unwrap_err();
        assert!(matches!(err, TransportError::Api(detail) if detail.contains("blocked")));

        let body: BotResponse<SentMessage> =
            serde_json::from_value(json!({ "ok": true, "result": { "message_id": 42 } })).unwrap();
        assert_eq!(unwrap_bot_response("sendMessage", body).unwrap().message_id, 42);
    }
}
