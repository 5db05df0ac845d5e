//! OpenAI-compatible chat completion and transcription client.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use healthmate_core::collaborators::{Completion, CompletionError};
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Clone)]
pub struct CompletionClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    transcription_model: String,
}

impl CompletionClient {
    pub fn new(api_base: &str, api_key: &str, model: &str, transcription_model: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            transcription_model: transcription_model.to_string(),
        }
    }

    async fn chat(&self, messages: Value, max_tokens: u32) -> Result<String, CompletionError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens,
        });
        let response = self
            .http
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| CompletionError::Network(err.to_string()))?;
        let response = check_status(response).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::Malformed(err.to_string()))?;
        first_choice(parsed)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CompletionError::Http {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}

fn first_choice(response: ChatResponse) -> Result<String, CompletionError> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .ok_or_else(|| CompletionError::Malformed("response has no message content".to_string()))
}

/// Inline `data:` URL for an image part.
pub fn image_data_url(mime_type: &str, image: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(image))
}

#[async_trait]
impl Completion for CompletionClient {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        let messages = json!([
            { "role": "system", "content": system_prompt },
            { "role": "user", "content": user_prompt },
        ]);
        self.chat(messages, max_tokens).await
    }

    async fn describe_image(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        image: Vec<u8>,
        mime_type: &str,
        max_tokens: u32,
    ) -> Result<String, CompletionError> {
        let messages = json!([
            { "role": "system", "content": system_prompt },
            {
                "role": "user",
                "content": [
                    { "type": "text", "text": user_prompt },
                    { "type": "image_url", "image_url": { "url": image_data_url(mime_type, &image) } },
                ],
            },
        ]);
        self.chat(messages, max_tokens).await
    }

    async fn transcribe(&self, audio: Vec<u8>, filename: &str) -> Result<String, CompletionError> {
        let part = reqwest::multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str("audio/ogg")
            .map_err(|err| CompletionError::Malformed(err.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", part);
        let response = self
            .http
            .post(format!("{}/audio/transcriptions", self.api_base))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|err| CompletionError::Network(err.to_string()))?;
        let response = check_status(response).await?;
        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|err| CompletionError::Malformed(err.to_string()))?;
        Ok(parsed.text)
    }

    async fn probe(&self) -> Result<(), CompletionError> {
        let response = self
            .http
            .get(format!("{}/models", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| CompletionError::Network(err.to_string()))?;
        check_status(response).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_embeds_base64_payload() {
        assert_eq!(image_data_url("image/png", b"abc"), "data:image/png;base64,YWJj");
    }

    #[test]
    fn first_choice_is_trimmed() {
        let response: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "role": "assistant", "content": "  Eat more greens.\n" } }]
        }))
        .unwrap();
        assert_eq!(first_choice(response).unwrap(), "Eat more greens.");
    }

    #[test]
    fn empty_or_missing_content_is_malformed() {
        let empty: ChatResponse = serde_json::from_value(json!({ "choices": [] })).unwrap();
        assert!(matches!(first_choice(empty), Err(CompletionError::Malformed(_))));

        let null: ChatResponse = serde_json::from_value(json!({
            "choices": [{ "message": { "content": null } }]
        }))
        .unwrap();
        assert!(matches!(first_choice(null), Err(CompletionError::Malformed(_))));
    }
}
