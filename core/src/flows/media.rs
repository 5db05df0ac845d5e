//! Voice, photo and document inputs. Voice becomes text and is routed like a typed
//! message; photos and documents go to the medical analysis or meal recognition path
//! depending on the active slot and the file type.

use crate::collaborators::TransportError;
use crate::error::FlowError;
use crate::prompts::{MEDICAL_IMAGE_PROMPT, MEDICAL_SYSTEM};
use crate::session::FlowKind;

use super::{FlowContext, Party};

/// Text documents are cut to this many characters before analysis.
pub const MAX_DOCUMENT_CHARS: usize = 12_000;

const DOWNLOAD_FALLBACK: &str = "Could not download your file. Please send it again.";
const TRANSCRIBE_FALLBACK: &str =
    "Could not recognize your voice message. Please try again or type your message.";
const ANALYSIS_FALLBACK: &str =
    "Could not analyze your file right now. Please send it again in a minute.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image,
    Text,
    Unsupported,
}

/// Classify a document by MIME type, falling back to the file extension when the
/// platform sent none.
pub fn classify_document(mime_type: Option<&str>, file_name: Option<&str>) -> DocumentKind {
    if let Some(mime) = mime_type.map(str::to_ascii_lowercase) {
        if mime.starts_with("image/") {
            return DocumentKind::Image;
        }
        if mime.starts_with("text/") {
            return DocumentKind::Text;
        }
    }
    let extension = file_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some("jpg" | "jpeg" | "png" | "webp") => DocumentKind::Image,
        Some("txt" | "csv" | "md") => DocumentKind::Text,
        _ => DocumentKind::Unsupported,
    }
}

fn image_mime(mime_type: Option<&str>) -> String {
    mime_type
        .filter(|mime| mime.starts_with("image/"))
        .unwrap_or("image/jpeg")
        .to_string()
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

impl FlowContext {
    async fn download(&self, file_ref: &str) -> Result<Vec<u8>, FlowError> {
        let file_ref = file_ref.to_string();
        self.io
            .transport("download_file", move |messenger| async move {
                let bytes = messenger.download_file(&file_ref).await?;
                if bytes.is_empty() {
                    return Err(TransportError::Api("downloaded file is empty".to_string()));
                }
                Ok(bytes)
            })
            .await
            .map_err(|failure| FlowError::CollaboratorFailure {
                operation: failure.operation,
                fallback: DOWNLOAD_FALLBACK.to_string(),
            })
    }

    /// Download and transcribe a voice message. `None` when nothing intelligible
    /// was said; the user has already been told.
    pub async fn transcribe_voice(&self, party: Party, file_ref: &str) -> Result<Option<String>, FlowError> {
        let audio = self.download(file_ref).await?;
        self.typing(party.chat_id).await;
        let transcript = self
            .io
            .completion(
                "transcribe_voice",
                self.io.budgets.completion,
                TRANSCRIBE_FALLBACK,
                move |completion| async move { completion.transcribe(audio, "voice.ogg").await },
            )
            .await?;
        let transcript = transcript.trim();
        if transcript.is_empty() {
            self.say(party.chat_id, "I could not hear anything in that voice message.")
                .await;
            return Ok(None);
        }
        tracing::debug!(user_id = party.user_id, chars = transcript.len(), "voice transcribed");
        Ok(Some(transcript.to_string()))
    }

    pub async fn handle_photo(&self, party: Party, file_ref: &str) -> Result<(), FlowError> {
        let image = self.download(file_ref).await?;
        self.typing(party.chat_id).await;
        if self
            .sessions
            .has_slot(party.user_id, FlowKind::MedicalWait)
            .await
        {
            self.analyze_medical_image(party, image, "image/jpeg".to_string())
                .await
        } else {
            self.handle_meal_photo(party, image).await
        }
    }

    pub async fn handle_document(
        &self,
        party: Party,
        file_ref: &str,
        mime_type: Option<&str>,
        file_name: Option<&str>,
    ) -> Result<(), FlowError> {
        let kind = classify_document(mime_type, file_name);
        if kind == DocumentKind::Unsupported {
            self.say(
                party.chat_id,
                "This file format is not supported. Please send an image or a text file.",
            )
            .await;
            return Ok(());
        }

        let bytes = self.download(file_ref).await?;
        self.typing(party.chat_id).await;
        match kind {
            DocumentKind::Image => {
                self.analyze_medical_image(party, bytes, image_mime(mime_type))
                    .await
            }
            DocumentKind::Text => {
                let Ok(text) = String::from_utf8(bytes) else {
                    self.say(party.chat_id, "Could not read this file as text.")
                        .await;
                    return Ok(());
                };
                let content = truncate_chars(&text, MAX_DOCUMENT_CHARS).to_string();
                let max_tokens = self.config.completion_max_tokens;
                let answer = self
                    .io
                    .completion(
                        "medical_document_analysis",
                        self.io.budgets.completion,
                        ANALYSIS_FALLBACK,
                        move |completion| async move {
                            completion.complete(MEDICAL_SYSTEM, &content, max_tokens).await
                        },
                    )
                    .await?;
                self.deliver_medical_answer(party, &answer).await;
                Ok(())
            }
            DocumentKind::Unsupported => Ok(()),
        }
    }

    async fn analyze_medical_image(
        &self,
        party: Party,
        image: Vec<u8>,
        mime_type: String,
    ) -> Result<(), FlowError> {
        let max_tokens = self.config.completion_max_tokens;
        let answer = self
            .io
            .completion(
                "medical_image_analysis",
                self.io.budgets.completion,
                ANALYSIS_FALLBACK,
                move |completion| async move {
                    completion
                        .describe_image(MEDICAL_SYSTEM, MEDICAL_IMAGE_PROMPT, image, &mime_type, max_tokens)
                        .await
                },
            )
            .await?;
        self.deliver_medical_answer(party, &answer).await;
        Ok(())
    }
}
