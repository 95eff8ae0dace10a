//! Chat transport seam. The orchestrator sends and fetches through this
//! trait only; `bot::transport` implements it for Telegram.

use async_trait::async_trait;

use crate::errors::BotResult;
use crate::media::MediaFormat;
use crate::model::{ChatId, MediaRef, MessageId};
use crate::presentation::Prompt;

/// A finished result ready to be posted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMedia {
    pub bytes: Vec<u8>,
    pub format: MediaFormat,
    pub caption: Option<String>,
    pub reply_to: Option<MessageId>,
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> BotResult<MessageId>;

    /// Post text with an optional button grid
    async fn send_prompt(&self, chat_id: ChatId, prompt: &Prompt) -> BotResult<MessageId>;

    /// Replace a previously sent prompt; an empty keyboard removes the buttons
    async fn edit_prompt(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        prompt: &Prompt,
    ) -> BotResult<()>;

    /// Post a result using the upload method matching its format
    async fn send_media(&self, chat_id: ChatId, media: OutgoingMedia) -> BotResult<MessageId>;

    /// Download bytes for a chat file or a public URL
    async fn fetch_media(&self, media: &MediaRef) -> BotResult<Vec<u8>>;
}
