//! Telegram implementation of the chat transport

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, MessageId as TgMessageId, ReplyParameters};
use teloxide::RequestError;
use tracing::debug;

use crate::errors::{BotError, BotResult};
use crate::media::MediaFormat;
use crate::model::{ChatId as ChatIdValue, MediaRef, MessageId};
use crate::presentation::Prompt;
use crate::transport::{ChatTransport, OutgoingMedia};

use super::ui_builder::prompt_keyboard;

const TELEGRAM_FILE_URL: &str = "https://api.telegram.org/file/bot";

fn transport_error(err: RequestError) -> BotError {
    BotError::Transport(err.to_string())
}

/// Sends and fetches through the Bot API
#[derive(Clone)]
pub struct TelegramTransport {
    bot: Bot,
    http: reqwest::Client,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            http: reqwest::Client::new(),
        }
    }

    async fn download(&self, url: &str) -> BotResult<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(BotError::transport_http)?;
        let bytes = response
            .bytes()
            .await
            .map_err(BotError::transport_http)?;
        Ok(bytes.to_vec())
    }

    async fn chat_file_url(&self, file_id: &str) -> BotResult<String> {
        let file = self
            .bot
            .get_file(FileId(file_id.to_string()))
            .await
            .map_err(transport_error)?;
        Ok(format!("{TELEGRAM_FILE_URL}{}/{}", self.bot.token(), file.path))
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: ChatIdValue, text: &str) -> BotResult<MessageId> {
        let sent = self
            .bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(transport_error)?;
        Ok(sent.id.0)
    }

    async fn send_prompt(&self, chat_id: ChatIdValue, prompt: &Prompt) -> BotResult<MessageId> {
        let mut request = self.bot.send_message(ChatId(chat_id), &prompt.text);
        if !prompt.keyboard.is_empty() {
            request = request.reply_markup(prompt_keyboard(prompt));
        }
        let sent = request.await.map_err(transport_error)?;
        Ok(sent.id.0)
    }

    async fn edit_prompt(
        &self,
        chat_id: ChatIdValue,
        message_id: MessageId,
        prompt: &Prompt,
    ) -> BotResult<()> {
        self.bot
            .edit_message_text(ChatId(chat_id), TgMessageId(message_id), &prompt.text)
            .reply_markup(prompt_keyboard(prompt))
            .await
            .map_err(transport_error)?;
        Ok(())
    }

    async fn send_media(&self, chat_id: ChatIdValue, media: OutgoingMedia) -> BotResult<MessageId> {
        let chat = ChatId(chat_id);
        let file_name = format!("result.{}", media.format.extension());
        let input = InputFile::memory(media.bytes).file_name(file_name);
        let reply = media
            .reply_to
            .map(|id| ReplyParameters::new(TgMessageId(id)).allow_sending_without_reply());
        debug!(chat_id, format = ?media.format, "Sending result media");

        let sent = match media.format {
            MediaFormat::Gif => {
                let mut request = self.bot.send_animation(chat, input);
                if let Some(caption) = media.caption {
                    request = request.caption(caption);
                }
                if let Some(reply) = reply {
                    request = request.reply_parameters(reply);
                }
                request.await
            }
            MediaFormat::Png | MediaFormat::Jpeg | MediaFormat::Webp => {
                let mut request = self.bot.send_photo(chat, input);
                if let Some(caption) = media.caption {
                    request = request.caption(caption);
                }
                if let Some(reply) = reply {
                    request = request.reply_parameters(reply);
                }
                request.await
            }
            MediaFormat::Mp4 => {
                let mut request = self.bot.send_video(chat, input);
                if let Some(caption) = media.caption {
                    request = request.caption(caption);
                }
                if let Some(reply) = reply {
                    request = request.reply_parameters(reply);
                }
                request.await
            }
            MediaFormat::Unknown => {
                let mut request = self.bot.send_document(chat, input);
                if let Some(caption) = media.caption {
                    request = request.caption(caption);
                }
                if let Some(reply) = reply {
                    request = request.reply_parameters(reply);
                }
                request.await
            }
        }
        .map_err(transport_error)?;

        Ok(sent.id.0)
    }

    async fn fetch_media(&self, media: &MediaRef) -> BotResult<Vec<u8>> {
        match media {
            MediaRef::Url(url) => self.download(url).await,
            MediaRef::ChatFile(file_id) => {
                let url = self.chat_file_url(file_id).await?;
                self.download(&url).await
            }
        }
    }
}
