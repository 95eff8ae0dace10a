//! Message Handler module for converting incoming Telegram messages and
//! routing them to the orchestrator

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{Document, PhotoSize};
use tracing::{debug, warn};

use crate::model::{Attachment, InboundMessage, MediaKind, MediaRef};
use crate::orchestrator::{InboundOutcome, Orchestrator};

const PHOTO_CONTENT_TYPE: &str = "image/jpeg";

fn chat_file(file_id: &teloxide::types::FileId) -> MediaRef {
    MediaRef::ChatFile(file_id.0.clone())
}

fn largest_photo(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    sizes
        .iter()
        .max_by_key(|size| u64::from(size.width) * u64::from(size.height))
}

fn document_attachment(document: &Document) -> Option<Attachment> {
    let content_type = document
        .mime_type
        .as_ref()
        .map(|mime| mime.essence_str().to_lowercase());
    let kind = match content_type.as_deref() {
        Some("image/gif") => MediaKind::Gif,
        Some(mime) if mime.starts_with("image/") => MediaKind::Image,
        Some(mime) if mime.starts_with("video/") => MediaKind::Video,
        _ => return None,
    };
    Some(Attachment {
        media: chat_file(&document.file.id),
        kind,
        content_type,
        size: Some(u64::from(document.file.size)),
        thumbnail: document.thumbnail.as_ref().map(|thumb| chat_file(&thumb.file.id)),
    })
}

fn attachments(msg: &Message) -> Vec<Attachment> {
    let mut found = Vec::new();

    if let Some(photo) = msg.photo().and_then(largest_photo) {
        found.push(Attachment {
            media: chat_file(&photo.file.id),
            kind: MediaKind::Image,
            content_type: Some(PHOTO_CONTENT_TYPE.to_string()),
            size: Some(u64::from(photo.file.size)),
            thumbnail: None,
        });
    }

    if let Some(animation) = msg.animation() {
        found.push(Attachment {
            media: chat_file(&animation.file.id),
            kind: MediaKind::Gif,
            content_type: animation
                .mime_type
                .as_ref()
                .map(|mime| mime.essence_str().to_lowercase()),
            size: Some(u64::from(animation.file.size)),
            thumbnail: animation.thumbnail.as_ref().map(|thumb| chat_file(&thumb.file.id)),
        });
    } else if let Some(attachment) = msg.document().and_then(document_attachment) {
        found.push(attachment);
    }

    if let Some(video) = msg.video() {
        found.push(Attachment {
            media: chat_file(&video.file.id),
            kind: MediaKind::Video,
            content_type: video
                .mime_type
                .as_ref()
                .map(|mime| mime.essence_str().to_lowercase()),
            size: Some(u64::from(video.file.size)),
            thumbnail: video.thumbnail.as_ref().map(|thumb| chat_file(&thumb.file.id)),
        });
    }

    found
}

/// Platform-neutral view of a Telegram message. Messages without a sender
/// (channel posts) yield `None`.
pub fn to_inbound(msg: &Message) -> Option<InboundMessage> {
    let user = msg.from.as_ref()?;
    Some(InboundMessage {
        message_id: msg.id.0,
        chat_id: msg.chat.id.0,
        user_id: user.id.0,
        language_code: user.language_code.clone(),
        text: msg.text().or_else(|| msg.caption()).map(str::to_string),
        attachments: attachments(msg),
    })
}

/// Handle every non-command message
pub async fn message_handler(msg: Message, orchestrator: Orchestrator) -> Result<()> {
    let Some(inbound) = to_inbound(&msg) else {
        debug!(chat_id = %msg.chat.id, "Ignoring message without sender");
        return Ok(());
    };

    match orchestrator.handle_inbound(&inbound).await {
        Ok(InboundOutcome::SwapStarted(started)) => {
            debug!(user_id = inbound.user_id, session_id = %started.session_id, "Swap started from detected GIF");
        }
        Ok(outcome) => {
            debug!(user_id = inbound.user_id, outcome = ?outcome, "Inbound message handled");
        }
        Err(e) => {
            warn!(user_id = inbound.user_id, kind = e.kind(), error = %e, "Inbound message failed");
            orchestrator
                .notify_error(inbound.chat_id, inbound.language_code.as_deref(), &e)
                .await;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(extra: serde_json::Value) -> Message {
        let mut value = json!({
            "message_id": 42,
            "date": 1_700_000_000,
            "chat": { "id": 1001, "type": "private", "first_name": "Ada" },
            "from": {
                "id": 1001,
                "is_bot": false,
                "first_name": "Ada",
                "language_code": "fr"
            }
        });
        if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
            for (key, field) in extra {
                base.insert(key.clone(), field.clone());
            }
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_photo_uses_largest_size() {
        let msg = message(json!({
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90, "file_size": 1000 },
                { "file_id": "large", "file_unique_id": "l", "width": 800, "height": 800, "file_size": 90000 }
            ]
        }));
        let inbound = to_inbound(&msg).unwrap();

        assert_eq!(inbound.user_id, 1001);
        assert_eq!(inbound.language_code.as_deref(), Some("fr"));
        assert_eq!(inbound.attachments.len(), 1);
        let photo = &inbound.attachments[0];
        assert_eq!(photo.media, MediaRef::ChatFile("large".to_string()));
        assert_eq!(photo.kind, MediaKind::Image);
        assert_eq!(photo.size, Some(90000));
    }

    #[test]
    fn test_text_message_has_no_attachments() {
        let msg = message(json!({ "text": "look https://media.tenor.com/x.gif" }));
        let inbound = to_inbound(&msg).unwrap();

        assert!(inbound.attachments.is_empty());
        assert_eq!(
            inbound.text.as_deref(),
            Some("look https://media.tenor.com/x.gif")
        );
    }
}
