//! # Data Model Module
//!
//! Platform-neutral identifiers, media references and the records owned by
//! the persistence collaborators.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = u64;
pub type ChatId = i64;
pub type MessageId = i32;
pub type FaceId = i64;

const CHAT_FILE_PREFIX: &str = "tg:";

/// Locator for a piece of media the bot can fetch
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaRef {
    /// Publicly reachable URL (search results, provider outputs)
    Url(String),
    /// File held by the chat platform, fetched through the transport
    ChatFile(String),
}

impl MediaRef {
    /// Parse the opaque string form used in persisted records
    pub fn parse(locator: &str) -> Self {
        match locator.strip_prefix(CHAT_FILE_PREFIX) {
            Some(file_id) => MediaRef::ChatFile(file_id.to_string()),
            None => MediaRef::Url(locator.to_string()),
        }
    }

    pub fn locator(&self) -> String {
        match self {
            MediaRef::Url(url) => url.clone(),
            MediaRef::ChatFile(file_id) => format!("{CHAT_FILE_PREFIX}{file_id}"),
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.locator())
    }
}

/// Kind of media as far as the remote job provider is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    Image,
    Gif,
    Video,
}

impl MediaKind {
    /// GIFs and videos are submitted as long-running media jobs
    pub fn is_animated(self) -> bool {
        matches!(self, MediaKind::Gif | MediaKind::Video)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Gif => "gif",
            MediaKind::Video => "video",
        }
    }

    pub fn from_str_opt(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaKind::Image),
            "gif" => Some(MediaKind::Gif),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// A target the swap is applied to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetMedia {
    pub media: MediaRef,
    pub kind: MediaKind,
}

/// An attachment carried by an inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub media: MediaRef,
    pub kind: MediaKind,
    pub content_type: Option<String>,
    pub size: Option<u64>,
    /// Smaller rendition when the platform offers one
    pub thumbnail: Option<MediaRef>,
}

/// Platform-neutral view of an inbound chat message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: MessageId,
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub language_code: Option<String>,
    pub text: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl InboundMessage {
    pub fn first_image(&self) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|attachment| attachment.kind == MediaKind::Image)
    }
}

/// A face a user saved for reuse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedFace {
    pub id: FaceId,
    pub owner_id: UserId,
    pub name: String,
    pub locator: String,
    pub thumbnail: Option<String>,
    pub usage_count: i64,
    pub created_at: DateTime<Utc>,
}

impl SavedFace {
    pub fn media(&self) -> MediaRef {
        MediaRef::parse(&self.locator)
    }
}

/// Input for a new saved face
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFace {
    pub owner_id: UserId,
    pub name: String,
    pub locator: String,
    pub thumbnail: Option<String>,
}

/// Per-user preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub default_face_id: Option<FaceId>,
    pub auto_detect_gifs: bool,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            default_face_id: None,
            auto_detect_gifs: true,
        }
    }
}

/// Append-only record of a delivered swap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRecord {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub target_locator: String,
    pub face_id: Option<FaceId>,
    pub job_id: String,
    pub result_url: String,
    pub credits_charged: Option<i64>,
    pub media_kind: MediaKind,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_ref_locator_roundtrip() {
        let chat_file = MediaRef::ChatFile("AgADBAAD".to_string());
        assert_eq!(chat_file.locator(), "tg:AgADBAAD");
        assert_eq!(MediaRef::parse("tg:AgADBAAD"), chat_file);

        let url = MediaRef::parse("https://media.tenor.com/x.gif");
        assert_eq!(url, MediaRef::Url("https://media.tenor.com/x.gif".to_string()));
    }

    #[test]
    fn test_preferences_default_enable_detection() {
        let prefs = UserPreferences::default();
        assert!(prefs.auto_detect_gifs);
        assert!(prefs.default_face_id.is_none());
    }
}
