//! # GIF Detection Module
//!
//! Classifies inbound chat messages into swap targets: animation
//! attachments, GIF documents, still images, and GIF links pasted as text.

use lazy_static::lazy_static;
use regex::Regex;

use crate::model::{InboundMessage, MediaKind, MediaRef, TargetMedia};

// Direct media only: the GIF hosts' media servers, or any link to a .gif or
// .mp4 file. Share pages such as tenor.com/view/... serve HTML.
const GIF_LINK_PATTERN: &str = r#"(?i)(?:^|\s)(https?://(?:media\d*\.tenor\.com|media\d*\.giphy\.com|i\.giphy\.com)/\S+|https?://\S+?\.(?:gif|mp4)(?:\?\S*)?)(?:\s|$)"#;

lazy_static! {
    static ref GIF_LINK_REGEX: Regex =
        Regex::new(GIF_LINK_PATTERN).expect("GIF link pattern should be valid");
}

/// First GIF link found in free text
pub fn find_gif_link(text: &str) -> Option<&str> {
    GIF_LINK_REGEX
        .captures(text)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Animated target carried by a message, for automatic detection
pub fn detect_gif(message: &InboundMessage) -> Option<TargetMedia> {
    if let Some(attachment) = message
        .attachments
        .iter()
        .find(|attachment| attachment.kind.is_animated())
    {
        return Some(TargetMedia {
            media: attachment.media.clone(),
            kind: attachment.kind,
        });
    }

    message
        .text
        .as_deref()
        .and_then(find_gif_link)
        .map(|link| TargetMedia {
            media: MediaRef::Url(link.to_string()),
            kind: MediaKind::Gif,
        })
}

/// Any swappable target in a message, still images included; used when a
/// user explicitly points at a message
pub fn detect_target(message: &InboundMessage) -> Option<TargetMedia> {
    detect_gif(message).or_else(|| {
        message.first_image().map(|attachment| TargetMedia {
            media: attachment.media.clone(),
            kind: MediaKind::Image,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Attachment;

    fn message(text: Option<&str>, attachments: Vec<Attachment>) -> InboundMessage {
        InboundMessage {
            message_id: 1,
            chat_id: -100,
            user_id: 7,
            language_code: None,
            text: text.map(str::to_string),
            attachments,
        }
    }

    #[test]
    fn test_detects_direct_media_links() {
        assert_eq!(
            find_gif_link("look https://media.tenor.com/abc/AAAAC/cat.gif lol"),
            Some("https://media.tenor.com/abc/AAAAC/cat.gif")
        );
        assert_eq!(
            find_gif_link("https://media2.giphy.com/media/xyz/giphy.mp4?cid=1"),
            Some("https://media2.giphy.com/media/xyz/giphy.mp4?cid=1")
        );
        assert_eq!(
            find_gif_link("https://example.org/a/b.GIF"),
            Some("https://example.org/a/b.GIF")
        );
        assert_eq!(find_gif_link("https://example.org/a/b.png"), None);
        assert_eq!(find_gif_link("https://example.org/a.gif-party"), None);
        assert_eq!(find_gif_link("no links here"), None);
    }

    #[test]
    fn test_share_pages_are_not_targets() {
        assert_eq!(find_gif_link("look https://tenor.com/view/cat-dance-123 lol"), None);
        assert_eq!(find_gif_link("https://giphy.com/gifs/happy-dance-xyz"), None);
        assert_eq!(find_gif_link("https://gph.is/g/abc"), None);
        assert!(detect_gif(&message(Some("https://tenor.com/view/x-gif-1"), vec![])).is_none());
    }

    #[test]
    fn test_animation_attachment_wins_over_text() {
        let msg = message(
            Some("https://tenor.com/view/x"),
            vec![Attachment {
                media: MediaRef::ChatFile("anim".into()),
                kind: MediaKind::Gif,
                content_type: Some("video/mp4".into()),
                size: None,
                thumbnail: None,
            }],
        );
        let target = detect_gif(&msg).unwrap();
        assert_eq!(target.media, MediaRef::ChatFile("anim".into()));
    }

    #[test]
    fn test_still_image_is_only_an_explicit_target() {
        let msg = message(
            None,
            vec![Attachment {
                media: MediaRef::ChatFile("photo".into()),
                kind: MediaKind::Image,
                content_type: Some("image/jpeg".into()),
                size: Some(1024),
                thumbnail: None,
            }],
        );
        assert!(detect_gif(&msg).is_none());
        assert_eq!(detect_target(&msg).unwrap().kind, MediaKind::Image);
    }
}
