//! Magic-byte detection for fetched media.

use image::ImageFormat;
use tracing::debug;

use crate::model::MediaKind;

const FORMAT_DETECTION_BUFFER_SIZE: usize = 16;

/// Concrete container format of a media blob
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaFormat {
    Gif,
    Png,
    Jpeg,
    Webp,
    Mp4,
    Unknown,
}

impl MediaFormat {
    pub fn extension(self) -> &'static str {
        match self {
            MediaFormat::Gif => "gif",
            MediaFormat::Png => "png",
            MediaFormat::Jpeg => "jpg",
            MediaFormat::Webp => "webp",
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Unknown => "bin",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            MediaFormat::Gif => "image/gif",
            MediaFormat::Png => "image/png",
            MediaFormat::Jpeg => "image/jpeg",
            MediaFormat::Webp => "image/webp",
            MediaFormat::Mp4 => "video/mp4",
            MediaFormat::Unknown => "application/octet-stream",
        }
    }

    pub fn media_kind(self) -> MediaKind {
        match self {
            MediaFormat::Gif => MediaKind::Gif,
            MediaFormat::Mp4 => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }
}

/// Detect the container format from the leading bytes. Still images and
/// GIFs go through `image::guess_format`; MP4 is recognised by its `ftyp` box.
pub fn detect_media_format(bytes: &[u8]) -> MediaFormat {
    let header = &bytes[..bytes.len().min(FORMAT_DETECTION_BUFFER_SIZE)];
    if header.len() >= 8 && &header[4..8] == b"ftyp" {
        return MediaFormat::Mp4;
    }

    match image::guess_format(header) {
        Ok(ImageFormat::Gif) => MediaFormat::Gif,
        Ok(ImageFormat::Png) => MediaFormat::Png,
        Ok(ImageFormat::Jpeg) => MediaFormat::Jpeg,
        Ok(ImageFormat::WebP) => MediaFormat::Webp,
        Ok(format) => {
            debug!(format = ?format, "Unsupported media format");
            MediaFormat::Unknown
        }
        Err(_) => MediaFormat::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_common_formats() {
        assert_eq!(detect_media_format(b"GIF89a\x01\x00"), MediaFormat::Gif);
        assert_eq!(
            detect_media_format(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0]),
            MediaFormat::Png
        );
        assert_eq!(detect_media_format(&[0xFF, 0xD8, 0xFF, 0xE0]), MediaFormat::Jpeg);
        assert_eq!(detect_media_format(b"RIFF\0\0\0\0WEBPVP8 "), MediaFormat::Webp);
        assert_eq!(detect_media_format(b"\0\0\0\x18ftypmp42"), MediaFormat::Mp4);
        assert_eq!(detect_media_format(b"hello"), MediaFormat::Unknown);
        assert_eq!(detect_media_format(b""), MediaFormat::Unknown);
    }

    #[test]
    fn test_mp4_is_delivered_as_video() {
        assert_eq!(MediaFormat::Mp4.media_kind(), MediaKind::Video);
        assert_eq!(MediaFormat::Gif.media_kind(), MediaKind::Gif);
        assert_eq!(MediaFormat::Jpeg.media_kind(), MediaKind::Image);
    }
}
