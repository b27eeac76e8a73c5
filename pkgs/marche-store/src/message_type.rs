//! Message kinds and their media policy.
//!
//! Each kind is looked up once into a [`MediaPolicy`] that carries the
//! storage folder, the size ceiling, the accepted MIME types and the
//! placeholder content used when a file is sent without text.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MIB: usize = 1024 * 1024;

/// Kind of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Vocal,
    Document,
}

/// Attachment rules for one message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaPolicy {
    /// Logical folder in the media store
    pub folder: &'static str,
    pub max_bytes: usize,
    pub allowed_mime_types: &'static [&'static str],
    /// Content stored when the sender attached a file but wrote nothing
    pub placeholder: &'static str,
}

const IMAGE_POLICY: MediaPolicy = MediaPolicy {
    folder: "messages/images",
    max_bytes: 5 * MIB,
    allowed_mime_types: &["image/jpeg", "image/png", "image/gif", "image/webp"],
    placeholder: "Image",
};

const VIDEO_POLICY: MediaPolicy = MediaPolicy {
    folder: "messages/videos",
    max_bytes: 25 * MIB,
    allowed_mime_types: &["video/mp4", "video/webm", "video/quicktime", "video/x-msvideo"],
    placeholder: "Video",
};

const VOCAL_POLICY: MediaPolicy = MediaPolicy {
    folder: "messages/vocals",
    max_bytes: 5 * MIB,
    allowed_mime_types: &[
        "audio/mpeg",
        "audio/mp4",
        "audio/ogg",
        "audio/wav",
        "audio/x-wav",
        "audio/webm",
        "audio/aac",
        "video/webm", // browsers record voice notes as webm
    ],
    placeholder: "Voice message",
};

const DOCUMENT_POLICY: MediaPolicy = MediaPolicy {
    folder: "messages/documents",
    max_bytes: 10 * MIB,
    allowed_mime_types: &[
        "application/pdf",
        "application/msword",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/vnd.ms-excel",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "text/plain",
        "text/csv",
    ],
    placeholder: "Document",
};

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::Text,
        MessageType::Image,
        MessageType::Video,
        MessageType::Vocal,
        MessageType::Document,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Vocal => "vocal",
            MessageType::Document => "document",
        }
    }

    /// Media rules, `None` for text
    pub fn policy(&self) -> Option<&'static MediaPolicy> {
        match self {
            MessageType::Text => None,
            MessageType::Image => Some(&IMAGE_POLICY),
            MessageType::Video => Some(&VIDEO_POLICY),
            MessageType::Vocal => Some(&VOCAL_POLICY),
            MessageType::Document => Some(&DOCUMENT_POLICY),
        }
    }
}

impl MediaPolicy {
    pub fn allows_mime(&self, mime: &str) -> bool {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.allowed_mime_types.iter().any(|m| *m == essence)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown message type name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown message type: {0}")]
pub struct UnknownMessageType(pub String);

impl FromStr for MessageType {
    type Err = UnknownMessageType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| UnknownMessageType(s.to_string()))
    }
}
