use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{ConversationId, MessageId, SenderId};

/// Discriminant of a cached entry, as written to the snapshot file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Text,
    Image,
    Video,
    Audio,
    Sticker,
    Document,
    Raw,
    Unknown,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Sticker => "sticker",
            Self::Document => "document",
            Self::Raw => "raw",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of kinds that carry a downloadable payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Sticker,
    Document,
}

impl MediaKind {
    pub fn entry_kind(self) -> EntryKind {
        match self {
            Self::Image => EntryKind::Image,
            Self::Video => EntryKind::Video,
            Self::Audio => EntryKind::Audio,
            Self::Sticker => EntryKind::Sticker,
            Self::Document => EntryKind::Document,
        }
    }

    pub fn as_str(self) -> &'static str {
        self.entry_kind().as_str()
    }

    /// Only these kinds accept a caption when re-sent.
    pub fn takes_caption(self) -> bool {
        matches!(self, Self::Image | Self::Video | Self::Document)
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata and (in memory only) bytes of a media attachment.
///
/// `payload` is never serialized; entries restored from a snapshot always
/// come back with `payload: None`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaContent {
    #[serde(skip)]
    pub payload: Option<Vec<u8>>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryContent {
    Text { body: String },
    Image(MediaContent),
    Video(MediaContent),
    Audio(MediaContent),
    Sticker(MediaContent),
    Document(MediaContent),
    Raw { raw: serde_json::Value },
    Unknown,
}

impl EntryContent {
    pub fn media(kind: MediaKind, content: MediaContent) -> Self {
        match kind {
            MediaKind::Image => Self::Image(content),
            MediaKind::Video => Self::Video(content),
            MediaKind::Audio => Self::Audio(content),
            MediaKind::Sticker => Self::Sticker(content),
            MediaKind::Document => Self::Document(content),
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Text { .. } => EntryKind::Text,
            Self::Image(_) => EntryKind::Image,
            Self::Video(_) => EntryKind::Video,
            Self::Audio(_) => EntryKind::Audio,
            Self::Sticker(_) => EntryKind::Sticker,
            Self::Document(_) => EntryKind::Document,
            Self::Raw { .. } => EntryKind::Raw,
            Self::Unknown => EntryKind::Unknown,
        }
    }

    pub fn as_media(&self) -> Option<(MediaKind, &MediaContent)> {
        match self {
            Self::Image(m) => Some((MediaKind::Image, m)),
            Self::Video(m) => Some((MediaKind::Video, m)),
            Self::Audio(m) => Some((MediaKind::Audio, m)),
            Self::Sticker(m) => Some((MediaKind::Sticker, m)),
            Self::Document(m) => Some((MediaKind::Document, m)),
            _ => None,
        }
    }
}

/// One cached conversation event. Immutable once stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub message_id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: SenderId,
    pub timestamp_millis: i64,
    #[serde(flatten)]
    pub content: EntryContent,
}

impl CacheEntry {
    pub fn kind(&self) -> EntryKind {
        self.content.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image_entry() -> CacheEntry {
        CacheEntry {
            message_id: MessageId::new("m1"),
            conversation_id: ConversationId::new("g1"),
            sender_id: SenderId::new("u1"),
            timestamp_millis: 1_700_000_000_000,
            content: EntryContent::Image(MediaContent {
                payload: Some(vec![1, 2, 3]),
                mime_type: Some("image/jpeg".to_string()),
                file_name: None,
                caption: Some("cat".to_string()),
                size_bytes: 3,
            }),
        }
    }

    #[test]
    fn serialized_entry_is_flat_and_omits_payload() {
        let v = serde_json::to_value(image_entry()).unwrap();
        assert_eq!(v["kind"], "image");
        assert_eq!(v["message_id"], "m1");
        assert_eq!(v["caption"], "cat");
        assert_eq!(v["size_bytes"], 3);
        assert!(v.get("payload").is_none());
    }

    #[test]
    fn deserialized_media_has_no_payload() {
        let txt = serde_json::to_string(&image_entry()).unwrap();
        let back: CacheEntry = serde_json::from_str(&txt).unwrap();
        let (kind, media) = back.content.as_media().unwrap();
        assert_eq!(kind, MediaKind::Image);
        assert!(media.payload.is_none());
        assert_eq!(media.caption.as_deref(), Some("cat"));
    }

    #[test]
    fn raw_and_unknown_variants_parse() {
        let raw: CacheEntry = serde_json::from_value(json!({
            "message_id": "m2",
            "conversation_id": "c",
            "sender_id": "u",
            "timestamp_millis": 1,
            "kind": "raw",
            "raw": { "pollCreationMessage": { "name": "lunch?" } }
        }))
        .unwrap();
        assert_eq!(raw.kind(), EntryKind::Raw);

        let unknown: CacheEntry = serde_json::from_value(json!({
            "message_id": "m3",
            "conversation_id": "c",
            "sender_id": "u",
            "timestamp_millis": 1,
            "kind": "unknown"
        }))
        .unwrap();
        assert_eq!(unknown.kind(), EntryKind::Unknown);
    }

    #[test]
    fn only_visual_and_document_media_take_captions() {
        assert!(MediaKind::Image.takes_caption());
        assert!(MediaKind::Document.takes_caption());
        assert!(!MediaKind::Audio.takes_caption());
        assert!(!MediaKind::Sticker.takes_caption());
    }
}
