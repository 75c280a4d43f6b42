use crate::{cache::MediaKind, domain::ConversationId};

/// Body of an outbound report. Text and captions are HTML.
#[derive(Clone, Debug, PartialEq)]
pub enum ReportContent {
    Text {
        html: String,
    },
    Image {
        bytes: Vec<u8>,
        caption: String,
    },
    Video {
        bytes: Vec<u8>,
        caption: String,
    },
    Audio {
        bytes: Vec<u8>,
        mime_type: String,
    },
    Sticker {
        bytes: Vec<u8>,
    },
    Document {
        bytes: Vec<u8>,
        file_name: String,
        mime_type: Option<String>,
        caption: String,
    },
}

impl ReportContent {
    pub fn text(html: impl Into<String>) -> Self {
        Self::Text { html: html.into() }
    }

    /// `None` for plain text reports.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            Self::Text { .. } => None,
            Self::Image { .. } => Some(MediaKind::Image),
            Self::Video { .. } => Some(MediaKind::Video),
            Self::Audio { .. } => Some(MediaKind::Audio),
            Self::Sticker { .. } => Some(MediaKind::Sticker),
            Self::Document { .. } => Some(MediaKind::Document),
        }
    }

    /// Text body or caption, whichever this report carries.
    pub fn text_part(&self) -> Option<&str> {
        match self {
            Self::Text { html } => Some(html),
            Self::Image { caption, .. }
            | Self::Video { caption, .. }
            | Self::Document { caption, .. } => Some(caption),
            Self::Audio { .. } | Self::Sticker { .. } => None,
        }
    }
}

/// A rendered report addressed to one conversation.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub target: ConversationId,
    pub content: ReportContent,
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub max_message_len: usize,
    pub max_caption_len: usize,
}
