//! Turns inbound transport messages into cache entries.
//!
//! Text needs no I/O. Media needs its byte stream drained into memory
//! first, which is the only slow step and is bounded by a timeout and a
//! size cap.

use std::{pin::Pin, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    cache::{CacheEntry, EntryContent, MediaContent, MediaKind},
    config::ShadowConfig,
    domain::{CacheKey, ConversationId, MessageId, SenderId},
    errors::Error,
    utils::now_millis,
    Result,
};

/// Lazily produced bytes of one attachment.
pub type MediaStream = Pin<Box<dyn AsyncRead + Send>>;

/// Opens the byte stream behind a [`MediaRef`].
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn open(&self, kind: MediaKind, media: &MediaRef) -> Result<MediaStream>;
}

/// Transport-level message key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageKey {
    pub conversation_id: ConversationId,
    pub message_id: Option<MessageId>,
    /// Author inside a group; `None` in one-to-one chats.
    pub participant: Option<SenderId>,
}

/// Attachment descriptor as delivered by the transport.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MediaRef {
    /// Transport handle used to fetch the bytes (e.g. a file id).
    pub handle: String,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub caption: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum InboundContent {
    Text(String),
    /// Quoted / formatted text; the transport may omit the text itself.
    ExtendedText { text: Option<String> },
    Media { kind: MediaKind, media: MediaRef },
    /// Anything else, kept verbatim for best-effort replay.
    Other(serde_json::Value),
    /// Event without message content (receipts, presence, ...).
    Empty,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InboundMessage {
    pub key: MessageKey,
    pub content: InboundContent,
}

impl InboundMessage {
    pub fn sender(&self) -> SenderId {
        self.key
            .participant
            .clone()
            .unwrap_or_else(|| SenderId::new(self.key.conversation_id.as_str()))
    }
}

/// Media waiting for its bytes.
#[derive(Clone, Debug)]
pub struct MediaJob {
    pub key: CacheKey,
    pub kind: MediaKind,
    pub media: MediaRef,
    pub sender_id: SenderId,
}

#[derive(Clone, Debug)]
pub enum Classification {
    Ready { key: CacheKey, entry: CacheEntry },
    NeedsMedia(MediaJob),
    Empty,
}

pub struct Classifier {
    source: Arc<dyn MediaSource>,
    timeout: Duration,
    max_bytes: u64,
}

impl Classifier {
    pub fn new(source: Arc<dyn MediaSource>, cfg: &ShadowConfig) -> Self {
        Self {
            source,
            timeout: cfg.media_timeout,
            max_bytes: cfg.max_media_bytes,
        }
    }

    /// Decide the entry kind. Never performs I/O.
    pub fn classify(&self, msg: InboundMessage) -> Classification {
        let sender_id = msg.sender();
        let conversation_id = msg.key.conversation_id.clone();
        let message_id = msg
            .key
            .message_id
            .clone()
            .filter(|id| !id.as_str().is_empty())
            .unwrap_or_else(|| MessageId::new(format!("{conversation_id}-{}", now_millis())));
        let key = CacheKey::new(conversation_id.clone(), message_id.clone());

        let content = match msg.content {
            InboundContent::Empty => return Classification::Empty,
            InboundContent::Media { kind, media } => {
                return Classification::NeedsMedia(MediaJob {
                    key,
                    kind,
                    media,
                    sender_id,
                })
            }
            InboundContent::Text(body) => EntryContent::Text { body },
            InboundContent::ExtendedText { text } => EntryContent::Text {
                body: text.unwrap_or_default(),
            },
            InboundContent::Other(raw) => EntryContent::Raw { raw },
        };

        Classification::Ready {
            key,
            entry: CacheEntry {
                message_id,
                conversation_id,
                sender_id,
                timestamp_millis: now_millis(),
                content,
            },
        }
    }

    /// Fetch and buffer the attachment, then build the entry.
    pub async fn acquire(&self, job: MediaJob) -> Result<(CacheKey, CacheEntry)> {
        let fetch = async {
            let stream = self.source.open(job.kind, &job.media).await?;
            drain(stream, self.max_bytes).await
        };
        let payload = tokio::time::timeout(self.timeout, fetch)
            .await
            .map_err(|_| Error::Timeout(self.timeout))??;

        let MediaJob {
            key,
            kind,
            media,
            sender_id,
        } = job;
        let entry = CacheEntry {
            message_id: key.message_id.clone(),
            conversation_id: key.conversation_id.clone(),
            sender_id,
            timestamp_millis: now_millis(),
            content: EntryContent::media(
                kind,
                MediaContent {
                    size_bytes: payload.len() as u64,
                    payload: Some(payload),
                    mime_type: media.mime_type,
                    file_name: media.file_name,
                    caption: media.caption,
                },
            ),
        };
        Ok((key, entry))
    }
}

async fn drain(stream: MediaStream, max_bytes: u64) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut buf)
        .await?;
    if buf.len() as u64 > max_bytes {
        return Err(Error::Acquisition(format!(
            "payload exceeds {max_bytes} bytes"
        )));
    }
    Ok(buf)
}
