//! Revoke handling: resolve the chat name, render what was deleted and
//! send it to the operator.

use std::sync::Arc;

use crate::{
    cache::{CacheEntry, EntryContent, EntryKind, MediaContent, MediaKind},
    domain::{CacheKey, ConversationId, MessageId, SenderId},
    formatting::{escape_html, truncate_text},
    messaging::{
        port::{ConversationDirectory, MessagingPort},
        types::{Report, ReportContent},
    },
    Result,
};

const DEFAULT_AUDIO_MIME: &str = "audio/mpeg";
const DEFAULT_DOCUMENT_NAME: &str = "file";

/// Control event announcing that a message was deleted by its sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevokeNotice {
    /// Conversation the notice arrived in.
    pub carrier: ConversationId,
    /// Key of the deleted message, if the transport supplied one.
    pub revoked: Option<RevokedRef>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevokedRef {
    pub conversation_id: Option<ConversationId>,
    pub message_id: Option<MessageId>,
}

impl RevokeNotice {
    /// `None` for malformed notices (no embedded key or no message id).
    pub fn target_key(&self) -> Option<CacheKey> {
        let revoked = self.revoked.as_ref()?;
        let message_id = revoked.message_id.clone()?;
        let chat = revoked
            .conversation_id
            .clone()
            .unwrap_or_else(|| self.carrier.clone());
        Some(CacheKey::new(chat, message_id))
    }
}

/// What a dispatched report told the operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportKind {
    Recovered(EntryKind),
    /// Media entry whose bytes were lost (restored from snapshot).
    Unrecoverable(EntryKind),
    Unsupported(EntryKind),
    NotFound,
}

pub struct DeletionHandler {
    owner: ConversationId,
    messenger: Arc<dyn MessagingPort>,
    directory: Arc<dyn ConversationDirectory>,
}

impl DeletionHandler {
    pub fn new(
        owner: ConversationId,
        messenger: Arc<dyn MessagingPort>,
        directory: Arc<dyn ConversationDirectory>,
    ) -> Self {
        Self {
            owner,
            messenger,
            directory,
        }
    }

    /// Display name for groups, raw id otherwise or when the lookup fails.
    pub async fn resolve_context(&self, chat: &ConversationId) -> String {
        if !self.directory.is_group(chat) {
            return chat.to_string();
        }
        match self.directory.display_name(chat).await {
            Ok(Some(name)) if !name.trim().is_empty() => name,
            Ok(_) => chat.to_string(),
            Err(e) => {
                tracing::warn!(chat = %chat, error = %e, "conversation name lookup failed");
                chat.to_string()
            }
        }
    }

    /// Render the report for a lookup result.
    pub fn render(&self, context: &str, found: Option<&CacheEntry>) -> (Report, ReportKind) {
        let Some(entry) = found else {
            let html = format!(
                "⚠️ A deleted message was not found in cache in chat: {}",
                escape_html(context)
            );
            return (self.report(ReportContent::text(html)), ReportKind::NotFound);
        };

        let header = header(context, &entry.sender_id);
        let caps = self.messenger.capabilities();

        let (content, kind) = match &entry.content {
            EntryContent::Text { body } => {
                let budget = caps.max_message_len.saturating_sub(header.chars().count() + 32);
                let html = format!(
                    "{header}\n\nDeleted message:\n{}",
                    escape_html(&truncate_text(body, budget))
                );
                (ReportContent::text(html), ReportKind::Recovered(EntryKind::Text))
            }
            content => match content.as_media() {
                Some((media_kind, media)) => match render_media(&header, media_kind, media, caps.max_caption_len) {
                    Some(content) => (content, ReportKind::Recovered(media_kind.entry_kind())),
                    None => (
                        ReportContent::text(format!(
                            "{header}\n(Content type not recoverable: {media_kind})"
                        )),
                        ReportKind::Unrecoverable(media_kind.entry_kind()),
                    ),
                },
                None => (
                    ReportContent::text(format!("{header}\n(Content type not supported)")),
                    ReportKind::Unsupported(entry.kind()),
                ),
            },
        };

        (self.report(content), kind)
    }

    pub async fn dispatch(&self, report: Report) -> Result<()> {
        self.messenger.send_report(report).await
    }

    fn report(&self, content: ReportContent) -> Report {
        Report {
            target: self.owner.clone(),
            content,
        }
    }
}

fn header(context: &str, sender: &SenderId) -> String {
    format!(
        "🛡️ <b>Anti-Delete</b>\nChat: {}\nUser: @{}",
        escape_html(context),
        escape_html(sender.tag())
    )
}

/// `None` when the payload is gone.
fn render_media(
    header: &str,
    kind: MediaKind,
    media: &MediaContent,
    max_caption_len: usize,
) -> Option<ReportContent> {
    let bytes = media.payload.clone()?;
    let caption = || {
        let budget = max_caption_len.saturating_sub(header.chars().count() + 32);
        let original = media
            .caption
            .as_deref()
            .filter(|c| !c.is_empty())
            .map(|c| escape_html(&truncate_text(c, budget)))
            .unwrap_or_else(|| "—".to_string());
        format!("{header}\nOriginal caption: {original}")
    };

    Some(match kind {
        MediaKind::Image => ReportContent::Image {
            bytes,
            caption: caption(),
        },
        MediaKind::Video => ReportContent::Video {
            bytes,
            caption: caption(),
        },
        MediaKind::Audio => ReportContent::Audio {
            bytes,
            mime_type: media
                .mime_type
                .clone()
                .unwrap_or_else(|| DEFAULT_AUDIO_MIME.to_string()),
        },
        MediaKind::Sticker => ReportContent::Sticker { bytes },
        MediaKind::Document => ReportContent::Document {
            bytes,
            file_name: media
                .file_name
                .clone()
                .unwrap_or_else(|| DEFAULT_DOCUMENT_NAME.to_string()),
            mime_type: media.mime_type.clone(),
            caption: caption(),
        },
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::messaging::types::MessagingCapabilities;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct FakeMessenger {
        pub(crate) sent: Mutex<Vec<Report>>,
        pub(crate) fail: bool,
    }

    impl FakeMessenger {
        pub(crate) fn reports(&self) -> Vec<Report> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessagingPort for FakeMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                max_message_len: 4096,
                max_caption_len: 1024,
            }
        }

        async fn send_report(&self, report: Report) -> Result<()> {
            if self.fail {
                return Err(crate::Error::External("send failed".to_string()));
            }
            self.sent.lock().unwrap().push(report);
            Ok(())
        }
    }

    /// Ids starting with `g` are groups; `gbroken` fails lookups.
    #[derive(Default)]
    pub(crate) struct FakeDirectory;

    #[async_trait]
    impl ConversationDirectory for FakeDirectory {
        fn is_group(&self, id: &ConversationId) -> bool {
            id.as_str().starts_with('g')
        }

        async fn display_name(&self, id: &ConversationId) -> Result<Option<String>> {
            match id.as_str() {
                "gbroken" => Err(crate::Error::External("timeout".to_string())),
                "g1" => Ok(Some("Family".to_string())),
                _ => Ok(None),
            }
        }
    }

    fn handler() -> DeletionHandler {
        DeletionHandler::new(
            ConversationId::new("owner"),
            Arc::new(FakeMessenger::default()),
            Arc::new(FakeDirectory),
        )
    }

    fn entry(content: EntryContent) -> CacheEntry {
        CacheEntry {
            message_id: MessageId::new("m1"),
            conversation_id: ConversationId::new("g1"),
            sender_id: SenderId::new("u1@s.whatsapp.net"),
            timestamp_millis: 0,
            content,
        }
    }

    fn media(payload: Option<&[u8]>) -> MediaContent {
        MediaContent {
            payload: payload.map(|p| p.to_vec()),
            mime_type: None,
            file_name: None,
            caption: None,
            size_bytes: 0,
        }
    }

    #[test]
    fn target_key_falls_back_to_carrier_and_rejects_missing_ids() {
        let notice = RevokeNotice {
            carrier: ConversationId::new("g1"),
            revoked: Some(RevokedRef {
                conversation_id: None,
                message_id: Some(MessageId::new("m1")),
            }),
        };
        assert_eq!(notice.target_key().unwrap().to_string(), "g1:m1");

        let no_id = RevokeNotice {
            carrier: ConversationId::new("g1"),
            revoked: Some(RevokedRef {
                conversation_id: Some(ConversationId::new("g2")),
                message_id: None,
            }),
        };
        assert!(no_id.target_key().is_none());

        let no_ref = RevokeNotice {
            carrier: ConversationId::new("g1"),
            revoked: None,
        };
        assert!(no_ref.target_key().is_none());
    }

    #[tokio::test]
    async fn context_uses_group_name_with_fallbacks() {
        let h = handler();
        assert_eq!(h.resolve_context(&ConversationId::new("g1")).await, "Family");
        assert_eq!(h.resolve_context(&ConversationId::new("gbroken")).await, "gbroken");
        assert_eq!(h.resolve_context(&ConversationId::new("gnameless")).await, "gnameless");
        assert_eq!(h.resolve_context(&ConversationId::new("dm42")).await, "dm42");
    }

    #[test]
    fn text_report_quotes_body_and_tags_sender() {
        let (report, kind) = handler().render(
            "Family",
            Some(&entry(EntryContent::Text {
                body: "<hi> & bye".to_string(),
            })),
        );
        assert_eq!(kind, ReportKind::Recovered(EntryKind::Text));
        assert_eq!(report.target, ConversationId::new("owner"));
        let html = report.content.text_part().unwrap();
        assert!(html.contains("Chat: Family"));
        assert!(html.contains("User: @u1"));
        assert!(html.contains("&lt;hi&gt; &amp; bye"));
    }

    #[test]
    fn media_reports_resend_bytes_with_defaults() {
        let h = handler();

        let (report, kind) = h.render("c", Some(&entry(EntryContent::Audio(media(Some(b"ogg"))))));
        assert_eq!(kind, ReportKind::Recovered(EntryKind::Audio));
        assert_eq!(
            report.content,
            ReportContent::Audio {
                bytes: b"ogg".to_vec(),
                mime_type: "audio/mpeg".to_string()
            }
        );

        let (report, _) = h.render("c", Some(&entry(EntryContent::Document(media(Some(b"pdf"))))));
        match report.content {
            ReportContent::Document {
                bytes,
                file_name,
                caption,
                ..
            } => {
                assert_eq!(bytes, b"pdf");
                assert_eq!(file_name, "file");
                assert!(caption.ends_with("Original caption: —"));
            }
            other => panic!("unexpected report: {other:?}"),
        }

        let mut captioned = media(Some(b"png"));
        captioned.caption = Some("sunset".to_string());
        let (report, _) = h.render("c", Some(&entry(EntryContent::Image(captioned))));
        assert!(report
            .content
            .text_part()
            .unwrap()
            .ends_with("Original caption: sunset"));

        let (report, _) = h.render("c", Some(&entry(EntryContent::Sticker(media(Some(b"webp"))))));
        assert_eq!(report.content, ReportContent::Sticker { bytes: b"webp".to_vec() });
    }

    #[test]
    fn media_without_payload_is_reported_unrecoverable() {
        let (report, kind) = handler().render("c", Some(&entry(EntryContent::Video(media(None)))));
        assert_eq!(kind, ReportKind::Unrecoverable(EntryKind::Video));
        assert!(report.content.media_kind().is_none());
        assert!(report
            .content
            .text_part()
            .unwrap()
            .contains("Content type not recoverable: video"));
    }

    #[test]
    fn raw_and_unknown_are_unsupported() {
        let h = handler();
        let (_, kind) = h.render(
            "c",
            Some(&entry(EntryContent::Raw {
                raw: serde_json::json!({}),
            })),
        );
        assert_eq!(kind, ReportKind::Unsupported(EntryKind::Raw));

        let (report, kind) = h.render("c", Some(&entry(EntryContent::Unknown)));
        assert_eq!(kind, ReportKind::Unsupported(EntryKind::Unknown));
        assert!(report
            .content
            .text_part()
            .unwrap()
            .contains("Content type not supported"));
    }

    #[test]
    fn miss_names_the_chat() {
        let (report, kind) = handler().render("g1", None);
        assert_eq!(kind, ReportKind::NotFound);
        assert!(report.content.text_part().unwrap().contains("not found in cache in chat: g1"));
    }
}
