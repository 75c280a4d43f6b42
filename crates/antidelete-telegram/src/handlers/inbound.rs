//! Telegram `Message` → transport-neutral `InboundMessage`.

use teloxide::types::{FileMeta, Message, MessageKind, User};

use antidelete_core::{
    cache::MediaKind,
    domain::{ConversationId, MessageId, SenderId},
    ingest::{InboundContent, InboundMessage, MediaRef, MessageKey},
};

pub fn to_inbound(msg: &Message) -> InboundMessage {
    InboundMessage {
        key: MessageKey {
            conversation_id: ConversationId::new(msg.chat.id.0.to_string()),
            message_id: Some(MessageId::new(msg.id.0.to_string())),
            participant: msg.from().map(sender_id),
        },
        content: content_of(msg),
    }
}

/// Username when the user has one (readable in reports), numeric id otherwise.
fn sender_id(user: &User) -> SenderId {
    match &user.username {
        Some(name) => SenderId::new(name.clone()),
        None => SenderId::new(user.id.0.to_string()),
    }
}

fn content_of(msg: &Message) -> InboundContent {
    // Service messages (joins, pins, title changes) carry nothing to recover.
    if !matches!(msg.kind, MessageKind::Common(_)) {
        return InboundContent::Empty;
    }

    if let Some(text) = msg.text() {
        return InboundContent::Text(text.to_string());
    }

    let caption = msg.caption().map(str::to_string);
    let attach = |kind, file: &FileMeta, mime_type: Option<String>, file_name: Option<String>| {
        InboundContent::Media {
            kind,
            media: MediaRef {
                handle: file.id.clone(),
                mime_type,
                file_name,
                caption: caption.clone(),
            },
        }
    };

    if let Some(best) = msg.photo().and_then(|sizes| sizes.last()) {
        return attach(MediaKind::Image, &best.file, Some("image/jpeg".to_string()), None);
    }
    if let Some(v) = msg.video() {
        return attach(
            MediaKind::Video,
            &v.file,
            v.mime_type.as_ref().map(|m| m.to_string()),
            v.file_name.clone(),
        );
    }
    if let Some(a) = msg.animation() {
        return attach(
            MediaKind::Video,
            &a.file,
            a.mime_type.as_ref().map(|m| m.to_string()),
            a.file_name.clone(),
        );
    }
    if let Some(a) = msg.audio() {
        return attach(
            MediaKind::Audio,
            &a.file,
            a.mime_type.as_ref().map(|m| m.to_string()),
            a.file_name.clone(),
        );
    }
    if let Some(v) = msg.voice() {
        let mime = v
            .mime_type
            .as_ref()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "audio/ogg".to_string());
        return attach(MediaKind::Audio, &v.file, Some(mime), None);
    }
    if let Some(s) = msg.sticker() {
        return attach(MediaKind::Sticker, &s.file, None, None);
    }
    if let Some(d) = msg.document() {
        return attach(
            MediaKind::Document,
            &d.file,
            d.mime_type.as_ref().map(|m| m.to_string()),
            d.file_name.clone(),
        );
    }

    InboundContent::Other(serde_json::to_value(msg).unwrap_or(serde_json::Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(extra: serde_json::Value) -> Message {
        let mut v = json!({
            "message_id": 77,
            "date": 1_700_000_000,
            "chat": { "id": 5, "type": "private", "first_name": "Ann" },
            "from": { "id": 5, "is_bot": false, "first_name": "Ann", "username": "ann" }
        });
        for (k, val) in extra.as_object().unwrap() {
            v[k] = val.clone();
        }
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn text_message_maps_key_sender_and_body() {
        let inbound = to_inbound(&message(json!({ "text": "hello" })));
        assert_eq!(inbound.key.conversation_id, ConversationId::new("5"));
        assert_eq!(inbound.key.message_id, Some(MessageId::new("77")));
        assert_eq!(inbound.key.participant, Some(SenderId::new("ann")));
        assert_eq!(inbound.content, InboundContent::Text("hello".to_string()));
    }

    #[test]
    fn photo_uses_largest_size_and_caption() {
        let inbound = to_inbound(&message(json!({
            "caption": "sunset",
            "photo": [
                { "file_id": "small", "file_unique_id": "s", "file_size": 10, "width": 90, "height": 90 },
                { "file_id": "large", "file_unique_id": "l", "file_size": 9000, "width": 1280, "height": 1280 }
            ]
        })));
        match inbound.content {
            InboundContent::Media { kind, media } => {
                assert_eq!(kind, MediaKind::Image);
                assert_eq!(media.handle, "large");
                assert_eq!(media.caption.as_deref(), Some("sunset"));
            }
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn service_messages_are_empty() {
        let inbound = to_inbound(&message(json!({ "new_chat_title": "Renamed" })));
        assert_eq!(inbound.content, InboundContent::Empty);
    }
}
