//! Line-delimited JSON revoke feed.
//!
//! Transports whose bot API does not surface deletions (or sidecars that
//! watch a user session) push revoke notices here, one JSON value per line:
//!
//! ```text
//! {"chat": "-100123", "message_id": "42"}
//! [{"chat": "-100123", "message_id": "42"}, {"chat": "7", "message_id": "9"}]
//! ```
//!
//! Each line is processed as one batch and answered with one JSON line
//! carrying the batch summary (or the parse error).

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{
    domain::{ConversationId, MessageId},
    revoke::{RevokeNotice, RevokedRef},
    service::{BatchSummary, ShadowService, TransportEvent},
    Result,
};

/// One deleted message as reported by the feed producer.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct RevokeRequest {
    /// Conversation the deleted message belonged to.
    pub chat: String,
    /// Missing ids are accepted and skipped as malformed notices.
    #[serde(default)]
    pub message_id: Option<String>,
    /// Conversation the notice arrived in, when it differs from `chat`.
    #[serde(default)]
    pub carrier: Option<String>,
}

impl RevokeRequest {
    pub fn into_notice(self) -> RevokeNotice {
        let chat = ConversationId::new(self.chat);
        RevokeNotice {
            carrier: self.carrier.map(ConversationId::new).unwrap_or_else(|| chat.clone()),
            revoked: Some(RevokedRef {
                conversation_id: Some(chat),
                message_id: self.message_id.map(MessageId::new),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeedLine {
    One(RevokeRequest),
    Many(Vec<RevokeRequest>),
}

impl FeedLine {
    fn into_events(self) -> Vec<TransportEvent> {
        let requests = match self {
            Self::One(req) => vec![req],
            Self::Many(reqs) => reqs,
        };
        requests
            .into_iter()
            .map(|req| TransportEvent::Revoke(req.into_notice()))
            .collect()
    }
}

#[derive(Debug, Serialize)]
struct FeedResponse {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<BatchSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Serve one feed connection until the peer closes it.
pub async fn serve<R, W>(service: &ShadowService, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<FeedLine>(&line) {
            Ok(batch) => FeedResponse {
                ok: true,
                summary: Some(service.process_batch(batch.into_events()).await),
                error: None,
            },
            Err(e) => {
                tracing::warn!(error = %e, "unreadable revoke feed line");
                FeedResponse {
                    ok: false,
                    summary: None,
                    error: Some(e.to_string()),
                }
            }
        };

        let mut out = serde_json::to_string(&response)?;
        out.push('\n');
        writer.write_all(out.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}
