//! TCP listener for the revoke feed.
//!
//! The Bot API never tells a bot that a message was deleted, so revokes
//! reach the shadow store from outside (a user-session bridge, a business
//! connection relay, a manual `nc`). Each connection speaks the
//! line-delimited protocol in `antidelete_core::feed`.

use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;

use antidelete_core::{feed, service::ShadowService};

/// Bind `addr` up front so a bad address fails startup, then accept in the
/// background.
pub async fn spawn(addr: SocketAddr, service: Arc<ShadowService>) -> anyhow::Result<SocketAddr> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!(addr = %local, "revoke feed listening");

    tokio::spawn(accept_loop(listener, service));
    Ok(local)
}

async fn accept_loop(listener: TcpListener, service: Arc<ShadowService>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(error = %e, "revoke feed accept failed");
                continue;
            }
        };

        let service = service.clone();
        tokio::spawn(async move {
            tracing::debug!(peer = %peer, "revoke feed connection opened");
            let (reader, writer) = stream.into_split();
            match feed::serve(&service, reader, writer).await {
                Ok(()) => tracing::debug!(peer = %peer, "revoke feed connection closed"),
                Err(e) => tracing::warn!(peer = %peer, error = %e, "revoke feed connection failed"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antidelete_core::{
        cache::{CacheStore, MediaKind},
        config::ShadowConfig,
        domain::ConversationId,
        ingest::{MediaRef, MediaSource, MediaStream},
        messaging::{
            port::{ConversationDirectory, MessagingPort},
            types::{MessagingCapabilities, Report},
        },
        Error, Result,
    };
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;

    #[derive(Default)]
    struct RecordingMessenger(Mutex<Vec<Report>>);

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        fn capabilities(&self) -> MessagingCapabilities {
            MessagingCapabilities {
                max_message_len: 4096,
                max_caption_len: 1024,
            }
        }

        async fn send_report(&self, report: Report) -> Result<()> {
            self.0.lock().unwrap().push(report);
            Ok(())
        }
    }

    #[async_trait]
    impl ConversationDirectory for RecordingMessenger {
        fn is_group(&self, _id: &ConversationId) -> bool {
            false
        }

        async fn display_name(&self, _id: &ConversationId) -> Result<Option<String>> {
            Ok(None)
        }
    }

    struct NoMedia;

    #[async_trait]
    impl MediaSource for NoMedia {
        async fn open(&self, _kind: MediaKind, media: &MediaRef) -> Result<MediaStream> {
            Err(Error::External(format!("no media: {}", media.handle)))
        }
    }

    #[tokio::test]
    async fn tcp_feed_reports_unknown_revoke_to_owner() {
        let messenger = Arc::new(RecordingMessenger::default());
        let cfg = ShadowConfig::new(ConversationId::new("1"), "/tmp/antidelete-feed-unused.json");
        let service = Arc::new(ShadowService::with_store(
            &cfg,
            CacheStore::in_memory(4),
            Arc::new(NoMedia),
            messenger.clone(),
            messenger.clone(),
        ));

        let addr = spawn("127.0.0.1:0".parse().unwrap(), service).await.unwrap();
        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer
            .write_all(b"{\"chat\":\"-100\",\"message_id\":\"5\"}\n")
            .await
            .unwrap();

        let mut lines = BufReader::new(reader).lines();
        let reply: serde_json::Value = serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["summary"]["reported"], 1);

        let sent = messenger.0.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].target, ConversationId::new("1"));
    }
}
