use std::io;

use async_trait::async_trait;
use futures::TryStreamExt;
use teloxide::{net::Download, prelude::*};
use tokio_util::io::StreamReader;

use antidelete_core::{
    cache::MediaKind,
    ingest::{MediaRef, MediaSource, MediaStream},
    Result,
};

use crate::TelegramMessenger;

/// Streams attachments straight from the Bot API file endpoint.
#[derive(Clone)]
pub struct TelegramMediaSource {
    bot: Bot,
}

impl TelegramMediaSource {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MediaSource for TelegramMediaSource {
    async fn open(&self, kind: MediaKind, media: &MediaRef) -> Result<MediaStream> {
        let file = self
            .bot
            .get_file(media.handle.clone())
            .await
            .map_err(TelegramMessenger::map_err)?;
        tracing::debug!(kind = %kind, size = file.size, "downloading attachment");

        let bytes = self
            .bot
            .download_file_stream(&file.path)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Ok(Box::pin(StreamReader::new(bytes)))
    }
}
