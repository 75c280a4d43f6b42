//! Telegram adapter (teloxide).
//!
//! Implements the `antidelete-core` reporting sink, conversation directory
//! and media source over the Telegram Bot API, and runs the polling loop
//! that feeds inbound messages to the shadow store. Revokes arrive over
//! the TCP feed in `revoke_feed`.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{InputFile, ParseMode, Recipient},
};

use tokio::time::sleep;

pub mod handlers;
pub mod media;
pub mod revoke_feed;
pub mod router;

use antidelete_core::{
    domain::ConversationId,
    errors::Error,
    messaging::{
        port::{ConversationDirectory, MessagingPort},
        types::{MessagingCapabilities, Report, ReportContent},
    },
    Result,
};

pub use media::TelegramMediaSource;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub(crate) fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

/// Numeric ids address chats directly; anything else is a public `@username`.
pub fn recipient(id: &ConversationId) -> Recipient {
    match id.as_str().trim().parse::<i64>() {
        Ok(n) => Recipient::Id(teloxide::types::ChatId(n)),
        Err(_) => {
            let name = id.as_str().trim();
            let name = if name.starts_with('@') {
                name.to_string()
            } else {
                format!("@{name}")
            };
            Recipient::ChannelUsername(name)
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_report(&self, report: Report) -> Result<()> {
        let to = recipient(&report.target);

        match report.content {
            ReportContent::Text { html } => {
                self.with_retry(|| {
                    self.bot
                        .send_message(to.clone(), html.clone())
                        .parse_mode(ParseMode::Html)
                })
                .await?;
            }
            ReportContent::Image { bytes, caption } => {
                self.with_retry(|| {
                    self.bot
                        .send_photo(to.clone(), InputFile::memory(bytes.clone()))
                        .caption(caption.clone())
                        .parse_mode(ParseMode::Html)
                })
                .await?;
            }
            ReportContent::Video { bytes, caption } => {
                self.with_retry(|| {
                    self.bot
                        .send_video(to.clone(), InputFile::memory(bytes.clone()))
                        .caption(caption.clone())
                        .parse_mode(ParseMode::Html)
                })
                .await?;
            }
            // Voice notes go back as voice notes; Telegram infers everything else.
            ReportContent::Audio { bytes, mime_type } if mime_type.starts_with("audio/ogg") => {
                self.with_retry(|| self.bot.send_voice(to.clone(), InputFile::memory(bytes.clone())))
                    .await?;
            }
            ReportContent::Audio { bytes, .. } => {
                self.with_retry(|| self.bot.send_audio(to.clone(), InputFile::memory(bytes.clone())))
                    .await?;
            }
            ReportContent::Sticker { bytes } => {
                self.with_retry(|| {
                    self.bot
                        .send_sticker(to.clone(), InputFile::memory(bytes.clone()))
                })
                .await?;
            }
            ReportContent::Document {
                bytes,
                file_name,
                caption,
                ..
            } => {
                self.with_retry(|| {
                    self.bot
                        .send_document(
                            to.clone(),
                            InputFile::memory(bytes.clone()).file_name(file_name.clone()),
                        )
                        .caption(caption.clone())
                        .parse_mode(ParseMode::Html)
                })
                .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ConversationDirectory for TelegramMessenger {
    fn is_group(&self, id: &ConversationId) -> bool {
        // Groups, supergroups and channels have negative ids.
        id.as_str().trim().parse::<i64>().map(|n| n < 0).unwrap_or(false)
    }

    async fn display_name(&self, id: &ConversationId) -> Result<Option<String>> {
        let chat = self
            .with_retry(|| self.bot.get_chat(recipient(id)))
            .await?;
        Ok(chat.title().map(str::to_string))
    }
}
