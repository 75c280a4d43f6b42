use std::{sync::Arc, time::Duration};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use antidelete_core::{
    config::Config,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
        types::{Report, ReportContent},
    },
    service::ShadowService,
};

use crate::{handlers, revoke_feed, TelegramMediaSource, TelegramMessenger};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub service: Arc<ShadowService>,
}

pub async fn run_polling(cfg: Arc<Config>) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => tracing::info!(bot = %me.username(), "antidelete started"),
        Err(e) => tracing::warn!(error = %e, "get_me failed; continuing"),
    }
    tracing::info!(
        owner = %cfg.shadow.owner,
        store = %cfg.shadow.store_path.display(),
        capacity = cfg.shadow.capacity,
        "configuration loaded"
    );

    // Reports are throttled so a burst of deletions does not trip flood limits;
    // the adapter still retries once on RetryAfter.
    let telegram = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        telegram.clone(),
        ThrottleConfig::default(),
    ));
    let media = Arc::new(TelegramMediaSource::new(bot.clone()));

    let service = Arc::new(ShadowService::open(&cfg.shadow, media, messenger.clone(), telegram).await?);

    {
        let service = service.clone();
        let owner = cfg.shadow.owner.clone();
        let messenger = messenger.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            let stats = service.stats().await;
            let html = format!(
                "🛡️ <b>Anti-Delete online</b>\nCached: {}/{}{}",
                stats.size,
                stats.capacity,
                if stats.persistent {
                    ""
                } else {
                    "\n⚠️ snapshot unavailable; running memory-only"
                }
            );
            let report = Report {
                target: owner,
                content: ReportContent::text(html),
            };
            if let Err(e) = messenger.send_report(report).await {
                tracing::warn!(error = %e, "startup notification failed");
            }
        });
    }

    match cfg.revoke_feed_addr {
        Some(addr) => {
            revoke_feed::spawn(addr, service.clone()).await?;
        }
        None => tracing::warn!(
            "ANTIDELETE_REVOKE_ADDR not set; messages are cached but no revoke source is attached"
        ),
    }

    let state = Arc::new(AppState { cfg, service });

    // Edits reuse the original message id, so they replace the cached entry.
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_message().endpoint(handlers::handle_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
