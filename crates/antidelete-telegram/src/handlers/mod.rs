//! Telegram update handlers.
//!
//! Operator commands are answered directly; every other message (new or
//! edited) becomes one transport event for the shadow store.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use antidelete_core::service::TransportEvent;

use crate::router::AppState;

mod commands;
pub mod inbound;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if let Some(text) = msg.text() {
        let from_owner = msg.chat.id.0.to_string() == state.cfg.shadow.owner.as_str();
        if from_owner && text.starts_with('/') && commands::handle_command(&bot, &msg, &state, text).await? {
            return Ok(());
        }
    }

    let event = TransportEvent::Message(inbound::to_inbound(&msg));
    state.service.process_batch(vec![event]).await;
    Ok(())
}
