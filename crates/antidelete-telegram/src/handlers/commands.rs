use teloxide::prelude::*;

use crate::router::AppState;

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

const TOGGLE_USAGE: &str = "⚙️ Usage:\n/antidelete on / off";
const TOGGLE_INVALID: &str = "⚠️ Invalid option.\nUse /antidelete on or /antidelete off";

/// Argument of `/antidelete`; `Err` carries the reply for bad input.
fn parse_toggle(args: &str) -> Result<bool, &'static str> {
    match args.trim().to_lowercase().as_str() {
        "" => Err(TOGGLE_USAGE),
        "on" => Ok(true),
        "off" => Ok(false),
        _ => Err(TOGGLE_INVALID),
    }
}

/// Operator commands. Returns `false` when `text` is not one of ours, so
/// the caller ingests it like any other message.
pub async fn handle_command(bot: &Bot, msg: &Message, state: &AppState, text: &str) -> ResponseResult<bool> {
    let (cmd, args) = parse_command(text);

    let reply = match cmd.as_str() {
        "antidelete" => match parse_toggle(&args) {
            Ok(true) => {
                state.service.set_enabled(true);
                "✅ Anti-Delete enabled. Deleted messages will now be recovered.".to_string()
            }
            Ok(false) => {
                state.service.set_enabled(false);
                "❌ Anti-Delete disabled. Deleted messages will no longer be recovered.".to_string()
            }
            Err(reply) => reply.to_string(),
        },
        "antidelete_size" => {
            let stats = state.service.stats().await;
            let mode = if stats.persistent {
                "persistent"
            } else {
                "memory-only"
            };
            let status = if state.service.is_enabled() {
                "enabled"
            } else {
                "disabled"
            };
            format!(
                "🛡️ Anti-Delete is {status}\nCached: {}/{} ({mode})",
                stats.size, stats.capacity
            )
        }
        "antidelete_clear" => {
            let before = state.service.size().await;
            state.service.clear().await;
            format!("🧹 Cleared {before} cached messages")
        }
        _ => return Ok(false),
    };

    bot.send_message(msg.chat.id, reply).await?;
    Ok(true)
}
