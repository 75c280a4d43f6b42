use std::sync::Arc;

use antidelete_core::config::Config;

#[tokio::main]
async fn main() -> Result<(), antidelete_core::Error> {
    antidelete_core::logging::init("antidelete")?;

    let cfg = Arc::new(Config::load()?);
    if !cfg.shadow.enabled {
        tracing::warn!("ANTIDELETE_ENABLED is off; messages will be observed but not cached");
    }

    antidelete_telegram::router::run_polling(cfg)
        .await
        .map_err(|e| antidelete_core::Error::External(format!("telegram bot failed: {e}")))?;

    Ok(())
}
