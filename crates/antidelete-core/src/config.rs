use std::{
    env, fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{cache::DEFAULT_CAPACITY, domain::ConversationId, errors::Error, Result};

pub const DEFAULT_STORE_PATH: &str = "data/antidelete.json";
pub const DEFAULT_MEDIA_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MEDIA_MAX_BYTES: u64 = 50 * 1024 * 1024;

/// Settings owned by the shadow store and its handlers.
#[derive(Clone, Debug)]
pub struct ShadowConfig {
    pub enabled: bool,
    pub store_path: PathBuf,
    pub capacity: usize,
    /// Operator conversation; destination for every report.
    pub owner: ConversationId,
    pub media_timeout: Duration,
    pub max_media_bytes: u64,
}

impl ShadowConfig {
    pub fn new(owner: ConversationId, store_path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            store_path: store_path.into(),
            capacity: DEFAULT_CAPACITY,
            owner,
            media_timeout: DEFAULT_MEDIA_TIMEOUT,
            max_media_bytes: DEFAULT_MEDIA_MAX_BYTES,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::Config(
                "ANTIDELETE_MAX_CACHE must be at least 1".to_string(),
            ));
        }
        if self.owner.as_str().trim().is_empty() {
            return Err(Error::Config(
                "ANTIDELETE_OWNER_CHAT must not be empty".to_string(),
            ));
        }
        if self.store_path.as_os_str().is_empty() {
            return Err(Error::InvalidPath {
                path: self.store_path.clone(),
                reason: "snapshot path is empty".to_string(),
            });
        }
        if self.store_path.is_dir() {
            return Err(Error::InvalidPath {
                path: self.store_path.clone(),
                reason: "snapshot path is a directory".to_string(),
            });
        }
        Ok(())
    }
}

/// Process configuration, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    pub telegram_bot_token: String,
    pub shadow: ShadowConfig,
    /// Where to accept line-delimited JSON revoke notices; off when unset.
    pub revoke_feed_addr: Option<SocketAddr>,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let owner = env_str("ANTIDELETE_OWNER_CHAT")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("ANTIDELETE_OWNER_CHAT environment variable is required".to_string())
            })?;

        let store_path = env_path("ANTIDELETE_DB_PATH").unwrap_or_else(|| PathBuf::from(DEFAULT_STORE_PATH));

        let shadow = ShadowConfig {
            enabled: env_bool("ANTIDELETE_ENABLED").unwrap_or(true),
            store_path,
            capacity: env_usize("ANTIDELETE_MAX_CACHE").unwrap_or(DEFAULT_CAPACITY),
            owner: ConversationId::new(owner.trim()),
            media_timeout: env_u64("ANTIDELETE_MEDIA_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(DEFAULT_MEDIA_TIMEOUT),
            max_media_bytes: env_u64("ANTIDELETE_MEDIA_MAX_BYTES").unwrap_or(DEFAULT_MEDIA_MAX_BYTES),
        };
        shadow.validate()?;

        let revoke_feed_addr = env_str("ANTIDELETE_REVOKE_ADDR")
            .map(|raw| parse_socket_addr("ANTIDELETE_REVOKE_ADDR", &raw))
            .transpose()?
            .flatten();

        Ok(Self {
            telegram_bot_token,
            shadow,
            revoke_feed_addr,
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_socket_addr(key: &str, raw: &str) -> Result<Option<SocketAddr>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<SocketAddr>()
        .map(Some)
        .map_err(|e| Error::Config(format!("{key} must be host:port ({raw}): {e}")))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
