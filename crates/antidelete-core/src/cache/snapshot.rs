//! Metadata-only snapshot of the cache, stored as a JSON object mapping
//! canonical cache keys to entries.
//!
//! Object order in the file is insertion order, so a restart restores the
//! eviction order along with the entries. Payload bytes never reach disk
//! (`MediaContent::payload` is `#[serde(skip)]`).

use std::{
    fmt,
    path::{Path, PathBuf},
};

use serde::{
    de::{MapAccess, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::{
    cache::entry::CacheEntry,
    domain::CacheKey,
    errors::Error,
    Result,
};

#[derive(Clone, Debug)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot, creating an empty one on first run.
    ///
    /// `Err` means the location is unusable (e.g. the directory cannot be
    /// created); a file that exists but does not parse yields an empty list.
    pub async fn load(&self) -> Result<Vec<(CacheKey, CacheEntry)>> {
        if self.path.is_dir() {
            return Err(Error::InvalidPath {
                path: self.path.clone(),
                reason: "snapshot path is a directory".to_string(),
            });
        }
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let txt = match tokio::fs::read_to_string(&self.path).await {
            Ok(txt) => txt,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::write(&self.path, "{}").await?;
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        if txt.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<RawSnapshot>(&txt) {
            Ok(raw) => Ok(raw.into_entries(&self.path)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "snapshot parse failed; starting empty");
                Ok(Vec::new())
            }
        }
    }

    /// Overwrite the snapshot with `entries`, in the order given.
    pub async fn flush<'a, I>(&self, entries: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a CacheKey, &'a CacheEntry)>,
    {
        let doc = OrderedEntries(entries.into_iter().collect());
        let txt = serde_json::to_string_pretty(&doc)?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, txt).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

struct OrderedEntries<'a>(Vec<(&'a CacheKey, &'a CacheEntry)>);

impl Serialize for OrderedEntries<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().copied())
    }
}

/// File contents before per-entry validation, in file order.
struct RawSnapshot(Vec<(String, serde_json::Value)>);

impl RawSnapshot {
    /// Keys are rebuilt from each entry's own ids; the object key is only
    /// cross-checked, since message ids may themselves contain `:`.
    fn into_entries(self, path: &Path) -> Vec<(CacheKey, CacheEntry)> {
        let mut out = Vec::with_capacity(self.0.len());
        for (raw_key, value) in self.0 {
            let entry = match serde_json::from_value::<CacheEntry>(value) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(path = %path.display(), key = %raw_key, error = %e, "skipping unreadable snapshot entry");
                    continue;
                }
            };
            let key = CacheKey::new(entry.conversation_id.clone(), entry.message_id.clone());
            if key.to_string() != raw_key {
                tracing::warn!(
                    path = %path.display(),
                    key = %raw_key,
                    entry_key = %key,
                    "snapshot key disagrees with entry ids; using entry ids"
                );
            }
            out.push((key, entry));
        }
        out
    }
}

impl<'de> Deserialize<'de> for RawSnapshot {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor;

        impl<'de> Visitor<'de> for OrderedVisitor {
            type Value = RawSnapshot;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object of cache entries")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut out = Vec::with_capacity(map.size_hint().unwrap_or(0));
                while let Some((k, v)) = map.next_entry::<String, serde_json::Value>()? {
                    out.push((k, v));
                }
                Ok(RawSnapshot(out))
            }
        }

        deserializer.deserialize_map(OrderedVisitor)
    }
}
