use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use crate::{
    cache::{entry::CacheEntry, snapshot::SnapshotFile},
    domain::CacheKey,
};

pub const DEFAULT_CAPACITY: usize = 500;

/// Bounded key → entry store with FIFO eviction.
///
/// Entries only ever leave from the front of `order` (eviction) or all at
/// once (`clear`), so the queue and the map stay in lockstep. A replacement
/// keeps the key's original queue slot; reads never touch the order.
///
/// When a snapshot file is attached, every mutation rewrites it. Flush
/// failures are logged and swallowed.
#[derive(Debug)]
pub struct CacheStore {
    capacity: usize,
    entries: HashMap<CacheKey, Arc<CacheEntry>>,
    order: VecDeque<CacheKey>,
    snapshot: Option<SnapshotFile>,
}

impl CacheStore {
    pub fn in_memory(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
            snapshot: None,
        }
    }

    /// Restore from `snapshot`, falling back to memory-only mode if the
    /// location is unusable.
    pub async fn open(snapshot: SnapshotFile, capacity: usize) -> Self {
        let mut store = Self::in_memory(capacity);

        let loaded = match snapshot.load().await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::error!(
                    path = %snapshot.path().display(),
                    error = %e,
                    "snapshot location unusable; running memory-only"
                );
                return store;
            }
        };

        let restored = loaded.len();
        let mut trimmed = false;
        for (key, entry) in loaded {
            trimmed |= store.insert(key, entry).is_some();
        }
        if store.is_empty() {
            tracing::info!(path = %snapshot.path().display(), "starting with an empty cache");
        } else {
            tracing::info!(restored, held = store.len(), capacity = store.capacity, "cache restored from snapshot");
        }
        store.snapshot = Some(snapshot);
        if trimmed {
            store.flush().await;
        }
        store
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_persistent(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Insert or replace, evicting the oldest-inserted key on overflow.
    ///
    /// Returns the evicted key, if any.
    pub async fn put(&mut self, key: CacheKey, entry: CacheEntry) -> Option<CacheKey> {
        let evicted = self.insert(key, entry);
        if let Some(k) = &evicted {
            tracing::debug!(key = %k, "evicted oldest cache entry");
        }
        self.flush().await;
        evicted
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.entries.get(key).cloned()
    }

    pub async fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.flush().await;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys from oldest to newest insertion.
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.order.iter()
    }

    fn insert(&mut self, key: CacheKey, entry: CacheEntry) -> Option<CacheKey> {
        if self.entries.insert(key.clone(), Arc::new(entry)).is_none() {
            self.order.push_back(key);
        }

        if self.entries.len() <= self.capacity {
            return None;
        }
        let oldest = self.order.pop_front()?;
        self.entries.remove(&oldest);
        Some(oldest)
    }

    async fn flush(&self) {
        let Some(snapshot) = &self.snapshot else {
            return;
        };
        let ordered = self
            .order
            .iter()
            .filter_map(|k| self.entries.get(k).map(|e| (k, e.as_ref())));
        if let Err(e) = snapshot.flush(ordered).await {
            tracing::error!(path = %snapshot.path().display(), error = %e, "snapshot flush failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::entry::{EntryContent, MediaContent};
    use crate::cache::snapshot::tests::{cleanup, tmp_path};
    use crate::domain::{ConversationId, MessageId, SenderId};

    fn key(id: &str) -> CacheKey {
        CacheKey::new(ConversationId::new("g1"), MessageId::new(id))
    }

    fn text(id: &str, body: &str) -> CacheEntry {
        CacheEntry {
            message_id: MessageId::new(id),
            conversation_id: ConversationId::new("g1"),
            sender_id: SenderId::new("u1"),
            timestamp_millis: 0,
            content: EntryContent::Text {
                body: body.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn size_never_exceeds_capacity_and_first_key_is_evicted() {
        let cap = 4;
        let mut store = CacheStore::in_memory(cap);

        for i in 0..cap {
            store.put(key(&format!("k{i}")), text(&format!("k{i}"), "x")).await;
            assert!(store.len() <= cap);
        }
        assert!(store.get(&key("k0")).is_some());

        let evicted = store.put(key("k4"), text("k4", "x")).await;
        assert_eq!(evicted, Some(key("k0")));
        assert_eq!(store.len(), cap);
        assert!(store.get(&key("k0")).is_none());
    }

    #[tokio::test]
    async fn fifo_eviction_keeps_exactly_the_newest_keys() {
        let cap = 10;
        let mut store = CacheStore::in_memory(cap);
        for i in 1..=cap + 5 {
            store.put(key(&format!("k{i}")), text(&format!("k{i}"), "x")).await;
        }

        for i in 1..=5 {
            assert!(store.get(&key(&format!("k{i}"))).is_none(), "k{i} should be evicted");
        }
        for i in 6..=cap + 5 {
            assert!(store.get(&key(&format!("k{i}"))).is_some(), "k{i} should be held");
        }
    }

    #[tokio::test]
    async fn reads_do_not_refresh_eviction_order() {
        let mut store = CacheStore::in_memory(2);
        store.put(key("a"), text("a", "x")).await;
        store.put(key("b"), text("b", "x")).await;

        for _ in 0..10 {
            assert!(store.get(&key("a")).is_some());
        }
        store.put(key("c"), text("c", "x")).await;

        assert!(store.get(&key("a")).is_none());
        assert!(store.get(&key("b")).is_some());
    }

    #[tokio::test]
    async fn replacement_keeps_original_slot_and_last_write_wins() {
        let mut store = CacheStore::in_memory(2);
        store.put(key("a"), text("a", "first")).await;
        store.put(key("b"), text("b", "x")).await;

        let evicted = store.put(key("a"), text("a", "second")).await;
        assert!(evicted.is_none());
        assert_eq!(store.len(), 2);
        match &store.get(&key("a")).unwrap().content {
            EntryContent::Text { body } => assert_eq!(body, "second"),
            other => panic!("unexpected content: {other:?}"),
        }

        // "a" was inserted first, so it is still the eviction candidate.
        store.put(key("c"), text("c", "x")).await;
        assert!(store.get(&key("a")).is_none());
        assert_eq!(store.keys().cloned().collect::<Vec<_>>(), vec![key("b"), key("c")]);
    }

    #[tokio::test]
    async fn clear_twice_leaves_empty_store_and_empty_snapshot() {
        let path = tmp_path("clear");
        let mut store = CacheStore::open(SnapshotFile::new(&path), 5).await;
        store.put(key("a"), text("a", "x")).await;
        assert_eq!(store.len(), 1);

        store.clear().await;
        store.clear().await;

        assert_eq!(store.len(), 0);
        let on_disk: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk, serde_json::json!({}));

        cleanup(&path);
    }

    #[tokio::test]
    async fn reopen_restores_metadata_in_insertion_order() {
        let path = tmp_path("reopen");
        {
            let mut store = CacheStore::open(SnapshotFile::new(&path), 3).await;
            store.put(key("z"), text("z", "x")).await;
            store
                .put(
                    key("a"),
                    CacheEntry {
                        content: EntryContent::Image(MediaContent {
                            payload: Some(vec![9; 16]),
                            size_bytes: 16,
                            ..MediaContent::default()
                        }),
                        ..text("a", "")
                    },
                )
                .await;
            store.put(key("m"), text("m", "x")).await;
        }

        let mut store = CacheStore::open(SnapshotFile::new(&path), 3).await;
        assert!(store.is_persistent());
        assert_eq!(
            store.keys().cloned().collect::<Vec<_>>(),
            vec![key("z"), key("a"), key("m")]
        );
        let restored = store.get(&key("a")).unwrap();
        let (_, media) = restored.content.as_media().unwrap();
        assert!(media.payload.is_none());
        assert_eq!(media.size_bytes, 16);

        // "z" is still the oldest after the restart.
        store.put(key("n"), text("n", "x")).await;
        assert!(store.get(&key("z")).is_none());

        cleanup(&path);
    }

    #[tokio::test]
    async fn reopen_with_smaller_capacity_trims_oldest() {
        let path = tmp_path("shrink");
        {
            let mut store = CacheStore::open(SnapshotFile::new(&path), 5).await;
            for id in ["a", "b", "c", "d"] {
                store.put(key(id), text(id, "x")).await;
            }
        }

        let store = CacheStore::open(SnapshotFile::new(&path), 2).await;
        assert_eq!(store.keys().cloned().collect::<Vec<_>>(), vec![key("c"), key("d")]);

        cleanup(&path);
    }

    #[tokio::test]
    async fn failed_flush_keeps_entries_in_memory() {
        let path = tmp_path("flushfail");
        let mut store = CacheStore::open(SnapshotFile::new(&path), 3).await;
        assert!(store.is_persistent());
        store.put(key("a"), text("a", "x")).await;

        // A directory where the snapshot file was makes every later rename fail.
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(&path).unwrap();

        store.put(key("b"), text("b", "y")).await;
        assert_eq!(store.len(), 2);
        assert!(store.get(&key("a")).is_some());
        assert!(store.get(&key("b")).is_some());
        assert!(store.is_persistent());

        store.clear().await;
        assert!(store.is_empty());
        assert!(path.is_dir());

        cleanup(&path);
    }

    #[tokio::test]
    async fn unusable_location_falls_back_to_memory_only() {
        let path = tmp_path("unusable");
        std::fs::create_dir_all(&path).unwrap();

        let mut store = CacheStore::open(SnapshotFile::new(&path), 2).await;
        assert!(!store.is_persistent());
        store.put(key("a"), text("a", "x")).await;
        assert_eq!(store.len(), 1);

        cleanup(&path);
    }
}
