//! The shadow store as seen by its host: one object, constructed once,
//! shared by reference between the ingest path and the revoke path.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use serde::Serialize;
use tokio::sync::Mutex;

use crate::{
    cache::{CacheEntry, CacheStore, EntryKind, SnapshotFile},
    config::ShadowConfig,
    domain::CacheKey,
    ingest::{Classification, Classifier, InboundMessage, MediaSource},
    messaging::port::{ConversationDirectory, MessagingPort},
    revoke::{DeletionHandler, ReportKind, RevokeNotice},
    Result,
};

/// One event from the transport's "new messages" stream.
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    Message(InboundMessage),
    Revoke(RevokeNotice),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    EmptyMessage,
    MalformedRevoke,
}

/// How a report held back during a media download went out.
#[derive(Clone, Debug, PartialEq)]
pub enum DeferredReport {
    Sent(ReportKind),
    Failed(String),
}

/// Result of processing one event. Failures are values, never panics or
/// propagated errors.
#[derive(Clone, Debug, PartialEq)]
pub enum StepOutcome {
    Stored {
        key: CacheKey,
        kind: EntryKind,
        /// Set when a revoke arrived while the media was downloading.
        deferred_report: Option<DeferredReport>,
    },
    Reported {
        key: CacheKey,
        report: ReportKind,
    },
    /// Revoke for a key whose media is still downloading.
    Deferred { key: CacheKey },
    Skipped { reason: SkipReason },
    Failed {
        key: Option<CacheKey>,
        reason: String,
        deferred_report: Option<DeferredReport>,
    },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub stored: usize,
    pub reported: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn record(&mut self, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Stored {
                deferred_report, ..
            } => {
                self.stored += 1;
                self.record_deferred(deferred_report.as_ref());
            }
            StepOutcome::Reported { .. } => self.reported += 1,
            StepOutcome::Deferred { .. } => self.deferred += 1,
            StepOutcome::Skipped { .. } => self.skipped += 1,
            StepOutcome::Failed {
                deferred_report, ..
            } => {
                self.failed += 1;
                self.record_deferred(deferred_report.as_ref());
            }
        }
    }

    fn record_deferred(&mut self, report: Option<&DeferredReport>) {
        match report {
            Some(DeferredReport::Sent(_)) => self.reported += 1,
            Some(DeferredReport::Failed(_)) => self.failed += 1,
            None => {}
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StoreStats {
    pub size: usize,
    pub capacity: usize,
    pub persistent: bool,
}

/// Downloads running for one key. `revoked` sticks until the last of them
/// finishes, so overlapping downloads (an edit during the first fetch)
/// cannot drop a deferred revoke.
#[derive(Debug, Default)]
struct PendingAcquisition {
    downloads: usize,
    revoked: bool,
}

pub struct ShadowService {
    enabled: AtomicBool,
    store: Mutex<CacheStore>,
    classifier: Classifier,
    handler: DeletionHandler,
    in_flight: Mutex<HashMap<CacheKey, PendingAcquisition>>,
}

impl ShadowService {
    /// Validate `cfg` and restore the store from its snapshot.
    ///
    /// The only fallible step is configuration validation; an unusable
    /// snapshot location degrades to memory-only mode.
    pub async fn open(
        cfg: &ShadowConfig,
        media: Arc<dyn MediaSource>,
        messenger: Arc<dyn MessagingPort>,
        directory: Arc<dyn ConversationDirectory>,
    ) -> Result<Self> {
        cfg.validate()?;
        let store = CacheStore::open(SnapshotFile::new(&cfg.store_path), cfg.capacity).await;
        Ok(Self::with_store(cfg, store, media, messenger, directory))
    }

    pub fn with_store(
        cfg: &ShadowConfig,
        store: CacheStore,
        media: Arc<dyn MediaSource>,
        messenger: Arc<dyn MessagingPort>,
        directory: Arc<dyn ConversationDirectory>,
    ) -> Self {
        if !cfg.enabled {
            tracing::info!("anti-delete disabled; events will be ignored");
        }
        Self {
            enabled: AtomicBool::new(cfg.enabled),
            store: Mutex::new(store),
            classifier: Classifier::new(media, cfg),
            handler: DeletionHandler::new(cfg.owner.clone(), messenger, directory),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Switch processing on or off at runtime. Returns the previous state.
    pub fn set_enabled(&self, enabled: bool) -> bool {
        let was = self.enabled.swap(enabled, Ordering::Relaxed);
        if was != enabled {
            tracing::info!(enabled, "anti-delete toggled");
        }
        was
    }

    /// Process a transport batch strictly in order.
    pub async fn process_batch(&self, events: Vec<TransportEvent>) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for event in events {
            let outcome = self.process(event).await;
            summary.record(&outcome);
        }

        if summary.stored + summary.reported + summary.deferred + summary.failed > 0 {
            tracing::info!(
                stored = summary.stored,
                reported = summary.reported,
                deferred = summary.deferred,
                skipped = summary.skipped,
                failed = summary.failed,
                "batch processed"
            );
        } else {
            tracing::debug!(skipped = summary.skipped, "batch processed");
        }
        summary
    }

    pub async fn process(&self, event: TransportEvent) -> StepOutcome {
        match event {
            TransportEvent::Message(msg) => self.ingest(msg).await,
            TransportEvent::Revoke(notice) => self.handle_revoke(notice).await,
        }
    }

    pub async fn ingest(&self, msg: InboundMessage) -> StepOutcome {
        if !self.is_enabled() {
            return StepOutcome::Skipped {
                reason: SkipReason::Disabled,
            };
        }

        let job = match self.classifier.classify(msg) {
            Classification::Empty => {
                return StepOutcome::Skipped {
                    reason: SkipReason::EmptyMessage,
                }
            }
            Classification::Ready { key, entry } => {
                let kind = self.store_entry(&key, entry).await;
                return StepOutcome::Stored {
                    key,
                    kind,
                    deferred_report: None,
                };
            }
            Classification::NeedsMedia(job) => job,
        };

        let key = job.key.clone();
        let media_kind = job.kind;
        self.in_flight
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .downloads += 1;

        // Store before releasing the key so a replayed revoke finds the entry.
        let stored = match self.classifier.acquire(job).await {
            Ok((_, entry)) => Ok(self.store_entry(&key, entry).await),
            Err(e) => {
                tracing::warn!(key = %key, kind = %media_kind, error = %e, "media acquisition failed; event dropped");
                Err(e)
            }
        };

        let deferred_report = if self.finish_acquisition(&key).await {
            tracing::info!(key = %key, "replaying revoke deferred during media download");
            Some(match self.report(&key).await {
                Ok(report) => DeferredReport::Sent(report),
                Err(e) => DeferredReport::Failed(e.to_string()),
            })
        } else {
            None
        };

        match stored {
            Ok(kind) => StepOutcome::Stored {
                key,
                kind,
                deferred_report,
            },
            Err(e) => StepOutcome::Failed {
                key: Some(key),
                reason: e.to_string(),
                deferred_report,
            },
        }
    }

    pub async fn handle_revoke(&self, notice: RevokeNotice) -> StepOutcome {
        if !self.is_enabled() {
            return StepOutcome::Skipped {
                reason: SkipReason::Disabled,
            };
        }

        let Some(key) = notice.target_key() else {
            tracing::debug!(carrier = %notice.carrier, "revoke notice without message key; skipped");
            return StepOutcome::Skipped {
                reason: SkipReason::MalformedRevoke,
            };
        };

        if let Some(pending) = self.in_flight.lock().await.get_mut(&key) {
            pending.revoked = true;
            tracing::info!(key = %key, downloads = pending.downloads, "revoke arrived during media download; deferring report");
            return StepOutcome::Deferred { key };
        }

        match self.report(&key).await {
            Ok(report) => StepOutcome::Reported { key, report },
            Err(e) => StepOutcome::Failed {
                key: Some(key),
                reason: e.to_string(),
                deferred_report: None,
            },
        }
    }

    pub async fn is_acquiring(&self, key: &CacheKey) -> bool {
        self.in_flight.lock().await.contains_key(key)
    }

    pub async fn lookup(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.store.lock().await.get(key)
    }

    pub async fn clear(&self) {
        self.store.lock().await.clear().await;
        tracing::info!("cache cleared");
    }

    pub async fn size(&self) -> usize {
        self.store.lock().await.len()
    }

    pub async fn stats(&self) -> StoreStats {
        let store = self.store.lock().await;
        StoreStats {
            size: store.len(),
            capacity: store.capacity(),
            persistent: store.is_persistent(),
        }
    }

    async fn store_entry(&self, key: &CacheKey, entry: CacheEntry) -> EntryKind {
        let kind = entry.kind();
        self.store.lock().await.put(key.clone(), entry).await;
        tracing::debug!(key = %key, kind = %kind, "cached");
        kind
    }

    /// Release one download of `key`. `true` when it was the last one and
    /// a revoke is waiting for it.
    async fn finish_acquisition(&self, key: &CacheKey) -> bool {
        let mut pending = self.in_flight.lock().await;
        let Some(entry) = pending.get_mut(key) else {
            return false;
        };
        entry.downloads = entry.downloads.saturating_sub(1);
        if entry.downloads > 0 {
            return false;
        }
        pending.remove(key).map(|p| p.revoked).unwrap_or(false)
    }

    async fn report(&self, key: &CacheKey) -> Result<ReportKind> {
        let context = self.handler.resolve_context(&key.conversation_id).await;
        let found = self.store.lock().await.get(key);
        let (report, kind) = self.handler.render(&context, found.as_deref());

        match self.handler.dispatch(report).await {
            Ok(()) => {
                tracing::info!(key = %key, report = ?kind, "deletion reported");
                Ok(kind)
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "report dispatch failed");
                Err(e)
            }
        }
    }
}
