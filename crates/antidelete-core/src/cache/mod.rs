//! Deleted-message shadow cache: entries, the FIFO store and its snapshot.

pub mod entry;
pub mod snapshot;
pub mod store;

pub use entry::{CacheEntry, EntryContent, EntryKind, MediaContent, MediaKind};
pub use snapshot::SnapshotFile;
pub use store::{CacheStore, DEFAULT_CAPACITY};
