//! Deleted-message shadow store for a chat bot.
//!
//! Every inbound conversation event is cached (text inline, media drained
//! into memory) so that when its sender later revokes it, the original can
//! be re-reported to the bot operator. The crate is transport-agnostic:
//! message delivery, media download and name lookups sit behind ports
//! implemented in adapter crates.

pub mod cache;
pub mod config;
pub mod domain;
pub mod errors;
pub mod feed;
pub mod formatting;
pub mod ingest;
pub mod logging;
pub mod messaging;
pub mod revoke;
pub mod service;
pub mod utils;

pub use errors::{Error, Result};
pub use service::{BatchSummary, ShadowService, StepOutcome, TransportEvent};
