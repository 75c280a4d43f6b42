use async_trait::async_trait;

use crate::{
    domain::ConversationId,
    messaging::types::{MessagingCapabilities, Report},
    Result,
};

/// Reporting sink: the transport used to deliver recovery reports.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_report(&self, report: Report) -> Result<()>;
}

/// Conversation metadata lookups (best-effort).
#[async_trait]
pub trait ConversationDirectory: Send + Sync {
    fn is_group(&self, id: &ConversationId) -> bool;

    /// Human-readable name, if the transport knows one.
    async fn display_name(&self, id: &ConversationId) -> Result<Option<String>>;
}
