//! Gmail REST transport and the provider record types it returns.
mod client;
mod record;

pub use client::{GmailClient, TokenSource};
pub use record::{GmailRecord, Header, MessagePart, PartBody};

use async_trait::async_trait;

use crate::errors::AppResult;

/// Remote mailbox operations the sync engine depends on. Authentication is
/// entirely the implementation's concern.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Ids of unread inbox messages, newest first as the provider returns them.
    async fn list_unread_ids(&self) -> AppResult<Vec<String>>;

    async fn fetch_message(&self, id: &str) -> AppResult<GmailRecord>;

    /// Remove the message from the inbox.
    async fn archive(&self, id: &str) -> AppResult<()>;
}
