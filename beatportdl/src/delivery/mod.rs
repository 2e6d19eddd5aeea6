//! Chat delivery of finished files and the inbound request listener.

pub mod listener;
pub mod telegram;

use std::path::Path;

use async_trait::async_trait;

use crate::Result;

pub use listener::{ChatRequest, Inbound, InboundFilter};
pub use telegram::{TelegramClient, TelegramConfig};

/// Outbound side of a chat transport.
///
/// Callers treat both operations as fire-and-forget: failures are logged by
/// the caller and never retried beyond the transport's own rate-limit handling.
#[async_trait]
pub trait Delivery: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Upload a local file as a document named after its base filename.
    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<()>;
}
