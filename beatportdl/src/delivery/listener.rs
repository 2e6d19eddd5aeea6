//! Inbound chat requests: URL-shape and allowlist filtering plus the
//! long-poll loop feeding accepted links to the batch runner.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::Delivery;
use super::telegram::{TelegramClient, TelegramConfig};

pub const ACK_TEXT: &str = "✅ Received and queued. Processing...";
pub const REJECT_TEXT: &str = "❌ Invalid URL. Please send a valid Beatport or Beatsource URL.";

/// Pause after a failed poll before trying again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// One accepted link and the chat that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub chat_id: i64,
    pub url: String,
}

/// Verdict on one inbound text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Accepted(String),
    /// Answered with [`REJECT_TEXT`].
    Rejected,
    /// Chat not on the allowlist; not answered.
    Ignored,
}

#[derive(Debug, Clone, Default)]
pub struct InboundFilter {
    allowed_domains: Vec<String>,
    allowed_chat_ids: Vec<i64>,
}

impl InboundFilter {
    pub fn new(allowed_domains: Vec<String>, allowed_chat_ids: Vec<i64>) -> Self {
        Self {
            allowed_domains: allowed_domains
                .into_iter()
                .map(|d| d.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|d| !d.is_empty())
                .collect(),
            allowed_chat_ids,
        }
    }

    pub fn from_config(config: &TelegramConfig) -> Self {
        Self::new(
            config.allowed_domains.clone(),
            config.allowed_chat_ids.clone(),
        )
    }

    fn host_allowed(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.allowed_domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
    }

    pub fn check(&self, chat_id: i64, text: &str) -> Inbound {
        if !self.allowed_chat_ids.is_empty() && !self.allowed_chat_ids.contains(&chat_id) {
            return Inbound::Ignored;
        }
        let text = text.trim();
        let Ok(url) = Url::parse(text) else {
            return Inbound::Rejected;
        };
        if !matches!(url.scheme(), "http" | "https") {
            return Inbound::Rejected;
        }
        match url.host_str() {
            Some(host) if self.host_allowed(host) => Inbound::Accepted(text.to_string()),
            _ => Inbound::Rejected,
        }
    }
}

async fn reply(client: &TelegramClient, chat_id: i64, text: &str) {
    if let Err(e) = client.send_message(chat_id, text).await {
        warn!(chat_id, error = %e, "Failed to answer chat request");
    }
}

/// Poll for updates until `cancel` fires, forwarding accepted links to `tx`.
///
/// Returns when cancelled or when the receiving side has gone away.
pub async fn listen(
    client: Arc<TelegramClient>,
    filter: InboundFilter,
    tx: mpsc::Sender<ChatRequest>,
    cancel: CancellationToken,
) {
    let mut offset = 0;
    info!("Listening for chat requests");

    loop {
        let updates = tokio::select! {
            _ = cancel.cancelled() => break,
            result = client.get_updates(offset) => result,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "Polling chat updates failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(POLL_ERROR_BACKOFF) => continue,
                }
            }
        };

        for update in updates {
            offset = offset.max(update.update_id + 1);
            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };
            let chat_id = message.chat.id;

            match filter.check(chat_id, &text) {
                Inbound::Accepted(url) => {
                    debug!(chat_id, url = %url, "Chat request accepted");
                    reply(&client, chat_id, ACK_TEXT).await;
                    if tx.send(ChatRequest { chat_id, url }).await.is_err() {
                        debug!("Request receiver closed, stopping listener");
                        return;
                    }
                }
                Inbound::Rejected => reply(&client, chat_id, REJECT_TEXT).await,
                Inbound::Ignored => debug!(chat_id, "Ignoring message from chat not on the allowlist"),
            }
        }
    }

    info!("Chat listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn filter() -> InboundFilter {
        InboundFilter::from_config(&TelegramConfig::default())
    }

    #[rstest]
    #[case("https://www.beatport.com/track/strobe/1234")]
    #[case("https://beatport.com/release/for-lack-of-a-better-name/88")]
    #[case("  http://www.beatsource.com/playlist/x/5  ")]
    #[case("https://WWW.BEATPORT.COM/chart/top-10/7")]
    fn test_accepts_allowed_hosts(#[case] text: &str) {
        assert_eq!(
            filter().check(1, text),
            Inbound::Accepted(text.trim().to_string())
        );
    }

    #[rstest]
    #[case("hello")]
    #[case("beatport.com/track/strobe/1234")]
    #[case("ftp://www.beatport.com/track/strobe/1234")]
    #[case("https://notbeatport.com/track/strobe/1234")]
    #[case("https://beatport.com.evil.example/track/1")]
    fn test_rejects_other_text(#[case] text: &str) {
        assert_eq!(filter().check(1, text), Inbound::Rejected);
    }

    #[test]
    fn test_chat_allowlist() {
        let filter = InboundFilter::new(vec!["beatport.com".to_string()], vec![42]);
        assert_eq!(filter.check(7, "https://www.beatport.com/track/a/1"), Inbound::Ignored);
        assert!(matches!(
            filter.check(42, "https://www.beatport.com/track/a/1"),
            Inbound::Accepted(_)
        ));
    }
}
