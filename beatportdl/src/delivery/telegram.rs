//! Telegram Bot API transport.
//!
//! Outbound: `sendMessage` and `sendDocument` (multipart upload). Inbound:
//! long-polling `getUpdates`. Rate limits (HTTP 429) are handled by honouring
//! the `parameters.retry_after` field of the JSON response body.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use super::Delivery;
use crate::{Error, Result};

/// Attempts per request while Telegram answers 429.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// `sendMessage` accepts at most this many characters.
const TELEGRAM_MESSAGE_LIMIT: usize = 4096;

pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Telegram transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    /// Token issued by BotFather.
    pub bot_token: String,
    pub api_url: String,
    /// Hosts accepted in inbound links; subdomains match too.
    pub allowed_domains: Vec<String>,
    /// Chats allowed to submit requests. Empty accepts every chat.
    pub allowed_chat_ids: Vec<i64>,
    /// Long-poll timeout of `getUpdates`.
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            api_url: TELEGRAM_API_URL.to_string(),
            allowed_domains: vec!["beatport.com".to_string(), "beatsource.com".to_string()],
            allowed_chat_ids: Vec::new(),
            poll_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

pub struct TelegramClient {
    config: TelegramConfig,
    client: Client,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Result<Self> {
        // The long poll must finish before the HTTP timeout does.
        let timeout = Duration::from_secs(config.poll_timeout_secs + 30);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::delivery(format!("Failed to build Telegram client: {}", e)))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty()
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.config.bot_token,
            method
        )
    }

    /// Send the request produced by `build`, waiting out HTTP 429 replies.
    ///
    /// `build` runs once per attempt: a multipart body is consumed by `send`.
    async fn send_with_retry<F>(&self, method: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client, String) -> RequestBuilder,
    {
        for attempt in 1..=MAX_RATE_LIMIT_RETRIES {
            let response = build(&self.client, self.method_url(method))
                .send()
                .await
                .map_err(|e| Error::delivery(format!("{method} request failed: {e}")))?;

            match response.status() {
                status if status.is_success() => return Ok(response),
                StatusCode::TOO_MANY_REQUESTS => {
                    let body: serde_json::Value = response.json().await.unwrap_or_default();
                    let wait = retry_after(&body).unwrap_or(Duration::from_secs(1));
                    if attempt == MAX_RATE_LIMIT_RETRIES {
                        break;
                    }
                    debug!(method, attempt, wait_ms = wait.as_millis() as u64, "Rate limited by Telegram");
                    tokio::time::sleep(wait).await;
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::delivery(format!("{method} failed: {status} {body}")));
                }
            }
        }
        warn!(method, attempts = MAX_RATE_LIMIT_RETRIES, "Giving up on rate limited Telegram request");
        Err(Error::delivery(format!(
            "{method} still rate limited after {MAX_RATE_LIMIT_RETRIES} attempts"
        )))
    }

    /// Long-poll for updates after `offset`.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>> {
        let payload = json!({
            "offset": offset,
            "timeout": self.config.poll_timeout_secs,
            "allowed_updates": ["message"],
        });
        let response = self
            .send_with_retry("getUpdates", |client, url| client.post(url).json(&payload))
            .await?;
        let body: ApiResponse<Vec<Update>> = response
            .json()
            .await
            .map_err(|e| Error::delivery(format!("Invalid getUpdates response: {}", e)))?;
        parse_updates(body)
    }
}

fn retry_after(body: &serde_json::Value) -> Option<Duration> {
    body.get("parameters")
        .and_then(|p| p.get("retry_after"))
        .and_then(|v| v.as_u64())
        .map(Duration::from_secs)
}

fn parse_updates(body: ApiResponse<Vec<Update>>) -> Result<Vec<Update>> {
    if !body.ok {
        return Err(Error::delivery(format!(
            "getUpdates rejected: {}",
            body.description.unwrap_or_default()
        )));
    }
    Ok(body.result.unwrap_or_default())
}

#[async_trait]
impl Delivery for TelegramClient {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let payload = json!({
            "chat_id": chat_id,
            "text": truncate_message(text, TELEGRAM_MESSAGE_LIMIT),
        });
        self.send_with_retry("sendMessage", |client, url| client.post(url).json(&payload))
            .await?;
        debug!(chat_id, "Telegram message sent");
        Ok(())
    }

    async fn send_document(&self, chat_id: i64, path: &Path) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let data = Bytes::from(
            tokio::fs::read(path)
                .await
                .map_err(|e| Error::io_path("reading document", path, e))?,
        );
        let length = data.len() as u64;

        self.send_with_retry("sendDocument", |client, url| {
            let document = Part::stream_with_length(data.clone(), length).file_name(file_name.clone());
            let form = Form::new()
                .text("chat_id", chat_id.to_string())
                .part("document", document);
            client.post(url).multipart(form)
        })
        .await?;
        debug!(chat_id, file = %file_name, bytes = length, "Telegram document sent");
        Ok(())
    }
}

/// Cut `text` to `limit` characters, marking the cut.
fn truncate_message(text: &str, limit: usize) -> String {
    const MARK: &str = "\n\n[truncated]";
    match text.char_indices().nth(limit) {
        None => text.to_string(),
        Some(_) => {
            let keep = limit.saturating_sub(MARK.chars().count());
            text.chars().take(keep).chain(MARK.chars()).collect()
        }
    }
}
