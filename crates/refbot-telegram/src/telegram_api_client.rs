//! Telegram Bot API client used by the bridge runtime: long-polling
//! `getUpdates` plus `sendMessage`.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::time::sleep;

use refbot_core::retry::{
    is_retryable_transport_error, parse_retry_after_ms, retry_delay, should_retry_status,
};

#[derive(Debug, Clone)]
/// Connection settings for [`TelegramApiClient`].
pub struct TelegramApiConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    /// Long-poll window passed to `getUpdates`, in seconds. Zero means a
    /// plain short poll.
    pub poll_timeout_seconds: u64,
    pub max_retries: usize,
    pub retry_jitter: bool,
}

#[derive(Debug, Clone, Deserialize)]
/// One entry from `getUpdates`.
pub struct TelegramUpdate {
    pub update_id: u64,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramEnvelope<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone)]
pub struct TelegramApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    poll_timeout_seconds: u64,
    max_retries: usize,
    retry_jitter: bool,
}

impl TelegramApiClient {
    pub fn new(config: TelegramApiConfig) -> Result<Self> {
        if config.bot_token.trim().is_empty() {
            bail!("telegram bot token cannot be empty");
        }
        let http = reqwest::Client::builder()
            // Long polls hold the connection for the poll window on top of
            // the normal request budget.
            .timeout(Duration::from_millis(
                config
                    .request_timeout_ms
                    .max(1)
                    .saturating_add(config.poll_timeout_seconds.saturating_mul(1_000)),
            ))
            .build()
            .context("failed to create telegram api client")?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.trim().to_string(),
            poll_timeout_seconds: config.poll_timeout_seconds,
            max_retries: config.max_retries,
            retry_jitter: config.retry_jitter,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    pub async fn get_updates(&self, offset: u64) -> Result<Vec<TelegramUpdate>> {
        let url = self.method_url("getUpdates");
        let timeout = self.poll_timeout_seconds.to_string();
        let offset = offset.to_string();
        let updates: Option<Vec<TelegramUpdate>> = self
            .request_json("getUpdates", || {
                self.http
                    .get(&url)
                    .query(&[("timeout", timeout.as_str()), ("offset", offset.as_str())])
            })
            .await?;
        updates.ok_or_else(|| anyhow!("telegram getUpdates response missing result[]"))
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let url = self.method_url("sendMessage");
        let payload = json!({ "chat_id": chat_id, "text": text });
        let _: Option<serde_json::Value> = self
            .request_json("sendMessage", || self.http.post(&url).json(&payload))
            .await?;
        Ok(())
    }

    async fn request_json<T, F>(&self, operation: &str, builder: F) -> Result<Option<T>>
    where
        T: DeserializeOwned + Default,
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            let request = builder().header("x-refbot-retry-attempt", attempt.to_string());
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let envelope = response
                            .json::<TelegramEnvelope<T>>()
                            .await
                            .with_context(|| format!("failed to decode telegram {operation}"))?;
                        if !envelope.ok {
                            bail!(
                                "telegram {operation} failed: {}",
                                envelope
                                    .description
                                    .unwrap_or_else(|| "unknown error".to_string())
                            );
                        }
                        return Ok(envelope.result);
                    }

                    let retry_after = parse_retry_after_ms(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.max_retries && should_retry_status(status.as_u16()) {
                        sleep(retry_delay(attempt, self.retry_jitter, retry_after)).await;
                        attempt += 1;
                        continue;
                    }
                    bail!(
                        "telegram {operation} failed with status {}: {body}",
                        status.as_u16()
                    );
                }
                Err(error) => {
                    if attempt < self.max_retries && is_retryable_transport_error(&error) {
                        sleep(retry_delay(attempt, self.retry_jitter, None)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(error)
                        .with_context(|| format!("telegram {operation} request failed"));
                }
            }
        }
    }
}
