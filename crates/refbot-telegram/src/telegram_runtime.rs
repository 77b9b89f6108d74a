//! Bridge runtime that polls Telegram for commands and replies with engine
//! result summaries.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use refbot_engine::ReconciliationEngine;

use crate::bot_command::{
    help_text, parse_bot_command, render_add_result, render_fill_result, BotCommand,
};
use crate::telegram_api_client::{TelegramApiClient, TelegramApiConfig};

#[derive(Clone)]
/// Runtime configuration for the Telegram bridge transport loop.
pub struct TelegramBridgeRuntimeConfig {
    pub engine: Arc<ReconciliationEngine>,
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    pub poll_timeout_seconds: u64,
    /// Delay before the next poll after a poll failure.
    pub poll_error_delay_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_jitter: bool,
    pub shutdown: watch::Receiver<bool>,
}

pub struct TelegramBridgeRuntime {
    client: TelegramApiClient,
    engine: Arc<ReconciliationEngine>,
    shutdown: watch::Receiver<bool>,
    poll_error_delay: Duration,
    next_update_offset: u64,
}

impl TelegramBridgeRuntime {
    pub fn new(config: TelegramBridgeRuntimeConfig) -> Result<Self> {
        let client = TelegramApiClient::new(TelegramApiConfig {
            api_base: config.api_base,
            bot_token: config.bot_token,
            request_timeout_ms: config.request_timeout_ms,
            poll_timeout_seconds: config.poll_timeout_seconds,
            max_retries: config.retry_max_attempts,
            retry_jitter: config.retry_jitter,
        })?;
        Ok(Self {
            client,
            engine: config.engine,
            shutdown: config.shutdown,
            poll_error_delay: Duration::from_millis(config.poll_error_delay_ms.max(1)),
            next_update_offset: 0,
        })
    }

    /// Poll/dispatch/reply loop. Poll failures are logged and retried after
    /// a delay; only a shutdown signal ends the loop. Updates already taken
    /// from a poll are processed to completion before exiting.
    pub async fn run(&mut self) -> Result<()> {
        info!("telegram bridge runtime started");
        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let mut shutdown = self.shutdown.clone();
            let updates = tokio::select! {
                _ = shutdown.changed() => continue,
                updates = self.client.get_updates(self.next_update_offset) => updates,
            };

            let updates = match updates {
                Ok(updates) => updates,
                Err(error) => {
                    warn!("telegram poll failed: {error:#}");
                    sleep(self.poll_error_delay).await;
                    continue;
                }
            };

            for update in updates {
                self.next_update_offset = self
                    .next_update_offset
                    .max(update.update_id.saturating_add(1));

                let Some(message) = update.message else {
                    continue;
                };
                let Some(text) = message.text.as_deref() else {
                    continue;
                };
                debug!(chat_id = message.chat.id, "dispatching inbound message");

                let reply = self.dispatch(text).await;
                if let Err(error) = self.client.send_message(message.chat.id, &reply).await {
                    warn!(
                        chat_id = message.chat.id,
                        "failed to send telegram reply: {error:#}"
                    );
                }
            }
        }
        info!("telegram bridge runtime stopped");
        Ok(())
    }

    async fn dispatch(&self, text: &str) -> String {
        match parse_bot_command(text) {
            BotCommand::AddReferences { dois } => {
                render_add_result(&self.engine.add_references(&dois).await)
            }
            BotCommand::FillIncomplete => match self.engine.fill_incomplete().await {
                Ok(result) => render_fill_result(&result),
                Err(error) => format!("could not read the reference store: {error}"),
            },
            BotCommand::Start => format!("Hi! I manage the reference database.\n\n{}", help_text()),
            BotCommand::Help => help_text().to_string(),
            BotCommand::Invalid { message } => message,
            BotCommand::Unknown => {
                format!("I didn't understand what you want.\n\n{}", help_text())
            }
        }
    }
}
