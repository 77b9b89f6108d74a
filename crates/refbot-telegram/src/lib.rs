//! Telegram front-end for the reconciliation engine: command parsing,
//! result rendering, and the long-polling bridge runtime.

mod bot_command;
mod telegram_api_client;
mod telegram_runtime;

pub use bot_command::{
    help_text, parse_bot_command, render_add_result, render_fill_result, BotCommand,
};
pub use telegram_api_client::{
    TelegramApiClient, TelegramApiConfig, TelegramChat, TelegramMessage, TelegramUpdate,
};
pub use telegram_runtime::{TelegramBridgeRuntime, TelegramBridgeRuntimeConfig};
