mod bootstrap_helpers;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::watch;
use tracing::{info, warn};

use refbot_engine::{EngineConfig, ReconciliationEngine};
use refbot_resolver::{CrossrefConfig, CrossrefResolver, MetadataResolver};
use refbot_store::{MemoryReferenceStore, NotionReferenceStore, NotionStoreConfig, ReferenceStore};
use refbot_telegram::{TelegramBridgeRuntime, TelegramBridgeRuntimeConfig};

use crate::bootstrap_helpers::{init_tracing, load_token_file};

#[derive(Debug, Parser)]
#[command(
    name = "refbot",
    about = "Telegram bot that reconciles a bibliographic reference database against Crossref",
    version
)]
struct Cli {
    #[arg(
        long,
        env = "REFBOT_TELEGRAM_TOKEN_FILE",
        default_value = "TELEGRAM_TOKEN.txt",
        help = "File containing the Telegram bot token"
    )]
    telegram_token_file: PathBuf,

    #[arg(
        long,
        env = "REFBOT_NOTION_TOKEN_FILE",
        default_value = "NOTION_TOKEN.txt",
        help = "File containing the Notion integration token (unused with --memory-store)"
    )]
    notion_token_file: PathBuf,

    #[arg(
        long,
        env = "REFBOT_NOTION_DATABASE_ID",
        default_value = "610b6086600f45d48065b7a46eb1e8bd",
        help = "Notion database holding the reference records"
    )]
    notion_database_id: String,

    #[arg(
        long,
        env = "REFBOT_TELEGRAM_API_BASE",
        default_value = "https://api.telegram.org",
        help = "Base URL for the Telegram Bot API"
    )]
    telegram_api_base: String,

    #[arg(
        long,
        env = "REFBOT_NOTION_API_BASE",
        default_value = "https://api.notion.com",
        help = "Base URL for the Notion API"
    )]
    notion_api_base: String,

    #[arg(
        long,
        env = "REFBOT_CROSSREF_API_BASE",
        default_value = "https://api.crossref.org",
        help = "Base URL for the Crossref REST API"
    )]
    crossref_api_base: String,

    #[arg(
        long,
        env = "REFBOT_CROSSREF_MAILTO",
        help = "Contact address sent to Crossref for polite-pool routing"
    )]
    crossref_mailto: Option<String>,

    #[arg(
        long,
        env = "REFBOT_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        help = "Per-request timeout for outbound HTTP calls, in milliseconds"
    )]
    request_timeout_ms: u64,

    #[arg(
        long,
        env = "REFBOT_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        help = "Retries per HTTP request after a transient failure"
    )]
    retry_max_attempts: usize,

    #[arg(
        long,
        env = "REFBOT_RETRY_JITTER",
        action = ArgAction::Set,
        default_value_t = true,
        help = "Apply jitter to retry backoff delays"
    )]
    retry_jitter: bool,

    #[arg(
        long,
        env = "REFBOT_POLL_TIMEOUT_SECONDS",
        default_value_t = 25,
        help = "Telegram long-poll window, in seconds"
    )]
    poll_timeout_seconds: u64,

    #[arg(
        long,
        env = "REFBOT_POLL_ERROR_DELAY_MS",
        default_value_t = 2_000,
        help = "Delay before polling again after a poll failure, in milliseconds"
    )]
    poll_error_delay_ms: u64,

    #[arg(
        long,
        env = "REFBOT_RESOLVE_CONCURRENCY",
        default_value_t = 4,
        help = "Concurrent metadata lookups during a fill pass"
    )]
    resolve_concurrency: usize,

    #[arg(
        long,
        env = "REFBOT_MEMORY_STORE",
        action = ArgAction::SetTrue,
        help = "Use an in-memory reference store instead of Notion (for local runs)"
    )]
    memory_store: bool,
}

fn build_store(cli: &Cli) -> Result<Arc<dyn ReferenceStore>> {
    if cli.memory_store {
        warn!("using the in-memory reference store; records are lost on exit");
        return Ok(Arc::new(MemoryReferenceStore::new()));
    }

    let token = load_token_file(&cli.notion_token_file, "notion")?;
    let store = NotionReferenceStore::new(NotionStoreConfig {
        api_base: cli.notion_api_base.clone(),
        token,
        database_id: cli.notion_database_id.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        max_retries: cli.retry_max_attempts,
        retry_jitter: cli.retry_jitter,
    })
    .context("failed to create notion reference store")?;
    Ok(Arc::new(store))
}

fn build_resolver(cli: &Cli) -> Result<Arc<dyn MetadataResolver>> {
    let resolver = CrossrefResolver::new(CrossrefConfig {
        api_base: cli.crossref_api_base.clone(),
        mailto: cli.crossref_mailto.clone(),
        request_timeout_ms: cli.request_timeout_ms,
        max_retries: cli.retry_max_attempts,
        retry_jitter: cli.retry_jitter,
    })
    .context("failed to create crossref resolver")?;
    Ok(Arc::new(resolver))
}

async fn run(cli: Cli) -> Result<()> {
    let telegram_token = load_token_file(&cli.telegram_token_file, "telegram")?;
    let store = build_store(&cli)?;
    let resolver = build_resolver(&cli)?;

    let (shutdown_sender, shutdown) = watch::channel(false);
    let engine = Arc::new(ReconciliationEngine::new(
        store,
        resolver,
        EngineConfig {
            resolve_concurrency: cli.resolve_concurrency,
            shutdown: Some(shutdown.clone()),
        },
    ));

    let mut runtime = TelegramBridgeRuntime::new(TelegramBridgeRuntimeConfig {
        engine,
        api_base: cli.telegram_api_base,
        bot_token: telegram_token,
        request_timeout_ms: cli.request_timeout_ms,
        poll_timeout_seconds: cli.poll_timeout_seconds,
        poll_error_delay_ms: cli.poll_error_delay_ms,
        retry_max_attempts: cli.retry_max_attempts,
        retry_jitter: cli.retry_jitter,
        shutdown,
    })
    .context("failed to create telegram bridge runtime")?;

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_sender.send(true);
        }
    });

    runtime.run().await
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run(cli).await
}
