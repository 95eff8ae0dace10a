use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use faceswap_bot::bot::{self, Command, TelegramTransport};
use faceswap_bot::clock::SystemClock;
use faceswap_bot::config::{BotConfig, LogFormat};
use faceswap_bot::db;
use faceswap_bot::localization::init_localization;
use faceswap_bot::orchestrator::{Collaborators, Orchestrator, TokioSleeper};
use faceswap_bot::persistence::Persistence;
use faceswap_bot::providers::{HttpFaceSwapClient, TenorClient};

const MAX_DB_CONNECTIONS: u32 = 5;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn init_persistence(database_url: Option<&str>) -> Result<Persistence> {
    let Some(database_url) = database_url else {
        warn!("DATABASE_URL not set, saved faces and history will not survive a restart");
        return Ok(Persistence::in_memory());
    };

    info!("Connecting to database");
    let pool = PgPoolOptions::new()
        .max_connections(MAX_DB_CONNECTIONS)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;
    db::init_database_schema(&pool).await?;
    Ok(Persistence::postgres(pool))
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = BotConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting Face Swap Telegram Bot");

    init_localization()?;
    let persistence = init_persistence(config.database_url.as_deref()).await?;

    let face_swap = HttpFaceSwapClient::new(
        &config.faceswap_base_url,
        &config.faceswap_api_key,
        &config.recovery,
    )?;
    let gif_search = TenorClient::new(
        &config.gif_search_base_url,
        &config.gif_search_api_key,
        &config.recovery,
    )?;

    let bot = Bot::new(&config.telegram_token);
    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        warn!(error = %e, "Failed to register bot commands");
    }

    let orchestrator = Orchestrator::new(
        config.orchestrator.clone(),
        config.rate_limits.clone(),
        config.recovery.clone(),
        Collaborators {
            persistence,
            face_swap: Arc::new(face_swap),
            gif_search: Arc::new(gif_search),
            transport: Arc::new(TelegramTransport::new(bot.clone())),
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
        },
    );
    let _sweeper = orchestrator.spawn_sweeper();

    info!(
        prompt_delivery = ?config.orchestrator.prompt_delivery,
        "Bot initialized, starting dispatcher"
    );

    Dispatcher::builder(bot, bot::schema())
        .dependencies(dptree::deps![orchestrator])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
