use std::path::PathBuf;
use std::sync::Arc;

use serenity::http::Http;
use serenity::model::gateway::GatewayIntents;
use serenity::prelude::*;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use jeongwonbot::bot::{Handler, Responder};
use jeongwonbot::config::{Config, DEFAULT_CONFIG_FILE};
use jeongwonbot::discord_log::{crate_targets, DiscordLogLayer};
use jeongwonbot::gemini::GeminiClient;

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from).or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    });
    let config = match Config::load(config_path.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("jeongwonbot.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        );

    if let Some(log_channel_id) = config.log_channel_id {
        let http = Arc::new(Http::new(&config.discord_bot_token));
        registry
            .with(DiscordLogLayer::new(http, log_channel_id).with_filter(crate_targets()))
            .init();
    } else {
        registry.init();
    }

    info!("🚀 Starting jeongwonbot...");
    match &config_path {
        Some(path) => info!("Loaded config from {}", path.display()),
        None => info!("No config file, using environment and defaults"),
    }
    info!("Watching forums: {:?}", config.forum_ids);
    info!("Models: light={}, capable={}", config.models.light, config.models.capable);

    let config = Arc::new(config);
    let gemini = GeminiClient::new(config.gemini_api_key.clone(), config.models.clone());
    let handler = Handler::new(Responder::new(config.clone(), gemini));

    let intents =
        GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

    let mut client = match Client::builder(&config.discord_bot_token, intents)
        .event_handler(handler)
        .await
    {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create Discord client: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = client.start().await {
        error!("Discord client stopped: {e}");
        std::process::exit(1);
    }
}
