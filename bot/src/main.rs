use std::sync::Arc;

use anyhow::Context as _;
use clap::Parser;
use serenity::Client;
use serenity::http::Http;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use serverwatch_bot::config::BotConfig;
use serverwatch_bot::db::pool::{create_pool, run_migrations};
use serverwatch_bot::db::queries;
use serverwatch_bot::discord::{self, DiscordChat, Handler};
use serverwatch_bot::engine::tracker::Tracker;
use serverwatch_bot::poll::HttpServerSource;

/// Mirrors game server status into Discord messages
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(long, default_value = "serverwatch.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = BotConfig::load(&args.config)?;
    if config.discord.token.is_empty() {
        anyhow::bail!("no Discord token configured (set DISCORD_TOKEN or [discord] token)");
    }

    // Initialize database
    let pool = create_pool(&config.database.url)
        .await
        .context("failed to connect to database")?;
    run_migrations(&pool)
        .await
        .context("failed to run database migrations")?;

    // Report what survived the last run
    let channels = queries::channels::list_channels(&pool).await?;
    let tracked = queries::trackings::list_trackings(&pool).await?;
    info!(
        channels = channels.len(),
        trackings = tracked.len(),
        "loaded persisted trackings"
    );

    let http = Arc::new(Http::new(&config.discord.token));
    let source = HttpServerSource::new(config.poll.url.clone(), config.poll_timeout())
        .context("failed to build HTTP client")?;
    let tracker = Arc::new(Tracker::new(
        pool,
        Arc::new(DiscordChat::new(http)),
        Arc::new(source),
        config.chat_timeout(),
    ));

    let cancel = CancellationToken::new();
    let poll_task = {
        let tracker = tracker.clone();
        let cancel = cancel.clone();
        let interval = config.poll_interval();
        tokio::spawn(async move { tracker.run(interval, cancel).await })
    };

    let handler = Handler::new(tracker, config.watch);
    let mut client = Client::builder(&config.discord.token, discord::intents())
        .event_handler(handler)
        .await
        .context("failed to build Discord client")?;

    let shard_manager = client.shard_manager.clone();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            shutdown.cancel();
            shard_manager.shutdown_all().await;
        }
    });

    info!(poll_url = %config.poll.url, "serverwatch starting");
    if let Err(e) = client.start().await {
        error!(error = %e, "Discord client stopped");
    }

    // The poll loop finishes its current cycle before exiting.
    cancel.cancel();
    if let Err(e) = poll_task.await {
        error!(error = %e, "poll task failed");
    }
    info!("serverwatch stopped");
    Ok(())
}
