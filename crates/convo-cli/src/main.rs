use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use convo_core::{CacheSettings, ConversationService, RequestContext};
use convo_infrastructure::{create_pool, create_redis_pool, PgConversationStore, RedisCache};
use convo_shared::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = "convo",
    version,
    about = "Inspect and maintain per-user conversation caches"
)]
struct Args {
    /// User whose cache entries are addressed
    #[arg(long, env = "CONVO_USER")]
    user: String,

    /// Deadline for the whole command, overrides cache.operation_timeout_ms
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the live conversation snapshot
    Snapshot {
        /// Only the last N messages
        #[arg(long)]
        recent: Option<usize>,
    },

    /// Print the active conversation, rebuilding the cached window
    Active,

    /// Make CONVERSATION the active one
    Switch { conversation: String },

    /// Drop the cached window. With --conversation, only if that one is active
    Invalidate {
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Remove every cache entry of the user
    Clear,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load().context("loading configuration")?;
    let _guard = convo_shared::telemetry::init_telemetry(&config.logging)?;

    let pool = create_pool(
        &config.database.url,
        config.database.max_connections,
        Duration::from_secs(config.database.acquire_timeout_seconds),
    )
    .await
    .context("connecting to PostgreSQL")?;
    let redis = create_redis_pool(&config.redis.url, config.redis.max_connections)
        .context("creating Redis pool")?;

    let service = ConversationService::new(
        Arc::new(RedisCache::new(redis)),
        Arc::new(PgConversationStore::new(pool)),
        CacheSettings::from(&config.cache),
    );

    let timeout_ms = args.timeout_ms.unwrap_or(config.cache.operation_timeout_ms);
    let ctx = RequestContext::with_timeout(Duration::from_millis(timeout_ms));
    let user = args.user.as_str();

    match args.command {
        Command::Snapshot { recent: Some(n) } => {
            print_json(&service.history().recent(&ctx, user, n).await?)?;
        }
        Command::Snapshot { recent: None } => {
            print_json(&service.snapshot(&ctx, user).await?)?;
        }
        Command::Active => {
            print_json(&service.read_active(&ctx, user).await?)?;
        }
        Command::Switch { conversation } => {
            let view = service.switch(&ctx, user, &conversation).await?;
            info!("Switched {} to {} ({} messages)", user, conversation, view.message_count());
            print_json(&view)?;
        }
        Command::Invalidate { conversation: Some(conversation) } => {
            let dropped = service.conversation_modified(&ctx, user, &conversation).await?;
            println!("{}", if dropped { "invalidated" } else { "not active, kept" });
        }
        Command::Invalidate { conversation: None } => {
            service.active().invalidate(&ctx, user).await?;
            println!("invalidated");
        }
        Command::Clear => {
            service.teardown(&ctx, user).await?;
            println!("cleared");
        }
    }

    Ok(())
}
