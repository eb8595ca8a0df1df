use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use feed_aggregator::config::Config;
use feed_aggregator::engine::{Aggregator, ChannelRegistry, EntrySet};
use feed_aggregator::feed::HttpSourceReader;
use feed_aggregator::model::Channel;
use feed_aggregator::storage::{ChannelUpdate, Database, DatabaseError, NewChannel};

/// Get the config directory path (~/.config/feed-aggregator/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feed-aggregator"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feed-aggregator",
    version,
    about = "Poll RSS/Atom channels by TTL and keep only new entries"
)]
struct Args {
    /// Config file (default: ~/.config/feed-aggregator/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// SQLite database file, overrides `database_path` from the config
    #[arg(long, value_name = "FILE", global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage subscribed channels
    #[command(subcommand)]
    Channel(ChannelCommand),

    /// Refresh one channel and print its entries
    Fetch {
        id: i64,
        /// Ignore the TTL and always retrieve
        #[arg(long)]
        force: bool,
    },

    /// Refresh every stale channel and print all entries
    Aggregate {
        /// Ignore TTLs and retrieve every channel
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand, Debug)]
enum ChannelCommand {
    /// List subscribed channels
    List,

    /// Subscribe to a channel
    Add {
        url: String,
        /// Display name (default: the feed's own title)
        #[arg(long)]
        name: Option<String>,
        /// Seconds a refresh stays valid
        #[arg(long)]
        ttl: Option<u32>,
    },

    /// Rename a channel or change its TTL
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, conflicts_with = "clear_ttl")]
        ttl: Option<u32>,
        /// Remove the TTL so every aggregation refreshes the channel
        #[arg(long)]
        clear_ttl: bool,
    },

    /// Unsubscribe and delete the channel's entries
    Remove { id: i64 },
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

fn print_entries(entries: EntrySet) -> Result<()> {
    print_json(&entries.into_sorted_vec())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = args
        .database
        .clone()
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(|| config_dir.join("feeds.db"));
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The database is in use by another process. Please try again.");
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .build()
        .context("Failed to build HTTP client")?;
    let reader = HttpSourceReader::new(client, config.fetch_options());

    match args.command {
        Command::Channel(command) => run_channel_command(command, &db, &reader).await,
        Command::Fetch { id, force } => {
            let aggregator = build_aggregator(&db, reader, &config);
            let entries = aggregator
                .refresh(id, force)
                .await
                .with_context(|| format!("Failed to refresh channel {id}"))?;
            print_entries(entries)
        }
        Command::Aggregate { force } => {
            let aggregator = build_aggregator(&db, reader, &config);
            let entries = aggregator
                .aggregate(force)
                .await
                .context("Aggregation failed")?;
            print_entries(entries)
        }
    }
}

fn build_aggregator(db: &Database, reader: HttpSourceReader, config: &Config) -> Aggregator {
    let db = Arc::new(db.clone());
    Aggregator::new(db.clone(), db, Arc::new(reader))
        .with_max_concurrent_fetches(config.max_concurrent_fetches)
}

/// Subscribe to `url` after checking that it serves a readable feed.
///
/// Without an explicit non-blank name the channel is named after the feed's
/// title, or its URL when the feed has none.
async fn add_channel(
    db: &Database,
    reader: &HttpSourceReader,
    url: String,
    name: Option<String>,
    ttl: Option<u32>,
) -> Result<Channel> {
    let feed = reader
        .fetch_feed(&url)
        .await
        .with_context(|| format!("Failed to read feed at {url}"))?;

    let name = name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| feed.title.filter(|t| !t.trim().is_empty()))
        .unwrap_or_else(|| url.clone());

    db.insert_channel(&NewChannel { name, url, ttl })
        .await
        .context("Failed to add channel (is the URL already subscribed?)")
}

async fn run_channel_command(
    command: ChannelCommand,
    db: &Database,
    reader: &HttpSourceReader,
) -> Result<()> {
    match command {
        ChannelCommand::List => {
            let channels = db.list().await.context("Failed to list channels")?;
            print_json(&channels)
        }
        ChannelCommand::Add { url, name, ttl } => {
            let channel = add_channel(db, reader, url, name, ttl).await?;
            print_json(&channel)
        }
        ChannelCommand::Update {
            id,
            name,
            ttl,
            clear_ttl,
        } => {
            let current = db
                .get(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Unknown channel [id: {id}]"))?;
            let ttl = if clear_ttl { None } else { ttl.or(current.ttl) };
            let channel = db
                .update_channel(id, &ChannelUpdate { name, ttl })
                .await?
                .ok_or_else(|| anyhow::anyhow!("Unknown channel [id: {id}]"))?;
            print_json(&channel)
        }
        ChannelCommand::Remove { id } => {
            let removed = db
                .delete_channel(id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("Unknown channel [id: {id}]"))?;
            eprintln!("Removed channel {id} and {removed} entries");
            Ok(())
        }
    }
}
