//! threadwatch CLI
//!
//! Local entry point: runs the poller, single cycles, and manages the
//! subscription store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use threadwatch::{
    config::{build_crawler, load_config},
    error::{AppError, Result},
    models::{Config, Subscription},
    pipeline::Poller,
    query::{FileTypes, TagQuery},
    storage::{LocalStore, ReadModel},
};

/// threadwatch - imageboard subscription relay
#[derive(Parser, Debug)]
#[command(
    name = "threadwatch",
    version,
    about = "Relays new imageboard media to subscribed chats"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "data/config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll boards on the configured interval until Ctrl-C
    Run,

    /// Run a single sync cycle and wait for its deliveries
    Once,

    /// Validate configuration and every stored subscription
    Validate,

    /// Evaluate a tag and type expression against sample input
    Check {
        /// Tag expression, e.g. '"cat"&!"dog"'
        #[arg(long)]
        tags: String,

        /// Type expression, e.g. '.img.webm'
        #[arg(long, default_value = ".img.gif.webm")]
        types: String,

        /// Thread text to match the tags against
        #[arg(long)]
        text: String,

        /// File name to match the types against
        #[arg(long)]
        file: Option<String>,
    },

    /// Manage users
    User {
        #[command(subcommand)]
        action: UserAction,
    },

    /// Manage subscriptions
    Sub {
        #[command(subcommand)]
        action: SubAction,
    },

    /// Show the stored post cursor
    Cursor,
}

#[derive(Subcommand, Debug)]
enum UserAction {
    /// Register a chat
    Add { chat_id: i64 },
}

#[derive(Subcommand, Debug)]
enum SubAction {
    /// Subscribe a chat: `board .types "tag"...`
    Add { chat_id: i64, request: String },

    /// Create a shared subscription: `board .types "tag"... alias`
    Share { request: String },

    /// Delete a shared subscription and unlink every chat from it
    Unshare { alias: String },

    /// Link a chat to a shared subscription
    Join { chat_id: i64, alias: String },

    /// Unlink a subscription from a chat
    Remove { chat_id: i64, id: i64 },

    /// List subscriptions, optionally for one chat or only shared ones
    List {
        #[arg(long, conflicts_with = "shared")]
        chat_id: Option<i64>,

        #[arg(long)]
        shared: bool,
    },
}

/// Initialize logging based on verbosity flag and configured level.
fn init_logging(verbose: bool, level: &str) {
    let level = if verbose { "debug" } else { level };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = Config::load(&cli.config)
        .map(|c| c.logging.level)
        .unwrap_or_else(|_| "info".to_string());
    init_logging(cli.verbose, &level);

    let config = load_config(&cli.config)?;
    log::debug!("Loaded configuration from {}", cli.config.display());

    match cli.command {
        Command::Run => {
            let store = open_store(&config).await?;
            let crawler = Arc::new(build_crawler(&config, store)?);
            let poller = Poller::new(crawler, Duration::from_secs(config.poller.interval_secs));

            log::info!(
                "threadwatch polling every {}s; press Ctrl-C to stop",
                config.poller.interval_secs
            );
            let cycles = poller
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::error!("Cannot listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await;
            log::info!("Stopped after {} cycles", cycles);
        }

        Command::Once => {
            let store = open_store(&config).await?;
            let crawler = build_crawler(&config, store)?;
            let mut report = crawler.run_cycle().await?;
            let dispatched = report.deliveries();
            let completed = report.wait_for_deliveries().await;
            log::info!(
                "Cycle took {}ms; {}/{} deliveries completed",
                (report.finished_at - report.started_at).num_milliseconds(),
                completed,
                dispatched
            );
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            log::info!("✓ Config OK");

            let store = LocalStore::open(&config.storage.path).await?;
            let mut invalid = 0;
            for subscription in store.subscriptions().await? {
                if let Err(e) = TagQuery::parse(&subscription.tags) {
                    log::error!(
                        "Subscription {} on /{}/ has a bad tag expression {:?}: {}",
                        subscription.id,
                        subscription.board,
                        subscription.tags,
                        e
                    );
                    invalid += 1;
                }
                if FileTypes::parse(&subscription.types).is_empty() {
                    log::warn!(
                        "Subscription {} accepts no file types ({:?})",
                        subscription.id,
                        subscription.types
                    );
                }
            }
            if invalid > 0 {
                return Err(AppError::validation(format!(
                    "{invalid} subscriptions have invalid tag expressions"
                )));
            }
            log::info!("All validations passed!");
        }

        Command::Check {
            tags,
            types,
            text,
            file,
        } => {
            let query = TagQuery::parse(&tags)?;
            println!("tags  {:?} -> {}", text, query.matches(&text));
            if let Some(file) = file {
                let types = FileTypes::parse(&types);
                println!("types {:?} ({}) -> {}", file, types, types.matches(&file));
            }
        }

        Command::User { action } => {
            let store = LocalStore::open(&config.storage.path).await?;
            match action {
                UserAction::Add { chat_id } => {
                    let user = store.update(|data| Ok(data.register_user(chat_id))).await?;
                    println!("user {} chat {}", user.id, user.chat_id);
                }
            }
        }

        Command::Sub { action } => {
            let store = LocalStore::open(&config.storage.path).await?;
            match action {
                SubAction::Add { chat_id, request } => {
                    let subscription = Subscription::parse_request(&request)?;
                    let stored = store
                        .update(|data| Ok(data.add_subscription(chat_id, subscription)))
                        .await?;
                    print_subscription(&stored);
                }
                SubAction::Share { request } => {
                    let subscription = Subscription::parse_default_request(&request)?;
                    let stored = store
                        .update(|data| data.add_default_subscription(subscription))
                        .await?;
                    print_subscription(&stored);
                }
                SubAction::Unshare { alias } => {
                    let removed = store.update(|data| data.remove_default(&alias)).await?;
                    log::info!("Removed shared subscription {}", removed.alias);
                    print_subscription(&removed);
                }
                SubAction::Join { chat_id, alias } => {
                    let joined = store
                        .update(|data| data.join_default(chat_id, &alias))
                        .await?;
                    print_subscription(&joined);
                }
                SubAction::Remove { chat_id, id } => {
                    let removed = store
                        .update(|data| Ok(data.remove_subscription(chat_id, id)))
                        .await?;
                    if !removed {
                        log::warn!("Chat {} has no subscription {}", chat_id, id);
                    }
                }
                SubAction::List { chat_id, shared } => {
                    let subscriptions = match chat_id {
                        Some(chat_id) => store.snapshot().await.subscriptions_of(chat_id),
                        None if shared => store.snapshot().await.shared_subscriptions(),
                        None => store.subscriptions().await?,
                    };
                    for subscription in &subscriptions {
                        print_subscription(subscription);
                    }
                    log::info!("{} subscriptions", subscriptions.len());
                }
            }
        }

        Command::Cursor => {
            let store = LocalStore::open(&config.storage.path).await?;
            let cursor = store.cursor().await?;
            let when = chrono::DateTime::from_timestamp(cursor as i64, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "out of range".to_string());
            println!("{cursor} ({when})");
        }
    }

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn ReadModel>> {
    let store = LocalStore::open(&config.storage.path).await?;
    log::info!("Using store {}", store.path().display());
    Ok(Arc::new(store))
}

fn print_subscription(subscription: &Subscription) {
    let alias = if subscription.is_default {
        format!(" [{}]", subscription.alias)
    } else {
        String::new()
    };
    println!(
        "#{} /{}/ {} {}{}",
        subscription.id, subscription.board, subscription.types, subscription.tags, alias
    );
}
