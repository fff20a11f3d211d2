use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use promptcv_store::assist::{AssistClient, AssistTask};
use promptcv_store::models::AppTag;
use promptcv_store::storage::{FileSystemTier, StorageGateway, Tier};
use promptcv_store::{LifecycleEvent, NewModelConfig, PromptCv, StoreConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the `synced/` and `local/` tiers
    #[arg(long, default_value = "./promptcv-data")]
    data_dir: PathBuf,

    /// Disable the browser storage quotas on both tiers
    #[arg(long)]
    no_quota: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Deliver a host lifecycle event
    Lifecycle {
        #[arg(value_enum)]
        event: EventArg,
    },
    /// Manage saved prompts
    #[command(subcommand)]
    Prompts(PromptsCommand),
    /// Copy history
    #[command(subcommand)]
    History(HistoryCommand),
    /// AI model connection profiles
    #[command(subcommand)]
    Models(ModelsCommand),
    /// Scratchpad contents
    #[command(subcommand)]
    Cache(CacheCommand),
    /// Polish or reverse-engineer text with the active model
    Assist {
        #[arg(value_enum)]
        task: TaskArg,
        text: String,
    },
}

#[derive(Subcommand, Debug)]
enum PromptsCommand {
    List {
        /// Only favorites
        #[arg(long)]
        favorites: bool,
    },
    Add {
        #[arg(long)]
        app: AppTag,
        content: String,
    },
    /// Replace a prompt's content, keeping its place in the list
    Edit { id: String, content: String },
    Favorite { id: String },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    List,
    /// Record that a prompt was copied
    Copy { id: String },
}

#[derive(Subcommand, Debug)]
enum ModelsCommand {
    List,
    Add {
        #[arg(long)]
        base_url: String,
        #[arg(long)]
        api_key: String,
        #[arg(long)]
        model: String,
        #[arg(long)]
        name: Option<String>,
    },
    Toggle { index: usize },
    Delete { index: usize },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
    Show,
    Save { content: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum EventArg {
    Install,
    Update,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TaskArg {
    Polish,
    Reverse,
}

fn open_store(args: &Cli) -> PromptCv {
    let mut config = StoreConfig::default();
    if args.no_quota {
        config = config.without_quotas();
    }
    tracing::info!(path = %args.data_dir.display(), "Using filesystem tiers");
    let synced = FileSystemTier::new(Tier::Synced, args.data_dir.join("synced"), config.synced_quota);
    let local = FileSystemTier::new(Tier::Local, args.data_dir.join("local"), config.local_quota);
    PromptCv::new(StorageGateway::new(Arc::new(synced), Arc::new(local)), config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Use `RUST_LOG=info` (or debug, trace, etc.) to control log level
    // Example: RUST_LOG=promptcv_store=debug promptcv prompts list
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    tracing::debug!(args = ?args, "Starting promptcv");
    let store = open_store(&args);

    match args.command {
        Command::Lifecycle { event } => {
            let event = match event {
                EventArg::Install => LifecycleEvent::Install,
                EventArg::Update => LifecycleEvent::Update,
            };
            let report = store
                .run_migration_if_needed(event)
                .await
                .with_context(|| format!("{} migration failed", event))?;
            println!("{:#?}", report);
        }
        Command::Prompts(cmd) => match cmd {
            PromptsCommand::List { favorites } => {
                let prompts = if favorites {
                    store.favorites().await?
                } else {
                    store.prompts_by_recency().await?
                };
                for p in prompts {
                    let star = if p.is_favorite { "*" } else { " " };
                    println!("{} {} [{}] {}", star, p.id, p.app, p.preview(120));
                }
            }
            PromptsCommand::Add { app, content } => {
                let prompt = store.add_prompt(app, &content).await.context("Failed to save prompt")?;
                println!("{}", prompt.id);
            }
            PromptsCommand::Edit { id, content } => {
                store.edit_prompt(&id, &content).await.context("Failed to edit prompt")?;
            }
            PromptsCommand::Favorite { id } => {
                let is_favorite = store.toggle_favorite(&id).await?;
                println!("{} favorite: {}", id, is_favorite);
            }
            PromptsCommand::Delete { id } => {
                store.delete_prompt(&id).await?;
            }
        },
        Command::History(cmd) => match cmd {
            HistoryCommand::List => {
                for (entry, prompt) in store.history_view().await? {
                    println!("{} {} {}", entry.copied_at.to_rfc3339(), prompt.id, prompt.preview(60));
                }
            }
            HistoryCommand::Copy { id } => {
                store.record_copy(&id).await?;
            }
        },
        Command::Models(cmd) => match cmd {
            ModelsCommand::List => {
                for (i, c) in store.get_model_configs().await?.iter().enumerate() {
                    let mark = if c.active { "on " } else { "off" };
                    println!("{} {} {} {} {} {}", i, mark, c.name, c.model_name, c.base_url, c.masked_api_key());
                }
            }
            ModelsCommand::Add {
                base_url,
                api_key,
                model,
                name,
            } => {
                let config = store
                    .add_model_config(NewModelConfig {
                        base_url,
                        api_key,
                        model_name: model,
                        name,
                    })
                    .await?;
                println!("{}", config.id);
            }
            ModelsCommand::Toggle { index } => {
                store.toggle_model(index).await?;
            }
            ModelsCommand::Delete { index } => {
                store.delete_model(index).await?;
            }
        },
        Command::Cache(cmd) => match cmd {
            CacheCommand::Show => {
                let cache = store.get_cache_data().await?;
                println!("{}", cache.content);
            }
            CacheCommand::Save { content } => {
                store.save_cache_content(content).await?;
            }
        },
        Command::Assist { task, text } => {
            let Some(model) = store.active_model().await? else {
                bail!("no active model config; add one with `models add` and enable it with `models toggle`");
            };
            let client = AssistClient::new(store.config().assist_timeout())?;
            let task = match task {
                TaskArg::Polish => AssistTask::Polish,
                TaskArg::Reverse => AssistTask::Reverse,
            };
            let result = client.run(task, &model, &text).await?;
            println!("{}", result);
        }
    }
    Ok(())
}
