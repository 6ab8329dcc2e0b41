use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pantry_gateway::db::{self, ActionLogRepo, ItemRepo};
use pantry_gateway::{ApiServer, Config};

/// Pantry - Voice-driven inventory gateway for restaurant kitchens
#[derive(Parser)]
#[command(name = "pantry", version, about)]
struct Cli {
    /// Port to listen on
    #[arg(long, env = "PANTRY_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Seed the catalog from a JSON file of {name, quantity, unit} items
    SeedCatalog {
        /// Path to the JSON file
        path: std::path::PathBuf,
    },
    /// List the catalog
    Items,
    /// Show recent inventory actions
    Actions {
        /// Number of actions to show
        #[arg(short, long, default_value = "20")]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,pantry_gateway=info",
        1 => "info,pantry_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.port)?;

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::SeedCatalog { path } => seed_catalog(&config, &path).await,
            Command::Items => list_items(&config),
            Command::Actions { lines } => list_actions(&config, lines),
        };
    }

    tracing::info!(
        port = config.port,
        data_dir = %config.data_dir.display(),
        "starting pantry gateway"
    );

    let pool = db::init(config.db_path())?;
    let server = ApiServer::new(&config, pool);

    if config.api_keys.openai.is_some() {
        tracing::info!("pantry gateway ready");
    } else {
        tracing::info!("pantry gateway ready (no API key: rule extraction, exact item names)");
    }

    server.run().await?;

    Ok(())
}

/// One catalog entry in a seed file
#[derive(serde::Deserialize)]
struct SeedItem {
    name: String,
    #[serde(default)]
    quantity: f64,
    unit: String,
}

/// Seed the catalog from a JSON file, embedding names when possible
async fn seed_catalog(config: &Config, path: &std::path::Path) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(path)?;
    let seed: Vec<SeedItem> = serde_json::from_str(&raw)?;

    let pool = db::init(config.db_path())?;
    let items = ItemRepo::new(pool);

    let embedder = config
        .api_keys
        .openai
        .as_ref()
        .and_then(|key| db::Embedder::with_model(key.clone(), config.embed_model.clone()).ok());

    let mut seeded = 0usize;
    for entry in seed {
        let name = entry.name.trim().to_lowercase();
        let Some(unit) = pantry_gateway::units::lookup(&entry.unit) else {
            tracing::warn!(item = %name, unit = %entry.unit, "unknown unit, skipped");
            continue;
        };

        let embedding = match &embedder {
            Some(embedder) => match embedder.embed(&name).await {
                Ok(embedding) => Some(embedding),
                Err(e) => {
                    tracing::warn!(error = %e, item = %name, "embedding failed, stored without vector");
                    None
                }
            },
            None => None,
        };

        items.upsert(&name, entry.quantity, unit.canonical, embedding.as_deref())?;
        seeded += 1;
    }

    println!("Seeded {seeded} items");
    Ok(())
}

/// List the catalog
fn list_items(config: &Config) -> anyhow::Result<()> {
    let pool = db::init(config.db_path())?;
    let items = ItemRepo::new(pool);

    for item in items.list()? {
        println!("{:<30} {:>10} {}", item.name, item.quantity, item.unit);
    }

    Ok(())
}

/// Show recent inventory actions, newest first
fn list_actions(config: &Config, lines: usize) -> anyhow::Result<()> {
    let pool = db::init(config.db_path())?;
    let actions = ActionLogRepo::new(pool);

    for record in actions.list_recent(lines)? {
        let undone = if record.undone { " (undone)" } else { "" };
        println!(
            "{} {:<7} {:<24} {} -> {} {}{}",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.action,
            record.item_name,
            record.previous_quantity,
            record.new_quantity,
            record.unit,
            undone
        );
    }

    Ok(())
}
