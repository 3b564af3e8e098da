/// Trellis CLI - command-line interface for the workflow dependency engine
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use trellis_core::{ConfigManager, TrellisConfig};

mod commands;

use commands::{analyze, deps, init, layout};

#[derive(Parser)]
#[command(name = "trellis")]
#[command(about = "Task dependency workflows for construction projects", long_about = None)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (defaults to ~/.trellis/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the SQLite database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Override log level
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config and create the database
    Init,

    /// Manage task dependencies of a project
    #[command(subcommand)]
    Deps(deps::DepsCommands),

    /// Show critical path, parallel groups and bottlenecks
    Analyze {
        /// Project identifier
        #[arg(short, long)]
        project: String,

        /// JSON file with the project's tasks
        #[arg(short, long)]
        tasks: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show node positions
    Layout {
        /// Project identifier
        #[arg(short, long)]
        project: String,

        /// JSON file with the project's tasks
        #[arg(short, long)]
        tasks: PathBuf,

        /// Ignore saved positions and lay the graph out again
        #[arg(long)]
        auto: bool,

        /// Persist the resulting positions
        #[arg(long)]
        save: bool,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },
}

/// Load configuration, then apply environment and flag overrides
fn load_config(args: &Args) -> anyhow::Result<ConfigManager> {
    let mut manager = ConfigManager::load(args.config.as_deref())?;
    manager.load_from_env()?;

    if let Some(db) = &args.db {
        let db = if db.is_absolute() {
            db.clone()
        } else {
            std::env::current_dir()?.join(db)
        };
        manager.config_mut().storage.sqlite_path = db.to_string_lossy().to_string();
    }

    manager.validate()?;
    Ok(manager)
}

fn build_subscriber(level: &str, compact: bool) -> Box<dyn tracing::Subscriber + Send + Sync> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if compact {
        Box::new(builder.compact().finish())
    } else {
        Box::new(builder.finish())
    }
}

fn init_tracing(config: &TrellisConfig, override_level: Option<&str>) -> anyhow::Result<()> {
    let log_level = override_level.unwrap_or(&config.logging.level);
    let subscriber = build_subscriber(log_level, config.logging.format == "compact");
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Config loading logs before the configured level is known
    let startup = build_subscriber(args.log_level.as_deref().unwrap_or("info"), false);
    let manager = tracing::subscriber::with_default(startup, || load_config(&args))?;
    init_tracing(manager.config(), args.log_level.as_deref())?;
    let config = manager.config();

    match args.command {
        Commands::Init => {
            init::execute(&manager).await?;
        }

        Commands::Deps(ref cmd) => {
            deps::execute(config, cmd).await?;
        }

        Commands::Analyze {
            ref project,
            ref tasks,
            ref format,
        } => {
            analyze::execute(config, project, tasks, format).await?;
        }

        Commands::Layout {
            ref project,
            ref tasks,
            auto,
            save,
            ref format,
        } => {
            layout::execute(config, project, tasks, auto, save, format).await?;
        }
    }

    Ok(())
}
