use std::path::PathBuf;

use clap::{Parser, Subcommand};
use recs_worker::Result;
use recs_worker::config::{Config, get_config_dir};
use recs_worker::worker::Worker;

#[derive(Parser)]
#[command(name = "recs-worker")]
#[command(about = "Background worker that turns item and like changes into recommendation feeds")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the SQLite database
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the polling worker
    Run {
        /// Forget item tracking progress and re-embed everything from scratch
        #[arg(long)]
        reindex: bool,
    },
    /// Show pending work and index size
    Status,
    /// Show the active configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir().map_err(|e| recs_worker::RecsError::Config(e.to_string()))?,
    };
    let config = Config::load(&config_dir)?;

    match cli.command {
        Commands::Run { reindex } => {
            Worker::new(config).await?.start(reindex).await?;
        }
        Commands::Status => {
            let worker = Worker::new(config).await?;
            let status = worker.status().await?;

            println!("Items:           {}", status.items_total);
            println!("Pending items:   {}", format_pending(status.items_pending));
            println!("Pending likes:   {}", format_pending(status.likes_pending));
            println!("Indexed vectors: {}", status.indexed_vectors);
        }
        Commands::Config => {
            let rendered = toml::to_string_pretty(&config)
                .map_err(|e| recs_worker::RecsError::Config(e.to_string()))?;
            println!("# {}", config.config_file_path().display());
            print!("{rendered}");
        }
    }

    Ok(())
}

fn format_pending(count: Option<i64>) -> String {
    match count {
        Some(count) => count.to_string(),
        None => "not attached".to_string(),
    }
}
