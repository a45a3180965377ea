use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use devnews::{ArticleFilter, Config, Database, IngestScheduler, NewsService};

#[derive(Parser)]
#[command(name = "devnews", version, about = "Developer news aggregator")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch all sources once and print the report as JSON
    Fetch,
    /// Delete old permanently dismissed articles
    Clean,
    /// Run ingestion and cleanup on their intervals until interrupted
    Run,
    /// List stored articles, newest first
    List {
        /// Only unread articles
        #[arg(long)]
        unread: bool,
        /// Hide permanently dismissed articles
        #[arg(long)]
        hide_dismissed: bool,
        /// Maximum number of articles
        #[arg(short, long, default_value_t = 30)]
        limit: usize,
    },
}

fn load_config(path: &Path) -> Config {
    let mut config = match Config::load(path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", path.display());
            eprintln!("Using default configuration.");
            Config::default()
        }
    };
    config.apply_env_overrides();
    config
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = load_config(&cli.config);

    if let Err(e) = devnews::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        devnews::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = config.validate() {
        error!("{}", e);
        return ExitCode::FAILURE;
    }

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: &Config) -> devnews::Result<()> {
    let db = Database::open(&config.database.path).await?;
    let service = NewsService::from_config(db, config)?;

    match command {
        Command::Fetch => {
            let report = service.run_ingestion().await;
            let json = serde_json::to_string_pretty(&report)
                .map_err(|e| devnews::DevNewsError::Validation(e.to_string()))?;
            println!("{}", json);
        }
        Command::Clean => {
            let deleted = service.cleanup().await?;
            println!("Deleted {} article(s)", deleted);
        }
        Command::Run => {
            info!("devnews scheduler starting");
            let scheduler = IngestScheduler::from_config(service.clone(), config);
            scheduler
                .run_until(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for shutdown signal: {}", e);
                    }
                })
                .await;
        }
        Command::List {
            unread,
            hide_dismissed,
            limit,
        } => {
            let mut filter = ArticleFilter::new();
            if unread {
                filter = filter.not_read();
            }
            if hide_dismissed {
                filter = filter.not_dismissed();
            }
            for article in service.list_articles(&filter, limit).await? {
                println!(
                    "{:>6}  {}  [{}] {}\n        {}",
                    article.id,
                    article.published_at.format("%Y-%m-%d %H:%M"),
                    article.source_type,
                    article.title,
                    article.url
                );
            }
        }
    }

    service.shutdown().await;
    Ok(())
}
