use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use ipbes_notifier::app::{self, Application};
use ipbes_notifier::cli::{Cli, Commands};
use ipbes_notifier::{Config, Database, Result};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match Config::load_or_default(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };
    config.apply_env_overrides();
    cli.command.apply_overrides(&mut config);

    // Initialize logging
    if let Err(e) = ipbes_notifier::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        ipbes_notifier::logging::init_console_only(&config.logging.level);
    }

    match execute(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Commands, config: Config) -> Result<()> {
    match command {
        Commands::Init { .. } => {
            let db = Database::open(&config.database.url).await?;
            println!(
                "Database ready at {} (schema version {})",
                config.database.url,
                db.schema_version().await?
            );
        }
        Commands::AddTopic { name, url, .. } => {
            let db = Database::open(&config.database.url).await?;
            let topic = app::add_topic(&db, &name, &url).await?;
            println!("Added topic {} ({})", topic.name, topic.url);
        }
        Commands::ListTopics { .. } => {
            let db = Database::open(&config.database.url).await?;
            let report = app::topic_report(&db).await?;
            if report.is_empty() {
                println!("No topics. Use add-topic to add one.");
            }
            for line in report {
                println!(
                    "{}\t{}\t{} subscriber(s)\t{} seen",
                    line.topic.name, line.topic.url, line.subscribers, line.seen
                );
            }
        }
        Commands::Run { .. } => {
            info!("IPBES notifier starting");
            Application::new(config).await?.run().await?;
        }
    }
    Ok(())
}
