use anyhow::Context;
use clap::{Parser, Subcommand};
use newsletter_podcast::sources::RssFeedSource;
use newsletter_podcast::utils::ci;
use newsletter_podcast::{AppConfig, Pipeline};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "newsletter-podcast", about = "Publish a newsletter RSS feed as a podcast")]
struct Cli {
    /// Path to the YAML configuration
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Overrides logging.level from the configuration
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the feed and publish new episodes
    Run,
    /// Check the configuration and credentials without fetching
    Validate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = dotenvy::dotenv();

    let config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(cli.log_level.as_deref().unwrap_or("info"));
            error!("{}", e);
            ci::notice_error(&e.to_string());
            return ExitCode::FAILURE;
        }
    };
    init_tracing(cli.log_level.as_deref().unwrap_or(&config.logging.level));

    match execute(cli.command, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ci::notice_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn execute(command: Command, config: AppConfig) -> anyhow::Result<()> {
    for warning in config.warnings() {
        warn!("{}", warning);
    }

    match command {
        Command::Validate => {
            config.validate()?;
            config.require_credentials()?;
            info!("Configuration is valid");
        }
        Command::Run => {
            let mut source = RssFeedSource::new(config.feed.url.clone(), config.feed.fetch.clone())?
                .with_title(config.feed.name.clone());
            let pipeline = Pipeline::from_config(config).context("failed to set up pipeline")?;
            let report = pipeline.run(&mut source).await.context("run failed")?;
            info!(
                "Done: {} new item(s), {} episode(s), {} text-only, committed: {}",
                report.new_items, report.episodes_created, report.text_only, report.committed
            );
        }
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let level = level.parse::<Level>().unwrap_or(Level::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();
}
