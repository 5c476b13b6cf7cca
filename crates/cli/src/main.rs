use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{prompt, render};
use trainer_core::config::{self, AppConfig};
use trainer_core::pipeline::{self, Pipeline, PipelineMode, PipelineSummary};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Check { json } => run_pipeline(cfg, PipelineMode::Check, json, true).await,
        Commands::Upload { json } => run_pipeline(cfg, PipelineMode::Upload, json, true).await,
        Commands::Train { json, yes } => run_pipeline(cfg, PipelineMode::Train, json, yes).await,
        Commands::Run { json, yes } => run_pipeline(cfg, PipelineMode::All, json, yes).await,
    }
}

#[derive(Parser)]
#[command(name = "vision-trainer")]
#[command(about = "Image dataset ingestion and Custom Vision training", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the dataset and report corrupt images
    Check {
        #[arg(long)]
        json: bool,
    },
    /// Scan, reconcile tags and upload images
    Upload {
        #[arg(long)]
        json: bool,
    },
    /// Train, evaluate and publish using images already in the project
    Train {
        #[arg(long)]
        json: bool,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Full pipeline: check, upload, train, evaluate, publish, report
    Run {
        #[arg(long)]
        json: bool,
        #[arg(short, long)]
        yes: bool,
    },
}

async fn run_pipeline(cfg: AppConfig, mode: PipelineMode, json: bool, yes: bool) -> Result<()> {
    let summary = execute(cfg, mode, yes).await?;
    if json {
        let out = render::summary_json(mode, &summary)?;
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        for line in render::summary_lines(mode, &summary) {
            println!("{line}");
        }
    }
    Ok(())
}

async fn execute(cfg: AppConfig, mode: PipelineMode, yes: bool) -> Result<PipelineSummary> {
    info!("Running {} pipeline", mode.label());
    if yes || mode == PipelineMode::Check {
        return pipeline::run_with_mode_summary(cfg, mode).await;
    }
    let service = pipeline::build_service(&cfg)?;
    Pipeline::new(cfg, service)
        .with_confirmation(prompt::confirm_training)
        .run(mode)
        .await
}
