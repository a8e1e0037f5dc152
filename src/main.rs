use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::Serialize;
use tracewatch::adapters::SimulatedSource;
use tracewatch::api::HttpJobSource;
use tracewatch::config::AppConfig;
use tracewatch::core::{JobSource, JobWatcher, badge_for};
use tracewatch::{cli, logging};

/// Pause between steps of the simulated job.
const SIMULATION_STEP: Duration = Duration::from_millis(800);

#[derive(Parser)]
#[command(name = "tracewatch")]
#[command(about = "Live progress viewer for trace collection jobs", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ./tracewatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: GlobalArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Follow a job until it finishes or you quit
    Watch(WatchArgs),
    /// Fetch and print one snapshot of a job
    Status(StatusArgs),
}

#[derive(Args, Serialize)]
struct GlobalArgs {
    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Debug-level logging
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Watch a scripted job instead of the real service
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    simulation: bool,
}

#[derive(Args)]
struct WatchArgs {
    job_id: String,

    /// Print each merged view as a JSON line instead of drawing the TUI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct StatusArgs {
    job_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::load(path, Some(&cli.overrides))?,
        None => AppConfig::new(Some(&cli.overrides))?,
    };

    let mut log_config = config.log_config();
    if matches!(&cli.command, Commands::Watch(args) if !args.json) {
        log_config.quiet_console = true;
    }
    logging::init(log_config)?;

    match &cli.command {
        Commands::Watch(args) => {
            let source = build_source(&config, &args.job_id)?;
            let mut watcher = JobWatcher::new(source, config.watch_settings());
            if args.json {
                run_json(&mut watcher, &args.job_id)
                    .await
                    .context("Failed to watch job")?
            } else {
                cli::tui::run(&mut watcher, &args.job_id)
                    .await
                    .context("Failed to run TUI")?
            }
        }
        Commands::Status(args) => {
            let source = build_source(&config, &args.job_id)?;
            run_status(source.as_ref(), &args.job_id)
                .await
                .context("Failed to fetch job status")?
        }
    }

    Ok(())
}

fn build_source(config: &AppConfig, job_id: &str) -> Result<Arc<dyn JobSource>> {
    if config.simulation {
        tracing::info!("Simulation mode: using scripted job source");
        let (source, controller) = SimulatedSource::new();
        let job_id = job_id.to_string();
        let devices = vec!["SIM-PIXEL-01".to_string(), "SIM-PIXEL-02".to_string()];
        tokio::spawn(async move {
            controller.run_script(&job_id, &devices, SIMULATION_STEP).await;
        });
        return Ok(Arc::new(source));
    }

    let source = HttpJobSource::new(&config.api_url, &config.jobs_path, config.request_timeout())
        .context("Failed to build HTTP client")?
        .with_traces_path(&config.traces_path);
    Ok(Arc::new(source))
}

async fn run_json(watcher: &mut JobWatcher, job_id: &str) -> Result<()> {
    let mut views = watcher.watch(job_id).await;

    let result = loop {
        let view = views.borrow_and_update().clone();
        println!("{}", serde_json::to_string(&view)?);

        let finished = view.job.as_ref().is_some_and(|job| job.status.is_terminal());
        if finished && !view.is_live {
            break Ok(());
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            changed = views.changed() => {
                if changed.is_err() {
                    break Ok(());
                }
            }
        }
    };

    watcher.stop().await;
    result
}

async fn run_status(source: &dyn JobSource, job_id: &str) -> Result<()> {
    let job = source.fetch_job(job_id).await?;
    let badge = badge_for(&job.status);

    println!("Job {}  [{}] ({})", job.job_id, badge.label, badge.color.css_class());
    println!("  Devices:  {}", job.device_serials.join(", "));
    println!("  Created:  {}", job.created_at.to_rfc3339());
    if let Some(updated_at) = job.updated_at {
        println!("  Updated:  {}", updated_at.to_rfc3339());
    }
    if let Some(duration) = job.duration {
        println!("  Duration: {duration}s");
    }
    if let Some(config_id) = &job.config_id {
        println!("  Config:   {config_id}");
    }
    if let Some(summary) = &job.result_summary {
        println!("  Summary:  {summary}");
    }

    Ok(())
}
