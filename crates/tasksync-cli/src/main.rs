use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tasksync_core::{Side, TaskGateway};
use tasksync_gateways::{optional_env, HttpClientConfig, TrelloConfig, TrelloGateway};
use tasksync_sync::{reconciler_from_config, write_report, SyncConfig};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "tasksync")]
#[command(about = "Keeps board cards and work tasks in sync")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one bidirectional batch pass.
    Sync {
        /// Print the planned writes without issuing them.
        #[arg(long)]
        dry_run: bool,
        /// Also write the run report as JSON to this path.
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Reconcile a single task reported changed on one side.
    SyncTask {
        #[arg(long)]
        side: Side,
        #[arg(long)]
        id: String,
    },
    /// Serve the webhook endpoint.
    Serve,
    /// Print the normalized tasks of one side.
    List {
        #[arg(long)]
        side: Side,
    },
    /// Register this deployment's callback URL as a board webhook.
    RegisterWebhook {
        /// Defaults to CALLBACK_URL.
        #[arg(long)]
        callback_url: Option<String>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Sync {
            dry_run: false,
            report: None,
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command.unwrap_or_default() {
        Commands::Sync { dry_run, report } => {
            let config = SyncConfig::from_env()?;
            let reconciler = reconciler_from_config(&config)?;
            if dry_run {
                let plan = reconciler.plan_batch_sync().await?;
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(());
            }
            let summary = reconciler.run_batch_sync().await?;
            if let Some(path) = report {
                write_report(&path, &summary).await?;
            }
            println!(
                "sync complete: run_id={} created_board={} created_work={} updated_board={} updated_work={} unchanged={} failed={}",
                summary.run_id,
                summary.created_on_board,
                summary.created_on_work,
                summary.updated_on_board,
                summary.updated_on_work,
                summary.unchanged,
                summary.failed.len()
            );
            for failure in &summary.failed {
                eprintln!(
                    "failed: side={} operation={:?} name={:?} error={}",
                    failure.side, failure.operation, failure.name, failure.error
                );
            }
        }
        Commands::SyncTask { side, id } => {
            let config = SyncConfig::from_env()?;
            let reconciler = reconciler_from_config(&config)?;
            let outcome = reconciler.run_single_task_sync(side, &id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Commands::Serve => {
            tasksync_web::serve_from_env().await?;
        }
        Commands::List { side } => {
            let config = SyncConfig::from_env()?;
            let reconciler = reconciler_from_config(&config)?;
            let tasks = reconciler
                .gateway(side)
                .list_tasks()
                .await
                .with_context(|| format!("listing {side} tasks"))?;
            for task in &tasks {
                let marker = if task.completed { "x" } else { " " };
                println!("[{marker}] {}  {}", task.name, task.external_id);
            }
        }
        Commands::RegisterWebhook { callback_url } => {
            let callback_url = callback_url
                .or_else(|| optional_env("CALLBACK_URL"))
                .context("pass --callback-url or set CALLBACK_URL")?;
            let gateway = TrelloGateway::new(TrelloConfig::from_env()?, &HttpClientConfig::from_env())?;
            let webhook = gateway
                .register_webhook(&callback_url, "tasksync card changes")
                .await?;
            println!(
                "webhook registered: id={} callback={} model={} active={}",
                webhook.id, webhook.callback_url, webhook.id_model, webhook.active
            );
        }
    }

    Ok(())
}
