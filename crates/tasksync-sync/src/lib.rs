//! Reconciliation of tasks between the board and work services.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tasksync_gateways::{MotionGateway, TrelloGateway};
use tokio::fs;

pub mod completion;
pub mod config;
pub mod diff;
pub mod matcher;
pub mod plan;
pub mod reconciler;

pub use completion::{resolve_completed, ResolvedCompletion};
pub use config::SyncConfig;
pub use diff::{diff, ChangeSet, FieldChange};
pub use matcher::{match_tasks, AmbiguousName, MatchResult, MatchedPair};
pub use plan::{plan_batch, plan_pair, SyncAction, SyncPlan};
pub use reconciler::{Operation, Reconciler, SyncError, SyncOutcome, SyncReport, TaskFailure};

pub const CRATE_NAME: &str = "tasksync-sync";

/// Wires the HTTP gateways described by `config` into a reconciler.
pub fn reconciler_from_config(config: &SyncConfig) -> Result<Reconciler> {
    let board = TrelloGateway::new(config.trello.clone(), &config.http)
        .context("building board gateway")?;
    let work = MotionGateway::new(config.motion.clone(), &config.http)
        .context("building work gateway")?;
    let reconciler = Reconciler::new(Arc::new(board), Arc::new(work))?
        .with_field_precedence(config.field_precedence);
    Ok(reconciler)
}

pub async fn run_batch_sync_from_env() -> Result<SyncReport> {
    let config = SyncConfig::from_env()?;
    let reconciler = reconciler_from_config(&config)?;
    Ok(reconciler.run_batch_sync().await?)
}

/// Writes `report` as pretty JSON, creating parent directories as needed.
pub async fn write_report(path: &Path, report: &SyncReport) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let bytes = serde_json::to_vec_pretty(report).context("serializing sync report")?;
    fs::write(path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
