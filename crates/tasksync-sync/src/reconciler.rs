//! Batch and event-driven reconciliation passes over two gateways.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tasksync_core::{GatewayError, Side, TaskGateway, TaskRecord, TaskUpdate};
use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::matcher::{find_by_name, AmbiguousName, MatchedPair};
use crate::plan::{plan_batch, plan_pair, SyncAction, SyncPlan};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetching {side} tasks failed: {source}")]
    Fetch {
        side: Side,
        #[source]
        source: GatewayError,
    },
    #[error("gateway for {actual} wired into the {expected} slot")]
    MisplacedGateway { expected: Side, actual: Side },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
    /// Follow-up update marking a freshly created task done.
    CompleteAfterCreate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub side: Side,
    pub operation: Operation,
    pub name: String,
    pub external_id: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created_on_board: usize,
    pub created_on_work: usize,
    pub updated_on_board: usize,
    pub updated_on_work: usize,
    pub unchanged: usize,
    pub failed: Vec<TaskFailure>,
    pub ambiguous: Vec<AmbiguousName>,
}

impl SyncReport {
    fn start(run_id: Uuid, started_at: DateTime<Utc>, plan: &SyncPlan) -> Self {
        Self {
            run_id,
            started_at,
            finished_at: started_at,
            created_on_board: 0,
            created_on_work: 0,
            updated_on_board: 0,
            updated_on_work: 0,
            unchanged: plan.unchanged,
            failed: Vec::new(),
            ambiguous: plan.ambiguous.clone(),
        }
    }

    pub fn writes(&self) -> usize {
        self.created_on_board + self.created_on_work + self.updated_on_board + self.updated_on_work
    }

    fn record_create(&mut self, side: Side) {
        match side {
            Side::Board => self.created_on_board += 1,
            Side::Work => self.created_on_work += 1,
        }
    }

    fn record_update(&mut self, side: Side) {
        match side {
            Side::Board => self.updated_on_board += 1,
            Side::Work => self.updated_on_work += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    Created { side: Side, external_id: String },
    Updated { sides: Vec<Side> },
    NoOp,
    NotFound { side: Side, external_id: String },
    /// `written` lists the sides changed before `failure` stopped the pass.
    Failed {
        failure: TaskFailure,
        written: Vec<Side>,
    },
}

/// A create that went through, plus the follow-up completion if that failed.
struct CreatedTask {
    record: TaskRecord,
    completion_failure: Option<TaskFailure>,
}

pub struct Reconciler {
    board: Arc<dyn TaskGateway>,
    work: Arc<dyn TaskGateway>,
    precedence: Side,
}

impl Reconciler {
    pub fn new(board: Arc<dyn TaskGateway>, work: Arc<dyn TaskGateway>) -> Result<Self, SyncError> {
        for (expected, gateway) in [(Side::Board, &board), (Side::Work, &work)] {
            if gateway.side() != expected {
                return Err(SyncError::MisplacedGateway {
                    expected,
                    actual: gateway.side(),
                });
            }
        }
        Ok(Self {
            board,
            work,
            precedence: Side::Work,
        })
    }

    /// Side whose description and due date win in batch passes.
    pub fn with_field_precedence(mut self, precedence: Side) -> Self {
        self.precedence = precedence;
        self
    }

    pub fn field_precedence(&self) -> Side {
        self.precedence
    }

    pub fn gateway(&self, side: Side) -> &Arc<dyn TaskGateway> {
        match side {
            Side::Board => &self.board,
            Side::Work => &self.work,
        }
    }

    async fn list(&self, side: Side) -> Result<Vec<TaskRecord>, SyncError> {
        self.gateway(side)
            .list_tasks()
            .await
            .map_err(|source| SyncError::Fetch { side, source })
    }

    /// Fetches both lists concurrently; either failure aborts the pass.
    pub async fn fetch_both(&self) -> Result<(Vec<TaskRecord>, Vec<TaskRecord>), SyncError> {
        tokio::try_join!(self.list(Side::Board), self.list(Side::Work))
    }

    /// Fetches and plans a batch pass without writing anything.
    pub async fn plan_batch_sync(&self) -> Result<SyncPlan, SyncError> {
        let (board, work) = self.fetch_both().await?;
        Ok(plan_batch(board, work, self.precedence))
    }

    pub async fn run_batch_sync(&self) -> Result<SyncReport, SyncError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("batch_sync", %run_id);
        async move {
            let started_at = Utc::now();
            let plan = self.plan_batch_sync().await?;
            info!(
                actions = plan.actions.len(),
                unchanged = plan.unchanged,
                "planned batch sync"
            );
            let report = self.apply(run_id, started_at, plan).await;
            info!(
                writes = report.writes(),
                failed = report.failed.len(),
                "batch sync finished"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Executes every action in order; a failed action is recorded and the rest still run.
    pub async fn apply(&self, run_id: Uuid, started_at: DateTime<Utc>, plan: SyncPlan) -> SyncReport {
        let mut report = SyncReport::start(run_id, started_at, &plan);

        for action in plan.actions {
            match action {
                SyncAction::Create { target, source } => {
                    match self.create_on(target, &source).await {
                        Ok(created) => {
                            report.record_create(target);
                            report.failed.extend(created.completion_failure);
                        }
                        Err(failure) => report.failed.push(failure),
                    }
                }
                SyncAction::Update {
                    target,
                    current,
                    update,
                    fields,
                } => match self.update_on(target, &current, &update, &fields).await {
                    Ok(_) => report.record_update(target),
                    Err(failure) => report.failed.push(failure),
                },
            }
        }

        report.finished_at = Utc::now();
        report
    }

    /// Reconciles one task reported changed on `source_side`.
    ///
    /// The notifying side wins for description and due date.
    pub async fn run_single_task_sync(
        &self,
        source_side: Side,
        source_external_id: &str,
    ) -> Result<SyncOutcome, SyncError> {
        let span = info_span!("event_sync", side = %source_side, external_id = source_external_id);
        async move {
            let source = self
                .gateway(source_side)
                .get_task(source_external_id)
                .await
                .map_err(|source| SyncError::Fetch {
                    side: source_side,
                    source,
                })?;
            let Some(source) = source else {
                info!("source task no longer exists");
                return Ok(SyncOutcome::NotFound {
                    side: source_side,
                    external_id: source_external_id.to_string(),
                });
            };

            let target_side = source_side.other();
            let candidates = self.list(target_side).await?;
            let same_name = candidates.iter().filter(|t| t.name == source.name).count();
            if same_name > 1 {
                warn!(
                    side = %target_side,
                    name = %source.name,
                    occurrences = same_name,
                    "duplicate task name; using the first"
                );
            }

            let Some(counterpart) = find_by_name(&candidates, &source.name).cloned() else {
                return Ok(match self.create_on(target_side, &source).await {
                    Ok(CreatedTask {
                        completion_failure: Some(failure),
                        ..
                    }) => SyncOutcome::Failed {
                        failure,
                        written: vec![target_side],
                    },
                    Ok(CreatedTask { record, .. }) => SyncOutcome::Created {
                        side: target_side,
                        external_id: record.external_id,
                    },
                    Err(failure) => SyncOutcome::Failed {
                        failure,
                        written: Vec::new(),
                    },
                });
            };

            let pair = MatchedPair::from_records(source, counterpart);
            let actions = plan_pair(&pair, source_side);
            if actions.is_empty() {
                return Ok(SyncOutcome::NoOp);
            }

            let mut sides = Vec::with_capacity(actions.len());
            for action in actions {
                if let SyncAction::Update {
                    target,
                    current,
                    update,
                    fields,
                } = action
                {
                    if let Err(failure) = self.update_on(target, &current, &update, &fields).await {
                        if !sides.is_empty() {
                            warn!(written = ?sides, "event sync stopped after a partial write");
                        }
                        return Ok(SyncOutcome::Failed {
                            failure,
                            written: sides,
                        });
                    }
                    sides.push(target);
                }
            }
            Ok(SyncOutcome::Updated { sides })
        }
        .instrument(span)
        .await
    }

    /// `Err` only when the create itself failed; the record then does not exist.
    async fn create_on(&self, target: Side, source: &TaskRecord) -> Result<CreatedTask, TaskFailure> {
        let gateway = self.gateway(target);
        let created = gateway
            .create_task(&source.to_new_task())
            .await
            .map_err(|err| {
                warn!(side = %target, name = %source.name, error = %err, "create failed");
                TaskFailure {
                    side: target,
                    operation: Operation::Create,
                    name: source.name.clone(),
                    external_id: None,
                    error: err.to_string(),
                }
            })?;
        info!(side = %target, name = %created.name, external_id = %created.external_id, "created task");

        if !source.completed || created.completed {
            return Ok(CreatedTask {
                record: created,
                completion_failure: None,
            });
        }

        let mut update = TaskUpdate::for_record(&created);
        update.completed = true;
        match gateway.update_task(&update).await {
            Ok(completed) => Ok(CreatedTask {
                record: completed,
                completion_failure: None,
            }),
            Err(err) => {
                warn!(side = %target, name = %created.name, error = %err, "completing new task failed");
                let failure = TaskFailure {
                    side: target,
                    operation: Operation::CompleteAfterCreate,
                    name: created.name.clone(),
                    external_id: Some(created.external_id.clone()),
                    error: err.to_string(),
                };
                Ok(CreatedTask {
                    record: created,
                    completion_failure: Some(failure),
                })
            }
        }
    }

    async fn update_on(
        &self,
        target: Side,
        current: &TaskRecord,
        update: &TaskUpdate,
        fields: &[&'static str],
    ) -> Result<TaskRecord, TaskFailure> {
        let updated = self.gateway(target).update_task(update).await.map_err(|err| {
            warn!(side = %target, name = %current.name, error = %err, "update failed");
            TaskFailure {
                side: target,
                operation: Operation::Update,
                name: current.name.clone(),
                external_id: Some(current.external_id.clone()),
                error: err.to_string(),
            }
        })?;
        info!(side = %target, name = %current.name, fields = ?fields, "updated task");
        Ok(updated)
    }
}
