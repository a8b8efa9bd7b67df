//! Pure planning: turns two fetched task lists into the writes a pass would issue.

use serde::Serialize;
use tasksync_core::{Side, TaskRecord, TaskUpdate};

use crate::completion::resolve_completed;
use crate::diff::diff;
use crate::matcher::{match_tasks, AmbiguousName, MatchedPair};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncAction {
    /// Create `source` on `target`; `source` comes from the other side.
    Create { target: Side, source: TaskRecord },
    /// Rewrite `current` (a `target` record) to the values in `update`.
    Update {
        target: Side,
        current: TaskRecord,
        update: TaskUpdate,
        fields: Vec<&'static str>,
    },
}

impl SyncAction {
    pub fn target(&self) -> Side {
        match self {
            SyncAction::Create { target, .. } | SyncAction::Update { target, .. } => *target,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SyncAction::Create { source, .. } => &source.name,
            SyncAction::Update { current, .. } => &current.name,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncPlan {
    pub actions: Vec<SyncAction>,
    /// Matched pairs that already agree.
    pub unchanged: usize,
    pub ambiguous: Vec<AmbiguousName>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn creates_on(&self, side: Side) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, SyncAction::Create { target, .. } if *target == side))
            .count()
    }

    pub fn updates_on(&self, side: Side) -> usize {
        self.actions
            .iter()
            .filter(|a| matches!(a, SyncAction::Update { target, .. } if *target == side))
            .count()
    }
}

/// Plans the updates for one matched pair.
///
/// Description and due date come from `precedence`; completion follows
/// [`resolve_completed`]. A side is only written when its values differ from
/// the resolved ones, and an empty diff yields no actions at all.
pub fn plan_pair(pair: &MatchedPair, precedence: Side) -> Vec<SyncAction> {
    let changes = diff(pair);
    if changes.is_empty() {
        return Vec::new();
    }

    let resolved = resolve_completed(pair.board.completed, pair.work.completed);
    let winner = pair.record(precedence);

    Side::ALL
        .into_iter()
        .filter_map(|side| {
            let current = pair.record(side);
            let mut update = TaskUpdate::for_record(current);
            update.description = winner.description.clone();
            update.due_at = winner.due_at;
            update.completed = resolved.value;
            if update.matches(current) {
                return None;
            }
            Some(SyncAction::Update {
                target: side,
                fields: changed_fields(current, &update),
                current: current.clone(),
                update,
            })
        })
        .collect()
}

/// Plans one full bidirectional pass over two fetched lists.
pub fn plan_batch(board: Vec<TaskRecord>, work: Vec<TaskRecord>, precedence: Side) -> SyncPlan {
    let matched = match_tasks(board, work);
    let mut actions = Vec::new();

    for source in matched.only_board {
        actions.push(SyncAction::Create {
            target: Side::Work,
            source,
        });
    }
    for source in matched.only_work {
        actions.push(SyncAction::Create {
            target: Side::Board,
            source,
        });
    }

    let mut unchanged = 0usize;
    for pair in &matched.pairs {
        let pair_actions = plan_pair(pair, precedence);
        if pair_actions.is_empty() {
            unchanged += 1;
        }
        actions.extend(pair_actions);
    }

    SyncPlan {
        actions,
        unchanged,
        ambiguous: matched.ambiguous,
    }
}

fn changed_fields(current: &TaskRecord, update: &TaskUpdate) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if current.description != update.description {
        fields.push("description");
    }
    if current.due_at != update.due_at {
        fields.push("due_at");
    }
    if current.completed != update.completed {
        fields.push("completed");
    }
    fields
}
