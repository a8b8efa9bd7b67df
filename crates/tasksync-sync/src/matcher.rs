//! Name-keyed pairing of board and work tasks.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;
use tasksync_core::{Side, TaskRecord};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedPair {
    pub board: TaskRecord,
    pub work: TaskRecord,
}

impl MatchedPair {
    /// Places two records of opposite origin into their slots.
    pub fn from_records(first: TaskRecord, second: TaskRecord) -> Self {
        match first.origin {
            Side::Board => Self {
                board: first,
                work: second,
            },
            Side::Work => Self {
                board: second,
                work: first,
            },
        }
    }

    pub fn record(&self, side: Side) -> &TaskRecord {
        match side {
            Side::Board => &self.board,
            Side::Work => &self.work,
        }
    }
}

/// A name that occurs more than once within one side's list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AmbiguousName {
    pub side: Side,
    pub name: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub pairs: Vec<MatchedPair>,
    pub only_board: Vec<TaskRecord>,
    pub only_work: Vec<TaskRecord>,
    pub ambiguous: Vec<AmbiguousName>,
}

/// Pairs tasks by exact, case-sensitive name.
///
/// Duplicate names pair in list order: the first board task named `n` takes the
/// first work task named `n`, the second takes the second, and any surplus lands
/// in the matching `only_*` bucket. Every input record ends up in exactly one bucket.
pub fn match_tasks(board: Vec<TaskRecord>, work: Vec<TaskRecord>) -> MatchResult {
    let mut ambiguous = duplicated_names(Side::Board, &board);
    ambiguous.extend(duplicated_names(Side::Work, &work));
    for dup in &ambiguous {
        warn!(
            side = %dup.side,
            name = %dup.name,
            occurrences = dup.occurrences,
            "duplicate task name; pairing in list order"
        );
    }

    let mut lookup: HashMap<String, VecDeque<usize>> = HashMap::new();
    for (idx, task) in work.iter().enumerate() {
        lookup.entry(task.name.clone()).or_default().push_back(idx);
    }

    let mut work_slots: Vec<Option<TaskRecord>> = work.into_iter().map(Some).collect();
    let mut pairs = Vec::new();
    let mut only_board = Vec::new();

    for board_task in board {
        let hit = lookup
            .get_mut(&board_task.name)
            .and_then(VecDeque::pop_front)
            .and_then(|idx| work_slots[idx].take());
        match hit {
            Some(work_task) => pairs.push(MatchedPair {
                board: board_task,
                work: work_task,
            }),
            None => only_board.push(board_task),
        }
    }

    let only_work = work_slots.into_iter().flatten().collect();

    MatchResult {
        pairs,
        only_board,
        only_work,
        ambiguous,
    }
}

/// First record on `candidates` carrying `name`, if any.
pub fn find_by_name<'a>(candidates: &'a [TaskRecord], name: &str) -> Option<&'a TaskRecord> {
    candidates.iter().find(|t| t.name == name)
}

fn duplicated_names(side: Side, tasks: &[TaskRecord]) -> Vec<AmbiguousName> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for task in tasks {
        *counts.entry(task.name.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(name, occurrences)| AmbiguousName {
            side,
            name: name.to_string(),
            occurrences,
        })
        .collect()
}
