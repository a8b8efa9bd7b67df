//! Field-level comparison of a matched pair.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tasksync_core::Side;

use crate::matcher::MatchedPair;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldChange<T> {
    pub board: T,
    pub work: T,
}

impl<T> FieldChange<T> {
    pub fn value(&self, side: Side) -> &T {
        match side {
            Side::Board => &self.board,
            Side::Work => &self.work,
        }
    }
}

/// Fields on which the two sides of a pair disagree; `None` means equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub description: Option<FieldChange<Option<String>>>,
    pub due_at: Option<FieldChange<Option<DateTime<Utc>>>>,
    pub completed: Option<FieldChange<bool>>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.description.is_none() && self.due_at.is_none() && self.completed.is_none()
    }

    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.description.is_some() {
            fields.push("description");
        }
        if self.due_at.is_some() {
            fields.push("due_at");
        }
        if self.completed.is_some() {
            fields.push("completed");
        }
        fields
    }
}

fn field<T: PartialEq + Clone>(board: &T, work: &T) -> Option<FieldChange<T>> {
    (board != work).then(|| FieldChange {
        board: board.clone(),
        work: work.clone(),
    })
}

/// Compares by value; descriptions are already normalized by the records.
pub fn diff(pair: &MatchedPair) -> ChangeSet {
    ChangeSet {
        description: field(&pair.board.description, &pair.work.description),
        due_at: field(&pair.board.due_at, &pair.work.due_at),
        completed: field(&pair.board.completed, &pair.work.completed),
    }
}
