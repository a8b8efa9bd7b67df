//! Completion is sticky: done on either side means done on both.

use serde::Serialize;
use tasksync_core::Side;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolvedCompletion {
    pub value: bool,
    /// Side still reporting the stale value, if the two disagree.
    pub side_to_update: Option<Side>,
}

pub fn resolve_completed(board_completed: bool, work_completed: bool) -> ResolvedCompletion {
    let side_to_update = match (board_completed, work_completed) {
        (true, false) => Some(Side::Work),
        (false, true) => Some(Side::Board),
        _ => None,
    };
    ResolvedCompletion {
        value: board_completed || work_completed,
        side_to_update,
    }
}
