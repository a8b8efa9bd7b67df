//! In-process gateway holding tasks in memory and recording every write.

use std::collections::HashSet;

use async_trait::async_trait;
use tasksync_core::{GatewayError, NewTask, Side, TaskGateway, TaskRecord, TaskUpdate};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedWrite {
    Create(NewTask),
    Update(TaskUpdate),
}

impl RecordedWrite {
    pub fn name(&self) -> &str {
        match self {
            RecordedWrite::Create(task) => &task.name,
            RecordedWrite::Update(update) => &update.name,
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tasks: Vec<TaskRecord>,
    next_id: usize,
    writes: Vec<RecordedWrite>,
    list_failure: Option<GatewayError>,
    failing_names: HashSet<String>,
    failing_updates: bool,
}

#[derive(Debug)]
pub struct InMemoryGateway {
    side: Side,
    state: Mutex<MemoryState>,
}

impl InMemoryGateway {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// Seeds the gateway; each record's origin is forced to `side`.
    pub fn with_tasks(side: Side, tasks: impl IntoIterator<Item = TaskRecord>) -> Self {
        let tasks = tasks
            .into_iter()
            .map(|mut t| {
                t.origin = side;
                t
            })
            .collect::<Vec<_>>();
        Self {
            side,
            state: Mutex::new(MemoryState {
                next_id: tasks.len(),
                tasks,
                ..MemoryState::default()
            }),
        }
    }

    /// Makes every `list_tasks` call fail with `err`.
    pub fn failing_list(mut self, err: GatewayError) -> Self {
        self.state.get_mut().list_failure = Some(err);
        self
    }

    /// Makes creates and updates of tasks called `name` fail.
    pub fn failing_writes_for(mut self, name: impl Into<String>) -> Self {
        self.state.get_mut().failing_names.insert(name.into());
        self
    }

    /// Makes every update fail while creates keep working.
    pub fn failing_updates(mut self) -> Self {
        self.state.get_mut().failing_updates = true;
        self
    }

    pub async fn tasks(&self) -> Vec<TaskRecord> {
        self.state.lock().await.tasks.clone()
    }

    pub async fn writes(&self) -> Vec<RecordedWrite> {
        self.state.lock().await.writes.clone()
    }

    pub async fn clear_writes(&self) {
        self.state.lock().await.writes.clear();
    }

    pub async fn remove(&self, external_id: &str) -> Option<TaskRecord> {
        let mut state = self.state.lock().await;
        let idx = state.tasks.iter().position(|t| t.external_id == external_id)?;
        Some(state.tasks.remove(idx))
    }

    /// Replaces a stored task in place, simulating an edit made on the service.
    pub async fn edit(&self, external_id: &str, edit: impl FnOnce(&mut TaskRecord)) -> bool {
        let mut state = self.state.lock().await;
        match state.tasks.iter_mut().find(|t| t.external_id == external_id) {
            Some(task) => {
                edit(task);
                true
            }
            None => false,
        }
    }

    fn write_failure(&self, name: &str) -> GatewayError {
        GatewayError::Status {
            side: self.side,
            status: 500,
            body: format!("simulated failure writing `{name}`"),
        }
    }
}

#[async_trait]
impl TaskGateway for InMemoryGateway {
    fn side(&self) -> Side {
        self.side
    }

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, GatewayError> {
        let state = self.state.lock().await;
        if let Some(err) = &state.list_failure {
            return Err(err.clone());
        }
        Ok(state.tasks.clone())
    }

    async fn get_task(&self, external_id: &str) -> Result<Option<TaskRecord>, GatewayError> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .iter()
            .find(|t| t.external_id == external_id)
            .cloned())
    }

    async fn create_task(&self, task: &NewTask) -> Result<TaskRecord, GatewayError> {
        let mut state = self.state.lock().await;
        state.writes.push(RecordedWrite::Create(task.clone()));
        if state.failing_names.contains(&task.name) {
            return Err(self.write_failure(&task.name));
        }

        state.next_id += 1;
        let record = TaskRecord::new(self.side, format!("{}-{}", self.side, state.next_id), &task.name)
            .with_description(task.description.clone())
            .with_due_at(task.due_at);
        state.tasks.push(record.clone());
        Ok(record)
    }

    async fn update_task(&self, update: &TaskUpdate) -> Result<TaskRecord, GatewayError> {
        let mut state = self.state.lock().await;
        state.writes.push(RecordedWrite::Update(update.clone()));
        if state.failing_updates || state.failing_names.contains(&update.name) {
            return Err(self.write_failure(&update.name));
        }

        let side = self.side;
        let Some(task) = state
            .tasks
            .iter_mut()
            .find(|t| t.external_id == update.external_id)
        else {
            return Err(GatewayError::Status {
                side,
                status: 404,
                body: format!("no task with id {}", update.external_id),
            });
        };
        task.name = update.name.clone();
        task.description = update.description.clone();
        task.due_at = update.due_at;
        task.completed = update.completed;
        Ok(task.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_assign_side_scoped_ids() {
        let gw = InMemoryGateway::new(Side::Work);
        let created = gw
            .create_task(&NewTask {
                name: "Plan trip".into(),
                description: Some("".into()),
                due_at: None,
            })
            .await
            .unwrap();
        assert_eq!(created.external_id, "work-1");
        assert_eq!(created.origin, Side::Work);
        assert_eq!(created.description, None);
        assert_eq!(gw.tasks().await.len(), 1);
        assert_eq!(gw.writes().await.len(), 1);
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_a_404() {
        let gw = InMemoryGateway::new(Side::Board);
        let err = gw
            .update_task(&TaskUpdate {
                external_id: "missing".into(),
                name: "x".into(),
                description: None,
                due_at: None,
                completed: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test]
    async fn configured_failures_surface() {
        let gw = InMemoryGateway::new(Side::Board)
            .failing_list(GatewayError::Transport {
                side: Side::Board,
                message: "connection refused".into(),
            })
            .failing_writes_for("Setup");
        assert!(gw.list_tasks().await.unwrap_err().is_transport());
        let err = gw
            .create_task(&NewTask {
                name: "Setup".into(),
                description: None,
                due_at: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
}
