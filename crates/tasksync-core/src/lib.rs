//! Core task model and the gateway contract shared by both services.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "tasksync-core";

/// Which external service a record or gateway belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Board,
    Work,
}

impl Side {
    pub const ALL: [Side; 2] = [Side::Board, Side::Work];

    pub fn other(self) -> Side {
        match self {
            Side::Board => Side::Work,
            Side::Work => Side::Board,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::Board => "board",
            Side::Work => "work",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown side `{0}` (expected `board` or `work`)")]
pub struct ParseSideError(pub String);

impl FromStr for Side {
    type Err = ParseSideError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "board" | "a" => Ok(Side::Board),
            "work" | "b" => Ok(Side::Work),
            other => Err(ParseSideError(other.to_string())),
        }
    }
}

/// Normalized task pulled from either service.
///
/// `external_id` is only meaningful to the gateway of `origin`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub origin: Side,
}

impl TaskRecord {
    pub fn new(origin: Side, external_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            name: name.into(),
            description: None,
            due_at: None,
            completed: false,
            origin,
        }
    }

    pub fn with_description(mut self, description: Option<impl Into<String>>) -> Self {
        self.description = normalize_description(description.map(Into::into));
        self
    }

    pub fn with_due_at(mut self, due_at: Option<DateTime<Utc>>) -> Self {
        self.due_at = due_at;
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }

    /// Payload for creating this task on another service.
    pub fn to_new_task(&self) -> NewTask {
        NewTask {
            name: self.name.clone(),
            description: self.description.clone(),
            due_at: self.due_at,
        }
    }
}

/// Empty and whitespace-only descriptions are the same as no description.
pub fn normalize_description(description: Option<String>) -> Option<String> {
    description.filter(|d| !d.trim().is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
}

/// Full replacement of the synced fields of one existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub completed: bool,
}

impl TaskUpdate {
    /// Starts from the current state of `record`, so the id always belongs to the record's side.
    pub fn for_record(record: &TaskRecord) -> Self {
        Self {
            external_id: record.external_id.clone(),
            name: record.name.clone(),
            description: record.description.clone(),
            due_at: record.due_at,
            completed: record.completed,
        }
    }

    /// True when applying this update to `record` would change nothing.
    pub fn matches(&self, record: &TaskRecord) -> bool {
        self.description == record.description
            && self.due_at == record.due_at
            && self.completed == record.completed
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("{side} transport error: {message}")]
    Transport { side: Side, message: String },
    #[error("{side} returned http status {status}: {body}")]
    Status { side: Side, status: u16, body: String },
    #[error("{side} returned a malformed response: {message}")]
    Malformed { side: Side, message: String },
    #[error("gateway configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, GatewayError::Transport { .. })
    }
}

/// Contract each external service client implements.
///
/// Implementations normalize their native representation into [`TaskRecord`]
/// on the way in and denormalize on the way out.
#[async_trait]
pub trait TaskGateway: Send + Sync {
    fn side(&self) -> Side;

    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, GatewayError>;

    /// `Ok(None)` when the service reports the task does not exist.
    async fn get_task(&self, external_id: &str) -> Result<Option<TaskRecord>, GatewayError>;

    async fn create_task(&self, task: &NewTask) -> Result<TaskRecord, GatewayError>;

    async fn update_task(&self, update: &TaskUpdate) -> Result<TaskRecord, GatewayError>;
}
