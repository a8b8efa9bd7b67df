//! Work-side gateway speaking the Motion task API.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tasksync_core::{GatewayError, NewTask, Side, TaskGateway, TaskRecord, TaskUpdate};
use tracing::{debug, instrument, warn};

use crate::http::{ApiClient, HttpClientConfig, Idempotency, TokenBucketConfig};
use crate::{optional_env, required_env};

pub const DEFAULT_MOTION_API_BASE: &str = "https://api.usemotion.com";
pub const DEFAULT_COMPLETED_STATUS: &str = "Completed";

#[derive(Clone)]
pub struct MotionConfig {
    pub api_base: String,
    pub api_key: String,
    pub workspace_id: String,
    /// Status name that counts as completed.
    pub completed_status: String,
    pub rate_limit: Option<TokenBucketConfig>,
}

impl std::fmt::Debug for MotionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MotionConfig")
            .field("api_base", &self.api_base)
            .field("workspace_id", &self.workspace_id)
            .field("completed_status", &self.completed_status)
            .finish_non_exhaustive()
    }
}

impl MotionConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_base: optional_env("MOTION_API_BASE")
                .unwrap_or_else(|| DEFAULT_MOTION_API_BASE.to_string()),
            api_key: required_env("MOTION_API_KEY")?,
            workspace_id: required_env("MOTION_WORKSPACE_ID")?,
            completed_status: optional_env("MOTION_COMPLETED_STATUS")
                .unwrap_or_else(|| DEFAULT_COMPLETED_STATUS.to_string()),
            rate_limit: optional_env("MOTION_RATE_LIMIT_PER_MIN")
                .and_then(|v| v.parse().ok())
                .map(TokenBucketConfig::per_minute),
        })
    }
}

#[derive(Debug, Deserialize)]
struct MotionTaskPage {
    #[serde(default)]
    tasks: Vec<MotionTask>,
    #[serde(default)]
    meta: Option<MotionMeta>,
}

#[derive(Debug, Deserialize)]
struct MotionMeta {
    #[serde(default, rename = "nextCursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MotionTask {
    id: String,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, rename = "dueDate")]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    status: Option<MotionStatus>,
}

#[derive(Debug, Clone, Deserialize)]
struct MotionStatus {
    name: String,
}

#[derive(Debug, Serialize)]
struct CreateTaskBody<'a> {
    name: &'a str,
    #[serde(rename = "workspaceId")]
    workspace_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(rename = "dueDate", skip_serializing_if = "Option::is_none")]
    due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct UpdateTaskBody<'a> {
    name: &'a str,
    description: &'a str,
    #[serde(rename = "dueDate")]
    due_date: Option<DateTime<Utc>>,
    /// Omitted unless completing; the open status is owned by Motion.
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<&'a str>,
}

#[derive(Debug)]
pub struct MotionGateway {
    config: MotionConfig,
    http: ApiClient,
}

impl MotionGateway {
    pub fn new(config: MotionConfig, http: &HttpClientConfig) -> Result<Self, GatewayError> {
        let http = http.clone().with_token_bucket(config.rate_limit);
        Ok(Self {
            http: ApiClient::new(Side::Work, &http)?,
            config,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .inner()
            .request(method, self.url(path))
            .header("X-API-Key", &self.config.api_key)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn normalize(&self, task: MotionTask) -> TaskRecord {
        let completed = task
            .status
            .as_ref()
            .is_some_and(|s| s.name == self.config.completed_status);
        TaskRecord::new(Side::Work, task.id, task.name)
            .with_description(task.description)
            .with_due_at(task.due_date)
            .with_completed(completed)
    }
}

#[async_trait]
impl TaskGateway for MotionGateway {
    fn side(&self) -> Side {
        Side::Work
    }

    #[instrument(level = "debug", skip(self), fields(workspace_id = %self.config.workspace_id))]
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, GatewayError> {
        let mut records = Vec::new();
        let mut seen_cursors = HashSet::new();
        let mut cursor: Option<String> = None;

        loop {
            // Without includeAllStatuses Motion hides resolved tasks.
            let mut request = self.request(Method::GET, "tasks").query(&[
                ("workspaceId", self.config.workspace_id.as_str()),
                ("includeAllStatuses", "true"),
            ]);
            if let Some(cursor) = &cursor {
                request = request.query(&[("cursor", cursor.as_str())]);
            }

            let page: MotionTaskPage = self.http.send_json(request, Idempotency::Idempotent).await?;
            debug!(tasks = page.tasks.len(), "fetched motion task page");
            records.extend(page.tasks.into_iter().map(|t| self.normalize(t)));

            match page.meta.and_then(|m| m.next_cursor).filter(|c| !c.is_empty()) {
                Some(next) if seen_cursors.insert(next.clone()) => cursor = Some(next),
                Some(next) => {
                    warn!(cursor = %next, "motion returned a repeated cursor; stopping pagination");
                    break;
                }
                None => break,
            }
        }

        Ok(records)
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_task(&self, external_id: &str) -> Result<Option<TaskRecord>, GatewayError> {
        let request = self.request(Method::GET, &format!("tasks/{external_id}"));
        match self.http.send_json::<MotionTask>(request, Idempotency::Idempotent).await {
            Ok(task) => Ok(Some(self.normalize(task))),
            Err(err) if err.status() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    #[instrument(level = "debug", skip(self, task), fields(name = %task.name))]
    async fn create_task(&self, task: &NewTask) -> Result<TaskRecord, GatewayError> {
        let request = self.request(Method::POST, "tasks").json(&CreateTaskBody {
            name: &task.name,
            workspace_id: &self.config.workspace_id,
            description: task.description.as_deref(),
            due_date: task.due_at,
        });
        let created: MotionTask = self.http.send_json(request, Idempotency::NonIdempotent).await?;
        Ok(self.normalize(created))
    }

    #[instrument(level = "debug", skip(self, update), fields(external_id = %update.external_id))]
    async fn update_task(&self, update: &TaskUpdate) -> Result<TaskRecord, GatewayError> {
        let request = self
            .request(Method::PATCH, &format!("tasks/{}", update.external_id))
            .json(&UpdateTaskBody {
                name: &update.name,
                description: update.description.as_deref().unwrap_or_default(),
                due_date: update.due_at,
                status: update
                    .completed
                    .then_some(self.config.completed_status.as_str()),
            });
        let updated: MotionTask = self.http.send_json(request, Idempotency::Idempotent).await?;
        Ok(self.normalize(updated))
    }
}
