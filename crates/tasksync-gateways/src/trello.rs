//! Board-side gateway speaking the Trello card API.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tasksync_core::{GatewayError, NewTask, Side, TaskGateway, TaskRecord, TaskUpdate};
use tracing::{info, instrument, warn};

use crate::http::{ApiClient, HttpClientConfig, Idempotency};
use crate::{optional_env, required_env};

pub const DEFAULT_TRELLO_API_BASE: &str = "https://api.trello.com";

#[derive(Clone)]
pub struct TrelloConfig {
    pub api_base: String,
    pub api_key: String,
    pub api_token: String,
    pub board_id: String,
    /// List new cards are created in.
    pub list_id: String,
}

impl std::fmt::Debug for TrelloConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrelloConfig")
            .field("api_base", &self.api_base)
            .field("board_id", &self.board_id)
            .field("list_id", &self.list_id)
            .finish_non_exhaustive()
    }
}

impl TrelloConfig {
    pub fn from_env() -> Result<Self> {
        let board_id = required_env("TRELLO_BOARD_ID")?;
        let list_id = match optional_env("TRELLO_LIST_ID") {
            Some(list_id) => list_id,
            None => {
                warn!("TRELLO_LIST_ID not set; creating cards against the board id");
                board_id.clone()
            }
        };
        Ok(Self {
            api_base: optional_env("TRELLO_API_BASE")
                .unwrap_or_else(|| DEFAULT_TRELLO_API_BASE.to_string()),
            api_key: required_env("TRELLO_API_KEY")?,
            api_token: required_env("TRELLO_API_TOKEN")?,
            board_id,
            list_id,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TrelloCard {
    id: String,
    name: String,
    #[serde(default)]
    desc: Option<String>,
    #[serde(default)]
    due: Option<DateTime<Utc>>,
    #[serde(default, rename = "dueComplete")]
    due_complete: bool,
}

impl TrelloCard {
    fn into_record(self) -> TaskRecord {
        TaskRecord::new(Side::Board, self.id, self.name)
            .with_description(self.desc)
            .with_due_at(self.due)
            .with_completed(self.due_complete)
    }
}

#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    #[serde(rename = "callbackURL")]
    callback_url: &'a str,
    #[serde(rename = "idModel")]
    id_model: &'a str,
    description: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrelloWebhook {
    pub id: String,
    #[serde(rename = "callbackURL")]
    pub callback_url: String,
    #[serde(rename = "idModel")]
    pub id_model: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug)]
pub struct TrelloGateway {
    config: TrelloConfig,
    http: ApiClient,
}

impl TrelloGateway {
    pub fn new(config: TrelloConfig, http: &HttpClientConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            config,
            http: ApiClient::new(Side::Board, http)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/1/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .inner()
            .request(method, self.url(path))
            .query(&[
                ("key", self.config.api_key.as_str()),
                ("token", self.config.api_token.as_str()),
            ])
    }

    /// Registers a webhook on the configured board.
    #[instrument(level = "info", skip(self))]
    pub async fn register_webhook(
        &self,
        callback_url: &str,
        description: &str,
    ) -> Result<TrelloWebhook, GatewayError> {
        let request = self.request(Method::POST, "webhooks/").json(&WebhookRequest {
            callback_url,
            id_model: &self.config.board_id,
            description,
        });
        let webhook: TrelloWebhook = self.http.send_json(request, Idempotency::NonIdempotent).await?;
        info!(webhook_id = %webhook.id, "trello webhook registered");
        Ok(webhook)
    }
}

fn format_due(due_at: Option<DateTime<Utc>>) -> String {
    due_at
        .map(|d| d.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| "null".to_string())
}

#[async_trait]
impl TaskGateway for TrelloGateway {
    fn side(&self) -> Side {
        Side::Board
    }

    #[instrument(level = "debug", skip(self), fields(board_id = %self.config.board_id))]
    async fn list_tasks(&self) -> Result<Vec<TaskRecord>, GatewayError> {
        let request = self.request(Method::GET, &format!("boards/{}/cards", self.config.board_id));
        let cards: Vec<TrelloCard> = self.http.send_json(request, Idempotency::Idempotent).await?;
        Ok(cards.into_iter().map(TrelloCard::into_record).collect())
    }

    #[instrument(level = "debug", skip(self))]
    async fn get_task(&self, external_id: &str) -> Result<Option<TaskRecord>, GatewayError> {
        let request = self.request(Method::GET, &format!("cards/{external_id}"));
        match self.http.send_json::<TrelloCard>(request, Idempotency::Idempotent).await {
            Ok(card) => Ok(Some(card.into_record())),
            Err(err) if err.status() == Some(404) => Ok(None),
            Err(err) => Err(err),
        }
    }

    #[instrument(level = "debug", skip(self, task), fields(name = %task.name))]
    async fn create_task(&self, task: &NewTask) -> Result<TaskRecord, GatewayError> {
        let mut params = vec![
            ("idList", self.config.list_id.clone()),
            ("name", task.name.clone()),
            ("desc", task.description.clone().unwrap_or_default()),
        ];
        if task.due_at.is_some() {
            params.push(("due", format_due(task.due_at)));
        }
        let request = self.request(Method::POST, "cards").query(&params);
        let card: TrelloCard = self.http.send_json(request, Idempotency::NonIdempotent).await?;
        Ok(card.into_record())
    }

    #[instrument(level = "debug", skip(self, update), fields(external_id = %update.external_id))]
    async fn update_task(&self, update: &TaskUpdate) -> Result<TaskRecord, GatewayError> {
        let params = [
            ("name", update.name.clone()),
            ("desc", update.description.clone().unwrap_or_default()),
            ("due", format_due(update.due_at)),
            ("dueComplete", update.completed.to_string()),
        ];
        let request = self
            .request(Method::PUT, &format!("cards/{}", update.external_id))
            .query(&params);
        let card: TrelloCard = self.http.send_json(request, Idempotency::Idempotent).await?;
        Ok(card.into_record())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn card_payload_normalizes_into_record() {
        let card: TrelloCard = serde_json::from_str(
            r#"{"id":"c1","name":"Write report","desc":"","due":"2026-03-01T09:00:00.000Z","dueComplete":true,"closed":false}"#,
        )
        .unwrap();
        let record = card.into_record();
        assert_eq!(record.origin, Side::Board);
        assert_eq!(record.external_id, "c1");
        assert_eq!(record.description, None);
        assert!(record.completed);
        assert_eq!(
            record.due_at,
            Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single()
        );
    }

    #[test]
    fn missing_due_is_sent_as_null() {
        assert_eq!(format_due(None), "null");
        let due = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single();
        assert_eq!(format_due(due), "2026-03-01T09:00:00.000Z");
    }

    #[test]
    fn debug_output_hides_credentials() {
        let config = TrelloConfig {
            api_base: DEFAULT_TRELLO_API_BASE.to_string(),
            api_key: "secret-key".to_string(),
            api_token: "secret-token".to_string(),
            board_id: "b1".to_string(),
            list_id: "l1".to_string(),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("b1"));
    }
}
