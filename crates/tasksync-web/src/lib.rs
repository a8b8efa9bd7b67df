//! Webhook endpoint that turns service notifications into reconciliation passes.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tasksync_core::Side;
use tasksync_gateways::optional_env;
use tasksync_sync::{reconciler_from_config, Reconciler, SyncConfig, SyncError};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub const CRATE_NAME: &str = "tasksync-web";

pub const DEFAULT_BIND: &str = "0.0.0.0:5000";

#[derive(Clone)]
pub struct AppState {
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    pub fn new(reconciler: Reconciler) -> Self {
        Self {
            reconciler: Arc::new(reconciler),
        }
    }
}

/// Minimal view of a Trello webhook delivery.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrelloWebhookPayload {
    #[serde(default)]
    pub action: Option<TrelloAction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrelloAction {
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: TrelloActionData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrelloActionData {
    #[serde(default)]
    pub card: Option<TrelloCardRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrelloCardRef {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub source_side: Side,
    pub source_external_id: String,
    #[serde(default)]
    pub change_kind: Option<String>,
}

impl TrelloWebhookPayload {
    /// Event for the card the action touched, if the action is about a card.
    pub fn into_event(self) -> Option<InboundEvent> {
        let action = self.action?;
        let card = action.data.card?;
        Some(InboundEvent {
            source_side: Side::Board,
            source_external_id: card.id,
            change_kind: Some(action.kind).filter(|k| !k.is_empty()),
        })
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health_handler))
        .route("/webhook", post(trello_webhook_handler).head(webhook_head_handler))
        .route("/events", post(event_handler))
        .route("/sync", post(batch_sync_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(bind: &str, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, "webhook endpoint listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

/// `TASKSYNC_BIND` if set, otherwise `0.0.0.0:$PORT`, otherwise [`DEFAULT_BIND`].
pub fn bind_from_env() -> String {
    optional_env("TASKSYNC_BIND")
        .or_else(|| optional_env("PORT").map(|port| format!("0.0.0.0:{port}")))
        .unwrap_or_else(|| DEFAULT_BIND.to_string())
}

pub async fn serve_from_env() -> anyhow::Result<()> {
    let config = SyncConfig::from_env()?;
    let reconciler = reconciler_from_config(&config)?;
    serve(&bind_from_env(), AppState::new(reconciler)).await
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn webhook_head_handler() -> StatusCode {
    StatusCode::OK
}

async fn trello_webhook_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TrelloWebhookPayload>,
) -> Response {
    match payload.into_event() {
        Some(event) => run_event(&state, event).await,
        None => Json(serde_json::json!({ "status": "ignored" })).into_response(),
    }
}

async fn event_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<InboundEvent>,
) -> Response {
    run_event(&state, event).await
}

async fn batch_sync_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.reconciler.run_batch_sync().await {
        Ok(report) => Json(report).into_response(),
        Err(err) => upstream_error(err),
    }
}

async fn run_event(state: &AppState, event: InboundEvent) -> Response {
    info!(
        side = %event.source_side,
        external_id = %event.source_external_id,
        change_kind = event.change_kind.as_deref().unwrap_or("unknown"),
        "received change notification"
    );
    match state
        .reconciler
        .run_single_task_sync(event.source_side, &event.source_external_id)
        .await
    {
        Ok(outcome) => Json(outcome).into_response(),
        Err(err) => upstream_error(err),
    }
}

fn upstream_error(err: SyncError) -> Response {
    warn!(error = %err, "sync pass failed");
    (
        StatusCode::BAD_GATEWAY,
        Json(serde_json::json!({ "error": err.to_string() })),
    )
        .into_response()
}
