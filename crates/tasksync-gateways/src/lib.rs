//! Service gateways: HTTP clients for the board and work services plus an in-memory backend.

use anyhow::{Context, Result};

pub mod http;
pub mod memory;
pub mod motion;
pub mod trello;

pub use http::{BackoffPolicy, HttpClientConfig, TokenBucketConfig};
pub use memory::{InMemoryGateway, RecordedWrite};
pub use motion::{MotionConfig, MotionGateway};
pub use trello::{TrelloConfig, TrelloGateway, TrelloWebhook};

pub const CRATE_NAME: &str = "tasksync-gateways";

pub fn required_env(name: &str) -> Result<String> {
    let value = std::env::var(name)
        .with_context(|| format!("missing required environment variable {name}"))?;
    if value.trim().is_empty() {
        anyhow::bail!("environment variable {name} is empty");
    }
    Ok(value)
}

pub fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
