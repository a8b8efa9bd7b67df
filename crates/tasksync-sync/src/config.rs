use anyhow::{Context, Result};
use tasksync_core::Side;
use tasksync_gateways::{optional_env, HttpClientConfig, MotionConfig, TrelloConfig};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub trello: TrelloConfig,
    pub motion: MotionConfig,
    pub http: HttpClientConfig,
    /// Side whose description and due date win when a batch pass finds them different.
    pub field_precedence: Side,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self> {
        let field_precedence = match optional_env("TASKSYNC_FIELD_PRECEDENCE") {
            Some(value) => value
                .parse::<Side>()
                .context("parsing TASKSYNC_FIELD_PRECEDENCE")?,
            None => Side::Work,
        };
        Ok(Self {
            trello: TrelloConfig::from_env().context("loading board service settings")?,
            motion: MotionConfig::from_env().context("loading work service settings")?,
            http: HttpClientConfig::from_env(),
            field_precedence,
        })
    }
}
