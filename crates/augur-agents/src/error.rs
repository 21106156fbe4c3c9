use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Agent timed out after {0} ms")]
    Timeout(u64),

    #[error("Agent failed: {0}")]
    Failed(String),

    #[error("Agent panicked: {0}")]
    Panicked(String),

    #[error("Data source error: {0}")]
    Data(String),

    #[error("Claude CLI error: {0}")]
    Cli(String),

    #[error("Cache error: {0}")]
    Cache(#[from] augur_cache::CacheError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AggregationError {
    #[error("No usable agent results: all {total} agents failed")]
    NoSurvivingAgents { total: usize },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    #[error("No current price available for {0}")]
    MissingPrice(String),

    #[error("Invalid holding: {0}")]
    InvalidHolding(String),
}
