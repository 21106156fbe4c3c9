use std::time::Duration;

use augur_agents::AggregationError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TaskError {
    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Task exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}
