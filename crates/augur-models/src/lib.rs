pub mod agent_result;
pub mod cache_schema;
pub mod config;
pub mod position;
pub mod signal;
pub mod task;

pub use agent_result::{AgentResult, Direction};
pub use cache_schema::{CacheCategory, CacheRow};
pub use config::{
    AgentsConfig, AggregationConfig, AnalystConfig, AugurConfig, CacheConfig, NarratorConfig,
    PositionConfig, ServerConfig, TasksConfig,
};
pub use position::{
    Holding, MarketContext, PositionAction, PositionRecommendation, RecoveryEstimate, Urgency,
};
pub use signal::{AggregatedSignal, AnalysisReport, Veto, VoteTally};
pub use task::{AnalysisTask, ProgressMessage, TaskEvent, TaskFilter, TaskStatus};
