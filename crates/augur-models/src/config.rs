use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level configuration for augur.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AugurConfig {
    pub cache: CacheConfig,
    pub agents: AgentsConfig,
    pub aggregation: AggregationConfig,
    pub tasks: TasksConfig,
    pub position: PositionConfig,
    pub narrator: NarratorConfig,
    pub server: ServerConfig,
}

/// Configuration for the data-source cache layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the shared SQLite cache file (written by the data pipeline, read by augur).
    pub sqlite_path: String,
    /// Maximum number of entries in the in-memory moka cache.
    pub memory_max_capacity: u64,
    /// How long a read stays in memory, in seconds.
    pub memory_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/augur_cache.db".to_string(),
            memory_max_capacity: 10_000,
            memory_ttl_seconds: 60,
        }
    }
}

/// Configuration for agent dispatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Timeout for a single agent attempt in seconds.
    pub agent_timeout_seconds: u64,
    /// Attempts per agent unless the analyst overrides it.
    pub default_max_attempts: u32,
    /// Pause between attempts of the same agent.
    pub retry_backoff_ms: u64,
    /// Cap on agents running at once. None = launch all together.
    pub max_concurrent_agents: Option<usize>,
    /// Hard deadline for a whole task. None = derived from the agent budget.
    pub max_task_duration_seconds: Option<u64>,
    /// Share of the 0-100 progress range spent in the agent phase.
    pub agent_phase_percent: u8,
    pub analysts: Vec<AnalystConfig>,
}

impl AgentsConfig {
    pub fn agent_timeout(&self) -> Duration {
        Duration::from_secs(self.agent_timeout_seconds)
    }

    /// Total task budget: explicit setting, or timeout × attempts × agents plus slack.
    pub fn max_task_duration(&self, agent_count: usize) -> Duration {
        if let Some(secs) = self.max_task_duration_seconds {
            return Duration::from_secs(secs);
        }
        let max_attempts = self
            .analysts
            .iter()
            .filter(|a| a.enabled)
            .map(|a| a.max_attempts.unwrap_or(self.default_max_attempts))
            .max()
            .unwrap_or(self.default_max_attempts)
            .max(1);
        let per_agent = self.agent_timeout_seconds * u64::from(max_attempts);
        Duration::from_secs(per_agent * agent_count.max(1) as u64 + 30)
    }
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            agent_timeout_seconds: 60,
            default_max_attempts: 1,
            retry_backoff_ms: 250,
            max_concurrent_agents: None,
            max_task_duration_seconds: None,
            agent_phase_percent: 85,
            analysts: vec![
                AnalystConfig::new("technical", "technical", 0.25, None),
                AnalystConfig::new("fundamental", "fundamental", 0.25, Some(3)),
                AnalystConfig::new("sentiment", "sentiment", 0.15, None),
                AnalystConfig::new("policy", "policy", 0.15, None),
                AnalystConfig::new("risk", "risk", 0.20, Some(3)),
            ],
        }
    }
}

/// Configuration for a single analyst agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalystConfig {
    pub name: String,
    pub domain: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Override of `AgentsConfig::default_max_attempts`.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl AnalystConfig {
    pub fn new(name: &str, domain: &str, weight: f64, max_attempts: Option<u32>) -> Self {
        Self {
            name: name.to_string(),
            domain: domain.to_string(),
            weight,
            max_attempts,
            enabled: true,
        }
    }
}

/// Configuration for signal aggregation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AggregationConfig {
    /// Largest position size the aggregator may suggest (fraction of capital).
    pub max_position_cap: f64,
    /// Weight for agents missing from the weight table.
    pub default_weight: f64,
    /// Agents allowed to force `hold` through a veto.
    pub veto_agents: Vec<String>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_position_cap: 0.3,
            default_weight: 1.0,
            veto_agents: vec!["risk".to_string()],
        }
    }
}

/// Task retention.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TasksConfig {
    /// How long a task stays queryable after creation.
    pub retention_seconds: u64,
    pub max_tasks: u64,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            retention_seconds: 24 * 60 * 60,
            max_tasks: 10_000,
        }
    }
}

/// Position decision thresholds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PositionConfig {
    /// Minimum aggregated confidence before recommending `add`.
    pub add_confidence_threshold: f64,
    /// Daily volatility assumed when the data source has none.
    pub default_daily_volatility: f64,
    /// A completed signal younger than this is reused instead of re-running analysis.
    pub signal_max_age_seconds: u64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            add_confidence_threshold: 0.75,
            default_daily_volatility: 0.025,
            signal_max_age_seconds: 3600,
        }
    }
}

/// Optional text-generation collaborator used for narrative reasoning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct NarratorConfig {
    pub enabled: bool,
    pub model: String,
    pub timeout_seconds: u64,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            model: "claude-3-5-haiku-latest".to_string(),
            timeout_seconds: 45,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}
