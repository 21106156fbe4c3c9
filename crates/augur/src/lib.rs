//! Augur - A-share multi-agent analysis engine
//!
//! Runs a panel of analyst agents over cached market data for one symbol,
//! aggregates their calibrated views into a single trading signal, and turns
//! that signal into a recommendation for an existing position.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use augur::models::{AugurConfig, Holding};
//! use augur::tasks::TaskManager;
//! use augur::{build_engine, Engine};
//! ```

pub use augur_agents as agents;
pub use augur_cache as cache;
pub use augur_models as models;
pub use augur_tasks as tasks;

pub mod engine;
pub mod server;

pub use engine::{Engine, EngineError, PositionAnalysis};

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use augur_agents::analysts::{
    FundamentalAnalyst, PolicyAnalyst, RiskAnalyst, SentimentAnalyst, TechnicalAnalyst,
};
use augur_agents::claude_cli::{ClaudeCli, ClaudeCliConfig};
use augur_agents::{Agent, AgentRegistry, Calibrator, DataSource, TextGenerator};
use augur_cache::{CacheReader, SqliteReader};
use augur_models::AugurConfig;
use augur_tasks::TaskManager;
use tracing::info;

/// Build the analyst registry from the `[agents]` section.
///
/// Disabled analysts are skipped. Agents outside the built-in domains (for
/// example a [`agents::analysts::ModelAnalyst`]) are registered in code.
pub fn build_registry(
    config: &AugurConfig,
    source: Arc<dyn DataSource>,
    narrator: Option<Arc<dyn TextGenerator>>,
) -> Result<AgentRegistry, anyhow::Error> {
    let calibrator = Calibrator::default();
    let mut registry = AgentRegistry::new();

    for analyst in config.agents.analysts.iter().filter(|a| a.enabled) {
        let name = analyst.name.clone();
        let source = Arc::clone(&source);
        let agent: Arc<dyn Agent> = match analyst.domain.as_str() {
            "technical" => Arc::new(TechnicalAnalyst::new(name, source, calibrator.clone())),
            "fundamental" => Arc::new(FundamentalAnalyst::new(name, source, calibrator.clone())),
            "risk" => Arc::new(RiskAnalyst::new(name, source, calibrator.clone())),
            "sentiment" => {
                let agent = SentimentAnalyst::new(name, source, calibrator.clone());
                match &narrator {
                    Some(n) => Arc::new(agent.with_narrator(Arc::clone(n))),
                    None => Arc::new(agent),
                }
            }
            "policy" => {
                let agent = PolicyAnalyst::new(name, source, calibrator.clone());
                match &narrator {
                    Some(n) => Arc::new(agent.with_narrator(Arc::clone(n))),
                    None => Arc::new(agent),
                }
            }
            other => bail!("Unknown analyst domain {other:?} for agent {:?}", analyst.name),
        };
        let max_attempts = analyst
            .max_attempts
            .unwrap_or(config.agents.default_max_attempts);
        registry.register(agent, analyst.weight, max_attempts);
    }

    if registry.is_empty() {
        bail!("No analysts enabled in configuration");
    }
    Ok(registry)
}

/// Build an Engine from configuration: SQLite-backed data source, the
/// configured analysts, and a task manager.
pub fn build_engine(config: &AugurConfig) -> Result<Engine, anyhow::Error> {
    let sqlite = SqliteReader::open(&config.cache.sqlite_path)?;
    let cache = Arc::new(CacheReader::new(
        sqlite,
        config.cache.memory_max_capacity,
        Duration::from_secs(config.cache.memory_ttl_seconds),
    ));
    let source: Arc<dyn DataSource> = cache;

    let narrator: Option<Arc<dyn TextGenerator>> = if config.narrator.enabled {
        Some(Arc::new(ClaudeCli::new(ClaudeCliConfig::from(&config.narrator))))
    } else {
        None
    };

    let registry = build_registry(config, Arc::clone(&source), narrator)?;
    info!(
        agents = ?registry.names(),
        cache = %config.cache.sqlite_path,
        narrator = config.narrator.enabled,
        "Engine configured"
    );
    let tasks = TaskManager::from_config(registry, config);
    Ok(Engine::new(tasks, source, config))
}
