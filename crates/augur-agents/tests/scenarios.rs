//! End-to-end analysis scenarios.
//!
//! Each test either seeds an in-memory SQLite cache and runs the built-in
//! analysts against it, or uses scripted agents to pin exact confidences,
//! then dispatches and aggregates the way a task does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use augur_agents::analysts::{
    ActionModel, ActionPrediction, FundamentalAnalyst, ModelAnalyst, PolicyAnalyst, RiskAnalyst,
    SentimentAnalyst, TechnicalAnalyst,
};
use augur_agents::test_support::{
    bullish_snapshot, halted_snapshot, PanickingAgent, RecordingSink, ScriptedAgent,
};
use augur_agents::{
    AgentError, AgentRegistry, AggregationError, Calibrator, DataSource, DispatchSettings,
    Dispatcher, SignalAggregator,
};
use augur_cache::{CacheReader, SqliteReader};
use augur_models::{AggregationConfig, CacheRow, Direction};
use chrono::{Duration as ChronoDuration, Utc};
use tokio_util::sync::CancellationToken;

fn category_of(key: &str) -> &'static str {
    match key.split(':').next() {
        Some("quote") => "market_data",
        Some("indicator") => "indicator",
        Some("fundamental") => "fundamental",
        Some("sentiment") => "sentiment",
        Some("policy") => "policy",
        _ => "risk",
    }
}

fn setup_cache(symbol: &str, snapshot: serde_json::Value) -> Arc<CacheReader> {
    let sqlite = SqliteReader::open_in_memory().unwrap();
    let now = Utc::now();
    for (key, value) in snapshot.as_object().unwrap() {
        sqlite
            .insert(&CacheRow {
                key: key.clone(),
                as_of: None,
                category: category_of(key).to_string(),
                value_json: value.to_string(),
                source: "test".to_string(),
                symbol: Some(symbol.to_string()),
                created_at: now.to_rfc3339(),
                expires_at: (now + ChronoDuration::hours(1)).to_rfc3339(),
                updated_at: now.to_rfc3339(),
            })
            .unwrap();
    }
    Arc::new(CacheReader::new(sqlite, 100, Duration::from_secs(60)))
}

fn analyst_registry(source: Arc<dyn DataSource>) -> AgentRegistry {
    let calibrator = Calibrator::default();
    AgentRegistry::new()
        .with(
            Arc::new(TechnicalAnalyst::new("technical", source.clone(), calibrator.clone())),
            0.25,
            1,
        )
        .with(
            Arc::new(FundamentalAnalyst::new("fundamental", source.clone(), calibrator.clone())),
            0.25,
            3,
        )
        .with(
            Arc::new(SentimentAnalyst::new("sentiment", source.clone(), calibrator.clone())),
            0.15,
            1,
        )
        .with(
            Arc::new(PolicyAnalyst::new("policy", source.clone(), calibrator.clone())),
            0.15,
            1,
        )
        .with(Arc::new(RiskAnalyst::new("risk", source, calibrator)), 0.20, 3)
}

fn settings() -> DispatchSettings {
    DispatchSettings {
        agent_timeout: Duration::from_millis(500),
        retry_backoff: Duration::from_millis(5),
        max_concurrent: None,
        agent_phase_percent: 85,
    }
}

async fn run(
    symbol: &str,
    registry: &AgentRegistry,
) -> Result<augur_models::AggregatedSignal, AggregationError> {
    let outcome = Dispatcher::new(settings())
        .dispatch(
            symbol,
            None,
            registry.agents(),
            &RecordingSink::default(),
            &CancellationToken::new(),
        )
        .await;
    let results = outcome.ordered(registry.agents());
    SignalAggregator::new(AggregationConfig::default(), registry.weights()).aggregate(symbol, &results)
}

#[tokio::test]
async fn three_longs_outvote_a_hold() {
    let registry = AgentRegistry::new()
        .with(Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.8)), 1.0, 1)
        .with(Arc::new(ScriptedAgent::returning("fundamental", Direction::Long, 0.7)), 1.0, 1)
        .with(Arc::new(ScriptedAgent::returning("sentiment", Direction::Long, 0.75)), 1.0, 1)
        .with(Arc::new(ScriptedAgent::returning("policy", Direction::Hold, 0.4)), 1.0, 1);

    let signal = run("600519", &registry).await.unwrap();

    assert_eq!(signal.direction, Direction::Long);
    assert_eq!(signal.num_agreeing_agents, 3);
    assert_eq!(signal.num_surviving_agents, 4);
    assert!((signal.confidence - 0.75).abs() < 1e-9);
    assert!((signal.votes.hold - 0.4).abs() < 1e-9);
    assert!(signal.position_size > 0.0 && signal.position_size <= 0.3);
}

#[tokio::test]
async fn risk_veto_overrides_bullish_majority() {
    let registry = AgentRegistry::new()
        .with(Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.9)), 0.25, 1)
        .with(Arc::new(ScriptedAgent::returning("fundamental", Direction::Long, 0.85)), 0.25, 1)
        .with(
            Arc::new(ScriptedAgent::vetoing("risk", 0.9, "000002 trading halted")),
            0.20,
            3,
        );

    let signal = run("000002", &registry).await.unwrap();

    assert_eq!(signal.direction, Direction::Hold);
    assert_eq!(signal.position_size, 0.0);
    assert!(signal.is_vetoed());
    assert!(signal.reasoning.contains("000002 trading halted"));
}

#[tokio::test]
async fn failing_agents_are_isolated() {
    let registry = AgentRegistry::new()
        .with(Arc::new(ScriptedAgent::returning("technical", Direction::Short, 0.7)), 1.0, 1)
        .with(Arc::new(ScriptedAgent::failing("sentiment", "rate limited")), 1.0, 1)
        .with(Arc::new(PanickingAgent::new("policy")), 1.0, 1);

    let signal = run("000001", &registry).await.unwrap();

    assert_eq!(signal.direction, Direction::Short);
    assert_eq!(signal.num_surviving_agents, 1);
    assert_eq!(signal.num_errored_agents, 2);
    // Failed agents keep their weight in the denominator.
    assert!((signal.confidence - (0.7f64 / 3.0).sqrt()).abs() < 1e-9);
}

#[tokio::test]
async fn every_agent_failing_is_an_aggregation_error() {
    let registry = AgentRegistry::new()
        .with(Arc::new(ScriptedAgent::failing("technical", "no data")), 1.0, 1)
        .with(Arc::new(ScriptedAgent::failing("fundamental", "no data")), 1.0, 2);

    assert_eq!(
        run("000001", &registry).await,
        Err(AggregationError::NoSurvivingAgents { total: 2 })
    );
}

struct OutOfRangeModel;

#[async_trait::async_trait]
impl ActionModel for OutOfRangeModel {
    async fn predict(
        &self,
        _symbol: &str,
        _features: &serde_json::Value,
    ) -> Result<ActionPrediction, AgentError> {
        Ok(ActionPrediction {
            action_index: 5,
            probability: 0.9,
        })
    }
}

#[tokio::test]
async fn out_of_range_model_action_counts_as_hold() {
    let source: Arc<dyn DataSource> = setup_cache("600036", bullish_snapshot("600036"));
    let registry = AgentRegistry::new()
        .with(
            Arc::new(ModelAnalyst::new("ppo", source, Arc::new(OutOfRangeModel))),
            1.0,
            1,
        )
        .with(Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.6)), 1.0, 1);

    let signal = run("600036", &registry).await.unwrap();

    assert_eq!(signal.direction, Direction::Long);
    assert_eq!(signal.num_surviving_agents, 2);
    assert!(signal.reasoning.contains("[ppo] hold"));
}

#[tokio::test]
async fn bullish_cache_data_yields_long_signal() {
    let source: Arc<dyn DataSource> = setup_cache("600519", bullish_snapshot("600519"));
    let registry = analyst_registry(source);

    let signal = run("600519", &registry).await.unwrap();

    assert_eq!(signal.direction, Direction::Long);
    assert_eq!(signal.num_errored_agents, 0);
    assert_eq!(signal.num_agreeing_agents, 5);
    assert!(signal.confidence > 0.8, "got {}", signal.confidence);
    assert!(signal.position_size <= 0.3);
}

#[tokio::test]
async fn halted_stock_is_vetoed_from_cache_data() {
    let source: Arc<dyn DataSource> = setup_cache("601318", halted_snapshot("601318"));
    let registry = analyst_registry(source);

    let signal = run("601318", &registry).await.unwrap();

    assert_eq!(signal.direction, Direction::Hold);
    let veto = signal.vetoed_by.unwrap();
    assert_eq!(veto.agent, "risk");
    assert_eq!(veto.reason, "601318 trading halted");
}

#[tokio::test]
async fn empty_cache_yields_low_conviction_hold() {
    let source: Arc<dyn DataSource> = setup_cache("688981", serde_json::json!({}));
    let registry = analyst_registry(source);

    let signal = run("688981", &registry).await.unwrap();

    // Every analyst reports zero-confidence hold, so nothing is voted.
    assert_eq!(signal.direction, Direction::Hold);
    assert_eq!(signal.confidence, 0.0);
    assert_eq!(signal.num_surviving_agents, 5);
}

#[tokio::test]
async fn weights_come_from_registry() {
    let registry = AgentRegistry::new()
        .with(Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.9)), 0.1, 1)
        .with(Arc::new(ScriptedAgent::returning("fundamental", Direction::Short, 0.6)), 0.9, 1);

    let signal = run("600519", &registry).await.unwrap();
    let weights: HashMap<String, f64> = registry.weights();

    assert_eq!(weights["fundamental"], 0.9);
    assert_eq!(signal.direction, Direction::Short);
}
