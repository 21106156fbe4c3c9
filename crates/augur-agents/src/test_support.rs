//! Controllable agents and fixtures for exercising dispatch, aggregation and
//! task lifecycles without real data.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use augur_models::{AgentResult, Direction};
use chrono::NaiveDate;
use serde_json::json;
use tokio::sync::Semaphore;

use crate::agent::Agent;
use crate::dispatcher::ProgressSink;
use crate::error::AgentError;

fn signed_score(direction: Direction, confidence: f64) -> f64 {
    match direction {
        Direction::Long => confidence,
        Direction::Short | Direction::Close => -confidence,
        Direction::Hold => 0.0,
    }
}

/// Returns a fixed result (or error), optionally after a delay.
pub struct ScriptedAgent {
    name: String,
    domain: String,
    outcome: Result<AgentResult, String>,
    delay: Option<Duration>,
}

impl ScriptedAgent {
    pub fn returning(name: &str, direction: Direction, confidence: f64) -> Self {
        Self::with_result(AgentResult::success(
            name,
            name,
            direction,
            confidence,
            signed_score(direction, confidence),
            format!("{name} scripted {direction}"),
        ))
    }

    pub fn with_result(result: AgentResult) -> Self {
        Self {
            name: result.agent_name.clone(),
            domain: result.domain.clone(),
            outcome: Ok(result),
            delay: None,
        }
    }

    pub fn vetoing(name: &str, confidence: f64, reason: &str) -> Self {
        let result = AgentResult::success(
            name,
            name,
            Direction::Hold,
            confidence,
            0.0,
            format!("{name} raised a veto"),
        )
        .with_veto(reason);
        Self::with_result(result)
    }

    pub fn failing(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            domain: name.to_string(),
            outcome: Err(reason.to_string()),
            delay: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        &self.domain
    }

    async fn run(&self, _symbol: &str, _as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcome.clone().map_err(AgentError::Failed)
    }
}

/// Sleeps far longer than any sensible timeout.
pub struct SleepingAgent {
    name: String,
    duration: Duration,
}

impl SleepingAgent {
    pub fn new(name: &str, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            duration,
        }
    }
}

#[async_trait]
impl Agent for SleepingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        &self.name
    }

    async fn run(&self, _symbol: &str, _as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        tokio::time::sleep(self.duration).await;
        Ok(AgentResult::success(
            &self.name,
            &self.name,
            Direction::Hold,
            0.5,
            0.0,
            "woke up",
        ))
    }
}

pub struct PanickingAgent {
    name: String,
}

impl PanickingAgent {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl Agent for PanickingAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        &self.name
    }

    async fn run(&self, symbol: &str, _as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        panic!("{} blew up on {symbol}", self.name);
    }
}

/// Fails the first `failures` calls, then succeeds.
pub struct FlakyAgent {
    name: String,
    failures: u32,
    direction: Direction,
    confidence: f64,
    calls: AtomicU32,
}

impl FlakyAgent {
    pub fn new(name: &str, failures: u32, direction: Direction, confidence: f64) -> Self {
        Self {
            name: name.to_string(),
            failures,
            direction,
            confidence,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for FlakyAgent {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        &self.name
    }

    async fn run(&self, _symbol: &str, _as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(AgentError::Data(format!("upstream unavailable (call {call})")));
        }
        Ok(AgentResult::success(
            &self.name,
            &self.name,
            self.direction,
            self.confidence,
            signed_score(self.direction, self.confidence),
            format!("succeeded on call {call}"),
        ))
    }
}

/// Blocks until the test opens the gate, then returns its result.
pub struct GatedAgent {
    inner: ScriptedAgent,
    gate: Arc<Semaphore>,
}

impl GatedAgent {
    pub fn new(name: &str, direction: Direction, confidence: f64) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        (
            Self {
                inner: ScriptedAgent::returning(name, direction, confidence),
                gate: Arc::clone(&gate),
            },
            gate,
        )
    }
}

#[async_trait]
impl Agent for GatedAgent {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn domain(&self) -> &str {
        self.inner.domain()
    }

    async fn run(&self, symbol: &str, as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| AgentError::Failed(format!("gate closed: {e}")))?;
        self.inner.run(symbol, as_of).await
    }
}

/// Records every progress value it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, u8)>>,
}

impl RecordingSink {
    pub fn progress(&self) -> Vec<u8> {
        self.events
            .lock()
            .map(|e| e.iter().map(|(_, p)| *p).collect())
            .unwrap_or_default()
    }

    pub fn agents(&self) -> Vec<String> {
        self.events
            .lock()
            .map(|e| e.iter().map(|(a, _)| a.clone()).collect())
            .unwrap_or_default()
    }
}

impl ProgressSink for RecordingSink {
    fn agent_finished(&self, result: &AgentResult, _completed: usize, _total: usize, progress: u8) {
        if let Ok(mut events) = self.events.lock() {
            events.push((result.agent_name.clone(), progress));
        }
    }
}

/// A full data snapshot for a healthy large-cap: bullish technicals and
/// fundamentals, positive sentiment and policy, low risk.
pub fn bullish_snapshot(symbol: &str) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    let mut put = |key: String, value: serde_json::Value| {
        map.insert(key, value);
    };
    put(format!("quote:{symbol}"), json!({"price": 1720.0}));
    put(format!("indicator:rsi_14:{symbol}"), json!({"value": [45.0, 28.0]}));
    put(format!("indicator:ma_5:{symbol}"), json!({"value": [1705.0]}));
    put(format!("indicator:ma_20:{symbol}"), json!({"value": [1660.0]}));
    put(
        format!("indicator:macd:{symbol}"),
        json!({"macd_line": [3.1], "signal_line": [2.2]}),
    );
    put(format!("indicator:adx_14:{symbol}"), json!({"value": [29.0]}));
    put(
        format!("fundamental:{symbol}"),
        json!({"roe": 30.5, "pe": 14.0, "pb": 1.4, "debt_ratio": 21.0, "revenue_growth": 16.0}),
    );
    put(format!("sentiment:news:{symbol}"), json!({"score": 0.55}));
    put(format!("sentiment:social:{symbol}"), json!({"score": 0.35}));
    put(format!("sentiment:analyst:{symbol}"), json!({"consensus": 0.8}));
    put(
        format!("policy:{symbol}"),
        json!({"items": [
            {"headline": "Consumption stimulus package", "impact": 0.6},
            {"headline": "Liquor excise unchanged", "impact": 0.2}
        ]}),
    );
    put(format!("risk:{symbol}"), json!({"risk_score": 0.15, "halted": false, "st": false}));
    serde_json::Value::Object(map)
}

/// The same as [`bullish_snapshot`] but the stock is suspended from trading.
pub fn halted_snapshot(symbol: &str) -> serde_json::Value {
    let mut snapshot = bullish_snapshot(symbol);
    snapshot[format!("risk:{symbol}")] = json!({"risk_score": 0.2, "halted": true});
    snapshot
}
