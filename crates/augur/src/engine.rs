use std::sync::Arc;
use std::time::Duration;

use augur_agents::data_source::last_value;
use augur_agents::{AgentError, DataSource, PositionDecisionEngine, PositionError};
use augur_models::{
    AggregatedSignal, AugurConfig, Holding, MarketContext, PositionRecommendation, TaskStatus,
};
use augur_tasks::{TaskError, TaskManager};
use chrono::{Local, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Task(#[from] TaskError),

    #[error("Analysis task {task_id} ended {status}: {reason}")]
    Analysis {
        task_id: Uuid,
        status: TaskStatus,
        reason: String,
    },

    #[error("Position error: {0}")]
    Position(#[from] PositionError),

    #[error(transparent)]
    Data(#[from] AgentError),
}

/// A position recommendation together with the signal it was derived from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionAnalysis {
    /// The analysis task whose signal was used.
    pub task_id: Uuid,
    /// True when a recent completed analysis was reused.
    pub reused_signal: bool,
    pub signal: AggregatedSignal,
    pub recommendation: PositionRecommendation,
}

/// Entry point for callers: task management plus position decisions.
#[derive(Clone)]
pub struct Engine {
    tasks: TaskManager,
    source: Arc<dyn DataSource>,
    positions: PositionDecisionEngine,
    signal_max_age: Duration,
    default_volatility: f64,
}

impl Engine {
    pub fn new(tasks: TaskManager, source: Arc<dyn DataSource>, config: &AugurConfig) -> Self {
        Self {
            tasks,
            source,
            positions: PositionDecisionEngine::new(
                config.position.clone(),
                config.aggregation.max_position_cap,
            ),
            signal_max_age: Duration::from_secs(config.position.signal_max_age_seconds),
            default_volatility: config.position.default_daily_volatility,
        }
    }

    pub fn tasks(&self) -> &TaskManager {
        &self.tasks
    }

    /// Recommend sell, hold or add for an existing position.
    ///
    /// Reuses the newest completed analysis of the symbol when it is recent
    /// enough, otherwise runs a fresh one and waits for it. A missing current
    /// price is read from the `quote:{SYMBOL}` cache entry; volatility comes
    /// from `risk:{SYMBOL}` or the configured default.
    pub async fn analyze_position(
        &self,
        symbol: &str,
        mut holding: Holding,
        trade_date: Option<NaiveDate>,
    ) -> Result<PositionAnalysis, EngineError> {
        let (task, reused_signal) = match self.tasks.latest_completed(symbol, self.signal_max_age) {
            Some(task) => (task, true),
            None => {
                let task_id = self.tasks.create(symbol, None).await?;
                (self.tasks.wait(task_id).await?, false)
            }
        };
        let signal = match (&task.status, task.result) {
            (TaskStatus::Completed, Some(report)) => report.signal,
            (status, _) => {
                return Err(EngineError::Analysis {
                    task_id: task.task_id,
                    status: *status,
                    reason: task.error.unwrap_or_else(|| "no result".to_string()),
                })
            }
        };

        // A caller-supplied price lets the decision go ahead on default
        // volatility when market data is unavailable.
        let snapshot = match self.source.snapshot(&signal.symbol, None).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) if holding.current_price.is_some() => {
                warn!(symbol = %signal.symbol, error = %e, "Market data unavailable; using default volatility");
                None
            }
            Err(e) => return Err(e.into()),
        };
        if holding.current_price.is_none() {
            holding.current_price = snapshot
                .as_ref()
                .and_then(|s| last_value(s, &format!("quote:{}", signal.symbol), "price"))
                .and_then(|price| Decimal::try_from(price).ok())
                .map(|price| price.round_dp(4));
            debug!(symbol = %signal.symbol, price = ?holding.current_price, "Resolved current price");
        }
        let daily_volatility = snapshot
            .as_ref()
            .and_then(|s| last_value(s, &format!("risk:{}", signal.symbol), "daily_volatility"))
            .filter(|v| v.is_finite() && *v > 0.0)
            .or(Some(self.default_volatility));

        let context = MarketContext {
            daily_volatility,
            trade_date: trade_date.unwrap_or_else(|| Local::now().date_naive()),
        };
        let recommendation = self.positions.decide(&signal, &holding, &context)?;
        info!(
            symbol = %signal.symbol,
            task_id = %task.task_id,
            reused_signal,
            action = ?recommendation.action,
            urgency = ?recommendation.urgency,
            pnl_pct = recommendation.pnl_pct,
            "Position analysed"
        );

        Ok(PositionAnalysis {
            task_id: task.task_id,
            reused_signal,
            signal,
            recommendation,
        })
    }
}
