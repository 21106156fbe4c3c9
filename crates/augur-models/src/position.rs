use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An existing position supplied by the caller. Not owned by the engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holding {
    /// Shares held.
    pub quantity: Decimal,
    pub avg_price: Decimal,
    pub purchase_date: NaiveDate,
    /// None = resolve from the data source.
    #[serde(default)]
    pub current_price: Option<Decimal>,
    /// Fraction of the portfolio this position represents (0.0 to 1.0).
    #[serde(default)]
    pub position_weight: Option<f64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionAction {
    Sell,
    Hold,
    Add,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// Rough odds of a losing position getting back to cost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecoveryEstimate {
    /// 0.0 to 1.0.
    pub probability: f64,
    pub expected_days: u32,
    /// Gain needed from the current price to reach the average cost.
    pub required_gain_pct: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PositionRecommendation {
    pub symbol: String,
    pub action: PositionAction,
    pub urgency: Urgency,
    pub reasoning: String,
    /// Unrealized P&L as a percentage of cost.
    pub pnl_pct: f64,
    pub recovery_estimate: Option<RecoveryEstimate>,
}

/// Market context supplied by an external collaborator for position decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketContext {
    /// Standard deviation of daily returns, e.g. 0.02 for 2%.
    pub daily_volatility: Option<f64>,
    /// The trading date the decision is made for (T+1 checks).
    pub trade_date: NaiveDate,
}
