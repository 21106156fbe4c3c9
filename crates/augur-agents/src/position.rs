use augur_models::{
    AggregatedSignal, Holding, MarketContext, PositionAction, PositionConfig,
    PositionRecommendation, RecoveryEstimate, Urgency,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::error::PositionError;

/// Loss depth (percent of cost) at which a bearish exit becomes urgent.
const HIGH_URGENCY_LOSS_PCT: f64 = 15.0;
const MEDIUM_URGENCY_LOSS_PCT: f64 = 7.0;
/// Confidence at which a bearish signal on a winner demands action now.
const HIGH_URGENCY_CONFIDENCE: f64 = 0.7;
/// Trading days per year; caps recovery horizons.
const MAX_RECOVERY_DAYS: u32 = 250;

/// Turns an aggregated signal plus an existing holding into sell / hold / add.
///
/// Rules, in order:
/// 1. A vetoed signal holds: the stock cannot be traded on it.
/// 2. A neutral signal holds.
/// 3. Losing positions: bearish sells (urgency by loss depth), bullish holds
///    with a recovery estimate.
/// 4. Flat or profitable positions: bearish sells (urgency by confidence),
///    bullish adds when confident and under the position cap, else holds.
/// 5. T+1: shares bought on the trade date cannot be sold that day, so a
///    sell becomes hold with the urgency kept.
#[derive(Debug, Clone)]
pub struct PositionDecisionEngine {
    config: PositionConfig,
    max_position_cap: f64,
}

impl PositionDecisionEngine {
    pub fn new(config: PositionConfig, max_position_cap: f64) -> Self {
        Self {
            config,
            max_position_cap,
        }
    }

    pub fn decide(
        &self,
        signal: &AggregatedSignal,
        holding: &Holding,
        context: &MarketContext,
    ) -> Result<PositionRecommendation, PositionError> {
        let current = holding
            .current_price
            .ok_or_else(|| PositionError::MissingPrice(signal.symbol.clone()))?;
        if holding.avg_price <= Decimal::ZERO {
            return Err(PositionError::InvalidHolding(format!(
                "average price must be positive, got {}",
                holding.avg_price
            )));
        }
        if current <= Decimal::ZERO {
            return Err(PositionError::InvalidHolding(format!(
                "current price must be positive, got {current}"
            )));
        }
        if holding.quantity <= Decimal::ZERO {
            return Err(PositionError::InvalidHolding(format!(
                "quantity must be positive, got {}",
                holding.quantity
            )));
        }

        let pnl_pct = ((current - holding.avg_price) / holding.avg_price * Decimal::ONE_HUNDRED)
            .to_f64()
            .unwrap_or(0.0);
        let losing = current < holding.avg_price;
        let confidence = signal.confidence;
        let direction = signal.direction;

        let mut recovery_estimate = None;
        let (mut action, urgency, mut reasoning) = if let Some(veto) = &signal.vetoed_by {
            (
                PositionAction::Hold,
                Urgency::Low,
                format!("Signal vetoed by {}: {}. No trade possible.", veto.agent, veto.reason),
            )
        } else if !direction.is_bullish() && !direction.is_bearish() {
            (
                PositionAction::Hold,
                Urgency::Low,
                format!("Neutral signal (confidence {confidence:.2}); keep the position."),
            )
        } else if losing {
            let loss = -pnl_pct;
            if direction.is_bearish() {
                let urgency = if loss >= HIGH_URGENCY_LOSS_PCT {
                    Urgency::High
                } else if loss >= MEDIUM_URGENCY_LOSS_PCT {
                    Urgency::Medium
                } else {
                    Urgency::Low
                };
                (
                    PositionAction::Sell,
                    urgency,
                    format!(
                        "Down {loss:.1}% with a {direction} signal (confidence {confidence:.2}); cut the loss."
                    ),
                )
            } else {
                let estimate = self.recovery_estimate(holding.avg_price, current, confidence, context);
                let reasoning = format!(
                    "Down {loss:.1}% but the signal is {direction} (confidence {confidence:.2}); \
                     needs {:.1}% to break even, about {} trading days at {:.0}% odds.",
                    estimate.required_gain_pct,
                    estimate.expected_days,
                    estimate.probability * 100.0,
                );
                recovery_estimate = Some(estimate);
                (PositionAction::Hold, Urgency::Low, reasoning)
            }
        } else if direction.is_bearish() {
            let urgency = if confidence >= HIGH_URGENCY_CONFIDENCE {
                Urgency::High
            } else {
                Urgency::Medium
            };
            (
                PositionAction::Sell,
                urgency,
                format!(
                    "Up {pnl_pct:.1}% with a {direction} signal (confidence {confidence:.2}); take profit."
                ),
            )
        } else {
            self.bullish_on_winner(holding, pnl_pct, confidence)
        };

        if action == PositionAction::Sell && holding.purchase_date >= context.trade_date {
            action = PositionAction::Hold;
            reasoning.push_str(&format!(
                " T+1: shares bought {} cannot be sold before the next trading day.",
                holding.purchase_date
            ));
        }

        debug!(
            symbol = %signal.symbol,
            action = ?action,
            urgency = ?urgency,
            pnl_pct,
            "Position decision"
        );

        Ok(PositionRecommendation {
            symbol: signal.symbol.clone(),
            action,
            urgency,
            reasoning,
            pnl_pct,
            recovery_estimate,
        })
    }

    fn bullish_on_winner(
        &self,
        holding: &Holding,
        pnl_pct: f64,
        confidence: f64,
    ) -> (PositionAction, Urgency, String) {
        if confidence < self.config.add_confidence_threshold {
            return (
                PositionAction::Hold,
                Urgency::Low,
                format!(
                    "Up {pnl_pct:.1}%, bullish but confidence {confidence:.2} is below {:.2}; hold.",
                    self.config.add_confidence_threshold
                ),
            );
        }
        match holding.position_weight {
            Some(weight) if weight < self.max_position_cap => (
                PositionAction::Add,
                Urgency::Medium,
                format!(
                    "Up {pnl_pct:.1}%, bullish with confidence {confidence:.2}; position {:.0}% is under the {:.0}% cap, add.",
                    weight * 100.0,
                    self.max_position_cap * 100.0
                ),
            ),
            Some(weight) => (
                PositionAction::Hold,
                Urgency::Low,
                format!(
                    "Up {pnl_pct:.1}%, bullish, but position {:.0}% is at the {:.0}% cap; hold.",
                    weight * 100.0,
                    self.max_position_cap * 100.0
                ),
            ),
            None => (
                PositionAction::Hold,
                Urgency::Low,
                format!(
                    "Up {pnl_pct:.1}%, bullish with confidence {confidence:.2}; portfolio weight unknown, hold."
                ),
            ),
        }
    }

    /// Random-walk estimate: the gain needed to reach cost, measured in daily
    /// volatility, sets the horizon; signal confidence scales the odds.
    fn recovery_estimate(
        &self,
        avg_price: Decimal,
        current: Decimal,
        confidence: f64,
        context: &MarketContext,
    ) -> RecoveryEstimate {
        let required = (avg_price / current - Decimal::ONE).to_f64().unwrap_or(0.0).max(0.0);
        let sigma = context
            .daily_volatility
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(self.config.default_daily_volatility)
            .max(1e-4);
        let conviction = confidence.clamp(0.05, 1.0);

        let days = ((required / sigma).powi(2) / conviction).ceil();
        let expected_days = if days.is_finite() {
            (days as u32).clamp(1, MAX_RECOVERY_DAYS)
        } else {
            MAX_RECOVERY_DAYS
        };
        let quarter_move = sigma * 60f64.sqrt();
        let probability = (confidence * (1.0 - required / (required + quarter_move))).clamp(0.05, 0.95);

        RecoveryEstimate {
            probability,
            expected_days,
            required_gain_pct: required * 100.0,
        }
    }
}
