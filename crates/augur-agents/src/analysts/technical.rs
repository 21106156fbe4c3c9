use std::sync::Arc;

use async_trait::async_trait;
use augur_models::cache_schema::key_patterns;
use augur_models::AgentResult;
use chrono::NaiveDate;
use serde_json::{json, Value};

use super::{vote_label, Findings};
use crate::agent::Agent;
use crate::calibration::{vote_score, Calibrator, Evidence, Vote};
use crate::data_source::{last_value, DataSource};
use crate::error::AgentError;

/// Votes over RSI, moving averages, MACD, Bollinger %B and KDJ, with ADX as
/// the trend-strength modifier.
pub struct TechnicalAnalyst {
    name: String,
    source: Arc<dyn DataSource>,
    calibrator: Calibrator,
}

impl TechnicalAnalyst {
    pub fn new(name: impl Into<String>, source: Arc<dyn DataSource>, calibrator: Calibrator) -> Self {
        Self {
            name: name.into(),
            source,
            calibrator,
        }
    }

    pub fn evaluate(&self, symbol: &str, data: &Value) -> AgentResult {
        let mut findings = Findings::default();

        let rsi_key = key_patterns::indicator("rsi_14", symbol);
        if let Some(rsi) = last_value(data, &rsi_key, "value") {
            let (vote, note) = if rsi < 30.0 {
                (Vote::Bullish, format!("RSI {rsi:.0} oversold"))
            } else if rsi > 70.0 {
                (Vote::Bearish, format!("RSI {rsi:.0} overbought"))
            } else {
                (Vote::Neutral, format!("RSI {rsi:.0} neutral"))
            };
            findings.record("rsi_14", rsi, vote, note, &rsi_key);
        }

        let fast_key = key_patterns::indicator("ma_5", symbol);
        let slow_key = key_patterns::indicator("ma_20", symbol);
        if let (Some(fast), Some(slow)) = (
            last_value(data, &fast_key, "value"),
            last_value(data, &slow_key, "value"),
        ) {
            let (vote, note) = if fast > slow {
                (Vote::Bullish, "MA5 above MA20".to_string())
            } else if fast < slow {
                (Vote::Bearish, "MA5 below MA20".to_string())
            } else {
                (Vote::Neutral, "MA5 flat on MA20".to_string())
            };
            findings.record("ma_cross", fast - slow, vote, note, &slow_key);
        }

        let macd_key = key_patterns::indicator("macd", symbol);
        if let (Some(macd), Some(signal)) = (
            last_value(data, &macd_key, "macd_line"),
            last_value(data, &macd_key, "signal_line"),
        ) {
            let (vote, note) = if macd > signal {
                (Vote::Bullish, "MACD above signal".to_string())
            } else if macd < signal {
                (Vote::Bearish, "MACD below signal".to_string())
            } else {
                (Vote::Neutral, "MACD on signal".to_string())
            };
            findings.record("macd", macd - signal, vote, note, &macd_key);
        }

        let bb_key = key_patterns::indicator("bollinger_bands", symbol);
        if let Some(pb) = last_value(data, &bb_key, "percent_b") {
            let (vote, note) = if pb < 0.0 {
                (Vote::Bullish, format!("%B {pb:.2} below lower band"))
            } else if pb > 1.0 {
                (Vote::Bearish, format!("%B {pb:.2} above upper band"))
            } else {
                (Vote::Neutral, format!("%B {pb:.2} inside bands"))
            };
            findings.record("bollinger_percent_b", pb, vote, note, &bb_key);
        }

        let kdj_key = key_patterns::indicator("kdj", symbol);
        if let (Some(k), Some(d)) = (
            last_value(data, &kdj_key, "k"),
            last_value(data, &kdj_key, "d"),
        ) {
            let j = last_value(data, &kdj_key, "j").unwrap_or(3.0 * k - 2.0 * d);
            let (vote, note) = if j < 0.0 {
                (Vote::Bullish, format!("KDJ J {j:.0} oversold"))
            } else if j > 100.0 {
                (Vote::Bearish, format!("KDJ J {j:.0} overbought"))
            } else if k > d {
                (Vote::Bullish, "KDJ K above D".to_string())
            } else if k < d {
                (Vote::Bearish, "KDJ K below D".to_string())
            } else {
                (Vote::Neutral, "KDJ K on D".to_string())
            };
            findings.record("kdj", j, vote, note, &kdj_key);
        }

        let adx_key = key_patterns::indicator("adx_14", symbol);
        let trend_strength = last_value(data, &adx_key, "value");

        if findings.is_empty() {
            return AgentResult::success(
                &self.name,
                "technical",
                augur_models::Direction::Hold,
                0.0,
                0.0,
                "No technical indicators available",
            );
        }

        let raw = vote_score(&findings.votes);
        let calibration = self.calibrator.calibrate(
            raw,
            &Evidence::Technical {
                votes: findings.votes.clone(),
                trend_strength,
            },
        );

        let trend_note = match trend_strength {
            Some(adx) if adx > self.calibrator.thresholds().strong_trend => {
                format!(" ADX {adx:.0}, strong trend.")
            }
            Some(adx) if adx < self.calibrator.thresholds().weak_trend => {
                format!(" ADX {adx:.0}, weak trend.")
            }
            Some(adx) => format!(" ADX {adx:.0}."),
            None => String::new(),
        };
        let reasoning = format!(
            "{}. {} bullish, {} bearish, {} neutral of {} indicators; net {raw:+.2}.{trend_note}",
            findings.notes.join("; "),
            findings.agreeing(Vote::Bullish),
            findings.agreeing(Vote::Bearish),
            findings.agreeing(Vote::Neutral),
            findings.votes.len(),
        );

        let mut analysis = serde_json::Map::new();
        analysis.insert("indicators".into(), Value::Object(findings.detail));
        analysis.insert("trend_strength".into(), json!(trend_strength));
        analysis.insert(
            "votes".into(),
            json!(findings.votes.iter().map(|v| vote_label(*v)).collect::<Vec<_>>()),
        );
        analysis.insert("data_sources".into(), json!(findings.sources));

        AgentResult::success(
            &self.name,
            "technical",
            calibration.direction,
            calibration.confidence,
            raw,
            reasoning,
        )
        .with_analysis(analysis)
    }
}

#[async_trait]
impl Agent for TechnicalAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        "technical"
    }

    async fn run(&self, symbol: &str, as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        let data = self.source.snapshot(symbol, as_of).await?;
        Ok(self.evaluate(symbol, &data))
    }
}
