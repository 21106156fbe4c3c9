use std::sync::Arc;

use async_trait::async_trait;
use augur_models::cache_schema::key_patterns;
use augur_models::{AgentResult, Direction};
use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::agent::Agent;
use crate::calibration::{Calibrator, Evidence};
use crate::data_source::{last_value, DataSource};
use crate::error::AgentError;

/// Extra risk for special-treatment (ST) listings.
const ST_PENALTY: f64 = 0.2;
const LIMIT_DOWN_PENALTY: f64 = 0.1;

/// Maps a risk score to enter / wait / exit, and vetoes when the stock cannot trade.
///
/// Reads `risk:{symbol}`: `risk_score` in [0, 1], plus the flags `halted`,
/// `st` and `limit_down`.
pub struct RiskAnalyst {
    name: String,
    source: Arc<dyn DataSource>,
    calibrator: Calibrator,
}

impl RiskAnalyst {
    pub fn new(name: impl Into<String>, source: Arc<dyn DataSource>, calibrator: Calibrator) -> Self {
        Self {
            name: name.into(),
            source,
            calibrator,
        }
    }

    pub fn evaluate(&self, symbol: &str, data: &Value) -> AgentResult {
        let key = key_patterns::risk(symbol);
        let entry = data.get(&key);
        let flag = |name: &str| entry.and_then(|v| v.get(name)).and_then(Value::as_bool);

        let base = last_value(data, &key, "risk_score").map(f64::abs);
        let halted = flag("halted");
        let st = flag("st");
        let limit_down = flag("limit_down");
        let factors = [base.is_some(), halted.is_some(), st.is_some(), limit_down.is_some()]
            .iter()
            .filter(|present| **present)
            .count();

        let mut risk = base.unwrap_or(0.0);
        let mut notes = Vec::new();
        if let Some(score) = base {
            notes.push(format!("risk score {score:.2}"));
        }
        if st == Some(true) {
            risk += ST_PENALTY;
            notes.push("ST special treatment".to_string());
        }
        if limit_down == Some(true) {
            risk += LIMIT_DOWN_PENALTY;
            notes.push("closed limit-down".to_string());
        }
        let risk = risk.min(1.0);

        let calibration = self.calibrator.calibrate(risk, &Evidence::Risk { factors });
        let reasoning = if factors == 0 {
            "No risk data available".to_string()
        } else {
            let stance = match calibration.direction {
                Direction::Long => "acceptable",
                Direction::Hold => "elevated, wait",
                _ => "high, reduce exposure",
            };
            format!("Risk {stance}: {}.", notes.join(", "))
        };

        let mut analysis = serde_json::Map::new();
        analysis.insert("risk_score".into(), json!(risk));
        analysis.insert("halted".into(), json!(halted.unwrap_or(false)));
        analysis.insert("st".into(), json!(st.unwrap_or(false)));
        analysis.insert("limit_down".into(), json!(limit_down.unwrap_or(false)));

        let result = AgentResult::success(
            &self.name,
            "risk",
            calibration.direction,
            calibration.confidence,
            -risk,
            reasoning,
        )
        .with_analysis(analysis);

        if halted == Some(true) {
            result.with_veto(format!("{symbol} trading halted"))
        } else {
            result
        }
    }
}

#[async_trait]
impl Agent for RiskAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        "risk"
    }

    async fn run(&self, symbol: &str, as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        let data = self.source.snapshot(symbol, as_of).await?;
        Ok(self.evaluate(symbol, &data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::StaticDataSource;

    fn analyst() -> RiskAnalyst {
        RiskAnalyst::new("risk", Arc::new(StaticDataSource::new()), Calibrator::default())
    }

    #[test]
    fn low_risk_is_long() {
        let result = analyst().evaluate("600519", &json!({"risk:600519": {"risk_score": 0.1}}));
        assert_eq!(result.direction, Some(Direction::Long));
        assert!((result.confidence - 0.65).abs() < 1e-9);
        assert!(result.veto.is_none());
    }

    #[test]
    fn st_flag_pushes_into_exit_band() {
        let data = json!({"risk:000001": {"risk_score": 0.45, "st": true}});
        let result = analyst().evaluate("000001", &data);
        assert_eq!(result.direction, Some(Direction::Close));
        assert!(result.reasoning.contains("ST"));
    }

    #[test]
    fn halted_stock_vetoes() {
        let data = json!({"risk:600000": {"risk_score": 0.2, "halted": true}});
        let result = analyst().evaluate("600000", &data);
        assert_eq!(result.veto.as_deref(), Some("600000 trading halted"));
        assert_eq!(result.analysis["halted"], json!(true));
    }

    #[test]
    fn no_risk_data_is_neutral() {
        let result = analyst().evaluate("600000", &json!({}));
        assert_eq!(result.direction, Some(Direction::Hold));
        assert_eq!(result.confidence, 0.0);
        assert!(result.veto.is_none());
    }
}
