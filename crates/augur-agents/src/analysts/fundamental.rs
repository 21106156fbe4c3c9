use std::sync::Arc;

use async_trait::async_trait;
use augur_models::cache_schema::key_patterns;
use augur_models::{AgentResult, Direction};
use chrono::NaiveDate;
use serde_json::{json, Value};

use super::Findings;
use crate::agent::Agent;
use crate::calibration::{vote_score, Calibrator, Evidence, Vote};
use crate::data_source::{last_value, DataSource};
use crate::error::AgentError;

/// ROE at or above this, with debt at or below [`EXCEPTIONAL_MAX_DEBT`], marks
/// an exceptional balance sheet.
const EXCEPTIONAL_MIN_ROE: f64 = 20.0;
const EXCEPTIONAL_MAX_DEBT: f64 = 30.0;

/// Scores valuation, profitability, leverage and growth from `fundamental:{symbol}`.
///
/// Ratios are percentages as published in A-share financial statements
/// (ROE 18.5 means 18.5%).
pub struct FundamentalAnalyst {
    name: String,
    source: Arc<dyn DataSource>,
    calibrator: Calibrator,
}

impl FundamentalAnalyst {
    pub fn new(name: impl Into<String>, source: Arc<dyn DataSource>, calibrator: Calibrator) -> Self {
        Self {
            name: name.into(),
            source,
            calibrator,
        }
    }

    pub fn evaluate(&self, symbol: &str, data: &Value) -> AgentResult {
        let key = key_patterns::fundamental(symbol);
        let mut findings = Findings::default();

        let roe = last_value(data, &key, "roe");
        if let Some(roe) = roe {
            let vote = if roe >= 15.0 {
                Vote::Bullish
            } else if roe < 8.0 {
                Vote::Bearish
            } else {
                Vote::Neutral
            };
            findings.record("roe", roe, vote, format!("ROE {roe:.1}%"), &key);
        }

        if let Some(pe) = last_value(data, &key, "pe") {
            let (vote, note) = if pe <= 0.0 {
                (Vote::Bearish, "negative earnings".to_string())
            } else if pe < 15.0 {
                (Vote::Bullish, format!("PE {pe:.1} cheap"))
            } else if pe > 50.0 {
                (Vote::Bearish, format!("PE {pe:.1} rich"))
            } else {
                (Vote::Neutral, format!("PE {pe:.1}"))
            };
            findings.record("pe", pe, vote, note, &key);
        }

        if let Some(pb) = last_value(data, &key, "pb") {
            let vote = if pb < 1.5 {
                Vote::Bullish
            } else if pb > 8.0 {
                Vote::Bearish
            } else {
                Vote::Neutral
            };
            findings.record("pb", pb, vote, format!("PB {pb:.2}"), &key);
        }

        let debt = last_value(data, &key, "debt_ratio");
        if let Some(debt) = debt {
            let vote = if debt < 40.0 {
                Vote::Bullish
            } else if debt > 70.0 {
                Vote::Bearish
            } else {
                Vote::Neutral
            };
            findings.record("debt_ratio", debt, vote, format!("debt {debt:.0}%"), &key);
        }

        if let Some(growth) = last_value(data, &key, "revenue_growth") {
            let vote = if growth > 15.0 {
                Vote::Bullish
            } else if growth < 0.0 {
                Vote::Bearish
            } else {
                Vote::Neutral
            };
            findings.record(
                "revenue_growth",
                growth,
                vote,
                format!("revenue {growth:+.1}%"),
                &key,
            );
        }

        if findings.is_empty() {
            return AgentResult::success(
                &self.name,
                "fundamental",
                Direction::Hold,
                0.0,
                0.0,
                "No fundamental data available",
            );
        }

        let exceptional = matches!(
            (roe, debt),
            (Some(r), Some(d)) if r >= EXCEPTIONAL_MIN_ROE && d <= EXCEPTIONAL_MAX_DEBT
        );
        let raw = vote_score(&findings.votes);
        let calibration = self.calibrator.calibrate(
            raw,
            &Evidence::Fundamental {
                votes: findings.votes.clone(),
                exceptional,
            },
        );

        let expected = self.calibrator.thresholds().expected_fundamental_metrics;
        let mut reasoning = format!(
            "{}. {}/{expected} metrics available; net {raw:+.2}.",
            findings.notes.join(", "),
            findings.votes.len(),
        );
        if exceptional {
            reasoning.push_str(" High return on equity with low leverage.");
        }

        let mut analysis = serde_json::Map::new();
        analysis.insert("metrics".into(), Value::Object(findings.detail));
        analysis.insert("exceptional".into(), json!(exceptional));
        analysis.insert(
            "completeness".into(),
            json!(findings.votes.len() as f64 / expected.max(1) as f64),
        );

        AgentResult::success(
            &self.name,
            "fundamental",
            calibration.direction,
            calibration.confidence,
            raw,
            reasoning,
        )
        .with_analysis(analysis)
    }
}

#[async_trait]
impl Agent for FundamentalAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        "fundamental"
    }

    async fn run(&self, symbol: &str, as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        let data = self.source.snapshot(symbol, as_of).await?;
        Ok(self.evaluate(symbol, &data))
    }
}
