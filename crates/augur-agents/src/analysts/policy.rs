use std::sync::Arc;

use async_trait::async_trait;
use augur_models::cache_schema::key_patterns;
use augur_models::{AgentResult, Direction};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::agent::Agent;
use crate::calibration::{Calibrator, Evidence};
use crate::data_source::DataSource;
use crate::error::AgentError;
use crate::narrator::{narrate_or, TextGenerator};
use crate::prompts::policy_system_prompt;

/// Policy items beyond this count no longer raise coverage.
const EXPECTED_ITEMS: usize = 3;

#[derive(Debug, Clone, Deserialize)]
struct PolicyItem {
    #[serde(default)]
    headline: String,
    impact: f64,
}

/// Reads regulatory and industry-policy items tagged with an impact score.
pub struct PolicyAnalyst {
    name: String,
    source: Arc<dyn DataSource>,
    calibrator: Calibrator,
    narrator: Option<Arc<dyn TextGenerator>>,
}

impl PolicyAnalyst {
    pub fn new(name: impl Into<String>, source: Arc<dyn DataSource>, calibrator: Calibrator) -> Self {
        Self {
            name: name.into(),
            source,
            calibrator,
            narrator: None,
        }
    }

    pub fn with_narrator(mut self, narrator: Arc<dyn TextGenerator>) -> Self {
        self.narrator = Some(narrator);
        self
    }

    fn items(symbol: &str, data: &Value) -> Vec<PolicyItem> {
        let Some(items) = data
            .get(key_patterns::policy(symbol))
            .and_then(|v| v.get("items"))
            .and_then(|v| v.as_array())
        else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| match serde_json::from_value::<PolicyItem>(item.clone()) {
                Ok(parsed) if parsed.impact.is_finite() => Some(parsed),
                Ok(_) => None,
                Err(e) => {
                    debug!(error = %e, "Skipping malformed policy item");
                    None
                }
            })
            .collect()
    }

    pub fn evaluate(&self, symbol: &str, data: &Value) -> AgentResult {
        let items = Self::items(symbol, data);
        if items.is_empty() {
            return AgentResult::success(
                &self.name,
                "policy",
                Direction::Hold,
                0.0,
                0.0,
                "No policy items on record",
            );
        }

        let scores: Vec<f64> = items.iter().map(|i| i.impact.clamp(-1.0, 1.0)).collect();
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let calibration = self.calibrator.calibrate(
            mean,
            &Evidence::Consensus {
                scores: scores.clone(),
                expected_sources: EXPECTED_ITEMS,
            },
        );

        let tailwinds = scores.iter().filter(|s| **s > 0.0).count();
        let headwinds = scores.iter().filter(|s| **s < 0.0).count();
        let strongest = items
            .iter()
            .max_by(|a, b| a.impact.abs().total_cmp(&b.impact.abs()))
            .map(|i| format!(" Strongest: \"{}\" ({:+.2}).", i.headline, i.impact))
            .unwrap_or_default();
        let reasoning = format!(
            "{} policy items: {tailwinds} tailwinds, {headwinds} headwinds; mean impact {mean:+.2}.{strongest}",
            items.len(),
        );

        let mut analysis = serde_json::Map::new();
        analysis.insert(
            "items".into(),
            json!(items
                .iter()
                .map(|i| json!({"headline": i.headline, "impact": i.impact}))
                .collect::<Vec<_>>()),
        );
        analysis.insert("mean_impact".into(), json!(mean));

        AgentResult::success(
            &self.name,
            "policy",
            calibration.direction,
            calibration.confidence,
            mean,
            reasoning,
        )
        .with_analysis(analysis)
    }
}

#[async_trait]
impl Agent for PolicyAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        "policy"
    }

    async fn run(&self, symbol: &str, as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        let data = self.source.snapshot(symbol, as_of).await?;
        let mut result = self.evaluate(symbol, &data);
        if result.confidence > 0.0 {
            let user_prompt = serde_json::to_string(&json!({
                "symbol": symbol,
                "direction": result.direction,
                "confidence": result.confidence,
                "items": result.analysis.get("items"),
            }))?;
            result.reasoning = narrate_or(
                self.narrator.as_deref(),
                &policy_system_prompt(),
                &user_prompt,
                result.reasoning,
            )
            .await;
        }
        Ok(result)
    }
}
