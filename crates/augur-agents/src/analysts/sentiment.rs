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
use crate::narrator::{narrate_or, TextGenerator};
use crate::prompts::sentiment_system_prompt;

const SOURCES: [&str; 3] = ["news", "social", "analyst"];

/// Blends news, social-media and sell-side sentiment into one consensus call.
pub struct SentimentAnalyst {
    name: String,
    source: Arc<dyn DataSource>,
    calibrator: Calibrator,
    narrator: Option<Arc<dyn TextGenerator>>,
}

impl SentimentAnalyst {
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

    /// Per-source scores in [-1, 1]. Analyst consensus arrives as 0..1 and is rescaled.
    fn readings(symbol: &str, data: &Value) -> Vec<(&'static str, f64)> {
        SOURCES
            .iter()
            .filter_map(|source| {
                let key = key_patterns::sentiment(source, symbol);
                let score = last_value(data, &key, "score").or_else(|| {
                    last_value(data, &key, "consensus").map(|c| (c - 0.5) * 2.0)
                })?;
                Some((*source, score.clamp(-1.0, 1.0)))
            })
            .collect()
    }

    pub fn evaluate(&self, symbol: &str, data: &Value) -> AgentResult {
        let readings = Self::readings(symbol, data);
        if readings.is_empty() {
            return AgentResult::success(
                &self.name,
                "sentiment",
                Direction::Hold,
                0.0,
                0.0,
                "No sentiment data available",
            );
        }

        let scores: Vec<f64> = readings.iter().map(|(_, s)| *s).collect();
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let calibration = self.calibrator.calibrate(
            mean,
            &Evidence::Consensus {
                scores,
                expected_sources: SOURCES.len(),
            },
        );

        let parts: Vec<String> = readings
            .iter()
            .map(|(source, score)| format!("{source} {score:+.2}"))
            .collect();
        let reasoning = format!(
            "Sentiment {} from {}/{} sources ({}); mean {mean:+.2}.",
            calibration.direction,
            readings.len(),
            SOURCES.len(),
            parts.join(", "),
        );

        let mut analysis = serde_json::Map::new();
        analysis.insert(
            "sources".into(),
            Value::Object(
                readings
                    .iter()
                    .map(|(source, score)| (source.to_string(), json!(score)))
                    .collect(),
            ),
        );
        analysis.insert("mean_score".into(), json!(mean));

        AgentResult::success(
            &self.name,
            "sentiment",
            calibration.direction,
            calibration.confidence,
            mean,
            reasoning,
        )
        .with_analysis(analysis)
    }
}

#[async_trait]
impl Agent for SentimentAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        "sentiment"
    }

    async fn run(&self, symbol: &str, as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        let data = self.source.snapshot(symbol, as_of).await?;
        let mut result = self.evaluate(symbol, &data);
        if result.confidence > 0.0 {
            let user_prompt = serde_json::to_string(&json!({
                "symbol": symbol,
                "direction": result.direction,
                "confidence": result.confidence,
                "readings": result.analysis.get("sources"),
            }))?;
            result.reasoning = narrate_or(
                self.narrator.as_deref(),
                &sentiment_system_prompt(),
                &user_prompt,
                result.reasoning,
            )
            .await;
        }
        Ok(result)
    }
}
