use std::sync::Arc;

use async_trait::async_trait;
use augur_models::{AgentResult, Direction};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::agent::Agent;
use crate::data_source::DataSource;
use crate::error::AgentError;

/// Output of a discrete-action policy model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionPrediction {
    /// 0 = long, 1 = hold, 2 = short.
    pub action_index: i64,
    /// Probability the model assigns to the chosen action.
    pub probability: f64,
}

/// An external trained model (e.g. a reinforcement-learning policy).
#[async_trait]
pub trait ActionModel: Send + Sync {
    async fn predict(&self, symbol: &str, features: &Value) -> Result<ActionPrediction, AgentError>;
}

/// Wraps an [`ActionModel`] as an agent.
pub struct ModelAnalyst {
    name: String,
    source: Arc<dyn DataSource>,
    model: Arc<dyn ActionModel>,
}

impl ModelAnalyst {
    pub fn new(
        name: impl Into<String>,
        source: Arc<dyn DataSource>,
        model: Arc<dyn ActionModel>,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            model,
        }
    }

    pub fn interpret(&self, prediction: ActionPrediction) -> AgentResult {
        let in_range = (0..=2).contains(&prediction.action_index);
        let direction = Direction::from_action_index(prediction.action_index);
        let probability = if prediction.probability.is_finite() {
            prediction.probability.clamp(0.0, 1.0)
        } else {
            0.0
        };
        // An unknown action carries no conviction
        let confidence = if in_range { probability } else { 0.0 };
        let score = match direction {
            Direction::Long => confidence,
            Direction::Short => -confidence,
            _ => 0.0,
        };

        let reasoning = if in_range {
            format!("Model chose {direction} with probability {probability:.2}")
        } else {
            format!(
                "Model emitted unknown action {}, treated as hold",
                prediction.action_index
            )
        };

        let mut analysis = serde_json::Map::new();
        analysis.insert("action_index".into(), json!(prediction.action_index));
        analysis.insert("probability".into(), json!(probability));
        analysis.insert("valid_action".into(), json!(in_range));

        AgentResult::success(&self.name, "model", direction, confidence, score, reasoning)
            .with_analysis(analysis)
    }
}

#[async_trait]
impl Agent for ModelAnalyst {
    fn name(&self) -> &str {
        &self.name
    }

    fn domain(&self) -> &str {
        "model"
    }

    async fn run(&self, symbol: &str, as_of: Option<NaiveDate>) -> Result<AgentResult, AgentError> {
        let features = self.source.snapshot(symbol, as_of).await?;
        let prediction = self.model.predict(symbol, &features).await?;
        Ok(self.interpret(prediction))
    }
}
