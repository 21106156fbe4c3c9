//! Built-in rule-based analysts.
//!
//! Each analyst reads one data snapshot, turns the readings it finds into
//! votes or scores, and lets the [`Calibrator`](crate::calibration::Calibrator)
//! decide direction and confidence. `evaluate` is synchronous and pure so the
//! rules can be tested without a runtime.

pub mod fundamental;
pub mod model;
pub mod policy;
pub mod risk;
pub mod sentiment;
pub mod technical;

pub use fundamental::FundamentalAnalyst;
pub use model::{ActionModel, ActionPrediction, ModelAnalyst};
pub use policy::PolicyAnalyst;
pub use risk::RiskAnalyst;
pub use sentiment::SentimentAnalyst;
pub use technical::TechnicalAnalyst;

use serde_json::{json, Map, Value};

use crate::calibration::Vote;

/// Readings collected by a vote-based analyst.
#[derive(Debug, Default)]
pub(crate) struct Findings {
    pub votes: Vec<Vote>,
    pub notes: Vec<String>,
    pub detail: Map<String, Value>,
    pub sources: Vec<String>,
}

impl Findings {
    pub fn record(&mut self, name: &str, reading: f64, vote: Vote, note: String, source: &str) {
        self.votes.push(vote);
        self.notes.push(note);
        self.detail
            .insert(name.to_string(), json!({ "value": reading, "vote": vote }));
        if !self.sources.iter().any(|s| s == source) {
            self.sources.push(source.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn agreeing(&self, vote: Vote) -> usize {
        self.votes.iter().filter(|v| **v == vote).count()
    }
}

pub(crate) fn vote_label(vote: Vote) -> &'static str {
    match vote {
        Vote::Bullish => "bullish",
        Vote::Bearish => "bearish",
        Vote::Neutral => "neutral",
    }
}
