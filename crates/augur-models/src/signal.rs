use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::agent_result::{AgentResult, Direction};

/// A hard stop raised by a veto-capable agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Veto {
    pub agent: String,
    pub reason: String,
}

/// Accumulated `weight * confidence` per direction bucket.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct VoteTally {
    pub long: f64,
    pub short: f64,
    pub hold: f64,
    pub close: f64,
}

impl VoteTally {
    pub fn add(&mut self, direction: Direction, amount: f64) {
        match direction {
            Direction::Long => self.long += amount,
            Direction::Short => self.short += amount,
            Direction::Hold => self.hold += amount,
            Direction::Close => self.close += amount,
        }
    }

    pub fn get(&self, direction: Direction) -> f64 {
        match direction {
            Direction::Long => self.long,
            Direction::Short => self.short,
            Direction::Hold => self.hold,
            Direction::Close => self.close,
        }
    }
}

/// The fused recommendation for one symbol. Read-only once produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AggregatedSignal {
    pub symbol: String,
    pub direction: Direction,
    /// 0.0 to 1.0.
    pub confidence: f64,
    /// Fraction of capital, 0.0 to the configured cap.
    pub position_size: f64,
    pub num_agreeing_agents: usize,
    pub num_surviving_agents: usize,
    pub num_errored_agents: usize,
    pub votes: VoteTally,
    /// Price levels are not produced by this engine; they stay null unless an
    /// external collaborator fills them in.
    pub entry_price: Option<Decimal>,
    pub target_price: Option<Decimal>,
    pub stop_loss_price: Option<Decimal>,
    pub vetoed_by: Option<Veto>,
    pub reasoning: String,
    pub generated_at: DateTime<Utc>,
}

impl AggregatedSignal {
    pub fn is_vetoed(&self) -> bool {
        self.vetoed_by.is_some()
    }
}

/// What a completed task stores as its result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisReport {
    pub signal: AggregatedSignal,
    /// Every agent's result, errors included.
    pub agent_results: Vec<AgentResult>,
    pub processing_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tally_accumulates_per_bucket() {
        let mut tally = VoteTally::default();
        tally.add(Direction::Long, 0.5);
        tally.add(Direction::Long, 0.25);
        tally.add(Direction::Close, 0.1);
        assert_eq!(tally.get(Direction::Long), 0.75);
        assert_eq!(tally.get(Direction::Close), 0.1);
        assert_eq!(tally.get(Direction::Short), 0.0);
    }

    #[test]
    fn signal_price_levels_serialize_as_null() {
        let signal = AggregatedSignal {
            symbol: "600519".to_string(),
            direction: Direction::Hold,
            confidence: 0.5,
            position_size: 0.15,
            num_agreeing_agents: 2,
            num_surviving_agents: 3,
            num_errored_agents: 0,
            votes: VoteTally::default(),
            entry_price: None,
            target_price: None,
            stop_loss_price: None,
            vetoed_by: None,
            reasoning: "mixed".to_string(),
            generated_at: Utc::now(),
        };
        let json = serde_json::to_value(&signal).unwrap();
        assert!(json["entry_price"].is_null());
        assert!(json["stop_loss_price"].is_null());
        assert!(!signal.is_vetoed());
    }
}
