use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Directional opinion of an agent or of the aggregated signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
    Hold,
    Close,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Long,
        Direction::Short,
        Direction::Hold,
        Direction::Close,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
            Direction::Hold => "hold",
            Direction::Close => "close",
        }
    }

    /// Short and close both mean "reduce exposure".
    pub fn is_bearish(&self) -> bool {
        matches!(self, Direction::Short | Direction::Close)
    }

    pub fn is_bullish(&self) -> bool {
        matches!(self, Direction::Long)
    }

    /// Map a discrete policy action (0 = long, 1 = hold, 2 = short) to a direction.
    ///
    /// Out-of-range indices come from external models and must not crash the
    /// pipeline: they fall back to `Hold` with a warning.
    pub fn from_action_index(index: i64) -> Direction {
        match index {
            0 => Direction::Long,
            1 => Direction::Hold,
            2 => Direction::Short,
            other => {
                warn!(
                    action_index = other,
                    valid_range = "[0,2]",
                    "Policy emitted out-of-range direction index, treating as hold"
                );
                Direction::Hold
            }
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of exactly one agent for one task.
///
/// Build through [`AgentResult::success`] or [`AgentResult::error`] so the
/// error invariant (`is_error` ⇒ no direction, zero confidence) always holds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentResult {
    pub agent_name: String,
    pub domain: String,
    /// `None` if and only if `is_error`.
    pub direction: Option<Direction>,
    /// 0.0 to 1.0 calibrated confidence.
    pub confidence: f64,
    /// -1.0 to 1.0 raw analytical score.
    pub score: f64,
    pub reasoning: String,
    /// Domain-specific structured analysis. Meaningless when `is_error`.
    pub analysis: serde_json::Map<String, serde_json::Value>,
    pub execution_time_ms: u64,
    pub is_error: bool,
    /// Hard-stop condition raised by the agent (e.g. trading halted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veto: Option<String>,
    #[serde(default = "default_attempts")]
    pub attempts: u32,
}

fn default_attempts() -> u32 {
    1
}

impl AgentResult {
    pub fn success(
        agent_name: impl Into<String>,
        domain: impl Into<String>,
        direction: Direction,
        confidence: f64,
        score: f64,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            domain: domain.into(),
            direction: Some(direction),
            confidence: clamp_unit(confidence),
            score: clamp_score(score),
            reasoning: reasoning.into(),
            analysis: serde_json::Map::new(),
            execution_time_ms: 0,
            is_error: false,
            veto: None,
            attempts: 1,
        }
    }

    pub fn error(
        agent_name: impl Into<String>,
        domain: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            agent_name: agent_name.into(),
            domain: domain.into(),
            direction: None,
            confidence: 0.0,
            score: 0.0,
            reasoning: reason.into(),
            analysis: serde_json::Map::new(),
            execution_time_ms: 0,
            is_error: true,
            veto: None,
            attempts: 1,
        }
    }

    pub fn with_analysis(mut self, analysis: serde_json::Map<String, serde_json::Value>) -> Self {
        self.analysis = analysis;
        self
    }

    pub fn with_veto(mut self, reason: impl Into<String>) -> Self {
        self.veto = Some(reason.into());
        self
    }

    pub fn with_timing(mut self, execution_time_ms: u64, attempts: u32) -> Self {
        self.execution_time_ms = execution_time_ms;
        self.attempts = attempts;
        self
    }

    /// Re-establish the invariants on a result produced by third-party code.
    pub fn sanitized(mut self) -> Self {
        if self.is_error || self.direction.is_none() {
            self.is_error = true;
            self.direction = None;
            self.confidence = 0.0;
            self.score = 0.0;
            self.veto = None;
            self.analysis.clear();
        } else {
            self.confidence = clamp_unit(self.confidence);
            self.score = clamp_score(self.score);
        }
        self
    }

    /// The analysis map, hidden for error results.
    pub fn analysis(&self) -> Option<&serde_json::Map<String, serde_json::Value>> {
        if self.is_error {
            None
        } else {
            Some(&self.analysis)
        }
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}
