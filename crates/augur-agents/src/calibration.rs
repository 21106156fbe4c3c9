//! Per-domain confidence calibration.
//!
//! Each analyst reduces its inputs to a raw score in [-1, 1] plus the evidence
//! behind it. The calibrator turns that into a direction and a confidence in
//! [0, 1] so results from different domains are comparable when voting.

use augur_models::Direction;
use serde::{Deserialize, Serialize};

/// The opinion of a single indicator or metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Vote {
    Bullish,
    Bearish,
    Neutral,
}

impl Vote {
    pub fn value(&self) -> f64 {
        match self {
            Vote::Bullish => 1.0,
            Vote::Bearish => -1.0,
            Vote::Neutral => 0.0,
        }
    }

    fn agrees_with(&self, direction: Direction) -> bool {
        match direction {
            Direction::Long => *self == Vote::Bullish,
            Direction::Short | Direction::Close => *self == Vote::Bearish,
            Direction::Hold => *self == Vote::Neutral,
        }
    }
}

/// Mean of the vote values, 0 for no votes.
pub fn vote_score(votes: &[Vote]) -> f64 {
    if votes.is_empty() {
        return 0.0;
    }
    votes.iter().map(Vote::value).sum::<f64>() / votes.len() as f64
}

/// What an analyst saw, per domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Evidence {
    /// One vote per indicator that had data, plus ADX when available.
    Technical {
        votes: Vec<Vote>,
        trend_strength: Option<f64>,
    },
    /// One vote per fundamental metric present.
    Fundamental { votes: Vec<Vote>, exceptional: bool },
    /// The raw score is the risk score; `factors` counts the inputs behind it.
    Risk { factors: usize },
    /// Independent scores in [-1, 1] (sentiment sources, policy items).
    Consensus {
        scores: Vec<f64>,
        expected_sources: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub direction: Direction,
    pub confidence: f64,
}

impl Calibration {
    /// Zero evidence: neutral, no conviction.
    pub fn no_signal() -> Self {
        Self {
            direction: Direction::Hold,
            confidence: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationThresholds {
    /// |raw score| at or below this is neutral for vote-based domains.
    pub direction_dead_zone: f64,
    /// Dead zone for consensus domains, whose inputs are noisier.
    pub consensus_dead_zone: f64,
    pub strong_trend: f64,
    pub weak_trend: f64,
    pub strong_trend_multiplier: f64,
    pub weak_trend_multiplier: f64,
    pub expected_fundamental_metrics: usize,
    pub exceptional_multiplier: f64,
    pub risk_low: f64,
    pub risk_high: f64,
}

impl Default for CalibrationThresholds {
    fn default() -> Self {
        Self {
            direction_dead_zone: 0.1,
            consensus_dead_zone: 0.15,
            strong_trend: 25.0,
            weak_trend: 20.0,
            strong_trend_multiplier: 1.15,
            weak_trend_multiplier: 0.92,
            expected_fundamental_metrics: 5,
            exceptional_multiplier: 1.15,
            risk_low: 0.3,
            risk_high: 0.6,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    thresholds: CalibrationThresholds,
}

impl Calibrator {
    pub fn new(thresholds: CalibrationThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &CalibrationThresholds {
        &self.thresholds
    }

    /// Deterministic, side-effect free.
    pub fn calibrate(&self, raw_score: f64, evidence: &Evidence) -> Calibration {
        let raw_score = if raw_score.is_finite() {
            raw_score.clamp(-1.0, 1.0)
        } else {
            0.0
        };
        match evidence {
            Evidence::Technical {
                votes,
                trend_strength,
            } => self.technical(raw_score, votes, *trend_strength),
            Evidence::Fundamental { votes, exceptional } => {
                self.fundamental(raw_score, votes, *exceptional)
            }
            Evidence::Risk { factors } => self.risk(raw_score, *factors),
            Evidence::Consensus {
                scores,
                expected_sources,
            } => self.consensus(scores, *expected_sources),
        }
    }

    fn technical(&self, raw: f64, votes: &[Vote], trend_strength: Option<f64>) -> Calibration {
        if votes.is_empty() {
            return Calibration::no_signal();
        }
        let t = &self.thresholds;
        let direction = directional(raw, t.direction_dead_zone);
        let ratio = agreement(votes, direction);

        let mut confidence = 0.4 + ratio * 0.5 + raw.abs() * 0.1;
        match trend_strength {
            Some(adx) if adx > t.strong_trend => confidence *= t.strong_trend_multiplier,
            Some(adx) if adx < t.weak_trend => confidence *= t.weak_trend_multiplier,
            _ => {}
        }

        Calibration {
            direction,
            confidence: confidence.clamp(0.3, 1.0),
        }
    }

    fn fundamental(&self, raw: f64, votes: &[Vote], exceptional: bool) -> Calibration {
        if votes.is_empty() {
            return Calibration::no_signal();
        }
        let t = &self.thresholds;
        let direction = directional(raw, t.direction_dead_zone);
        let consistency = agreement(votes, direction);
        let expected = t.expected_fundamental_metrics.max(1) as f64;
        let completeness = (votes.len() as f64 / expected).min(1.0);

        let mut confidence = 0.45 + consistency * 0.4 + completeness * 0.1;
        if exceptional {
            confidence *= t.exceptional_multiplier;
        }

        Calibration {
            direction,
            confidence: confidence.clamp(0.4, 1.0),
        }
    }

    /// Low risk favours entering, moderate risk waits, high risk exits.
    fn risk(&self, raw: f64, factors: usize) -> Calibration {
        if factors == 0 {
            return Calibration::no_signal();
        }
        let t = &self.thresholds;
        let r = raw.abs();
        let (direction, confidence) = if r < t.risk_low {
            (Direction::Long, 0.7 - r * 0.5)
        } else if r < t.risk_high {
            (Direction::Hold, 0.45 + (r - t.risk_low))
        } else {
            (Direction::Close, (r + 0.15).min(0.95))
        };
        Calibration {
            direction,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    fn consensus(&self, scores: &[f64], expected_sources: usize) -> Calibration {
        let scores: Vec<f64> = scores
            .iter()
            .copied()
            .filter(|s| s.is_finite())
            .map(|s| s.clamp(-1.0, 1.0))
            .collect();
        if scores.is_empty() {
            return Calibration::no_signal();
        }
        let dz = self.thresholds.consensus_dead_zone;
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let direction = directional(mean, dz);

        let agreeing = scores
            .iter()
            .filter(|s| match direction {
                Direction::Long => **s > dz,
                Direction::Short | Direction::Close => **s < -dz,
                Direction::Hold => s.abs() <= dz,
            })
            .count();
        let agreement = agreeing as f64 / scores.len() as f64;
        let coverage = (scores.len() as f64 / expected_sources.max(1) as f64).min(1.0);

        let confidence = 0.35 + agreement * 0.45 + coverage * 0.1 + mean.abs() * 0.1;
        Calibration {
            direction,
            confidence: confidence.clamp(0.3, 0.95),
        }
    }
}

fn directional(score: f64, dead_zone: f64) -> Direction {
    if score > dead_zone {
        Direction::Long
    } else if score < -dead_zone {
        Direction::Short
    } else {
        Direction::Hold
    }
}

fn agreement(votes: &[Vote], direction: Direction) -> f64 {
    let agreeing = votes.iter().filter(|v| v.agrees_with(direction)).count();
    agreeing as f64 / votes.len() as f64
}
