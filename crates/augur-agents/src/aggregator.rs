use std::collections::HashMap;

use augur_models::{AgentResult, AggregatedSignal, AggregationConfig, Direction, Veto, VoteTally};
use chrono::Utc;
use tracing::{debug, info};

use crate::error::AggregationError;

const TIE_EPSILON: f64 = 1e-9;

/// Fuses agent results into one signal by confidence-weighted voting.
///
/// - Confidence is `sqrt(agreeing support / total weight)`: the geometric mean
///   of the agreeing agents' weighted confidence and their share of the total
///   weight. Moving any agent onto the winning side never lowers it.
/// - Error results do not vote. Their weight still counts toward the total, so
///   losing agents lower confidence.
/// - A veto from a veto-capable agent forces `hold` with zero position size.
/// - Ties between top buckets, and an all-zero vote, resolve to `hold`.
#[derive(Debug, Clone)]
pub struct SignalAggregator {
    config: AggregationConfig,
    weights: HashMap<String, f64>,
}

impl SignalAggregator {
    pub fn new(config: AggregationConfig, weights: HashMap<String, f64>) -> Self {
        Self { config, weights }
    }

    pub fn weight_of(&self, agent: &str) -> f64 {
        let w = self
            .weights
            .get(agent)
            .copied()
            .unwrap_or(self.config.default_weight);
        if w.is_finite() {
            w.max(0.0)
        } else {
            0.0
        }
    }

    fn can_veto(&self, result: &AgentResult) -> bool {
        self.config
            .veto_agents
            .iter()
            .any(|v| *v == result.agent_name || *v == result.domain)
    }

    pub fn aggregate(
        &self,
        symbol: &str,
        results: &[AgentResult],
    ) -> Result<AggregatedSignal, AggregationError> {
        let survivors: Vec<&AgentResult> = results
            .iter()
            .filter(|r| !r.is_error && r.direction.is_some())
            .collect();
        let errored = results.len() - survivors.len();
        if survivors.is_empty() {
            return Err(AggregationError::NoSurvivingAgents {
                total: results.len(),
            });
        }

        let mut votes = VoteTally::default();
        for r in &survivors {
            if let Some(direction) = r.direction {
                votes.add(direction, self.weight_of(&r.agent_name) * r.confidence);
            }
        }

        let total_weight: f64 = results.iter().map(|r| self.weight_of(&r.agent_name)).sum();
        let surviving_weight: f64 = survivors.iter().map(|r| self.weight_of(&r.agent_name)).sum();
        let coverage = if total_weight > 0.0 {
            surviving_weight / total_weight
        } else {
            survivors.len() as f64 / results.len() as f64
        };

        let veto = survivors
            .iter()
            .filter(|r| r.veto.is_some() && self.can_veto(r))
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence));

        let (direction, confidence, position_size, vetoed_by) = match veto {
            Some(vetoing) => {
                let reason = vetoing.veto.clone().unwrap_or_default();
                info!(symbol, agent = %vetoing.agent_name, reason = %reason, "Signal vetoed");
                (
                    Direction::Hold,
                    vetoing.confidence,
                    0.0,
                    Some(Veto {
                        agent: vetoing.agent_name.clone(),
                        reason,
                    }),
                )
            }
            None => {
                let direction = winner(&votes);
                let agreeing: Vec<&&AgentResult> = survivors
                    .iter()
                    .filter(|r| r.direction == Some(direction))
                    .collect();
                let support: f64 = agreeing
                    .iter()
                    .map(|r| self.weight_of(&r.agent_name) * r.confidence)
                    .sum();
                let share = if total_weight > 0.0 {
                    support / total_weight
                } else {
                    agreeing.iter().map(|r| r.confidence).sum::<f64>() / results.len() as f64
                };
                let confidence = share.clamp(0.0, 1.0).sqrt();
                let cap = self.config.max_position_cap.clamp(0.0, 1.0);
                (direction, confidence, (confidence * cap).min(cap), None)
            }
        };

        let num_agreeing = survivors
            .iter()
            .filter(|r| r.direction == Some(direction))
            .count();

        let reasoning = build_reasoning(
            direction,
            confidence,
            coverage,
            num_agreeing,
            &votes,
            vetoed_by.as_ref(),
            results,
        );

        debug!(
            symbol,
            direction = %direction,
            confidence,
            coverage,
            survivors = survivors.len(),
            errored,
            "Aggregated signal"
        );

        Ok(AggregatedSignal {
            symbol: symbol.to_string(),
            direction,
            confidence,
            position_size,
            num_agreeing_agents: num_agreeing,
            num_surviving_agents: survivors.len(),
            num_errored_agents: errored,
            votes,
            entry_price: None,
            target_price: None,
            stop_loss_price: None,
            vetoed_by,
            reasoning,
            generated_at: Utc::now(),
        })
    }
}

/// Free-function form for callers holding a plain weight table.
pub fn aggregate(
    symbol: &str,
    results: &[AgentResult],
    weights: &HashMap<String, f64>,
    config: &AggregationConfig,
) -> Result<AggregatedSignal, AggregationError> {
    SignalAggregator::new(config.clone(), weights.clone()).aggregate(symbol, results)
}

fn winner(votes: &VoteTally) -> Direction {
    let best = Direction::ALL
        .iter()
        .map(|d| votes.get(*d))
        .fold(0.0_f64, f64::max);
    if best <= TIE_EPSILON {
        return Direction::Hold;
    }
    let leaders: Vec<Direction> = Direction::ALL
        .iter()
        .copied()
        .filter(|d| (votes.get(*d) - best).abs() <= TIE_EPSILON)
        .collect();
    match leaders.as_slice() {
        [single] => *single,
        _ => Direction::Hold,
    }
}

fn build_reasoning(
    direction: Direction,
    confidence: f64,
    coverage: f64,
    num_agreeing: usize,
    votes: &VoteTally,
    veto: Option<&Veto>,
    results: &[AgentResult],
) -> String {
    let survivors = results.iter().filter(|r| !r.is_error).count();
    let mut lines = Vec::with_capacity(results.len() + 2);
    match veto {
        Some(v) => lines.push(format!("HOLD: vetoed by {} ({}).", v.agent, v.reason)),
        None => lines.push(format!(
            "{}: {num_agreeing}/{survivors} agents agree, confidence {confidence:.2}, coverage {:.0}%.",
            direction.as_str().to_uppercase(),
            coverage * 100.0,
        )),
    }
    lines.push(format!(
        "Votes: long {:.3}, short {:.3}, hold {:.3}, close {:.3}.",
        votes.long, votes.short, votes.hold, votes.close
    ));
    for r in results {
        match r.direction {
            Some(d) if !r.is_error => lines.push(format!(
                "[{}] {d} ({:.2}): {}",
                r.agent_name, r.confidence, r.reasoning
            )),
            _ => lines.push(format!("[{}] failed: {}", r.agent_name, r.reasoning)),
        }
    }
    lines.join("\n")
}
