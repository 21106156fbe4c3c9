use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use augur_models::{AgentResult, AgentsConfig};
use chrono::NaiveDate;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::{Agent, RegisteredAgent};
use crate::error::AgentError;

/// Receives each agent result as soon as it is final.
pub trait ProgressSink: Send + Sync {
    /// `progress` is `completed / total` scaled to the agent phase range.
    fn agent_finished(&self, result: &AgentResult, completed: usize, total: usize, progress: u8);
}

/// Discards progress.
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn agent_finished(&self, _: &AgentResult, _: usize, _: usize, _: u8) {}
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub agent_timeout: Duration,
    pub retry_backoff: Duration,
    pub max_concurrent: Option<usize>,
    pub agent_phase_percent: u8,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self::from(&AgentsConfig::default())
    }
}

impl From<&AgentsConfig> for DispatchSettings {
    fn from(config: &AgentsConfig) -> Self {
        Self {
            agent_timeout: config.agent_timeout(),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_concurrent: config.max_concurrent_agents,
            agent_phase_percent: config.agent_phase_percent.min(100),
        }
    }
}

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    /// One result per agent that finished, keyed by agent name.
    pub results: HashMap<String, AgentResult>,
    /// Cancellation stopped the dispatch; `results` holds what finished before it.
    pub cancelled: bool,
}

impl DispatchOutcome {
    /// Results in registration order.
    pub fn ordered(&self, agents: &[RegisteredAgent]) -> Vec<AgentResult> {
        agents
            .iter()
            .filter_map(|a| self.results.get(a.name()).cloned())
            .collect()
    }
}

/// Runs agents concurrently and isolates their failures.
///
/// Every launched agent yields exactly one result: a timeout, an error, or a
/// panic becomes an error result and never affects the other agents.
pub struct Dispatcher {
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(settings: DispatchSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    pub async fn dispatch(
        &self,
        symbol: &str,
        as_of: Option<NaiveDate>,
        agents: &[RegisteredAgent],
        sink: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> DispatchOutcome {
        let total = agents.len();
        if cancel.is_cancelled() {
            return DispatchOutcome {
                results: HashMap::new(),
                cancelled: true,
            };
        }
        if total == 0 {
            return DispatchOutcome::default();
        }

        info!(symbol, agents = total, "Dispatching agents");
        let semaphore = self
            .settings
            .max_concurrent
            .map(|n| Arc::new(Semaphore::new(n.max(1))));

        let mut join_set = JoinSet::new();
        for entry in agents {
            let agent = Arc::clone(&entry.agent);
            let max_attempts = entry.max_attempts.max(1);
            let symbol = symbol.to_string();
            let settings = self.settings.clone();
            let cancel = cancel.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => tokio::select! {
                        permit = semaphore.acquire_owned() => permit.ok(),
                        _ = cancel.cancelled() => return None,
                    },
                    None => None,
                };
                if cancel.is_cancelled() {
                    return None;
                }
                Some(run_agent(agent, &symbol, as_of, max_attempts, &settings, &cancel).await)
            });
        }

        let phase = usize::from(self.settings.agent_phase_percent);
        let mut results: HashMap<String, AgentResult> = HashMap::with_capacity(total);
        let mut cancelled = false;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Running agents finish in the background; their results are dropped.
                    join_set.detach_all();
                    cancelled = true;
                    break;
                }
                joined = join_set.join_next() => match joined {
                    None => break,
                    Some(Ok(Some(result))) => {
                        let completed = results.len() + 1;
                        let progress = (completed * phase / total) as u8;
                        info!(
                            agent = %result.agent_name,
                            direction = ?result.direction,
                            confidence = result.confidence,
                            is_error = result.is_error,
                            attempts = result.attempts,
                            elapsed_ms = result.execution_time_ms,
                            completed,
                            total,
                            "Agent finished"
                        );
                        sink.agent_finished(&result, completed, total, progress);
                        results.insert(result.agent_name.clone(), result);
                    }
                    Some(Ok(None)) => {}
                    Some(Err(e)) => error!(error = %e, "Agent task failed to join"),
                }
            }
        }

        if !cancelled {
            for entry in agents {
                if !results.contains_key(entry.name()) {
                    let result =
                        AgentResult::error(entry.name(), entry.agent.domain(), "agent task aborted");
                    let completed = results.len() + 1;
                    sink.agent_finished(&result, completed, total, (completed * phase / total) as u8);
                    results.insert(entry.name().to_string(), result);
                }
            }
        }

        DispatchOutcome { results, cancelled }
    }
}

async fn run_agent(
    agent: Arc<dyn Agent>,
    symbol: &str,
    as_of: Option<NaiveDate>,
    max_attempts: u32,
    settings: &DispatchSettings,
    cancel: &CancellationToken,
) -> AgentResult {
    let name = agent.name().to_string();
    let domain = agent.domain().to_string();
    let start = Instant::now();
    let mut attempts = 0;
    let mut last_error = String::new();

    while attempts < max_attempts {
        attempts += 1;
        let attempt = AssertUnwindSafe(agent.run(symbol, as_of)).catch_unwind();
        let err = match tokio::time::timeout(settings.agent_timeout, attempt).await {
            Ok(Ok(Ok(result))) => {
                let mut result = result.sanitized();
                result.agent_name = name;
                if result.domain.is_empty() {
                    result.domain = domain;
                }
                return result.with_timing(start.elapsed().as_millis() as u64, attempts);
            }
            Ok(Ok(Err(e))) => e,
            Ok(Err(payload)) => AgentError::Panicked(panic_message(payload.as_ref())),
            Err(_) => AgentError::Timeout(settings.agent_timeout.as_millis() as u64),
        };
        warn!(agent = %name, attempt = attempts, max_attempts, error = %err, "Agent attempt failed");
        last_error = err.to_string();

        if attempts < max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(settings.retry_backoff) => {}
                _ = cancel.cancelled() => break,
            }
        }
    }

    AgentResult::error(
        name,
        domain,
        format!("{last_error} (after {attempts} attempt(s))"),
    )
    .with_timing(start.elapsed().as_millis() as u64, attempts)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentRegistry;
    use crate::test_support::{FlakyAgent, PanickingAgent, RecordingSink, ScriptedAgent, SleepingAgent};
    use augur_models::Direction;

    fn settings(timeout_ms: u64) -> DispatchSettings {
        DispatchSettings {
            agent_timeout: Duration::from_millis(timeout_ms),
            retry_backoff: Duration::from_millis(5),
            max_concurrent: None,
            agent_phase_percent: 85,
        }
    }

    #[tokio::test]
    async fn each_agent_yields_one_result() {
        let registry = AgentRegistry::new()
            .with(Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.8)), 1.0, 1)
            .with(Arc::new(ScriptedAgent::failing("sentiment", "feed down")), 1.0, 1)
            .with(Arc::new(PanickingAgent::new("policy")), 1.0, 1);
        let sink = RecordingSink::default();

        let outcome = Dispatcher::new(settings(500))
            .dispatch("600519", None, registry.agents(), &sink, &CancellationToken::new())
            .await;

        assert!(!outcome.cancelled);
        assert_eq!(outcome.results.len(), 3);
        assert!(!outcome.results["technical"].is_error);
        assert!(outcome.results["sentiment"].is_error);
        assert!(outcome.results["sentiment"].reasoning.contains("feed down"));
        assert!(outcome.results["policy"].is_error);
        assert!(outcome.results["policy"].reasoning.contains("panicked"));

        let progress = sink.progress();
        assert_eq!(progress.len(), 3);
        assert_eq!(progress.last().copied(), Some(85));
        assert!(progress.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn slow_agent_times_out_without_blocking_others() {
        let registry = AgentRegistry::new()
            .with(Arc::new(SleepingAgent::new("fundamental", Duration::from_secs(10))), 1.0, 1)
            .with(Arc::new(ScriptedAgent::returning("risk", Direction::Hold, 0.6)), 1.0, 1);

        let start = Instant::now();
        let outcome = Dispatcher::new(settings(50))
            .dispatch("600519", None, registry.agents(), &NoopSink, &CancellationToken::new())
            .await;

        assert!(start.elapsed() < Duration::from_secs(2));
        let slow = &outcome.results["fundamental"];
        assert!(slow.is_error);
        assert!(slow.reasoning.contains("timed out"));
        assert!(!outcome.results["risk"].is_error);
    }

    #[tokio::test]
    async fn flaky_agent_succeeds_on_retry() {
        let flaky = Arc::new(FlakyAgent::new("risk", 2, Direction::Long, 0.7));
        let registry = AgentRegistry::new().with(flaky.clone(), 1.0, 3);

        let outcome = Dispatcher::new(settings(500))
            .dispatch("600519", None, registry.agents(), &NoopSink, &CancellationToken::new())
            .await;

        let result = &outcome.results["risk"];
        assert!(!result.is_error);
        assert_eq!(result.attempts, 3);
        assert_eq!(flaky.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_report_attempt_count() {
        let flaky = Arc::new(FlakyAgent::new("fundamental", 5, Direction::Long, 0.7));
        let registry = AgentRegistry::new().with(flaky.clone(), 1.0, 2);

        let outcome = Dispatcher::new(settings(500))
            .dispatch("600519", None, registry.agents(), &NoopSink, &CancellationToken::new())
            .await;

        let result = &outcome.results["fundamental"];
        assert!(result.is_error);
        assert_eq!(result.attempts, 2);
        assert!(result.reasoning.contains("after 2 attempt(s)"));
    }

    #[tokio::test]
    async fn concurrency_cap_still_runs_everyone() {
        let registry = AgentRegistry::new()
            .with(Arc::new(SleepingAgent::new("a", Duration::from_millis(20))), 1.0, 1)
            .with(Arc::new(SleepingAgent::new("b", Duration::from_millis(20))), 1.0, 1)
            .with(Arc::new(SleepingAgent::new("c", Duration::from_millis(20))), 1.0, 1);
        let mut capped = settings(1_000);
        capped.max_concurrent = Some(1);

        let outcome = Dispatcher::new(capped)
            .dispatch("600519", None, registry.agents(), &NoopSink, &CancellationToken::new())
            .await;
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results.values().all(|r| !r.is_error));
    }

    #[tokio::test]
    async fn cancellation_stops_collecting() {
        let registry = AgentRegistry::new()
            .with(Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.8)), 1.0, 1)
            .with(Arc::new(SleepingAgent::new("fundamental", Duration::from_secs(10))), 1.0, 1);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = Dispatcher::new(settings(30_000))
            .dispatch("600519", None, registry.agents(), &NoopSink, &cancel)
            .await;

        assert!(outcome.cancelled);
        assert!(outcome.results.contains_key("technical"));
        assert!(!outcome.results.contains_key("fundamental"));
    }

    #[tokio::test]
    async fn already_cancelled_launches_nothing() {
        let registry = AgentRegistry::new()
            .with(Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.8)), 1.0, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = Dispatcher::new(settings(500))
            .dispatch("600519", None, registry.agents(), &NoopSink, &cancel)
            .await;
        assert!(outcome.cancelled);
        assert!(outcome.results.is_empty());
    }

    #[tokio::test]
    async fn ordered_follows_registration() {
        let registry = AgentRegistry::new()
            .with(Arc::new(SleepingAgent::new("slow", Duration::from_millis(30))), 1.0, 1)
            .with(Arc::new(ScriptedAgent::returning("fast", Direction::Hold, 0.5)), 1.0, 1);

        let outcome = Dispatcher::new(settings(1_000))
            .dispatch("600519", None, registry.agents(), &NoopSink, &CancellationToken::new())
            .await;
        let names: Vec<_> = outcome
            .ordered(registry.agents())
            .into_iter()
            .map(|r| r.agent_name)
            .collect();
        assert_eq!(names, vec!["slow", "fast"]);
    }
}
