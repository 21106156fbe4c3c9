use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use augur_models::AgentResult;
use chrono::NaiveDate;
use tracing::warn;

use crate::error::AgentError;

/// An independent analytical unit. Mockable for testing.
///
/// Implementations return an `AgentResult` with a calibrated confidence, or an
/// error; the dispatcher turns errors and timeouts into error results.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;
    fn domain(&self) -> &str;

    async fn run(&self, symbol: &str, as_of: Option<NaiveDate>)
        -> Result<AgentResult, AgentError>;
}

/// An agent plus its dispatch policy and vote weight.
#[derive(Clone)]
pub struct RegisteredAgent {
    pub agent: Arc<dyn Agent>,
    pub weight: f64,
    pub max_attempts: u32,
}

impl RegisteredAgent {
    pub fn name(&self) -> &str {
        self.agent.name()
    }
}

/// The set of agents a process runs. Built once at startup and shared by `Arc`.
#[derive(Clone, Default)]
pub struct AgentRegistry {
    agents: Vec<RegisteredAgent>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field(
                "agents",
                &self.agents.iter().map(|a| a.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent. A later registration with the same name replaces the earlier one.
    pub fn register(&mut self, agent: Arc<dyn Agent>, weight: f64, max_attempts: u32) {
        let entry = RegisteredAgent {
            agent,
            weight: weight.max(0.0),
            max_attempts: max_attempts.max(1),
        };
        if let Some(existing) = self
            .agents
            .iter_mut()
            .find(|a| a.name() == entry.name())
        {
            warn!(agent = %entry.name(), "Replacing previously registered agent");
            *existing = entry;
        } else {
            self.agents.push(entry);
        }
    }

    pub fn with(mut self, agent: Arc<dyn Agent>, weight: f64, max_attempts: u32) -> Self {
        self.register(agent, weight, max_attempts);
        self
    }

    pub fn agents(&self) -> &[RegisteredAgent] {
        &self.agents
    }

    pub fn weights(&self) -> HashMap<String, f64> {
        self.agents
            .iter()
            .map(|a| (a.name().to_string(), a.weight))
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.agents.iter().map(|a| a.name()).collect()
    }

    pub fn max_attempts(&self) -> u32 {
        self.agents.iter().map(|a| a.max_attempts).max().unwrap_or(1)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedAgent;
    use augur_models::Direction;

    #[test]
    fn register_replaces_same_name() {
        let mut registry = AgentRegistry::new();
        registry.register(
            Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.8)),
            0.3,
            1,
        );
        registry.register(
            Arc::new(ScriptedAgent::returning("technical", Direction::Short, 0.6)),
            0.5,
            2,
        );

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.weights()["technical"], 0.5);
        assert_eq!(registry.max_attempts(), 2);
    }

    #[test]
    fn register_sanitizes_policy() {
        let registry = AgentRegistry::new().with(
            Arc::new(ScriptedAgent::returning("risk", Direction::Hold, 0.5)),
            -1.0,
            0,
        );
        let entry = &registry.agents()[0];
        assert_eq!(entry.weight, 0.0);
        assert_eq!(entry.max_attempts, 1);
    }

    #[test]
    fn names_preserve_registration_order() {
        let registry = AgentRegistry::new()
            .with(
                Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.8)),
                1.0,
                1,
            )
            .with(
                Arc::new(ScriptedAgent::returning("risk", Direction::Hold, 0.5)),
                1.0,
                3,
            );
        assert_eq!(registry.names(), vec!["technical", "risk"]);
        assert!(!registry.is_empty());
    }
}
