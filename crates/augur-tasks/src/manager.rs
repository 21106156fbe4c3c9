use std::sync::Arc;
use std::time::{Duration, Instant};

use augur_agents::{AgentRegistry, DispatchSettings, Dispatcher, ProgressSink, SignalAggregator};
use augur_models::{
    AgentResult, AnalysisReport, AnalysisTask, AugurConfig, TaskEvent, TaskFilter, TaskStatus,
    TasksConfig,
};
use chrono::{NaiveDate, Utc};
use futures::stream::{BoxStream, StreamExt};
use moka::future::Cache;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entry::TaskEntry;
use crate::error::TaskError;
use crate::publisher::event_stream;
use crate::{PROGRESS_AGGREGATING, PROGRESS_CREATED, PROGRESS_DISPATCH};

/// Owns every analysis task from creation until it ages out of retention.
///
/// Cloning is cheap; clones share the same task table.
#[derive(Clone)]
pub struct TaskManager {
    tasks: Cache<Uuid, Arc<TaskEntry>>,
    runner: Arc<Runner>,
}

struct Runner {
    registry: Arc<AgentRegistry>,
    dispatcher: Dispatcher,
    aggregator: SignalAggregator,
    deadline: Duration,
}

impl TaskManager {
    pub fn new(
        registry: Arc<AgentRegistry>,
        dispatcher: Dispatcher,
        aggregator: SignalAggregator,
        deadline: Duration,
        retention: &TasksConfig,
    ) -> Self {
        Self {
            tasks: Cache::builder()
                .max_capacity(retention.max_tasks)
                .time_to_live(Duration::from_secs(retention.retention_seconds))
                .build(),
            runner: Arc::new(Runner {
                registry,
                dispatcher,
                aggregator,
                deadline,
            }),
        }
    }

    /// Wire dispatcher, aggregator and deadline from configuration.
    pub fn from_config(registry: AgentRegistry, config: &AugurConfig) -> Self {
        let dispatcher = Dispatcher::new(DispatchSettings::from(&config.agents));
        let aggregator = SignalAggregator::new(config.aggregation.clone(), registry.weights());
        let deadline = config.agents.max_task_duration(registry.len());
        Self::new(
            Arc::new(registry),
            dispatcher,
            aggregator,
            deadline,
            &config.tasks,
        )
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.runner.registry
    }

    pub fn deadline(&self) -> Duration {
        self.runner.deadline
    }

    /// Register a task and start it in the background. Returns at once.
    pub async fn create(&self, symbol: &str, as_of: Option<NaiveDate>) -> Result<Uuid, TaskError> {
        let symbol = normalize_symbol(symbol)?;
        let entry = Arc::new(TaskEntry::new(AnalysisTask::new(symbol.clone(), as_of)));
        entry.append(PROGRESS_CREATED, format!("Task created for {symbol}"));
        let task_id = entry.id();
        self.tasks.insert(task_id, Arc::clone(&entry)).await;

        info!(%task_id, symbol = %symbol, as_of = ?as_of, "Task created");
        tokio::spawn(Arc::clone(&self.runner).run(entry));
        Ok(task_id)
    }

    pub async fn entry(&self, task_id: Uuid) -> Result<Arc<TaskEntry>, TaskError> {
        self.tasks
            .get(&task_id)
            .await
            .ok_or(TaskError::NotFound(task_id))
    }

    pub async fn get(&self, task_id: Uuid) -> Result<AnalysisTask, TaskError> {
        Ok(self.entry(task_id).await?.snapshot())
    }

    /// Cancel a pending or running task. A terminal task is returned unchanged.
    pub async fn cancel(&self, task_id: Uuid) -> Result<AnalysisTask, TaskError> {
        let entry = self.entry(task_id).await?;
        if entry.cancel() {
            info!(%task_id, "Task cancelled");
        }
        Ok(entry.snapshot())
    }

    /// Matching tasks, newest first.
    pub fn list(&self, filter: &TaskFilter) -> Vec<AnalysisTask> {
        let mut tasks: Vec<AnalysisTask> = self
            .tasks
            .iter()
            .map(|(_, entry)| entry.snapshot())
            .filter(|task| filter.matches(task))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            tasks.truncate(limit);
        }
        tasks
    }

    /// Resolve once the task reaches a terminal state.
    pub async fn wait(&self, task_id: Uuid) -> Result<AnalysisTask, TaskError> {
        let entry = self.entry(task_id).await?;
        let mut version = entry.publisher().subscribe();
        loop {
            version.borrow_and_update();
            let task = entry.snapshot();
            if task.is_terminal() || version.changed().await.is_err() {
                return Ok(task);
            }
        }
    }

    /// The most recently completed analysis of `symbol` no older than `max_age`.
    pub fn latest_completed(&self, symbol: &str, max_age: Duration) -> Option<AnalysisTask> {
        let symbol = normalize_symbol(symbol).ok()?;
        // An age too large to represent admits every completed task.
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        self.tasks
            .iter()
            .map(|(_, entry)| entry.snapshot())
            .filter(|task| task.status == TaskStatus::Completed && task.symbol == symbol)
            .filter(|task| match (task.completed_at, cutoff) {
                (Some(at), Some(cutoff)) => at >= cutoff,
                (Some(_), None) => true,
                (None, _) => false,
            })
            .max_by_key(|task| task.completed_at)
    }

    /// Progress events for one task: replay, live progress, then one terminal event.
    pub async fn subscribe(&self, task_id: Uuid) -> Result<BoxStream<'static, TaskEvent>, TaskError> {
        let entry = self.entry(task_id).await?;
        Ok(event_stream(entry).boxed())
    }
}

impl Runner {
    async fn run(self: Arc<Self>, entry: Arc<TaskEntry>) {
        let (task_id, symbol, as_of) = entry.read(|t| (t.task_id, t.symbol.clone(), t.as_of));
        let agents = self.registry.agents();
        if !entry.start(format!("Dispatching {} agents", agents.len())) {
            info!(%task_id, "Task left pending before dispatch; not running");
            return;
        }

        let started = Instant::now();
        let cancel = entry.cancel_token();
        let sink = EntrySink { entry: &entry };
        let dispatch = self
            .dispatcher
            .dispatch(&symbol, as_of, agents, &sink, &cancel);

        let outcome = match tokio::time::timeout(self.deadline, dispatch).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let error = TaskError::DeadlineExceeded(self.deadline);
                warn!(%task_id, symbol = %symbol, error = %error, "Task deadline exceeded");
                entry.fail(error.to_string());
                cancel.cancel();
                return;
            }
        };
        if outcome.cancelled {
            info!(%task_id, finished = outcome.results.len(), "Dispatch stopped by cancellation");
            return;
        }

        let results = outcome.ordered(agents);
        entry.append(
            PROGRESS_AGGREGATING,
            format!("Aggregating {} agent results", results.len()),
        );

        match self.aggregator.aggregate(&symbol, &results) {
            Ok(signal) => {
                let message = format!(
                    "Analysis complete: {} with confidence {:.2}",
                    signal.direction, signal.confidence
                );
                info!(
                    %task_id,
                    symbol = %symbol,
                    direction = %signal.direction,
                    confidence = signal.confidence,
                    position_size = signal.position_size,
                    vetoed = signal.is_vetoed(),
                    "Task completed"
                );
                let report = AnalysisReport {
                    signal,
                    agent_results: results,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                };
                entry.complete(report, message);
            }
            Err(e) => {
                let error = TaskError::from(e);
                warn!(%task_id, symbol = %symbol, error = %error, "Task failed");
                entry.fail(error.to_string());
            }
        }
    }
}

/// Reports each finished agent into the task log.
struct EntrySink<'a> {
    entry: &'a TaskEntry,
}

impl ProgressSink for EntrySink<'_> {
    fn agent_finished(&self, result: &AgentResult, completed: usize, total: usize, progress: u8) {
        let message = match result.direction {
            Some(direction) if !result.is_error => format!(
                "{} finished ({completed}/{total}): {direction} ({:.2})",
                result.agent_name, result.confidence
            ),
            _ => format!(
                "{} failed ({completed}/{total}): {}",
                result.agent_name, result.reasoning
            ),
        };
        self.entry.record_agent(
            result.clone(),
            PROGRESS_DISPATCH.saturating_add(progress),
            message,
        );
    }
}

fn normalize_symbol(symbol: &str) -> Result<String, TaskError> {
    let normalized = symbol.trim().to_ascii_uppercase();
    if normalized.is_empty() {
        return Err(TaskError::InvalidSymbol(symbol.to_string()));
    }
    Ok(normalized)
}
