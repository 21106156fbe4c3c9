//! Integration tests for the task lifecycle: creation, background dispatch,
//! progress streaming with replay, cancellation and the total deadline.
//!
//! Agents are scripted so every run is deterministic and fast.
//!
//! Run with:
//! ```bash
//! cargo test -p augur-tasks --test lifecycle
//! ```

use std::sync::Arc;
use std::time::Duration;

use augur_agents::test_support::{GatedAgent, ScriptedAgent, SleepingAgent};
use augur_agents::{AgentRegistry, DispatchSettings, Dispatcher, SignalAggregator};
use augur_models::{
    AggregationConfig, AnalysisTask, Direction, ProgressMessage, TaskEvent, TaskFilter,
    TaskStatus, TasksConfig,
};
use augur_tasks::{TaskError, TaskManager};
use futures::StreamExt;
use uuid::Uuid;

const STREAM_TIMEOUT: Duration = Duration::from_secs(5);

fn manager_with(registry: AgentRegistry, agent_timeout: Duration, deadline: Duration) -> TaskManager {
    let settings = DispatchSettings {
        agent_timeout,
        retry_backoff: Duration::from_millis(5),
        max_concurrent: None,
        agent_phase_percent: 85,
    };
    let aggregator = SignalAggregator::new(AggregationConfig::default(), registry.weights());
    TaskManager::new(
        Arc::new(registry),
        Dispatcher::new(settings),
        aggregator,
        deadline,
        &TasksConfig::default(),
    )
}

fn manager_with_deadline(registry: AgentRegistry, deadline: Duration) -> TaskManager {
    manager_with(registry, Duration::from_secs(30), deadline)
}

fn manager(registry: AgentRegistry) -> TaskManager {
    manager_with_deadline(registry, Duration::from_secs(30))
}

fn three_bullish_agents() -> AgentRegistry {
    AgentRegistry::new()
        .with(Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.8)), 1.0, 1)
        .with(Arc::new(ScriptedAgent::returning("fundamental", Direction::Long, 0.7)), 1.0, 1)
        .with(Arc::new(ScriptedAgent::returning("sentiment", Direction::Long, 0.75)), 1.0, 1)
}

/// Poll until `done` holds for the task, or give up after a few seconds.
async fn until(
    manager: &TaskManager,
    task_id: Uuid,
    done: impl Fn(&AnalysisTask) -> bool,
) -> AnalysisTask {
    for _ in 0..500 {
        let task = manager.get(task_id).await.unwrap();
        if done(&task) {
            return task;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} never reached the expected state");
}

/// Rebuild the full progress log a subscriber observed.
fn observed_log(events: &[TaskEvent]) -> Vec<ProgressMessage> {
    let mut log = Vec::new();
    for event in events {
        match event {
            TaskEvent::Replay { messages, .. } => log.extend(messages.iter().cloned()),
            TaskEvent::Progress { message, .. } => log.push(message.clone()),
            _ => {}
        }
    }
    log
}

#[tokio::test]
async fn task_completes_with_phased_progress() {
    let manager = manager(three_bullish_agents());

    let task_id = manager.create(" 600519 ", None).await.unwrap();
    let task = tokio::time::timeout(STREAM_TIMEOUT, manager.wait(task_id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.symbol, "600519");
    assert_eq!(task.progress, 100);
    assert!(task.started_at.is_some() && task.completed_at.is_some());

    let progress: Vec<u8> = task.progress_messages.iter().map(|m| m.progress).collect();
    assert_eq!(progress, vec![0, 5, 33, 61, 90, 95, 100]);
    assert_eq!(task.progress_messages[0].message, "Task created for 600519");
    assert_eq!(task.progress_messages[1].message, "Dispatching 3 agents");

    let report = task.result.unwrap();
    assert_eq!(report.signal.direction, Direction::Long);
    assert!((report.signal.confidence - 0.75f64.sqrt()).abs() < 1e-9);
    assert_eq!(report.agent_results.len(), 3);
    assert_eq!(task.agent_results.len(), 3);
}

#[tokio::test]
async fn reconnecting_subscriber_sees_the_same_log() {
    let (gated, gate) = GatedAgent::new("fundamental", Direction::Long, 0.7);
    let registry = AgentRegistry::new()
        .with(Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.8)), 1.0, 1)
        .with(Arc::new(gated), 1.0, 1);
    let manager = manager(registry);

    let task_id = manager.create("000001", None).await.unwrap();
    let first = manager.subscribe(task_id).await.unwrap();

    // One agent has reported; the other is held at the gate.
    until(&manager, task_id, |t| t.agent_results.len() == 1).await;
    let second = manager.subscribe(task_id).await.unwrap();
    gate.add_permits(1);

    let first: Vec<TaskEvent> = tokio::time::timeout(STREAM_TIMEOUT, first.collect())
        .await
        .unwrap();
    let second: Vec<TaskEvent> = tokio::time::timeout(STREAM_TIMEOUT, second.collect())
        .await
        .unwrap();
    let task = manager.get(task_id).await.unwrap();

    match &second[0] {
        TaskEvent::Replay { messages, status, .. } => {
            assert_eq!(*status, TaskStatus::Running);
            assert!(messages.len() >= 3, "replay had {} messages", messages.len());
        }
        other => panic!("expected replay first, got {other:?}"),
    }
    for events in [&first, &second] {
        assert_eq!(observed_log(events), task.progress_messages);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(events.last().map(|e| e.event_name()), Some("complete"));
    }
}

#[tokio::test]
async fn subscribing_to_finished_task_ends_immediately() {
    let manager = manager(three_bullish_agents());
    let task_id = manager.create("600036", None).await.unwrap();
    manager.wait(task_id).await.unwrap();

    let events: Vec<TaskEvent> =
        tokio::time::timeout(STREAM_TIMEOUT, manager.subscribe(task_id).await.unwrap().collect())
            .await
            .unwrap();

    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_name(), "replay");
    match &events[1] {
        TaskEvent::Complete { report, .. } => {
            assert_eq!(report.signal.symbol, "600036");
        }
        other => panic!("expected complete, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_keeps_partial_results_and_discards_late_ones() {
    let (gated, gate) = GatedAgent::new("fundamental", Direction::Long, 0.7);
    let registry = AgentRegistry::new()
        .with(Arc::new(ScriptedAgent::returning("technical", Direction::Short, 0.6)), 1.0, 1)
        .with(Arc::new(gated), 1.0, 1);
    let manager = manager(registry);

    let task_id = manager.create("601318", None).await.unwrap();
    until(&manager, task_id, |t| t.agent_results.len() == 1).await;

    let cancelled = manager.cancel(task_id).await.unwrap();
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert_eq!(cancelled.agent_results.len(), 1);

    // The held agent finishes after cancellation; its result is dropped.
    gate.add_permits(1);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let task = manager.wait(task_id).await.unwrap();
    assert_eq!(task, cancelled);
    assert!(task.result.is_none());
    assert!(manager.entry(task_id).await.unwrap().cancel_token().is_cancelled());

    // A second cancel is a no-op on a terminal task.
    assert_eq!(manager.cancel(task_id).await.unwrap(), cancelled);

    let events: Vec<TaskEvent> = manager.subscribe(task_id).await.unwrap().collect().await;
    match events.last() {
        Some(TaskEvent::Error { status, error, .. }) => {
            assert_eq!(*status, TaskStatus::Cancelled);
            assert_eq!(error, "cancelled by request");
        }
        other => panic!("expected error event, got {other:?}"),
    }
}

#[tokio::test]
async fn cancel_before_dispatch_never_runs() {
    let manager = manager(three_bullish_agents());
    let task_id = manager.create("600519", None).await.unwrap();
    manager.cancel(task_id).await.unwrap();

    let task = manager.wait(task_id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.result.is_none());
}

#[tokio::test]
async fn deadline_fails_task_but_keeps_finished_agents() {
    let registry = AgentRegistry::new()
        .with(Arc::new(ScriptedAgent::returning("technical", Direction::Long, 0.8)), 1.0, 1)
        .with(Arc::new(SleepingAgent::new("policy", Duration::from_secs(10))), 1.0, 1);
    let manager = manager_with_deadline(registry, Duration::from_millis(200));

    let task_id = manager.create("000002", None).await.unwrap();
    let task = tokio::time::timeout(STREAM_TIMEOUT, manager.wait(task_id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("deadline"));
    assert_eq!(task.agent_results.len(), 1);
    assert_eq!(task.agent_results[0].agent_name, "technical");
    assert!(manager.entry(task_id).await.unwrap().cancel_token().is_cancelled());
}

#[tokio::test]
async fn agent_timing_out_on_every_attempt_still_completes() {
    let registry = three_bullish_agents().with(
        Arc::new(SleepingAgent::new("policy", Duration::from_secs(10))),
        1.0,
        3,
    );
    let manager = manager_with(registry, Duration::from_millis(50), Duration::from_secs(5));

    let task_id = manager.create("600519", None).await.unwrap();
    let task = tokio::time::timeout(STREAM_TIMEOUT, manager.wait(task_id))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(task.status, TaskStatus::Completed);
    let report = task.result.unwrap();
    assert_eq!(report.agent_results.len(), 4);
    let policy = report
        .agent_results
        .iter()
        .find(|r| r.agent_name == "policy")
        .unwrap();
    assert!(policy.is_error);
    assert_eq!(policy.attempts, 3);
    assert!(policy.reasoning.contains("timed out"));
    assert!(policy.direction.is_none());

    assert_eq!(report.signal.direction, Direction::Long);
    assert_eq!(report.signal.num_agreeing_agents, 3);
    assert_eq!(report.signal.num_errored_agents, 1);
}

#[tokio::test]
async fn all_agents_failing_fails_the_task() {
    let registry = AgentRegistry::new()
        .with(Arc::new(ScriptedAgent::failing("technical", "no data")), 1.0, 1)
        .with(Arc::new(ScriptedAgent::failing("risk", "no data")), 1.0, 1);
    let manager = manager(registry);

    let task_id = manager.create("688981", None).await.unwrap();
    let task = manager.wait(task_id).await.unwrap();

    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().starts_with("Aggregation failed"));
    assert_eq!(task.agent_results.len(), 2);
    assert!(task.agent_results.iter().all(|r| r.is_error));
    assert!(task.progress_messages.last().unwrap().message.starts_with("Failed: "));
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let manager = manager(three_bullish_agents());
    let missing = Uuid::new_v4();

    assert_eq!(manager.get(missing).await, Err(TaskError::NotFound(missing)));
    assert_eq!(manager.cancel(missing).await, Err(TaskError::NotFound(missing)));
    assert!(matches!(
        manager.subscribe(missing).await,
        Err(TaskError::NotFound(id)) if id == missing
    ));
}

#[tokio::test]
async fn blank_symbol_is_rejected() {
    let manager = manager(three_bullish_agents());
    assert_eq!(
        manager.create("  ", None).await,
        Err(TaskError::InvalidSymbol("  ".to_string()))
    );
    assert!(manager.list(&TaskFilter::default()).is_empty());
}

#[tokio::test]
async fn list_filters_and_orders_newest_first() {
    let manager = manager(three_bullish_agents());
    let oldest = manager.create("sh600519", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let other = manager.create("sz000001", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let newest = manager.create("SH600519", None).await.unwrap();
    for id in [oldest, other, newest] {
        manager.wait(id).await.unwrap();
    }

    let all = manager.list(&TaskFilter::default());
    assert_eq!(all.len(), 3);

    let mine = manager.list(&TaskFilter {
        symbol: Some("sh600519".to_string()),
        ..Default::default()
    });
    let ids: Vec<Uuid> = mine.iter().map(|t| t.task_id).collect();
    assert_eq!(ids, vec![newest, oldest]);

    let limited = manager.list(&TaskFilter {
        status: Some(TaskStatus::Completed),
        limit: Some(1),
        ..Default::default()
    });
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].task_id, newest);

    let failed = manager.list(&TaskFilter {
        status: Some(TaskStatus::Failed),
        ..Default::default()
    });
    assert!(failed.is_empty());
}

#[tokio::test]
async fn latest_completed_respects_symbol_and_age() {
    let manager = manager(three_bullish_agents());
    let task_id = manager.create("600519", None).await.unwrap();
    manager.wait(task_id).await.unwrap();

    let found = manager
        .latest_completed("600519", Duration::from_secs(60))
        .unwrap();
    assert_eq!(found.task_id, task_id);
    assert!(manager
        .latest_completed("000001", Duration::from_secs(60))
        .is_none());

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(manager
        .latest_completed("600519", Duration::from_millis(1))
        .is_none());
}
