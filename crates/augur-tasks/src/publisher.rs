//! Per-task progress fan-out.
//!
//! The task's progress log is the source of truth. The publisher only bumps a
//! version counter on every change; each subscriber keeps its own cursor into
//! the log and catches up whenever the counter moves. A slow subscriber
//! therefore never loses events and never holds up other subscribers.

use std::collections::VecDeque;
use std::sync::Arc;

use augur_models::{AnalysisTask, TaskEvent, TaskStatus};
use futures::stream::{self, Stream};
use tokio::sync::watch;

use crate::entry::TaskEntry;

pub struct ProgressPublisher {
    version: watch::Sender<u64>,
}

impl ProgressPublisher {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self { version }
    }

    /// Wake every subscriber.
    pub fn publish(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.version.receiver_count()
    }
}

impl Default for ProgressPublisher {
    fn default() -> Self {
        Self::new()
    }
}

enum Phase {
    Replay,
    Live { cursor: usize },
    Done,
}

struct Subscription {
    entry: Arc<TaskEntry>,
    version: watch::Receiver<u64>,
    phase: Phase,
    pending: VecDeque<TaskEvent>,
}

/// Events for one subscriber: `replay`, then live `progress`, then exactly
/// one terminal `complete` or `error`, then end of stream.
pub fn event_stream(entry: Arc<TaskEntry>) -> impl Stream<Item = TaskEvent> + Send + 'static {
    let version = entry.publisher().subscribe();
    let subscription = Subscription {
        entry,
        version,
        phase: Phase::Replay,
        pending: VecDeque::new(),
    };

    stream::unfold(subscription, |mut sub| async move {
        loop {
            if let Some(event) = sub.pending.pop_front() {
                return Some((event, sub));
            }
            match sub.phase {
                Phase::Done => return None,
                Phase::Replay => {
                    // Mark the current version seen before reading, so any
                    // later change wakes `changed()` below.
                    sub.version.borrow_and_update();
                    let (event, cursor, terminal) = sub.entry.read(|task| {
                        let event = TaskEvent::Replay {
                            task_id: task.task_id,
                            symbol: task.symbol.clone(),
                            status: task.status,
                            progress: task.progress,
                            messages: task.progress_messages.clone(),
                        };
                        (event, task.progress_messages.len(), terminal_event(task))
                    });
                    sub.pending.push_back(event);
                    sub.phase = match terminal {
                        Some(terminal) => {
                            sub.pending.push_back(terminal);
                            Phase::Done
                        }
                        None => Phase::Live { cursor },
                    };
                }
                Phase::Live { cursor } => {
                    sub.version.borrow_and_update();
                    let (events, cursor, terminal) = sub.entry.read(|task| {
                        let events: Vec<TaskEvent> = task
                            .progress_messages
                            .iter()
                            .skip(cursor)
                            .map(|message| TaskEvent::Progress {
                                task_id: task.task_id,
                                message: message.clone(),
                            })
                            .collect();
                        (events, task.progress_messages.len(), terminal_event(task))
                    });
                    let caught_up = events.is_empty();
                    sub.pending.extend(events);
                    match terminal {
                        Some(terminal) => {
                            sub.pending.push_back(terminal);
                            sub.phase = Phase::Done;
                        }
                        None => {
                            sub.phase = Phase::Live { cursor };
                            if caught_up && sub.version.changed().await.is_err() {
                                sub.phase = Phase::Done;
                            }
                        }
                    }
                }
            }
        }
    })
}

fn terminal_event(task: &AnalysisTask) -> Option<TaskEvent> {
    match task.status {
        TaskStatus::Pending | TaskStatus::Running => None,
        TaskStatus::Completed => Some(match &task.result {
            Some(report) => TaskEvent::Complete {
                task_id: task.task_id,
                report: report.clone(),
            },
            None => TaskEvent::Error {
                task_id: task.task_id,
                status: task.status,
                error: "completed without a result".to_string(),
            },
        }),
        TaskStatus::Failed | TaskStatus::Cancelled => Some(TaskEvent::Error {
            task_id: task.task_id,
            status: task.status,
            error: task
                .error
                .clone()
                .unwrap_or_else(|| task.status.to_string()),
        }),
    }
}
