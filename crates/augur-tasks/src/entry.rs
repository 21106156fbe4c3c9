use std::sync::{Mutex, MutexGuard, PoisonError};

use augur_models::{AgentResult, AnalysisReport, AnalysisTask, ProgressMessage, TaskStatus};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::publisher::ProgressPublisher;

/// One task's mutable state.
///
/// Every mutation takes the mutex, applies the change, releases it, then
/// notifies subscribers. The lock is never held across an `.await`. Once the
/// task is terminal, every mutation is refused.
pub struct TaskEntry {
    state: Mutex<AnalysisTask>,
    publisher: ProgressPublisher,
    cancel: CancellationToken,
}

impl TaskEntry {
    pub fn new(task: AnalysisTask) -> Self {
        Self {
            state: Mutex::new(task),
            publisher: ProgressPublisher::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.read(|t| t.task_id)
    }

    pub fn snapshot(&self) -> AnalysisTask {
        self.lock().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&AnalysisTask) -> R) -> R {
        f(&self.lock())
    }

    pub fn publisher(&self) -> &ProgressPublisher {
        &self.publisher
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// `pending → running`. False if the task already left `pending`.
    pub fn start(&self, message: String) -> bool {
        self.mutate(|task| {
            if task.status != TaskStatus::Pending {
                return false;
            }
            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
            push_message(task, crate::PROGRESS_DISPATCH, message);
            true
        })
    }

    /// Append a log line. Progress never moves backwards.
    pub fn append(&self, progress: u8, message: String) -> bool {
        self.mutate(|task| {
            if task.is_terminal() {
                return false;
            }
            push_message(task, progress, message);
            true
        })
    }

    pub fn record_agent(&self, result: AgentResult, progress: u8, message: String) -> bool {
        self.mutate(|task| {
            if task.is_terminal() {
                return false;
            }
            task.agent_results.push(result);
            push_message(task, progress, message);
            true
        })
    }

    pub fn complete(&self, report: AnalysisReport, message: String) -> bool {
        self.mutate(|task| {
            if task.is_terminal() {
                return false;
            }
            push_message(task, crate::PROGRESS_DONE, message);
            task.status = TaskStatus::Completed;
            task.result = Some(report);
            task.completed_at = Some(Utc::now());
            true
        })
    }

    pub fn fail(&self, error: String) -> bool {
        self.mutate(|task| {
            if task.is_terminal() {
                return false;
            }
            let progress = task.progress;
            push_message(task, progress, format!("Failed: {error}"));
            task.status = TaskStatus::Failed;
            task.error = Some(error);
            task.completed_at = Some(Utc::now());
            true
        })
    }

    /// Mark cancelled and signal the running work to stop.
    pub fn cancel(&self) -> bool {
        let changed = self.mutate(|task| {
            if task.is_terminal() {
                return false;
            }
            let progress = task.progress;
            push_message(task, progress, "Task cancelled".to_string());
            task.status = TaskStatus::Cancelled;
            task.error = Some("cancelled by request".to_string());
            task.completed_at = Some(Utc::now());
            true
        });
        if changed {
            self.cancel.cancel();
        }
        changed
    }

    fn mutate(&self, f: impl FnOnce(&mut AnalysisTask) -> bool) -> bool {
        let changed = {
            let mut task = self.lock();
            f(&mut task)
        };
        if changed {
            self.publisher.publish();
        }
        changed
    }

    fn lock(&self) -> MutexGuard<'_, AnalysisTask> {
        // A panic while holding the lock cannot leave the task half-written:
        // every mutation is a handful of field assignments.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn push_message(task: &mut AnalysisTask, progress: u8, message: String) {
    let progress = progress.min(100).max(task.progress);
    task.progress = progress;
    task.progress_messages.push(ProgressMessage {
        progress,
        message,
        timestamp: Utc::now(),
    });
}
