use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent_result::AgentResult;
use crate::signal::AnalysisReport;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(TaskStatus::Pending),
            "running" => Ok(TaskStatus::Running),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            "cancelled" | "canceled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// One entry of a task's append-only progress log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressMessage {
    /// 0 to 100.
    pub progress: u8,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// One orchestration run for a symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnalysisTask {
    pub task_id: Uuid,
    pub symbol: String,
    pub as_of: Option<NaiveDate>,
    pub status: TaskStatus,
    pub progress: u8,
    pub progress_messages: Vec<ProgressMessage>,
    pub result: Option<AnalysisReport>,
    pub error: Option<String>,
    /// Results recorded as each agent finishes; kept even when the task fails.
    pub agent_results: Vec<AgentResult>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AnalysisTask {
    pub fn new(symbol: String, as_of: Option<NaiveDate>) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            symbol,
            as_of,
            status: TaskStatus::Pending,
            progress: 0,
            progress_messages: Vec::new(),
            result: None,
            error: None,
            agent_results: Vec::new(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            metadata: HashMap::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Filter for listing tasks. Empty filter matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub symbol: Option<String>,
    pub limit: Option<usize>,
}

impl TaskFilter {
    pub fn matches(&self, task: &AnalysisTask) -> bool {
        if let Some(status) = self.status {
            if task.status != status {
                return false;
            }
        }
        if let Some(symbol) = &self.symbol {
            if !task.symbol.eq_ignore_ascii_case(symbol.trim()) {
                return false;
            }
        }
        true
    }
}

/// Event delivered to progress subscribers.
///
/// Every stream starts with `Replay`, carries zero or more `Progress`, and ends
/// with exactly one of `Complete` or `Error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    Replay {
        task_id: Uuid,
        symbol: String,
        status: TaskStatus,
        progress: u8,
        messages: Vec<ProgressMessage>,
    },
    Progress {
        task_id: Uuid,
        #[serde(flatten)]
        message: ProgressMessage,
    },
    Complete {
        task_id: Uuid,
        report: AnalysisReport,
    },
    Error {
        task_id: Uuid,
        status: TaskStatus,
        error: String,
    },
}

impl TaskEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            TaskEvent::Replay { .. } => "replay",
            TaskEvent::Progress { .. } => "progress",
            TaskEvent::Complete { .. } => "complete",
            TaskEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Complete { .. } | TaskEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_statuses() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_parses_both_spellings() {
        assert_eq!("Cancelled".parse::<TaskStatus>(), Ok(TaskStatus::Cancelled));
        assert_eq!("canceled".parse::<TaskStatus>(), Ok(TaskStatus::Cancelled));
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn new_task_is_pending() {
        let task = AnalysisTask::new("000001".to_string(), None);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.progress, 0);
        assert!(task.progress_messages.is_empty());
        assert!(task.started_at.is_none());
    }

    #[test]
    fn filter_matches_status_and_symbol() {
        let mut task = AnalysisTask::new("600519".to_string(), None);
        task.status = TaskStatus::Running;

        assert!(TaskFilter::default().matches(&task));
        assert!(TaskFilter {
            status: Some(TaskStatus::Running),
            symbol: Some(" 600519 ".to_string()),
            limit: None,
        }
        .matches(&task));
        assert!(!TaskFilter {
            status: Some(TaskStatus::Completed),
            ..Default::default()
        }
        .matches(&task));
        assert!(!TaskFilter {
            symbol: Some("000001".to_string()),
            ..Default::default()
        }
        .matches(&task));
    }

    #[test]
    fn progress_event_is_flattened_and_tagged() {
        let event = TaskEvent::Progress {
            task_id: Uuid::nil(),
            message: ProgressMessage {
                progress: 42,
                message: "technical finished".to_string(),
                timestamp: Utc::now(),
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["progress"], 42);
        assert_eq!(event.event_name(), "progress");
        assert!(!event.is_terminal());
    }
}
