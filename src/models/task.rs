use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::history::TaskHistory;

/// A leaf unit of work inside a process.
///
/// A task's status is the only progress input of the whole tree: a process's
/// progress is the share of its tasks that are `Completed`. Every status
/// change is recorded in [`Task::history`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: Uuid,
    pub process_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub history: TaskHistory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// The status of a task.
///
/// - `NotStarted`: No work done yet
/// - `InProgress`: Someone is working on it
/// - `Completed`: Done; contributes 100 to its process
/// - `UnableToProceed`: Blocked; contributes 0, same as not started
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    NotStarted,
    InProgress,
    Completed,
    UnableToProceed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::UnableToProceed => "unable_to_proceed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "unable_to_proceed" => Some(Self::UnableToProceed),
            _ => None,
        }
    }
}

/// Input for adding a task to a process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub name: String,
    pub description: Option<String>,
    /// Initial status. Defaults to `NotStarted`. Not recorded as a transition.
    pub status: Option<TaskStatus>,
}

/// Input for updating a task. Status changes go through
/// `Workspace::update_task_status` so they land in the history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}
