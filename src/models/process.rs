use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::Task;

/// A unit of planned work inside a phase.
///
/// With at least one task, progress is the share of completed tasks. Without
/// tasks, the hand-entered `manual_progress` stands in.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Process {
    pub id: Uuid,
    pub phase_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub assignee: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub estimated_hours: f64,
    pub actual_hours: f64,
    /// Progress (0–100) used only while the process has no tasks.
    pub manual_progress: f64,
    /// Aggregated progress (0–100), kept current by the workspace.
    pub progress: f64,
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Process {
    pub fn completed_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| t.is_completed()).count()
    }
}

/// Input for adding a process to a phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateProcessInput {
    pub name: String,
    pub description: Option<String>,
    pub assignee: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub manual_progress: Option<f64>,
}

/// Input for updating a process. All fields are optional for partial updates;
/// `Some(None)` clears a clearable field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProcessInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub assignee: Option<String>,
    pub start_date: Option<Option<NaiveDate>>,
    pub end_date: Option<Option<NaiveDate>>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub manual_progress: Option<f64>,
}
