use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::process::Process;

/// A stage of a project, grouping processes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Deadline watched by the notification engine.
    pub end_date: Option<NaiveDate>,
    /// Aggregated progress (0–100), kept current by the workspace.
    pub progress: f64,
    pub processes: Vec<Process>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for adding a phase to a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreatePhaseInput {
    pub name: String,
    pub description: Option<String>,
    pub end_date: Option<NaiveDate>,
}

/// Input for updating a phase. All fields are optional for partial updates;
/// `Some(None)` clears a clearable field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePhaseInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub end_date: Option<Option<NaiveDate>>,
}
