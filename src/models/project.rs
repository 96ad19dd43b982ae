use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::phase::Phase;

/// Root of a work tree.
///
/// A project owns its phases. Its `progress` is the mean of their progress,
/// and its `status` follows that progress unless someone pinned it by hand
/// (`status_manual`). A pinned status stays put until it is explicitly
/// reverted to automatic determination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    /// Whether `status` was set by hand and automatic determination is frozen.
    pub status_manual: bool,
    /// Aggregated progress (0–100), kept current by the workspace.
    pub progress: f64,
    pub phases: Vec<Phase>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The lifecycle status of a project.
///
/// `NotStarted`, `InProgress` and `Completed` are derived from progress.
/// `Cancelled` and `OnHold` only ever come from a manual override.
///
/// Phases and processes have no stored status; the same enum describes their
/// derived status during notification evaluation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    NotStarted,
    InProgress,
    Completed,
    Cancelled,
    OnHold,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::OnHold => "on_hold",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            "on_hold" => Some(Self::OnHold),
            _ => None,
        }
    }

    /// Work in this state no longer needs deadline or schedule reminders.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::OnHold)
    }
}

/// Input for creating a new project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub name: String,
    pub description: Option<String>,
}

/// Input for updating an existing project. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProjectInput {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    /// Pins the status and turns on the manual override.
    pub status: Option<ProjectStatus>,
}
