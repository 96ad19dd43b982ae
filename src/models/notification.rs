use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::kind::EntityKind;

/// A notice raised by the notification engine about a node in the tree.
///
/// Notifications are created and removed only by the engine. Callers may
/// flip `read`, or delete a notice outright.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: NotificationPriority,
    /// The tree node this notice is about.
    pub entity: Option<EntityRef>,
    /// Project owning `entity`, for filtering.
    pub project_id: Option<Uuid>,
    /// Set for `MilestoneReached` notices.
    pub milestone: Option<u8>,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn entity_id(&self) -> Option<Uuid> {
        self.entity.map(|e| e.id)
    }

    pub fn is_about(&self, id: Uuid) -> bool {
        self.entity_id() == Some(id)
    }
}

/// Reference from a notification to a tree node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Uuid,
}

/// What condition a notification reports.
///
/// All kinds except `MilestoneReached` describe a condition that is either
/// holding or not; the engine removes such a notice once its condition clears.
/// A milestone notice records a one-off event and stays until it is read and
/// ages out.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    /// End date within the warning window.
    DeadlineApproaching,
    /// End date already passed.
    DeadlineOverdue,
    /// Progress reached a configured milestone.
    MilestoneReached,
    /// Progress lags well behind elapsed schedule.
    ProgressDelay,
    /// Little progress with the end date close.
    LowProgress,
}

/// Groups of condition kinds that are mutually exclusive per node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConditionFamily {
    Deadline,
    ProgressDelay,
    LowProgress,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeadlineApproaching => "deadline_approaching",
            Self::DeadlineOverdue => "deadline_overdue",
            Self::MilestoneReached => "milestone_reached",
            Self::ProgressDelay => "progress_delay",
            Self::LowProgress => "low_progress",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "deadline_approaching" => Some(Self::DeadlineApproaching),
            "deadline_overdue" => Some(Self::DeadlineOverdue),
            "milestone_reached" => Some(Self::MilestoneReached),
            "progress_delay" => Some(Self::ProgressDelay),
            "low_progress" => Some(Self::LowProgress),
            _ => None,
        }
    }

    /// The condition family, or `None` for event kinds.
    pub fn family(&self) -> Option<ConditionFamily> {
        match self {
            Self::DeadlineApproaching | Self::DeadlineOverdue => Some(ConditionFamily::Deadline),
            Self::ProgressDelay => Some(ConditionFamily::ProgressDelay),
            Self::LowProgress => Some(ConditionFamily::LowProgress),
            Self::MilestoneReached => None,
        }
    }

    pub fn is_deadline(&self) -> bool {
        self.family() == Some(ConditionFamily::Deadline)
    }
}

/// How urgently a notification wants attention.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    High,
    Medium,
    Low,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }

    /// Sort rank, most urgent first.
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}
