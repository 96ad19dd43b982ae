use std::fmt;

use serde::{Deserialize, Serialize};

/// The kind of an entity, used in lookups, errors, audit events and
/// notification references.
///
/// `Node` stands for a tree node whose kind is not known at the call site,
/// e.g. a removal by bare identifier that matched nothing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Project,
    Phase,
    Process,
    Task,
    Notification,
    Node,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Phase => "phase",
            Self::Process => "process",
            Self::Task => "task",
            Self::Notification => "notification",
            Self::Node => "node",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "project" => Some(Self::Project),
            "phase" => Some(Self::Phase),
            "process" => Some(Self::Process),
            "task" => Some(Self::Task),
            "notification" => Some(Self::Notification),
            "node" => Some(Self::Node),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Project => "Project",
            Self::Phase => "Phase",
            Self::Process => "Process",
            Self::Task => "Task",
            Self::Notification => "Notification",
            Self::Node => "Node",
        };
        f.write_str(label)
    }
}
