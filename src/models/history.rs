use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::TaskStatus;

/// One recorded status change of a task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
    pub at: DateTime<Utc>,
}

/// Append-only log of a task's status transitions.
///
/// Entries are only ever pushed by the workspace when a status change is
/// accepted. Nothing edits or removes an entry; the log goes away only
/// together with its task. Reads hand out a slice, so reading twice yields
/// the same sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct TaskHistory(Vec<StatusTransition>);

impl TaskHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a log from persisted entries. The caller validates the chain.
    pub(crate) fn from_entries(entries: Vec<StatusTransition>) -> Self {
        Self(entries)
    }

    pub(crate) fn record(&mut self, from: TaskStatus, to: TaskStatus, at: DateTime<Utc>) {
        self.0.push(StatusTransition { from, to, at });
    }

    /// All transitions in chronological (insertion) order.
    pub fn entries(&self) -> &[StatusTransition] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StatusTransition> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a TaskHistory {
    type Item = &'a StatusTransition;
    type IntoIter = std::slice::Iter<'a, StatusTransition>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
