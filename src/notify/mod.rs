//! Notification engine: turns tree conditions into a deduplicated set of notices.
//!
//! Two sorts of notice exist. Condition notices (deadline, progress delay,
//! low progress) mirror something that holds right now: at most one per node
//! and family, replaced when the condition escalates and removed when it
//! clears. Milestone notices record a one-off crossing and stay until the
//! user deletes them or they age out after being read.

mod rules;

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::NotificationSettings;
use crate::error::{Error, Result};
use crate::models::*;
use crate::snapshot::{EngineSnapshot, MilestoneMark};
use crate::workspace::Workspace;

use rules::{Condition, Target};

const FAMILIES: [ConditionFamily; 3] = [
    ConditionFamily::Deadline,
    ConditionFamily::ProgressDelay,
    ConditionFamily::LowProgress,
];

/// What one evaluation pass changed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationReport {
    pub created: Vec<Notification>,
    /// Condition notices removed because their condition cleared, escalated
    /// or their node is gone.
    pub dismissed: Vec<Notification>,
}

impl EvaluationReport {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.dismissed.is_empty()
    }
}

/// Selects notifications for listing. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotificationFilter {
    pub unread_only: bool,
    pub priority: Option<NotificationPriority>,
    pub kind: Option<NotificationKind>,
    pub entity_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
}

impl NotificationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn unread() -> Self {
        Self {
            unread_only: true,
            ..Self::default()
        }
    }

    pub fn matches(&self, notification: &Notification) -> bool {
        (!self.unread_only || !notification.read)
            && self.priority.map_or(true, |p| notification.priority == p)
            && self.kind.map_or(true, |k| notification.kind == k)
            && self.entity_id.map_or(true, |id| notification.is_about(id))
            && self
                .project_id
                .map_or(true, |id| notification.project_id == Some(id))
    }
}

#[derive(Debug, Clone, Default)]
pub struct NotificationEngine {
    settings: NotificationSettings,
    notifications: HashMap<Uuid, Notification>,
    unread: usize,
    fired: HashSet<MilestoneMark>,
}

impl NotificationEngine {
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.unread
    }

    pub fn get(&self, id: Uuid) -> Result<&Notification> {
        self.notifications
            .get(&id)
            .ok_or_else(|| Error::not_found(EntityKind::Notification, id))
    }

    /// Matching notifications, High before Low, newest first within a priority.
    pub fn notifications(&self, filter: &NotificationFilter) -> Vec<&Notification> {
        let mut list: Vec<&Notification> = self
            .notifications
            .values()
            .filter(|n| filter.matches(n))
            .collect();
        list.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        list
    }

    /// Whether the milestone already fired for the node.
    pub fn has_fired(&self, entity_id: Uuid, milestone: u8) -> bool {
        self.fired.contains(&MilestoneMark {
            entity_id,
            milestone,
        })
    }

    // ============================================================
    // Evaluation
    // ============================================================

    /// Run every rule once against the tree.
    ///
    /// Evaluating twice with no change in between creates nothing the second
    /// time.
    pub fn evaluate(&mut self, workspace: &Workspace, today: NaiveDate) -> EvaluationReport {
        let now = Utc::now();
        let targets = rules::targets(workspace);
        let mut report = EvaluationReport::default();

        let mut standing: HashMap<(Uuid, ConditionFamily), Vec<Uuid>> = HashMap::new();
        for notification in self.notifications.values() {
            if let (Some(entity_id), Some(family)) =
                (notification.entity_id(), notification.kind.family())
            {
                standing
                    .entry((entity_id, family))
                    .or_default()
                    .push(notification.id);
            }
        }

        for target in &targets {
            for family in FAMILIES {
                let condition = match family {
                    ConditionFamily::Deadline => rules::deadline(target, &self.settings, today),
                    ConditionFamily::ProgressDelay => {
                        rules::progress_delay(target, &self.settings, today)
                    }
                    ConditionFamily::LowProgress => {
                        rules::low_progress(target, &self.settings, today)
                    }
                };
                let existing = standing.remove(&(target.id, family)).unwrap_or_default();
                self.reconcile(target, condition, existing, now, &mut report);
            }
            self.check_milestones(target, now, &mut report);
        }

        // Whatever is left belongs to nodes that no longer exist.
        for id in standing.into_values().flatten() {
            if let Some(notification) = self.take(id) {
                report.dismissed.push(notification);
            }
        }
        let live: HashSet<Uuid> = targets.iter().map(|t| t.id).collect();
        self.fired.retain(|mark| live.contains(&mark.entity_id));

        tracing::info!(
            targets = targets.len(),
            created = report.created.len(),
            dismissed = report.dismissed.len(),
            unread = self.unread,
            "Notification scan finished"
        );
        report
    }

    /// Bring one node's notices of one family in line with its condition.
    fn reconcile(
        &mut self,
        target: &Target,
        condition: Option<Condition>,
        existing: Vec<Uuid>,
        now: DateTime<Utc>,
        report: &mut EvaluationReport,
    ) {
        let keep = condition.as_ref().and_then(|cond| {
            existing.iter().copied().find(|id| {
                self.notifications
                    .get(id)
                    .is_some_and(|n| n.kind == cond.kind && n.priority == cond.priority)
            })
        });

        for id in existing {
            if Some(id) != keep {
                if let Some(notification) = self.take(id) {
                    report.dismissed.push(notification);
                }
            }
        }

        if let (Some(cond), None) = (condition, keep) {
            let created = self.insert(target, cond, None, now);
            report.created.push(created);
        }
    }

    fn check_milestones(
        &mut self,
        target: &Target,
        now: DateTime<Utc>,
        report: &mut EvaluationReport,
    ) {
        for milestone in self.settings.sorted_milestones() {
            let mark = MilestoneMark {
                entity_id: target.id,
                milestone,
            };
            if target.progress >= f64::from(milestone) {
                if self.fired.insert(mark) {
                    let cond = rules::milestone(target, milestone);
                    let created = self.insert(target, cond, Some(milestone), now);
                    report.created.push(created);
                }
            } else {
                self.fired.remove(&mark);
            }
        }
    }

    fn insert(
        &mut self,
        target: &Target,
        condition: Condition,
        milestone: Option<u8>,
        now: DateTime<Utc>,
    ) -> Notification {
        let mut id = Uuid::new_v4();
        while self.notifications.contains_key(&id) {
            id = Uuid::new_v4();
        }
        let notification = Notification {
            id,
            kind: condition.kind,
            title: condition.title,
            message: condition.message,
            priority: condition.priority,
            entity: Some(target.entity()),
            project_id: Some(target.project_id),
            milestone,
            read: false,
            read_at: None,
            created_at: now,
        };

        tracing::debug!(
            notification_id = %id,
            kind = notification.kind.as_str(),
            priority = notification.priority.as_str(),
            entity_id = %target.id,
            "Raised notification"
        );
        self.unread += 1;
        self.notifications.insert(id, notification.clone());
        notification
    }

    fn take(&mut self, id: Uuid) -> Option<Notification> {
        let notification = self.notifications.remove(&id)?;
        if !notification.read {
            self.unread -= 1;
        }
        Some(notification)
    }

    // ============================================================
    // User operations
    // ============================================================

    pub fn mark_read(&mut self, id: Uuid) -> Result<&Notification> {
        let notification = self
            .notifications
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(EntityKind::Notification, id))?;
        if !notification.read {
            notification.read = true;
            notification.read_at = Some(Utc::now());
            self.unread -= 1;
        }
        Ok(notification)
    }

    pub fn mark_unread(&mut self, id: Uuid) -> Result<&Notification> {
        let notification = self
            .notifications
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(EntityKind::Notification, id))?;
        if notification.read {
            notification.read = false;
            notification.read_at = None;
            self.unread += 1;
        }
        Ok(notification)
    }

    /// Mark every unread notice read. Returns how many changed.
    pub fn mark_all_read(&mut self) -> usize {
        let now = Utc::now();
        let mut changed = 0;
        for notification in self.notifications.values_mut().filter(|n| !n.read) {
            notification.read = true;
            notification.read_at = Some(now);
            changed += 1;
        }
        self.unread = 0;
        changed
    }

    pub fn delete(&mut self, id: Uuid) -> Result<Notification> {
        self.take(id)
            .ok_or_else(|| Error::not_found(EntityKind::Notification, id))
    }

    /// Remove read notices that were read before `older_than`. Unread
    /// notices are never purged.
    pub fn auto_dismiss(&mut self, older_than: DateTime<Utc>) -> usize {
        let before = self.notifications.len();
        self.notifications
            .retain(|_, n| !n.read || n.read_at.unwrap_or(n.created_at) >= older_than);
        let purged = before - self.notifications.len();
        if purged > 0 {
            tracing::info!(purged, "Purged read notifications");
        }
        purged
    }

    // ============================================================
    // Snapshots
    // ============================================================

    pub fn to_snapshot(&self) -> EngineSnapshot {
        let mut notifications: Vec<Notification> =
            self.notifications.values().cloned().collect();
        notifications.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let mut milestones: Vec<MilestoneMark> = self.fired.iter().copied().collect();
        milestones.sort();

        EngineSnapshot {
            notifications,
            milestones,
        }
    }

    pub fn from_snapshot(settings: NotificationSettings, snapshot: EngineSnapshot) -> Result<Self> {
        let mut notifications = HashMap::with_capacity(snapshot.notifications.len());
        for notification in snapshot.notifications {
            if notification.read != notification.read_at.is_some() {
                return Err(Error::validation(format!(
                    "Notification {} has inconsistent read state",
                    notification.id
                )));
            }
            let id = notification.id;
            if notifications.insert(id, notification).is_some() {
                return Err(Error::validation(format!(
                    "Duplicate notification {id} in snapshot"
                )));
            }
        }
        let unread = notifications.values().filter(|n| !n.read).count();

        Ok(Self {
            settings,
            notifications,
            unread,
            fired: snapshot.milestones.into_iter().collect(),
        })
    }
}
