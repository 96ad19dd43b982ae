//! Rule checks run by the notification engine.
//!
//! Each check is a pure function of one scan target, the settings and the
//! current date. A check returns the condition that currently holds, or
//! `None`; turning conditions into notifications (and dedup) is the engine's
//! job. Checks skip targets that lack the dates they need.

use chrono::NaiveDate;
use uuid::Uuid;

use crate::aggregate;
use crate::config::NotificationSettings;
use crate::models::*;
use crate::workspace::Workspace;

/// A node as seen by one evaluation pass.
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub kind: EntityKind,
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub progress: f64,
    pub status: ProjectStatus,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl Target {
    pub fn entity(&self) -> EntityRef {
        EntityRef {
            kind: self.kind,
            id: self.id,
        }
    }

    fn label(&self) -> String {
        format!("{} \"{}\"", self.kind, self.name)
    }
}

/// A condition that holds for a target right now.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Condition {
    pub kind: NotificationKind,
    pub priority: NotificationPriority,
    pub title: String,
    pub message: String,
}

/// Every project, phase and process, in tree order.
pub(crate) fn targets(workspace: &Workspace) -> Vec<Target> {
    let mut targets = Vec::with_capacity(workspace.node_count());

    for project in workspace.projects() {
        targets.push(Target {
            kind: EntityKind::Project,
            id: project.id,
            project_id: project.id,
            name: project.name.clone(),
            progress: project.progress,
            status: project.status,
            start_date: None,
            end_date: None,
        });

        for phase in &project.phases {
            targets.push(Target {
                kind: EntityKind::Phase,
                id: phase.id,
                project_id: project.id,
                name: phase.name.clone(),
                progress: phase.progress,
                status: aggregate::derived_status(phase.progress, project.status),
                start_date: None,
                end_date: phase.end_date,
            });

            for process in &phase.processes {
                targets.push(Target {
                    kind: EntityKind::Process,
                    id: process.id,
                    project_id: project.id,
                    name: process.name.clone(),
                    progress: process.progress,
                    status: aggregate::derived_status(process.progress, project.status),
                    start_date: process.start_date,
                    end_date: process.end_date,
                });
            }
        }
    }

    targets
}

/// Deadline proximity for phases and processes with an end date.
pub(crate) fn deadline(
    target: &Target,
    settings: &NotificationSettings,
    today: NaiveDate,
) -> Option<Condition> {
    if !matches!(target.kind, EntityKind::Phase | EntityKind::Process) || target.status.is_settled()
    {
        return None;
    }
    let end = target.end_date?;
    let days = (end - today).num_days();

    if days < 0 {
        return Some(Condition {
            kind: NotificationKind::DeadlineOverdue,
            priority: NotificationPriority::High,
            title: "Deadline passed".to_string(),
            message: format!(
                "{} is {} past its end date ({end}).",
                target.label(),
                plural_days(-days)
            ),
        });
    }
    if days > settings.deadline_warning_days {
        return None;
    }

    let priority = if days <= settings.deadline_critical_days {
        NotificationPriority::High
    } else {
        NotificationPriority::Medium
    };
    let when = if days == 0 {
        "today".to_string()
    } else {
        format!("in {}", plural_days(days))
    };
    Some(Condition {
        kind: NotificationKind::DeadlineApproaching,
        priority,
        title: "Deadline approaching".to_string(),
        message: format!("{} is due {when} ({end}).", target.label()),
    })
}

/// Progress lagging well behind the elapsed share of the schedule.
pub(crate) fn progress_delay(
    target: &Target,
    settings: &NotificationSettings,
    today: NaiveDate,
) -> Option<Condition> {
    let window = active_window(target, today)?;
    let done = target.progress / 100.0;

    if window.elapsed_ratio <= 0.5 || done >= window.elapsed_ratio * settings.progress_delay_ratio
    {
        return None;
    }

    let priority = if window.elapsed_ratio - done > 0.5 {
        NotificationPriority::High
    } else {
        NotificationPriority::Medium
    };
    Some(Condition {
        kind: NotificationKind::ProgressDelay,
        priority,
        title: "Progress behind schedule".to_string(),
        message: format!(
            "{} is behind schedule: {}% of the time used, {}% done.",
            target.label(),
            (window.elapsed_ratio * 100.0) as i64,
            target.progress as i64
        ),
    })
}

/// Little progress with the end date inside the warning window.
pub(crate) fn low_progress(
    target: &Target,
    settings: &NotificationSettings,
    today: NaiveDate,
) -> Option<Condition> {
    let window = active_window(target, today)?;

    if window.days_remaining > settings.deadline_warning_days
        || target.progress >= settings.low_progress_percent
    {
        return None;
    }

    let priority = if window.days_remaining <= settings.deadline_critical_days {
        NotificationPriority::High
    } else {
        NotificationPriority::Medium
    };
    Some(Condition {
        kind: NotificationKind::LowProgress,
        priority,
        title: "Low progress near deadline".to_string(),
        message: format!(
            "{} is at {}% with {} left.",
            target.label(),
            target.progress as i64,
            plural_days(window.days_remaining)
        ),
    })
}

pub(crate) fn milestone(target: &Target, milestone: u8) -> Condition {
    let (title, priority) = if milestone >= 100 {
        ("Completed".to_string(), NotificationPriority::Medium)
    } else {
        (format!("{milestone}% reached"), NotificationPriority::Low)
    };
    Condition {
        kind: NotificationKind::MilestoneReached,
        priority,
        title,
        message: format!("{} reached {milestone}% progress.", target.label()),
    }
}

struct ActiveWindow {
    elapsed_ratio: f64,
    days_remaining: i64,
}

/// Schedule position of a running process: both dates set, a positive
/// duration, today inside the window, and not settled.
fn active_window(target: &Target, today: NaiveDate) -> Option<ActiveWindow> {
    if target.kind != EntityKind::Process || target.status.is_settled() {
        return None;
    }
    let (start, end) = (target.start_date?, target.end_date?);
    let total = (end - start).num_days();
    if total <= 0 || today < start || today > end {
        return None;
    }
    Some(ActiveWindow {
        elapsed_ratio: (today - start).num_days() as f64 / total as f64,
        days_remaining: (end - today).num_days(),
    })
}

fn plural_days(days: i64) -> String {
    if days == 1 {
        "1 day".to_string()
    } else {
        format!("{days} days")
    }
}
