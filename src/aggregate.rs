//! Progress and status derivation.
//!
//! The functions here are pure: they recompute a node's value from its whole
//! subtree and never read the cached `progress` fields. The workspace keeps
//! those caches current one level at a time (see [`refresh_process`] and
//! friends); the pure functions are what the caches must always agree with.

use crate::models::{Phase, Process, Project, ProjectStatus, Task, TaskStatus};

pub const MIN_PROGRESS: f64 = 0.0;
pub const MAX_PROGRESS: f64 = 100.0;

pub fn task_progress(task: &Task) -> f64 {
    match task.status {
        TaskStatus::Completed => MAX_PROGRESS,
        TaskStatus::NotStarted | TaskStatus::InProgress | TaskStatus::UnableToProceed => {
            MIN_PROGRESS
        }
    }
}

/// Share of completed tasks × 100, or the manual value when there are no tasks.
pub fn process_progress(process: &Process) -> f64 {
    if process.tasks.is_empty() {
        return process.manual_progress.clamp(MIN_PROGRESS, MAX_PROGRESS);
    }
    ratio(process.completed_tasks(), process.tasks.len())
}

pub fn phase_progress(phase: &Phase) -> f64 {
    mean(phase.processes.iter().map(process_progress))
}

pub fn project_progress(project: &Project) -> f64 {
    mean(project.phases.iter().map(phase_progress))
}

/// Status implied by progress alone.
pub fn determine_status(progress: f64) -> ProjectStatus {
    if progress >= MAX_PROGRESS {
        ProjectStatus::Completed
    } else if progress > MIN_PROGRESS {
        ProjectStatus::InProgress
    } else {
        ProjectStatus::NotStarted
    }
}

/// Status of a phase or process for rule evaluation.
///
/// A cancelled or on-hold project freezes everything below it; otherwise the
/// node's own progress decides.
pub fn derived_status(progress: f64, project_status: ProjectStatus) -> ProjectStatus {
    match project_status {
        ProjectStatus::Cancelled | ProjectStatus::OnHold => project_status,
        _ => determine_status(progress),
    }
}

/// Recompute a process's cached progress from its tasks.
pub(crate) fn refresh_process(process: &mut Process) {
    process.progress = process_progress(process);
}

/// Recompute a phase's cached progress from its processes' cached values.
pub(crate) fn refresh_phase(phase: &mut Phase) {
    phase.progress = mean(phase.processes.iter().map(|p| p.progress));
}

/// Recompute a project's cached progress from its phases' cached values, and
/// its status unless the status is pinned.
pub(crate) fn refresh_project(project: &mut Project) {
    project.progress = mean(project.phases.iter().map(|p| p.progress));
    if !project.status_manual {
        project.status = determine_status(project.progress);
    }
}

/// Recompute every cache in a project bottom-up. Used after loading.
pub(crate) fn refresh_all(project: &mut Project) {
    for phase in &mut project.phases {
        for process in &mut phase.processes {
            refresh_process(process);
        }
        refresh_phase(phase);
    }
    refresh_project(project);
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return MIN_PROGRESS;
    }
    part as f64 / whole as f64 * MAX_PROGRESS
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        MIN_PROGRESS
    } else {
        (sum / count as f64).clamp(MIN_PROGRESS, MAX_PROGRESS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskHistory;
    use chrono::Utc;
    use uuid::Uuid;

    fn task(status: TaskStatus) -> Task {
        Task {
            id: Uuid::new_v4(),
            process_id: Uuid::nil(),
            name: "t".to_string(),
            description: None,
            status,
            history: TaskHistory::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn process(tasks: Vec<Task>, manual: f64) -> Process {
        Process {
            id: Uuid::new_v4(),
            phase_id: Uuid::nil(),
            name: "p".to_string(),
            description: None,
            assignee: String::new(),
            start_date: None,
            end_date: None,
            estimated_hours: 0.0,
            actual_hours: 0.0,
            manual_progress: manual,
            progress: 0.0,
            tasks,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn phase(processes: Vec<Process>) -> Phase {
        Phase {
            id: Uuid::new_v4(),
            project_id: Uuid::nil(),
            name: "ph".to_string(),
            description: None,
            end_date: None,
            progress: 0.0,
            processes,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_task_progress_only_counts_completed() {
        assert_eq!(task_progress(&task(TaskStatus::Completed)), 100.0);
        assert_eq!(task_progress(&task(TaskStatus::InProgress)), 0.0);
        assert_eq!(task_progress(&task(TaskStatus::UnableToProceed)), 0.0);
    }

    #[test]
    fn test_process_progress_counts_blocked_tasks_in_denominator() {
        let p = process(
            vec![
                task(TaskStatus::Completed),
                task(TaskStatus::UnableToProceed),
                task(TaskStatus::NotStarted),
                task(TaskStatus::Completed),
            ],
            0.0,
        );
        assert_eq!(process_progress(&p), 50.0);
    }

    #[test]
    fn test_process_without_tasks_uses_manual_value() {
        assert_eq!(process_progress(&process(vec![], 40.0)), 40.0);
    }

    #[test]
    fn test_empty_phase_is_zero() {
        assert_eq!(phase_progress(&phase(vec![])), 0.0);
    }

    #[test]
    fn test_phase_is_mean_of_processes() {
        let ph = phase(vec![
            process(vec![task(TaskStatus::Completed)], 0.0),
            process(vec![], 50.0),
            process(vec![task(TaskStatus::NotStarted)], 0.0),
        ]);
        assert_eq!(phase_progress(&ph), 50.0);
    }

    #[test]
    fn test_determine_status_thresholds() {
        assert_eq!(determine_status(0.0), ProjectStatus::NotStarted);
        assert_eq!(determine_status(0.5), ProjectStatus::InProgress);
        assert_eq!(determine_status(99.9), ProjectStatus::InProgress);
        assert_eq!(determine_status(100.0), ProjectStatus::Completed);
    }

    #[test]
    fn test_derived_status_inherits_frozen_project_states() {
        assert_eq!(
            derived_status(100.0, ProjectStatus::Cancelled),
            ProjectStatus::Cancelled
        );
        assert_eq!(derived_status(10.0, ProjectStatus::OnHold), ProjectStatus::OnHold);
        assert_eq!(
            derived_status(100.0, ProjectStatus::InProgress),
            ProjectStatus::Completed
        );
    }

    #[test]
    fn test_refresh_phase_uses_cached_children() {
        let mut p = process(vec![task(TaskStatus::Completed), task(TaskStatus::NotStarted)], 0.0);
        refresh_process(&mut p);
        let mut ph = phase(vec![p]);
        refresh_phase(&mut ph);
        assert_eq!(ph.progress, 50.0);
        assert_eq!(ph.progress, phase_progress(&ph));
    }
}
