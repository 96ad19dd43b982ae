//! Flat record form of a workspace, for persistence collaborators.
//!
//! Each entity kind maps to one record type holding its identifier, its
//! parent's identifier, its own fields and the ordered identifiers of its
//! children. Aggregated progress is not stored: it is derived data and is
//! rebuilt on load. Loading checks every structural invariant the live tree
//! relies on, so a snapshot that passes [`Workspace::from_snapshot`] is as
//! trustworthy as a tree built through the mutation API.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate;
use crate::error::{Error, Result};
use crate::models::*;
use crate::workspace::{IndexEntry, Workspace};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProjectRecord {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: ProjectStatus,
    pub status_manual: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub phase_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseRecord {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub end_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub process_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessRecord {
    pub id: Uuid,
    pub phase_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub assignee: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub estimated_hours: f64,
    pub actual_hours: f64,
    pub manual_progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub task_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskRecord {
    pub id: Uuid,
    pub process_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub history: Vec<StatusTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Every node of a workspace as flat records. Project order is display order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceSnapshot {
    pub projects: Vec<ProjectRecord>,
    pub phases: Vec<PhaseRecord>,
    pub processes: Vec<ProcessRecord>,
    pub tasks: Vec<TaskRecord>,
}

/// A milestone that already fired for a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MilestoneMark {
    pub entity_id: Uuid,
    pub milestone: u8,
}

/// Persistent state of the notification engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EngineSnapshot {
    pub notifications: Vec<Notification>,
    pub milestones: Vec<MilestoneMark>,
}

impl Workspace {
    pub fn to_snapshot(&self) -> WorkspaceSnapshot {
        let mut snapshot = WorkspaceSnapshot::default();

        for project in &self.projects {
            snapshot.projects.push(ProjectRecord {
                id: project.id,
                name: project.name.clone(),
                description: project.description.clone(),
                status: project.status,
                status_manual: project.status_manual,
                created_at: project.created_at,
                updated_at: project.updated_at,
                phase_ids: project.phases.iter().map(|p| p.id).collect(),
            });

            for phase in &project.phases {
                snapshot.phases.push(PhaseRecord {
                    id: phase.id,
                    project_id: phase.project_id,
                    name: phase.name.clone(),
                    description: phase.description.clone(),
                    end_date: phase.end_date,
                    created_at: phase.created_at,
                    updated_at: phase.updated_at,
                    process_ids: phase.processes.iter().map(|p| p.id).collect(),
                });

                for process in &phase.processes {
                    snapshot.processes.push(ProcessRecord {
                        id: process.id,
                        phase_id: process.phase_id,
                        name: process.name.clone(),
                        description: process.description.clone(),
                        assignee: process.assignee.clone(),
                        start_date: process.start_date,
                        end_date: process.end_date,
                        estimated_hours: process.estimated_hours,
                        actual_hours: process.actual_hours,
                        manual_progress: process.manual_progress,
                        created_at: process.created_at,
                        updated_at: process.updated_at,
                        task_ids: process.tasks.iter().map(|t| t.id).collect(),
                    });

                    for task in &process.tasks {
                        snapshot.tasks.push(TaskRecord {
                            id: task.id,
                            process_id: task.process_id,
                            name: task.name.clone(),
                            description: task.description.clone(),
                            status: task.status,
                            history: task.history.entries().to_vec(),
                            created_at: task.created_at,
                            updated_at: task.updated_at,
                        });
                    }
                }
            }
        }

        snapshot
    }

    /// Rebuild a workspace from records, checking it is a well-formed tree.
    pub fn from_snapshot(snapshot: WorkspaceSnapshot) -> Result<Self> {
        let mut seen = HashSet::new();
        let ids = snapshot
            .projects
            .iter()
            .map(|r| r.id)
            .chain(snapshot.phases.iter().map(|r| r.id))
            .chain(snapshot.processes.iter().map(|r| r.id))
            .chain(snapshot.tasks.iter().map(|r| r.id));
        for id in ids {
            if !seen.insert(id) {
                return Err(Error::validation(format!("Duplicate identifier {id} in snapshot")));
            }
        }

        let mut phases: HashMap<Uuid, PhaseRecord> =
            snapshot.phases.into_iter().map(|r| (r.id, r)).collect();
        let mut processes: HashMap<Uuid, ProcessRecord> =
            snapshot.processes.into_iter().map(|r| (r.id, r)).collect();
        let mut tasks: HashMap<Uuid, TaskRecord> =
            snapshot.tasks.into_iter().map(|r| (r.id, r)).collect();

        let mut workspace = Workspace::new();

        for record in snapshot.projects {
            check_name(&record.name, record.id)?;
            workspace.index.insert(
                record.id,
                IndexEntry {
                    kind: EntityKind::Project,
                    parent: None,
                },
            );

            let mut project = Project {
                id: record.id,
                name: record.name,
                description: record.description,
                status: record.status,
                status_manual: record.status_manual,
                progress: 0.0,
                phases: Vec::with_capacity(record.phase_ids.len()),
                created_at: record.created_at,
                updated_at: record.updated_at,
            };

            for phase_id in record.phase_ids {
                let rec = take_child(&mut phases, phase_id, project.id, |r| r.project_id)?;
                let phase = build_phase(&mut workspace, rec, &mut processes, &mut tasks)?;
                project.phases.push(phase);
            }

            aggregate::refresh_all(&mut project);
            workspace.projects.push(project);
        }

        if let Some(orphan) = phases
            .keys()
            .chain(processes.keys())
            .chain(tasks.keys())
            .next()
        {
            return Err(Error::validation(format!(
                "Record {orphan} is not reachable from any project"
            )));
        }

        Ok(workspace)
    }
}

fn build_phase(
    workspace: &mut Workspace,
    record: PhaseRecord,
    processes: &mut HashMap<Uuid, ProcessRecord>,
    tasks: &mut HashMap<Uuid, TaskRecord>,
) -> Result<Phase> {
    check_name(&record.name, record.id)?;
    workspace.index.insert(
        record.id,
        IndexEntry {
            kind: EntityKind::Phase,
            parent: Some(record.project_id),
        },
    );

    let mut phase = Phase {
        id: record.id,
        project_id: record.project_id,
        name: record.name,
        description: record.description,
        end_date: record.end_date,
        progress: 0.0,
        processes: Vec::with_capacity(record.process_ids.len()),
        created_at: record.created_at,
        updated_at: record.updated_at,
    };

    for process_id in record.process_ids {
        let rec = take_child(processes, process_id, phase.id, |r| r.phase_id)?;
        let process = build_process(workspace, rec, tasks)?;
        phase.processes.push(process);
    }

    Ok(phase)
}

fn build_process(
    workspace: &mut Workspace,
    record: ProcessRecord,
    tasks: &mut HashMap<Uuid, TaskRecord>,
) -> Result<Process> {
    check_name(&record.name, record.id)?;
    let invalid = |detail: String| Error::validation(format!("Process {}: {detail}", record.id));
    for (field, value) in [
        ("estimated_hours", record.estimated_hours),
        ("actual_hours", record.actual_hours),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(invalid(format!("{field} is {value}")));
        }
    }
    if !(0.0..=100.0).contains(&record.manual_progress) {
        return Err(invalid(format!("manual_progress is {}", record.manual_progress)));
    }
    if let (Some(start), Some(end)) = (record.start_date, record.end_date) {
        if end < start {
            return Err(invalid("end date before start date".to_string()));
        }
    }

    workspace.index.insert(
        record.id,
        IndexEntry {
            kind: EntityKind::Process,
            parent: Some(record.phase_id),
        },
    );

    let mut process = Process {
        id: record.id,
        phase_id: record.phase_id,
        name: record.name,
        description: record.description,
        assignee: record.assignee,
        start_date: record.start_date,
        end_date: record.end_date,
        estimated_hours: record.estimated_hours,
        actual_hours: record.actual_hours,
        manual_progress: record.manual_progress,
        progress: 0.0,
        tasks: Vec::with_capacity(record.task_ids.len()),
        created_at: record.created_at,
        updated_at: record.updated_at,
    };

    for task_id in record.task_ids {
        let rec = take_child(tasks, task_id, process.id, |r| r.process_id)?;
        check_name(&rec.name, rec.id)?;
        check_history(&rec)?;
        workspace.index.insert(
            rec.id,
            IndexEntry {
                kind: EntityKind::Task,
                parent: Some(process.id),
            },
        );
        process.tasks.push(Task {
            id: rec.id,
            process_id: rec.process_id,
            name: rec.name,
            description: rec.description,
            status: rec.status,
            history: TaskHistory::from_entries(rec.history),
            created_at: rec.created_at,
            updated_at: rec.updated_at,
        });
    }

    Ok(process)
}

/// Pull a child record out of the pool, checking it points back at `parent`.
fn take_child<R>(
    pool: &mut HashMap<Uuid, R>,
    id: Uuid,
    parent: Uuid,
    parent_of: impl Fn(&R) -> Uuid,
) -> Result<R> {
    let record = pool.remove(&id).ok_or_else(|| {
        Error::validation(format!("Child {id} of {parent} is missing or listed twice"))
    })?;
    if parent_of(&record) != parent {
        return Err(Error::validation(format!(
            "Record {id} is listed under {parent} but names {} as parent",
            parent_of(&record)
        )));
    }
    Ok(record)
}

fn check_name(name: &str, id: Uuid) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::validation(format!("Record {id} has an empty name")));
    }
    Ok(())
}

/// A history must be a chain of real changes ending in the current status.
fn check_history(task: &TaskRecord) -> Result<()> {
    let broken = || Error::validation(format!("Task {} has an inconsistent history", task.id));

    for entry in &task.history {
        if entry.from == entry.to {
            return Err(broken());
        }
    }
    for pair in task.history.windows(2) {
        if pair[0].to != pair[1].from {
            return Err(broken());
        }
        // Wall-clock steps can reorder timestamps; keep the data loadable.
        if pair[1].at < pair[0].at {
            tracing::warn!(task_id = %task.id, "Task history timestamps go backwards");
        }
    }
    if let Some(last) = task.history.last() {
        if last.to != task.status {
            return Err(broken());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Workspace {
        let mut ws = Workspace::new();
        let project = ws
            .create_project(CreateProjectInput {
                name: "Launch".to_string(),
                description: None,
            })
            .unwrap()
            .id;
        let phase = ws
            .add_phase(
                project,
                CreatePhaseInput {
                    name: "Build".to_string(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id;
        let process = ws
            .add_process(
                phase,
                CreateProcessInput {
                    name: "Backend".to_string(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id;
        let task = ws
            .add_task(
                process,
                CreateTaskInput {
                    name: "Schema".to_string(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id;
        ws.update_task_status(task, TaskStatus::InProgress).unwrap();
        ws.update_task_status(task, TaskStatus::Completed).unwrap();
        ws
    }

    #[test]
    fn test_round_trip_rebuilds_caches() {
        let ws = sample();
        let snapshot = ws.to_snapshot();

        let restored = Workspace::from_snapshot(snapshot.clone()).unwrap();

        assert_eq!(restored.to_snapshot(), snapshot);
        assert_eq!(restored.node_count(), ws.node_count());
        assert_eq!(restored.projects()[0].progress, 100.0);
        assert_eq!(restored.projects()[0].status, ProjectStatus::Completed);
    }

    #[test]
    fn test_serializes_through_json() {
        let snapshot = sample().to_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: WorkspaceSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let mut snapshot = sample().to_snapshot();
        snapshot.tasks[0].id = snapshot.processes[0].id;
        assert!(Workspace::from_snapshot(snapshot).unwrap_err().is_validation());
    }

    #[test]
    fn test_rejects_mismatched_parent() {
        let mut snapshot = sample().to_snapshot();
        snapshot.phases[0].project_id = Uuid::new_v4();
        assert!(Workspace::from_snapshot(snapshot).is_err());
    }

    #[test]
    fn test_rejects_unreachable_records() {
        let mut snapshot = sample().to_snapshot();
        snapshot.processes[0].task_ids.clear();
        assert!(Workspace::from_snapshot(snapshot).is_err());
    }

    #[test]
    fn test_rejects_history_not_ending_in_status() {
        let mut snapshot = sample().to_snapshot();
        snapshot.tasks[0].status = TaskStatus::InProgress;
        assert!(Workspace::from_snapshot(snapshot).is_err());
    }

    #[test]
    fn test_accepts_history_with_backward_timestamps() {
        let mut snapshot = sample().to_snapshot();
        let first = snapshot.tasks[0].history[0].at;
        snapshot.tasks[0].history[1].at = first - chrono::Duration::seconds(1);

        let restored = Workspace::from_snapshot(snapshot.clone()).unwrap();

        let task_id = snapshot.tasks[0].id;
        let history = restored.history(task_id).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history[1].at < history[0].at);
        assert_eq!(restored.to_snapshot(), snapshot);
    }

    #[test]
    fn test_rejects_broken_history_chain() {
        let mut snapshot = sample().to_snapshot();
        snapshot.tasks[0].history[1].from = TaskStatus::NotStarted;
        assert!(Workspace::from_snapshot(snapshot).unwrap_err().is_validation());
    }

    #[test]
    fn test_rejects_negative_hours() {
        let mut snapshot = sample().to_snapshot();
        snapshot.processes[0].actual_hours = -1.0;
        assert!(Workspace::from_snapshot(snapshot).unwrap_err().is_validation());
    }
}
