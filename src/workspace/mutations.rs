use chrono::Utc;
use uuid::Uuid;

use super::{validate, IndexEntry, NodePath, Workspace};
use crate::error::{Error, Result};
use crate::models::*;

/// A subtree detached by [`Workspace::remove`], handed back as a unit.
#[derive(Debug, Clone, PartialEq)]
pub enum RemovedNode {
    Project(Project),
    Phase(Phase),
    Process(Process),
    Task(Task),
}

impl RemovedNode {
    pub fn id(&self) -> Uuid {
        match self {
            Self::Project(p) => p.id,
            Self::Phase(p) => p.id,
            Self::Process(p) => p.id,
            Self::Task(t) => t.id,
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Project(_) => EntityKind::Project,
            Self::Phase(_) => EntityKind::Phase,
            Self::Process(_) => EntityKind::Process,
            Self::Task(_) => EntityKind::Task,
        }
    }

    /// The removed node's identifier followed by all of its descendants'.
    pub fn subtree_ids(&self) -> Vec<Uuid> {
        let mut ids = Vec::new();
        match self {
            Self::Project(p) => collect_project(p, &mut ids),
            Self::Phase(p) => collect_phase(p, &mut ids),
            Self::Process(p) => collect_process(p, &mut ids),
            Self::Task(t) => ids.push(t.id),
        }
        ids
    }
}

fn collect_project(project: &Project, ids: &mut Vec<Uuid>) {
    ids.push(project.id);
    for phase in &project.phases {
        collect_phase(phase, ids);
    }
}

fn collect_phase(phase: &Phase, ids: &mut Vec<Uuid>) {
    ids.push(phase.id);
    for process in &phase.processes {
        collect_process(process, ids);
    }
}

fn collect_process(process: &Process, ids: &mut Vec<Uuid>) {
    ids.push(process.id);
    ids.extend(process.tasks.iter().map(|t| t.id));
}

impl Workspace {
    // ============================================================
    // Create
    // ============================================================

    pub fn create_project(&mut self, input: CreateProjectInput) -> Result<&Project> {
        let name = validate::name(&input.name)?;
        let id = self.fresh_id();
        let now = Utc::now();

        self.index.insert(
            id,
            IndexEntry {
                kind: EntityKind::Project,
                parent: None,
            },
        );
        self.projects.push(Project {
            id,
            name,
            description: input.description,
            status: ProjectStatus::NotStarted,
            status_manual: false,
            progress: 0.0,
            phases: Vec::new(),
            created_at: now,
            updated_at: now,
        });

        tracing::info!(project_id = %id, "Created project");
        let idx = self.projects.len() - 1;
        Ok(&self.projects[idx])
    }

    pub fn add_phase(&mut self, project_id: Uuid, input: CreatePhaseInput) -> Result<&Phase> {
        let name = validate::name(&input.name)?;
        let mut path = self.path_of(project_id, EntityKind::Project)?;
        let id = self.fresh_id();
        let now = Utc::now();

        let project = &mut self.projects[path.project];
        project.phases.push(Phase {
            id,
            project_id,
            name,
            description: input.description,
            end_date: input.end_date,
            progress: 0.0,
            processes: Vec::new(),
            created_at: now,
            updated_at: now,
        });
        project.updated_at = now;
        path.phase = Some(project.phases.len() - 1);

        self.index.insert(
            id,
            IndexEntry {
                kind: EntityKind::Phase,
                parent: Some(project_id),
            },
        );
        self.recompute(path);

        tracing::info!(phase_id = %id, %project_id, "Added phase");
        Ok(self.phase_at(path))
    }

    pub fn add_process(&mut self, phase_id: Uuid, input: CreateProcessInput) -> Result<&Process> {
        let name = validate::name(&input.name)?;
        let estimated_hours =
            validate::hours("estimated_hours", input.estimated_hours.unwrap_or(0.0))?;
        let actual_hours = validate::hours("actual_hours", input.actual_hours.unwrap_or(0.0))?;
        let manual_progress =
            validate::percent("manual_progress", input.manual_progress.unwrap_or(0.0))?;
        validate::date_order(input.start_date, input.end_date)?;

        let mut path = self.path_of(phase_id, EntityKind::Phase)?;
        let id = self.fresh_id();
        let now = Utc::now();

        let phase = self.phase_at_mut(path);
        phase.processes.push(Process {
            id,
            phase_id,
            name,
            description: input.description,
            assignee: input.assignee.unwrap_or_default(),
            start_date: input.start_date,
            end_date: input.end_date,
            estimated_hours,
            actual_hours,
            manual_progress,
            progress: 0.0,
            tasks: Vec::new(),
            created_at: now,
            updated_at: now,
        });
        phase.updated_at = now;
        path.process = Some(phase.processes.len() - 1);

        self.index.insert(
            id,
            IndexEntry {
                kind: EntityKind::Process,
                parent: Some(phase_id),
            },
        );
        self.recompute(path);

        tracing::info!(process_id = %id, %phase_id, "Added process");
        Ok(self.process_at(path))
    }

    pub fn add_task(&mut self, process_id: Uuid, input: CreateTaskInput) -> Result<&Task> {
        let name = validate::name(&input.name)?;
        let path = self.path_of(process_id, EntityKind::Process)?;
        let id = self.fresh_id();
        let now = Utc::now();

        let process = self.process_at_mut(path);
        process.tasks.push(Task {
            id,
            process_id,
            name,
            description: input.description,
            status: input.status.unwrap_or(TaskStatus::NotStarted),
            history: TaskHistory::new(),
            created_at: now,
            updated_at: now,
        });
        process.updated_at = now;
        let task_idx = process.tasks.len() - 1;

        self.index.insert(
            id,
            IndexEntry {
                kind: EntityKind::Task,
                parent: Some(process_id),
            },
        );
        self.recompute(path);

        tracing::info!(task_id = %id, %process_id, "Added task");
        Ok(&self.process_at(path).tasks[task_idx])
    }

    // ============================================================
    // Update
    // ============================================================

    pub fn update_project(&mut self, id: Uuid, input: UpdateProjectInput) -> Result<&Project> {
        let name = input.name.as_deref().map(validate::name).transpose()?;
        let path = self.path_of(id, EntityKind::Project)?;

        let project = &mut self.projects[path.project];
        if let Some(name) = name {
            project.name = name;
        }
        if let Some(description) = input.description {
            project.description = description;
        }
        if let Some(status) = input.status {
            project.status = status;
            project.status_manual = true;
        }
        project.updated_at = Utc::now();
        self.recompute(path);

        Ok(&self.projects[path.project])
    }

    /// Clear a pinned status and let progress decide again.
    pub fn revert_project_status(&mut self, id: Uuid) -> Result<&Project> {
        let path = self.path_of(id, EntityKind::Project)?;

        let project = &mut self.projects[path.project];
        project.status_manual = false;
        project.updated_at = Utc::now();
        self.recompute(path);

        Ok(&self.projects[path.project])
    }

    pub fn update_phase(&mut self, id: Uuid, input: UpdatePhaseInput) -> Result<&Phase> {
        let name = input.name.as_deref().map(validate::name).transpose()?;
        let path = self.path_of(id, EntityKind::Phase)?;

        let phase = self.phase_at_mut(path);
        if let Some(name) = name {
            phase.name = name;
        }
        if let Some(description) = input.description {
            phase.description = description;
        }
        if let Some(end_date) = input.end_date {
            phase.end_date = end_date;
        }
        phase.updated_at = Utc::now();
        self.recompute(path);

        Ok(self.phase_at(path))
    }

    pub fn update_process(&mut self, id: Uuid, input: UpdateProcessInput) -> Result<&Process> {
        let path = self.path_of(id, EntityKind::Process)?;
        let existing = self.process_at(path);

        // Validate the merged record before touching anything.
        let name = input.name.as_deref().map(validate::name).transpose()?;
        let estimated_hours = input
            .estimated_hours
            .map(|h| validate::hours("estimated_hours", h))
            .transpose()?;
        let actual_hours = input
            .actual_hours
            .map(|h| validate::hours("actual_hours", h))
            .transpose()?;
        let manual_progress = input
            .manual_progress
            .map(|p| validate::percent("manual_progress", p))
            .transpose()?;
        let start_date = input.start_date.unwrap_or(existing.start_date);
        let end_date = input.end_date.unwrap_or(existing.end_date);
        validate::date_order(start_date, end_date)?;

        let process = self.process_at_mut(path);
        if let Some(name) = name {
            process.name = name;
        }
        if let Some(description) = input.description {
            process.description = description;
        }
        if let Some(assignee) = input.assignee {
            process.assignee = assignee;
        }
        process.start_date = start_date;
        process.end_date = end_date;
        if let Some(hours) = estimated_hours {
            process.estimated_hours = hours;
        }
        if let Some(hours) = actual_hours {
            process.actual_hours = hours;
        }
        if let Some(progress) = manual_progress {
            process.manual_progress = progress;
        }
        process.updated_at = Utc::now();
        self.recompute(path);

        Ok(self.process_at(path))
    }

    pub fn update_task(&mut self, id: Uuid, input: UpdateTaskInput) -> Result<&Task> {
        let name = input.name.as_deref().map(validate::name).transpose()?;
        let path = self.path_of(id, EntityKind::Task)?;

        let task = self.task_at_mut(path);
        if let Some(name) = name {
            task.name = name;
        }
        if let Some(description) = input.description {
            task.description = description;
        }
        task.updated_at = Utc::now();
        self.recompute(path);

        Ok(self.task_at(path))
    }

    /// Move a task to a new status and record the transition.
    ///
    /// Setting the status a task already has is rejected, so every history
    /// entry marks a real change.
    pub fn update_task_status(&mut self, id: Uuid, status: TaskStatus) -> Result<&Task> {
        let path = self.path_of(id, EntityKind::Task)?;
        let current = self.task_at(path).status;
        if current == status {
            return Err(Error::validation(format!(
                "Task {id} is already {}",
                status.as_str()
            )));
        }

        let now = Utc::now();
        let task = self.task_at_mut(path);
        task.history.record(current, status, now);
        task.status = status;
        task.updated_at = now;
        self.recompute(path);

        tracing::info!(
            task_id = %id,
            from = current.as_str(),
            to = status.as_str(),
            "Task status changed"
        );
        Ok(self.task_at(path))
    }

    // ============================================================
    // Remove
    // ============================================================

    /// Detach a node and its whole subtree.
    ///
    /// Every identifier in the subtree leaves the index, so later lookups of
    /// any of them fail with `NotFound`.
    pub fn remove(&mut self, id: Uuid) -> Result<RemovedNode> {
        let kind = self.kind_of(id)?;
        let path = self.path_of(id, kind)?;
        let now = Utc::now();

        let removed = match kind {
            EntityKind::Project => RemovedNode::Project(self.projects.remove(path.project)),
            EntityKind::Phase => {
                let project = &mut self.projects[path.project];
                project.updated_at = now;
                RemovedNode::Phase(project.phases.remove(path.phase.unwrap_or_default()))
            }
            EntityKind::Process => {
                let phase = self.phase_at_mut(path);
                phase.updated_at = now;
                RemovedNode::Process(phase.processes.remove(path.process.unwrap_or_default()))
            }
            EntityKind::Task => {
                let process = self.process_at_mut(path);
                process.updated_at = now;
                RemovedNode::Task(process.tasks.remove(path.task.unwrap_or_default()))
            }
            EntityKind::Notification | EntityKind::Node => {
                return Err(Error::not_found(EntityKind::Node, id));
            }
        };

        let subtree = removed.subtree_ids();
        for node_id in &subtree {
            self.index.remove(node_id);
        }
        if let Some(parent) = path.parent() {
            self.recompute(parent);
        }

        tracing::info!(
            node_id = %id,
            kind = kind.as_str(),
            removed = subtree.len(),
            "Removed subtree"
        );
        Ok(removed)
    }

    // ============================================================
    // Positional access
    // ============================================================

    pub(super) fn phase_at_mut(&mut self, path: NodePath) -> &mut Phase {
        &mut self.projects[path.project].phases[path.phase.unwrap_or_default()]
    }

    pub(super) fn process_at_mut(&mut self, path: NodePath) -> &mut Process {
        &mut self.phase_at_mut(path).processes[path.process.unwrap_or_default()]
    }

    fn task_at(&self, path: NodePath) -> &Task {
        &self.process_at(path).tasks[path.task.unwrap_or_default()]
    }

    fn task_at_mut(&mut self, path: NodePath) -> &mut Task {
        &mut self.process_at_mut(path).tasks[path.task.unwrap_or_default()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtree_ids_lists_root_first() {
        let mut ws = Workspace::new();
        let project = ws
            .create_project(CreateProjectInput {
                name: "Root".to_string(),
                description: None,
            })
            .unwrap()
            .id;
        let phase = ws
            .add_phase(
                project,
                CreatePhaseInput {
                    name: "Phase".to_string(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id;
        let process = ws
            .add_process(
                phase,
                CreateProcessInput {
                    name: "Process".to_string(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id;
        let task = ws
            .add_task(
                process,
                CreateTaskInput {
                    name: "Task".to_string(),
                    ..Default::default()
                },
            )
            .unwrap()
            .id;

        let removed = ws.remove(phase).unwrap();
        assert_eq!(removed.subtree_ids(), vec![phase, process, task]);
        assert_eq!(ws.node_count(), 1);
    }
}
