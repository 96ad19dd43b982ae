//! The work tree and its mutation operations.
//!
//! A [`Workspace`] owns any number of project trees. Each node owns its
//! children by value; parents are found through an identifier index, never
//! through a back pointer. Every mutation validates first, then writes, then
//! recomputes cached progress along the ancestor chain, so a call either
//! applies completely or leaves the tree untouched.

mod mutations;
mod validate;

use std::collections::HashMap;

use uuid::Uuid;

use crate::aggregate;
use crate::error::{Error, Result};
use crate::models::*;

pub use mutations::RemovedNode;

/// Where a node lives in the tree: its kind and its parent's identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndexEntry {
    pub kind: EntityKind,
    pub parent: Option<Uuid>,
}

/// Positions of a node and its ancestors inside the owning vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NodePath {
    pub project: usize,
    pub phase: Option<usize>,
    pub process: Option<usize>,
    pub task: Option<usize>,
}

impl NodePath {
    fn project(project: usize) -> Self {
        Self {
            project,
            phase: None,
            process: None,
            task: None,
        }
    }

    /// Path of the node's parent, or `None` for a project.
    fn parent(self) -> Option<Self> {
        if self.task.is_some() {
            Some(Self { task: None, ..self })
        } else if self.process.is_some() {
            Some(Self {
                process: None,
                ..self
            })
        } else if self.phase.is_some() {
            Some(Self::project(self.project))
        } else {
            None
        }
    }
}

/// A borrowed view of any tree node.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Project(&'a Project),
    Phase(&'a Phase),
    Process(&'a Process),
    Task(&'a Task),
}

impl<'a> NodeRef<'a> {
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

    pub fn name(&self) -> &'a str {
        match self {
            Self::Project(p) => &p.name,
            Self::Phase(p) => &p.name,
            Self::Process(p) => &p.name,
            Self::Task(t) => &t.name,
        }
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        match self {
            Self::Project(_) => None,
            Self::Phase(p) => Some(p.project_id),
            Self::Process(p) => Some(p.phase_id),
            Self::Task(t) => Some(t.process_id),
        }
    }

    pub fn progress(&self) -> f64 {
        match self {
            Self::Project(p) => p.progress,
            Self::Phase(p) => p.progress,
            Self::Process(p) => p.progress,
            Self::Task(t) => aggregate::task_progress(t),
        }
    }

    pub fn children(&self) -> Vec<NodeRef<'a>> {
        match self {
            Self::Project(p) => p.phases.iter().map(NodeRef::Phase).collect(),
            Self::Phase(p) => p.processes.iter().map(NodeRef::Process).collect(),
            Self::Process(p) => p.tasks.iter().map(NodeRef::Task).collect(),
            Self::Task(_) => Vec::new(),
        }
    }
}

/// All project trees plus the global identifier index.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub(crate) projects: Vec<Project>,
    pub(crate) index: HashMap<Uuid, IndexEntry>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Number of nodes across all trees.
    pub fn node_count(&self) -> usize {
        self.index.len()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.index.contains_key(&id)
    }

    pub fn kind_of(&self, id: Uuid) -> Result<EntityKind> {
        self.index
            .get(&id)
            .map(|e| e.kind)
            .ok_or_else(|| Error::not_found(EntityKind::Node, id))
    }

    pub fn parent_of(&self, id: Uuid) -> Result<Option<Uuid>> {
        self.index
            .get(&id)
            .map(|e| e.parent)
            .ok_or_else(|| Error::not_found(EntityKind::Node, id))
    }

    /// Identifiers from the node's parent up to its project.
    pub fn ancestors(&self, id: Uuid) -> Result<Vec<Uuid>> {
        let mut chain = Vec::new();
        let mut current = self.parent_of(id)?;
        while let Some(parent) = current {
            chain.push(parent);
            current = self.parent_of(parent)?;
        }
        Ok(chain)
    }

    pub fn project(&self, id: Uuid) -> Result<&Project> {
        let path = self.path_of(id, EntityKind::Project)?;
        Ok(&self.projects[path.project])
    }

    pub fn phase(&self, id: Uuid) -> Result<&Phase> {
        let path = self.path_of(id, EntityKind::Phase)?;
        Ok(self.phase_at(path))
    }

    pub fn process(&self, id: Uuid) -> Result<&Process> {
        let path = self.path_of(id, EntityKind::Process)?;
        Ok(self.process_at(path))
    }

    pub fn task(&self, id: Uuid) -> Result<&Task> {
        let path = self.path_of(id, EntityKind::Task)?;
        let process = self.process_at(path);
        Ok(&process.tasks[path.task.unwrap_or_default()])
    }

    /// Look up a node of any kind.
    pub fn node(&self, id: Uuid) -> Result<NodeRef<'_>> {
        match self.kind_of(id)? {
            EntityKind::Project => self.project(id).map(NodeRef::Project),
            EntityKind::Phase => self.phase(id).map(NodeRef::Phase),
            EntityKind::Process => self.process(id).map(NodeRef::Process),
            EntityKind::Task => self.task(id).map(NodeRef::Task),
            EntityKind::Notification | EntityKind::Node => {
                Err(Error::not_found(EntityKind::Node, id))
            }
        }
    }

    /// Cached aggregated progress of any node.
    pub fn progress(&self, id: Uuid) -> Result<f64> {
        self.node(id).map(|n| n.progress())
    }

    pub fn status(&self, project_id: Uuid) -> Result<ProjectStatus> {
        self.project(project_id).map(|p| p.status)
    }

    /// A task's status transitions in the order they happened.
    pub fn history(&self, task_id: Uuid) -> Result<&[StatusTransition]> {
        self.task(task_id).map(|t| t.history.entries())
    }

    /// The project a node belongs to.
    pub fn project_of(&self, id: Uuid) -> Result<&Project> {
        let entry = self.entry(id, EntityKind::Node)?;
        if entry.kind == EntityKind::Project {
            return self.project(id);
        }
        let root = self.ancestors(id)?.last().copied().unwrap_or(id);
        self.project(root)
    }

    fn entry(&self, id: Uuid, kind: EntityKind) -> Result<IndexEntry> {
        self.index
            .get(&id)
            .copied()
            .ok_or_else(|| Error::not_found(kind, id))
    }

    /// Resolve a node of the expected kind to its position in the tree.
    pub(crate) fn path_of(&self, id: Uuid, kind: EntityKind) -> Result<NodePath> {
        let entry = self.entry(id, kind)?;
        if entry.kind != kind {
            return Err(Error::not_found(kind, id));
        }
        let missing = || Error::not_found(kind, id);

        match kind {
            EntityKind::Project => self
                .projects
                .iter()
                .position(|p| p.id == id)
                .map(NodePath::project)
                .ok_or_else(missing),
            EntityKind::Phase => {
                let parent = entry.parent.ok_or_else(missing)?;
                let mut path = self.path_of(parent, EntityKind::Project)?;
                path.phase = self.projects[path.project]
                    .phases
                    .iter()
                    .position(|p| p.id == id);
                path.phase.map(|_| path).ok_or_else(missing)
            }
            EntityKind::Process => {
                let parent = entry.parent.ok_or_else(missing)?;
                let mut path = self.path_of(parent, EntityKind::Phase)?;
                path.process = self.phase_at(path).processes.iter().position(|p| p.id == id);
                path.process.map(|_| path).ok_or_else(missing)
            }
            EntityKind::Task => {
                let parent = entry.parent.ok_or_else(missing)?;
                let mut path = self.path_of(parent, EntityKind::Process)?;
                path.task = self.process_at(path).tasks.iter().position(|t| t.id == id);
                path.task.map(|_| path).ok_or_else(missing)
            }
            EntityKind::Notification | EntityKind::Node => Err(missing()),
        }
    }

    fn phase_at(&self, path: NodePath) -> &Phase {
        &self.projects[path.project].phases[path.phase.unwrap_or_default()]
    }

    fn process_at(&self, path: NodePath) -> &Process {
        &self.phase_at(path).processes[path.process.unwrap_or_default()]
    }

    /// Recompute cached progress from the node at `path` up to its project.
    /// Each level is refreshed once, from the cached values of the level below.
    pub(crate) fn recompute(&mut self, path: NodePath) {
        let project = &mut self.projects[path.project];
        if let Some(ph) = path.phase {
            let phase = &mut project.phases[ph];
            if let Some(pr) = path.process {
                aggregate::refresh_process(&mut phase.processes[pr]);
            }
            aggregate::refresh_phase(phase);
        }
        aggregate::refresh_project(project);

        tracing::debug!(
            project_id = %project.id,
            progress = project.progress,
            status = project.status.as_str(),
            "Recomputed progress"
        );
    }

    pub(crate) fn fresh_id(&self) -> Uuid {
        loop {
            let id = Uuid::new_v4();
            if !self.index.contains_key(&id) {
                return id;
            }
        }
    }
}
