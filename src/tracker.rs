//! Shared context bundling the workspace, the notification engine and the
//! audit sink.
//!
//! Built once at startup and passed to whatever needs it; clones share the
//! same state. There is a single writer at a time: mutations hold the
//! workspace write lock across the whole cascade, and scans hold the read
//! lock for the whole pass. Locks are always taken workspace first, then
//! engine.

use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::audit::{AuditAction, AuditEvent, AuditSink, TracingAuditSink};
use crate::config::NotificationSettings;
use crate::error::Result;
use crate::models::*;
use crate::notify::{EvaluationReport, NotificationEngine, NotificationFilter};
use crate::snapshot::{EngineSnapshot, WorkspaceSnapshot};
use crate::workspace::{RemovedNode, Workspace};

pub struct Tracker {
    workspace: Arc<RwLock<Workspace>>,
    engine: Arc<Mutex<NotificationEngine>>,
    audit: Arc<dyn AuditSink>,
}

impl Clone for Tracker {
    fn clone(&self) -> Self {
        Self {
            workspace: Arc::clone(&self.workspace),
            engine: Arc::clone(&self.engine),
            audit: Arc::clone(&self.audit),
        }
    }
}

impl Tracker {
    pub fn new(settings: NotificationSettings) -> Self {
        Self::with_audit(settings, Arc::new(TracingAuditSink))
    }

    pub fn with_audit(settings: NotificationSettings, audit: Arc<dyn AuditSink>) -> Self {
        Self::from_parts(Workspace::new(), NotificationEngine::new(settings), audit)
    }

    pub fn from_parts(
        workspace: Workspace,
        engine: NotificationEngine,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            workspace: Arc::new(RwLock::new(workspace)),
            engine: Arc::new(Mutex::new(engine)),
            audit,
        }
    }

    /// Rebuild a tracker from persisted snapshots.
    pub fn load(
        workspace: WorkspaceSnapshot,
        engine: EngineSnapshot,
        settings: NotificationSettings,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let workspace = Workspace::from_snapshot(workspace)?;
        let engine = NotificationEngine::from_snapshot(settings, engine)?;
        Ok(Self::from_parts(workspace, engine, audit))
    }

    /// Consistent snapshot of both halves of the state.
    pub fn snapshot(&self) -> (WorkspaceSnapshot, EngineSnapshot) {
        let workspace = self.read_workspace();
        let engine = self.lock_engine();
        (workspace.to_snapshot(), engine.to_snapshot())
    }

    /// Run a read-only closure against the workspace.
    pub fn read<R>(&self, f: impl FnOnce(&Workspace) -> R) -> R {
        f(&*self.read_workspace())
    }

    pub fn settings(&self) -> NotificationSettings {
        self.lock_engine().settings().clone()
    }

    fn read_workspace(&self) -> RwLockReadGuard<'_, Workspace> {
        self.workspace.read().expect("workspace lock poisoned")
    }

    fn write_workspace(&self) -> RwLockWriteGuard<'_, Workspace> {
        self.workspace.write().expect("workspace lock poisoned")
    }

    fn lock_engine(&self) -> MutexGuard<'_, NotificationEngine> {
        self.engine.lock().expect("notification engine lock poisoned")
    }

    /// Apply one workspace mutation and report it to the audit sink.
    ///
    /// `op` returns the affected node's identifier alongside its result so
    /// creates can be audited with the new identifier.
    fn mutate<T>(
        &self,
        event: AuditEvent,
        op: impl FnOnce(&mut Workspace) -> Result<(Uuid, T)>,
    ) -> Result<T> {
        let result = op(&mut *self.write_workspace());
        self.finish(event, result)
    }

    fn finish<T>(&self, event: AuditEvent, result: Result<(Uuid, T)>) -> Result<T> {
        match result {
            Ok((id, value)) => {
                let id = event.entity_id.or(Some(id));
                self.audit.record(&event.entity(id));
                Ok(value)
            }
            Err(e) => {
                self.audit.record(&event.failed(&e));
                Err(e)
            }
        }
    }

    // ============================================================
    // Tree mutations
    // ============================================================

    pub fn create_project(&self, input: CreateProjectInput) -> Result<Project> {
        let event = AuditEvent::new(AuditAction::Create, EntityKind::Project)
            .details(Some(json!({ "name": input.name })));
        self.mutate(event, |ws| ws.create_project(input).map(|p| (p.id, p.clone())))
    }

    pub fn add_phase(&self, project_id: Uuid, input: CreatePhaseInput) -> Result<Phase> {
        let event = AuditEvent::new(AuditAction::Create, EntityKind::Phase)
            .details(Some(json!({ "name": input.name, "parent_id": project_id })));
        self.mutate(event, |ws| {
            ws.add_phase(project_id, input).map(|p| (p.id, p.clone()))
        })
    }

    pub fn add_process(&self, phase_id: Uuid, input: CreateProcessInput) -> Result<Process> {
        let event = AuditEvent::new(AuditAction::Create, EntityKind::Process)
            .details(Some(json!({ "name": input.name, "parent_id": phase_id })));
        self.mutate(event, |ws| {
            ws.add_process(phase_id, input).map(|p| (p.id, p.clone()))
        })
    }

    pub fn add_task(&self, process_id: Uuid, input: CreateTaskInput) -> Result<Task> {
        let event = AuditEvent::new(AuditAction::Create, EntityKind::Task)
            .details(Some(json!({ "name": input.name, "parent_id": process_id })));
        self.mutate(event, |ws| {
            ws.add_task(process_id, input).map(|t| (t.id, t.clone()))
        })
    }

    pub fn update_project(&self, id: Uuid, input: UpdateProjectInput) -> Result<Project> {
        let action = if input.status.is_some() {
            AuditAction::StatusOverride
        } else {
            AuditAction::Update
        };
        let details = input.status.map(|s| json!({ "status": s.as_str() }));
        let event = AuditEvent::new(action, EntityKind::Project)
            .entity(Some(id))
            .details(details);
        self.mutate(event, |ws| {
            ws.update_project(id, input).map(|p| (p.id, p.clone()))
        })
    }

    pub fn revert_project_status(&self, id: Uuid) -> Result<Project> {
        let event = AuditEvent::new(AuditAction::StatusRevert, EntityKind::Project).entity(Some(id));
        self.mutate(event, |ws| {
            ws.revert_project_status(id).map(|p| (p.id, p.clone()))
        })
    }

    pub fn update_phase(&self, id: Uuid, input: UpdatePhaseInput) -> Result<Phase> {
        let event = AuditEvent::new(AuditAction::Update, EntityKind::Phase).entity(Some(id));
        self.mutate(event, |ws| ws.update_phase(id, input).map(|p| (p.id, p.clone())))
    }

    pub fn update_process(&self, id: Uuid, input: UpdateProcessInput) -> Result<Process> {
        let event = AuditEvent::new(AuditAction::Update, EntityKind::Process).entity(Some(id));
        self.mutate(event, |ws| {
            ws.update_process(id, input).map(|p| (p.id, p.clone()))
        })
    }

    pub fn update_task(&self, id: Uuid, input: UpdateTaskInput) -> Result<Task> {
        let event = AuditEvent::new(AuditAction::Update, EntityKind::Task).entity(Some(id));
        self.mutate(event, |ws| ws.update_task(id, input).map(|t| (t.id, t.clone())))
    }

    pub fn update_task_status(&self, id: Uuid, status: TaskStatus) -> Result<Task> {
        let event = AuditEvent::new(AuditAction::StatusChange, EntityKind::Task)
            .entity(Some(id))
            .details(Some(json!({ "to": status.as_str() })));
        self.mutate(event, |ws| {
            ws.update_task_status(id, status).map(|t| (t.id, t.clone()))
        })
    }

    pub fn remove(&self, id: Uuid) -> Result<RemovedNode> {
        let (kind, result) = {
            let mut workspace = self.write_workspace();
            let kind = workspace.kind_of(id).unwrap_or(EntityKind::Node);
            (kind, workspace.remove(id))
        };

        let details = result
            .as_ref()
            .ok()
            .map(|removed| json!({ "removed": removed.subtree_ids().len() }));
        let event = AuditEvent::new(AuditAction::Remove, kind)
            .entity(Some(id))
            .details(details);
        self.finish(event, result.map(|removed| (id, removed)))
    }

    // ============================================================
    // Reads
    // ============================================================

    pub fn progress(&self, id: Uuid) -> Result<f64> {
        self.read_workspace().progress(id)
    }

    pub fn status(&self, project_id: Uuid) -> Result<ProjectStatus> {
        self.read_workspace().status(project_id)
    }

    pub fn history(&self, task_id: Uuid) -> Result<Vec<StatusTransition>> {
        self.read_workspace().history(task_id).map(<[_]>::to_vec)
    }

    pub fn projects(&self) -> Vec<Project> {
        self.read_workspace().projects().to_vec()
    }

    // ============================================================
    // Notifications
    // ============================================================

    /// Evaluate every rule against a consistent view of the tree.
    pub fn scan(&self, today: NaiveDate) -> EvaluationReport {
        let workspace = self.read_workspace();
        let mut engine = self.lock_engine();
        let report = engine.evaluate(&workspace, today);
        drop(engine);
        drop(workspace);

        let event = AuditEvent::new(AuditAction::Scan, EntityKind::Notification).details(Some(
            json!({
                "today": today.to_string(),
                "created": report.created.len(),
                "dismissed": report.dismissed.len(),
            }),
        ));
        self.audit.record(&event);
        report
    }

    /// Drop read notices older than the retention window, counted from `now`.
    pub fn purge(&self, now: DateTime<Utc>) -> usize {
        let mut engine = self.lock_engine();
        let cutoff = now - engine.settings().retention();
        let purged = engine.auto_dismiss(cutoff);
        drop(engine);

        if purged > 0 {
            let event = AuditEvent::new(AuditAction::Purge, EntityKind::Notification)
                .details(Some(json!({ "purged": purged })));
            self.audit.record(&event);
        }
        purged
    }

    pub fn auto_dismiss(&self, older_than: DateTime<Utc>) -> usize {
        self.lock_engine().auto_dismiss(older_than)
    }

    pub fn notifications(&self, filter: &NotificationFilter) -> Vec<Notification> {
        self.lock_engine()
            .notifications(filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn notification(&self, id: Uuid) -> Result<Notification> {
        self.lock_engine().get(id).cloned()
    }

    pub fn unread_count(&self) -> usize {
        self.lock_engine().unread_count()
    }

    pub fn mark_read(&self, id: Uuid) -> Result<Notification> {
        let event = AuditEvent::new(AuditAction::MarkRead, EntityKind::Notification).entity(Some(id));
        let result = self.lock_engine().mark_read(id).map(|n| (n.id, n.clone()));
        self.finish(event, result)
    }

    pub fn mark_unread(&self, id: Uuid) -> Result<Notification> {
        let event =
            AuditEvent::new(AuditAction::MarkUnread, EntityKind::Notification).entity(Some(id));
        let result = self.lock_engine().mark_unread(id).map(|n| (n.id, n.clone()));
        self.finish(event, result)
    }

    pub fn mark_all_read(&self) -> usize {
        let changed = self.lock_engine().mark_all_read();
        let event = AuditEvent::new(AuditAction::MarkAllRead, EntityKind::Notification)
            .details(Some(json!({ "changed": changed })));
        self.audit.record(&event);
        changed
    }

    pub fn delete_notification(&self, id: Uuid) -> Result<Notification> {
        let event = AuditEvent::new(AuditAction::Delete, EntityKind::Notification).entity(Some(id));
        let result = self.lock_engine().delete(id).map(|n| (n.id, n));
        self.finish(event, result)
    }
}
