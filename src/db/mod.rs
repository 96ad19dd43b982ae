//! SQLite persistence for workspace and engine snapshots.
//!
//! The store is a save/load boundary: the whole state is written in one
//! transaction that replaces what was there, and read back as snapshots for
//! [`Workspace::from_snapshot`](crate::workspace::Workspace::from_snapshot)
//! to validate. Nothing in the core talks to the database directly.

mod schema;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::models::*;
use crate::snapshot::*;

pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open(path: PathBuf) -> Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> Result<PathBuf> {
        let dirs = directories::ProjectDirs::from("", "", "workline")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().join("workline.db"))
    }

    pub fn open_default() -> Result<Self> {
        Self::open(Self::default_path()?)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock().expect("database lock poisoned");
        schema::run_migrations(&conn)
    }

    // ============================================================
    // Save
    // ============================================================

    /// Replace the stored state with the given snapshots.
    pub fn save_snapshot(&self, workspace: &WorkspaceSnapshot, engine: &EngineSnapshot) -> Result<()> {
        let mut conn = self.conn.lock().expect("database lock poisoned");
        let tx = conn.transaction()?;

        tx.execute_batch(
            "DELETE FROM task_history;
             DELETE FROM tasks;
             DELETE FROM processes;
             DELETE FROM phases;
             DELETE FROM projects;
             DELETE FROM notifications;
             DELETE FROM milestone_marks;",
        )
        .context("Failed to clear previous snapshot")?;

        for (position, project) in workspace.projects.iter().enumerate() {
            tx.execute(
                "INSERT INTO projects (id, position, name, description, status, status_manual, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    project.id.to_string(),
                    position as i64,
                    project.name,
                    project.description,
                    project.status.as_str(),
                    project.status_manual,
                    project.created_at.to_rfc3339(),
                    project.updated_at.to_rfc3339(),
                ],
            )?;
        }

        let phase_positions = positions(workspace.projects.iter().map(|p| &p.phase_ids));
        for phase in &workspace.phases {
            tx.execute(
                "INSERT INTO phases (id, project_id, position, name, description, end_date, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    phase.id.to_string(),
                    phase.project_id.to_string(),
                    phase_positions.get(&phase.id).copied().unwrap_or_default(),
                    phase.name,
                    phase.description,
                    phase.end_date.map(|d| d.to_string()),
                    phase.created_at.to_rfc3339(),
                    phase.updated_at.to_rfc3339(),
                ],
            )?;
        }

        let process_positions = positions(workspace.phases.iter().map(|p| &p.process_ids));
        for process in &workspace.processes {
            tx.execute(
                "INSERT INTO processes (id, phase_id, position, name, description, assignee, start_date, end_date,
                                        estimated_hours, actual_hours, manual_progress, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    process.id.to_string(),
                    process.phase_id.to_string(),
                    process_positions.get(&process.id).copied().unwrap_or_default(),
                    process.name,
                    process.description,
                    process.assignee,
                    process.start_date.map(|d| d.to_string()),
                    process.end_date.map(|d| d.to_string()),
                    process.estimated_hours,
                    process.actual_hours,
                    process.manual_progress,
                    process.created_at.to_rfc3339(),
                    process.updated_at.to_rfc3339(),
                ],
            )?;
        }

        let task_positions = positions(workspace.processes.iter().map(|p| &p.task_ids));
        for task in &workspace.tasks {
            tx.execute(
                "INSERT INTO tasks (id, process_id, position, name, description, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    task.id.to_string(),
                    task.process_id.to_string(),
                    task_positions.get(&task.id).copied().unwrap_or_default(),
                    task.name,
                    task.description,
                    task.status.as_str(),
                    task.created_at.to_rfc3339(),
                    task.updated_at.to_rfc3339(),
                ],
            )?;

            for (seq, entry) in task.history.iter().enumerate() {
                tx.execute(
                    "INSERT INTO task_history (task_id, seq, from_status, to_status, changed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        task.id.to_string(),
                        seq as i64,
                        entry.from.as_str(),
                        entry.to.as_str(),
                        entry.at.to_rfc3339(),
                    ],
                )?;
            }
        }

        for n in &engine.notifications {
            tx.execute(
                "INSERT INTO notifications (id, kind, title, message, priority, entity_kind, entity_id,
                                            project_id, milestone, read, read_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    n.id.to_string(),
                    n.kind.as_str(),
                    n.title,
                    n.message,
                    n.priority.as_str(),
                    n.entity.map(|e| e.kind.as_str()),
                    n.entity.map(|e| e.id.to_string()),
                    n.project_id.map(|id| id.to_string()),
                    n.milestone,
                    n.read,
                    n.read_at.map(|t| t.to_rfc3339()),
                    n.created_at.to_rfc3339(),
                ],
            )?;
        }

        for mark in &engine.milestones {
            tx.execute(
                "INSERT INTO milestone_marks (entity_id, milestone) VALUES (?1, ?2)",
                params![mark.entity_id.to_string(), mark.milestone],
            )?;
        }

        tx.commit().context("Failed to commit snapshot")?;

        tracing::info!(
            nodes = workspace.projects.len()
                + workspace.phases.len()
                + workspace.processes.len()
                + workspace.tasks.len(),
            notifications = engine.notifications.len(),
            "Saved snapshot"
        );
        Ok(())
    }

    // ============================================================
    // Load
    // ============================================================

    pub fn load_snapshot(&self) -> Result<(WorkspaceSnapshot, EngineSnapshot)> {
        let conn = self.conn.lock().expect("database lock poisoned");

        let mut history: HashMap<Uuid, Vec<StatusTransition>> = HashMap::new();
        {
            let mut stmt = conn.prepare(
                "SELECT task_id, from_status, to_status, changed_at
                 FROM task_history ORDER BY task_id, seq",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    uuid_at(row, 0)?,
                    StatusTransition {
                        from: task_status_at(row, 1)?,
                        to: task_status_at(row, 2)?,
                        at: datetime_at(row, 3)?,
                    },
                ))
            })?;
            for row in rows {
                let (task_id, entry) = row?;
                history.entry(task_id).or_default().push(entry);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id, process_id, name, description, status, created_at, updated_at
             FROM tasks ORDER BY process_id, position",
        )?;
        let tasks = stmt
            .query_map([], |row| {
                let id = uuid_at(row, 0)?;
                Ok(TaskRecord {
                    id,
                    process_id: uuid_at(row, 1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    status: task_status_at(row, 4)?,
                    history: Vec::new(),
                    created_at: datetime_at(row, 5)?,
                    updated_at: datetime_at(row, 6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let tasks: Vec<TaskRecord> = tasks
            .into_iter()
            .map(|mut task| {
                task.history = history.remove(&task.id).unwrap_or_default();
                task
            })
            .collect();

        let mut stmt = conn.prepare(
            "SELECT id, phase_id, name, description, assignee, start_date, end_date,
                    estimated_hours, actual_hours, manual_progress, created_at, updated_at
             FROM processes ORDER BY phase_id, position",
        )?;
        let mut processes = stmt
            .query_map([], |row| {
                Ok(ProcessRecord {
                    id: uuid_at(row, 0)?,
                    phase_id: uuid_at(row, 1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    assignee: row.get(4)?,
                    start_date: date_at(row, 5)?,
                    end_date: date_at(row, 6)?,
                    estimated_hours: row.get(7)?,
                    actual_hours: row.get(8)?,
                    manual_progress: row.get(9)?,
                    created_at: datetime_at(row, 10)?,
                    updated_at: datetime_at(row, 11)?,
                    task_ids: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut task_ids = children(tasks.iter().map(|t| (t.process_id, t.id)));
        for process in &mut processes {
            process.task_ids = task_ids.remove(&process.id).unwrap_or_default();
        }

        let mut stmt = conn.prepare(
            "SELECT id, project_id, name, description, end_date, created_at, updated_at
             FROM phases ORDER BY project_id, position",
        )?;
        let mut phases = stmt
            .query_map([], |row| {
                Ok(PhaseRecord {
                    id: uuid_at(row, 0)?,
                    project_id: uuid_at(row, 1)?,
                    name: row.get(2)?,
                    description: row.get(3)?,
                    end_date: date_at(row, 4)?,
                    created_at: datetime_at(row, 5)?,
                    updated_at: datetime_at(row, 6)?,
                    process_ids: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut process_ids = children(processes.iter().map(|p| (p.phase_id, p.id)));
        for phase in &mut phases {
            phase.process_ids = process_ids.remove(&phase.id).unwrap_or_default();
        }

        let mut stmt = conn.prepare(
            "SELECT id, name, description, status, status_manual, created_at, updated_at
             FROM projects ORDER BY position",
        )?;
        let mut projects = stmt
            .query_map([], |row| {
                Ok(ProjectRecord {
                    id: uuid_at(row, 0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    status: project_status_at(row, 3)?,
                    status_manual: row.get(4)?,
                    created_at: datetime_at(row, 5)?,
                    updated_at: datetime_at(row, 6)?,
                    phase_ids: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let mut phase_ids = children(phases.iter().map(|p| (p.project_id, p.id)));
        for project in &mut projects {
            project.phase_ids = phase_ids.remove(&project.id).unwrap_or_default();
        }

        let mut stmt = conn.prepare(
            "SELECT id, kind, title, message, priority, entity_kind, entity_id,
                    project_id, milestone, read, read_at, created_at
             FROM notifications ORDER BY created_at, id",
        )?;
        let notifications = stmt
            .query_map([], |row| {
                let entity_kind: Option<String> = row.get(5)?;
                let entity = match (entity_kind, optional_uuid_at(row, 6)?) {
                    (Some(kind), Some(id)) => Some(EntityRef {
                        kind: EntityKind::from_str(&kind)
                            .ok_or_else(|| invalid(5, format!("unknown entity kind {kind}")))?,
                        id,
                    }),
                    _ => None,
                };
                let kind: String = row.get(1)?;
                let priority: String = row.get(4)?;
                Ok(Notification {
                    id: uuid_at(row, 0)?,
                    kind: NotificationKind::from_str(&kind)
                        .ok_or_else(|| invalid(1, format!("unknown notification kind {kind}")))?,
                    title: row.get(2)?,
                    message: row.get(3)?,
                    priority: NotificationPriority::from_str(&priority)
                        .ok_or_else(|| invalid(4, format!("unknown priority {priority}")))?,
                    entity,
                    project_id: optional_uuid_at(row, 7)?,
                    milestone: row.get(8)?,
                    read: row.get(9)?,
                    read_at: optional_datetime_at(row, 10)?,
                    created_at: datetime_at(row, 11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = conn.prepare(
            "SELECT entity_id, milestone FROM milestone_marks ORDER BY entity_id, milestone",
        )?;
        let milestones = stmt
            .query_map([], |row| {
                Ok(MilestoneMark {
                    entity_id: uuid_at(row, 0)?,
                    milestone: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok((
            WorkspaceSnapshot {
                projects,
                phases,
                processes,
                tasks,
            },
            EngineSnapshot {
                notifications,
                milestones,
            },
        ))
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

/// Position of each child within its parent's ordered list.
fn positions<'a>(lists: impl Iterator<Item = &'a Vec<Uuid>>) -> HashMap<Uuid, i64> {
    lists
        .flat_map(|ids| ids.iter().enumerate().map(|(i, id)| (*id, i as i64)))
        .collect()
}

/// Group child ids under their parent, keeping row order.
fn children(pairs: impl Iterator<Item = (Uuid, Uuid)>) -> HashMap<Uuid, Vec<Uuid>> {
    let mut map: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for (parent, child) in pairs {
        map.entry(parent).or_default().push(child);
    }
    map
}

fn invalid(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}

fn parse_uuid(idx: usize, s: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_datetime(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    parse_uuid(idx, &row.get::<_, String>(idx)?)
}

fn optional_uuid_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Uuid>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| parse_uuid(idx, &s))
        .transpose()
}

fn datetime_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    parse_datetime(idx, &row.get::<_, String>(idx)?)
}

fn optional_datetime_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| parse_datetime(idx, &s))
        .transpose()
}

fn date_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    row.get::<_, Option<String>>(idx)?
        .map(|s| {
            s.parse::<NaiveDate>()
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
        })
        .transpose()
}

fn task_status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<TaskStatus> {
    let s: String = row.get(idx)?;
    TaskStatus::from_str(&s).ok_or_else(|| invalid(idx, format!("unknown task status {s}")))
}

fn project_status_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<ProjectStatus> {
    let s: String = row.get(idx)?;
    ProjectStatus::from_str(&s).ok_or_else(|| invalid(idx, format!("unknown project status {s}")))
}
