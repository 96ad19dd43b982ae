//! Audit side channel.
//!
//! The tracker reports every mutation, accepted or rejected, to an
//! [`AuditSink`]. Sinks observe; they cannot veto or alter an operation.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::Error;
use crate::models::EntityKind;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Remove,
    StatusChange,
    StatusOverride,
    StatusRevert,
    Scan,
    MarkRead,
    MarkUnread,
    MarkAllRead,
    Delete,
    Purge,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::StatusChange => "status_change",
            Self::StatusOverride => "status_override",
            Self::StatusRevert => "status_revert",
            Self::Scan => "scan",
            Self::MarkRead => "mark_read",
            Self::MarkUnread => "mark_unread",
            Self::MarkAllRead => "mark_all_read",
            Self::Delete => "delete",
            Self::Purge => "purge",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "result", content = "error")]
pub enum AuditOutcome {
    Success,
    Failure(String),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub entity_kind: EntityKind,
    /// Unknown for a create that failed validation.
    pub entity_id: Option<Uuid>,
    pub outcome: AuditOutcome,
    pub details: Option<serde_json::Value>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, entity_kind: EntityKind) -> Self {
        Self {
            action,
            entity_kind,
            entity_id: None,
            outcome: AuditOutcome::Success,
            details: None,
            at: Utc::now(),
        }
    }

    pub fn entity(mut self, id: Option<Uuid>) -> Self {
        self.entity_id = id;
        self
    }

    pub fn details(mut self, details: Option<serde_json::Value>) -> Self {
        self.details = details;
        self
    }

    pub fn failed(mut self, error: &Error) -> Self {
        self.outcome = AuditOutcome::Failure(error.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AuditOutcome::Success
    }
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Writes audit events as structured `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let entity_id = event.entity_id.map(|id| id.to_string()).unwrap_or_default();
        let details = event
            .details
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();

        match &event.outcome {
            AuditOutcome::Success => tracing::info!(
                target: "workline::audit",
                action = event.action.as_str(),
                entity_kind = event.entity_kind.as_str(),
                entity_id = %entity_id,
                details = %details,
                "ok"
            ),
            AuditOutcome::Failure(error) => tracing::warn!(
                target: "workline::audit",
                action = event.action.as_str(),
                entity_kind = event.entity_kind.as_str(),
                entity_id = %entity_id,
                details = %details,
                error = %error,
                "rejected"
            ),
        }
    }
}

/// Keeps events in memory, for tests and diagnostics.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().expect("audit lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("audit lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        self.events
            .lock()
            .expect("audit lock poisoned")
            .push(event.clone());
    }
}
