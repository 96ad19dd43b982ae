use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use speculate2::speculate;
use uuid::Uuid;
use workline::audit::{AuditAction, AuditOutcome, MemoryAuditSink};
use workline::config::NotificationSettings;
use workline::models::*;
use workline::notify::NotificationFilter;
use workline::Tracker;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 10).unwrap()
}

/// Project → phase → process (due in two days) → one task.
fn seed(tracker: &Tracker) -> (Uuid, Uuid, Uuid) {
    let project = tracker
        .create_project(CreateProjectInput {
            name: "Launch".to_string(),
            description: Some("Q3 release".to_string()),
        })
        .unwrap();
    let phase = tracker
        .add_phase(
            project.id,
            CreatePhaseInput {
                name: "Build".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    let process = tracker
        .add_process(
            phase.id,
            CreateProcessInput {
                name: "Backend".to_string(),
                end_date: Some(today() + Duration::days(2)),
                ..Default::default()
            },
        )
        .unwrap();
    let task = tracker
        .add_task(
            process.id,
            CreateTaskInput {
                name: "Schema".to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    (project.id, process.id, task.id)
}

speculate! {
    before {
        let audit = Arc::new(MemoryAuditSink::new());
        let tracker = Tracker::with_audit(NotificationSettings::default(), audit.clone());
    }

    describe "audit trail" {
        it "records successful mutations with the new identifier" {
            let (project_id, _, _) = seed(&tracker);

            let events = audit.events();
            assert_eq!(events.len(), 4);
            assert!(events.iter().all(|e| e.is_success()));
            assert_eq!(events[0].action, AuditAction::Create);
            assert_eq!(events[0].entity_kind, EntityKind::Project);
            assert_eq!(events[0].entity_id, Some(project_id));
        }

        it "records rejected mutations as failures" {
            let (_, _, task_id) = seed(&tracker);

            let err = tracker.update_task_status(task_id, TaskStatus::NotStarted).unwrap_err();

            assert!(err.is_validation());
            let last = audit.events().pop().unwrap();
            assert_eq!(last.action, AuditAction::StatusChange);
            assert_eq!(last.entity_id, Some(task_id));
            assert!(matches!(last.outcome, AuditOutcome::Failure(_)));
        }

        it "records a failed create without an identifier" {
            let result = tracker.create_project(CreateProjectInput {
                name: String::new(),
                description: None,
            });

            assert!(result.is_err());
            let event = audit.events().pop().unwrap();
            assert_eq!(event.entity_id, None);
            assert!(!event.is_success());
        }

        it "distinguishes status overrides from plain updates" {
            let (project_id, _, _) = seed(&tracker);

            tracker.update_project(project_id, UpdateProjectInput {
                status: Some(ProjectStatus::OnHold),
                ..Default::default()
            }).unwrap();
            tracker.revert_project_status(project_id).unwrap();

            let actions: Vec<AuditAction> = audit.events().iter().map(|e| e.action).collect();
            assert!(actions.ends_with(&[AuditAction::StatusOverride, AuditAction::StatusRevert]));
        }

        it "records removals with the subtree size" {
            let (project_id, _, _) = seed(&tracker);

            tracker.remove(project_id).unwrap();

            let event = audit.events().pop().unwrap();
            assert_eq!(event.action, AuditAction::Remove);
            assert_eq!(event.entity_kind, EntityKind::Project);
            assert_eq!(event.details, Some(serde_json::json!({ "removed": 4 })));
        }
    }

    describe "shared state" {
        it "is visible through every clone" {
            let other = tracker.clone();
            let (project_id, _, task_id) = seed(&tracker);

            other.update_task_status(task_id, TaskStatus::Completed).unwrap();

            assert_eq!(tracker.progress(project_id).unwrap(), 100.0);
            assert_eq!(tracker.status(project_id).unwrap(), ProjectStatus::Completed);
            assert_eq!(tracker.history(task_id).unwrap().len(), 1);
        }

        it "hands out detached copies" {
            let (project_id, _, _) = seed(&tracker);
            let mut copy = tracker.projects().remove(0);
            copy.name = "Changed".to_string();

            tracker.read(|ws| assert_eq!(ws.project(project_id).unwrap().name, "Launch"));
        }
    }

    describe "scan" {
        it "evaluates rules and audits the pass" {
            let (_, process_id, _) = seed(&tracker);

            let report = tracker.scan(today());

            assert_eq!(report.created.len(), 1);
            assert!(report.created[0].is_about(process_id));
            assert_eq!(tracker.unread_count(), 1);
            assert_eq!(audit.events().pop().unwrap().action, AuditAction::Scan);
        }

        it "marks notices read and purges them after retention" {
            seed(&tracker);
            let id = tracker.scan(today()).created[0].id;

            tracker.mark_read(id).unwrap();
            assert_eq!(tracker.purge(Utc::now()), 0);

            let later = Utc::now() + Duration::days(31);
            assert_eq!(tracker.purge(later), 1);
            assert!(tracker.notification(id).unwrap_err().is_not_found());
            assert_eq!(audit.events().pop().unwrap().action, AuditAction::Purge);
        }

        it "lists, marks unread and deletes" {
            seed(&tracker);
            let id = tracker.scan(today()).created[0].id;

            assert_eq!(tracker.mark_all_read(), 1);
            assert!(tracker.notifications(&NotificationFilter::unread()).is_empty());

            tracker.mark_unread(id).unwrap();
            assert_eq!(tracker.unread_count(), 1);

            let deleted = tracker.delete_notification(id).unwrap();
            assert_eq!(deleted.id, id);
            assert!(tracker.notifications(&NotificationFilter::all()).is_empty());
        }
    }

    describe "snapshot" {
        it "reloads into an equivalent tracker" {
            let (project_id, _, task_id) = seed(&tracker);
            tracker.update_task_status(task_id, TaskStatus::InProgress).unwrap();
            tracker.scan(today());

            let (workspace, engine) = tracker.snapshot();
            let reloaded = Tracker::load(
                workspace.clone(),
                engine.clone(),
                NotificationSettings::default(),
                Arc::new(MemoryAuditSink::new()),
            ).unwrap();

            assert_eq!(reloaded.snapshot(), (workspace, engine));
            assert_eq!(reloaded.history(task_id).unwrap(), tracker.history(task_id).unwrap());
            assert_eq!(reloaded.progress(project_id).unwrap(), tracker.progress(project_id).unwrap());
            assert!(reloaded.scan(today()).is_empty());
        }
    }
}
