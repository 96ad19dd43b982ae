use chrono::{Duration, NaiveDate, Utc};
use speculate2::speculate;
use uuid::Uuid;
use workline::config::NotificationSettings;
use workline::models::*;
use workline::notify::{NotificationEngine, NotificationFilter};
use workline::{Error, Workspace};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 5, 10).unwrap()
}

fn days(n: i64) -> NaiveDate {
    today() + Duration::days(n)
}

struct Tree {
    project: Uuid,
    phase: Uuid,
    process: Uuid,
    tasks: Vec<Uuid>,
}

/// One project, one phase, one process ending at `end`, with `task_count` tasks.
fn tree(ws: &mut Workspace, end: Option<NaiveDate>, task_count: usize) -> Tree {
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
                end_date: end,
                ..Default::default()
            },
        )
        .unwrap()
        .id;
    let tasks = (0..task_count)
        .map(|i| {
            ws.add_task(
                process,
                CreateTaskInput {
                    name: format!("Task {i}"),
                    ..Default::default()
                },
            )
            .unwrap()
            .id
        })
        .collect();
    Tree {
        project,
        phase,
        process,
        tasks,
    }
}

fn deadline_notices(engine: &NotificationEngine, entity: Uuid) -> Vec<Notification> {
    engine
        .notifications(&NotificationFilter {
            entity_id: Some(entity),
            ..Default::default()
        })
        .into_iter()
        .filter(|n| n.kind.is_deadline())
        .cloned()
        .collect()
}

fn milestone_notices(engine: &NotificationEngine) -> Vec<Notification> {
    engine
        .notifications(&NotificationFilter {
            kind: Some(NotificationKind::MilestoneReached),
            ..Default::default()
        })
        .into_iter()
        .cloned()
        .collect()
}

speculate! {
    before {
        let mut ws = Workspace::new();
        let mut engine = NotificationEngine::new(NotificationSettings::default());
    }

    describe "deadline rule" {
        it "raises exactly one High notice two days out and clears it on completion" {
            let t = tree(&mut ws, Some(days(2)), 2);
            ws.update_task_status(t.tasks[0], TaskStatus::Completed).unwrap();

            engine.evaluate(&ws, today());

            let notices = deadline_notices(&engine, t.process);
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].kind, NotificationKind::DeadlineApproaching);
            assert_eq!(notices[0].priority, NotificationPriority::High);
            assert_eq!(notices[0].project_id, Some(t.project));

            ws.update_task_status(t.tasks[1], TaskStatus::Completed).unwrap();
            let report = engine.evaluate(&ws, today());

            assert!(deadline_notices(&engine, t.process).is_empty());
            assert!(report.dismissed.iter().any(|n| n.id == notices[0].id));
        }

        it "creates nothing on a second pass without changes" {
            tree(&mut ws, Some(days(2)), 1);

            let first = engine.evaluate(&ws, today());
            let second = engine.evaluate(&ws, today());

            assert!(!first.created.is_empty());
            assert!(second.is_empty());
        }

        it "is Medium inside the warning window and escalates by replacement" {
            let t = tree(&mut ws, Some(days(5)), 1);
            engine.evaluate(&ws, today());
            let medium = deadline_notices(&engine, t.process);
            assert_eq!(medium.len(), 1);
            assert_eq!(medium[0].priority, NotificationPriority::Medium);

            let report = engine.evaluate(&ws, days(3));

            let high = deadline_notices(&engine, t.process);
            assert_eq!(high.len(), 1);
            assert_eq!(high[0].priority, NotificationPriority::High);
            assert_ne!(high[0].id, medium[0].id);
            assert_eq!(report.created.len(), 1);
            assert_eq!(report.dismissed.len(), 1);
        }

        it "reports an overdue end date" {
            let t = tree(&mut ws, Some(days(-1)), 1);
            engine.evaluate(&ws, today());

            let notices = deadline_notices(&engine, t.process);
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].kind, NotificationKind::DeadlineOverdue);
            assert_eq!(notices[0].priority, NotificationPriority::High);
        }

        it "ignores end dates beyond the warning window" {
            let t = tree(&mut ws, Some(days(30)), 1);
            engine.evaluate(&ws, today());
            assert!(deadline_notices(&engine, t.process).is_empty());
        }

        it "dismisses the notice when the end date moves out of the window" {
            let t = tree(&mut ws, Some(days(1)), 1);
            engine.evaluate(&ws, today());
            assert_eq!(deadline_notices(&engine, t.process).len(), 1);

            ws.update_process(t.process, UpdateProcessInput {
                end_date: Some(Some(days(20))),
                ..Default::default()
            }).unwrap();
            engine.evaluate(&ws, today());

            assert!(deadline_notices(&engine, t.process).is_empty());
        }

        it "skips nodes of a cancelled or held project" {
            let t = tree(&mut ws, Some(days(1)), 1);
            ws.update_project(t.project, UpdateProjectInput {
                status: Some(ProjectStatus::Cancelled),
                ..Default::default()
            }).unwrap();

            engine.evaluate(&ws, today());

            assert!(deadline_notices(&engine, t.process).is_empty());
        }

        it "covers phases with an end date" {
            let t = tree(&mut ws, None, 1);
            ws.update_phase(t.phase, UpdatePhaseInput {
                end_date: Some(Some(days(0))),
                ..Default::default()
            }).unwrap();

            engine.evaluate(&ws, today());

            let notices = deadline_notices(&engine, t.phase);
            assert_eq!(notices.len(), 1);
            assert_eq!(notices[0].entity, Some(EntityRef { kind: EntityKind::Phase, id: t.phase }));
        }

        it "dismisses notices of removed nodes" {
            let t = tree(&mut ws, Some(days(1)), 1);
            engine.evaluate(&ws, today());
            assert_eq!(deadline_notices(&engine, t.process).len(), 1);

            ws.remove(t.process).unwrap();
            let report = engine.evaluate(&ws, today());

            assert_eq!(report.dismissed.len(), 1);
            assert!(deadline_notices(&engine, t.process).is_empty());
        }
    }

    describe "milestone rule" {
        it "fires each crossed milestone once per node" {
            let t = tree(&mut ws, None, 2);
            ws.update_task_status(t.tasks[0], TaskStatus::Completed).unwrap();

            let report = engine.evaluate(&ws, today());

            // 25 and 50 for the process, phase and project.
            assert_eq!(report.created.len(), 6);
            assert!(engine.has_fired(t.process, 50));
            assert!(!engine.has_fired(t.process, 75));
            assert!(engine.evaluate(&ws, today()).created.is_empty());
        }

        it "fires again after dropping below and crossing back" {
            let t = tree(&mut ws, None, 1);
            ws.update_task_status(t.tasks[0], TaskStatus::Completed).unwrap();
            engine.evaluate(&ws, today());
            assert_eq!(milestone_notices(&engine).len(), 12);

            ws.update_task_status(t.tasks[0], TaskStatus::InProgress).unwrap();
            engine.evaluate(&ws, today());
            assert!(!engine.has_fired(t.process, 25));

            ws.update_task_status(t.tasks[0], TaskStatus::Completed).unwrap();
            let report = engine.evaluate(&ws, today());
            assert_eq!(report.created.len(), 12);
        }

        it "marks the 100 milestone as completion" {
            let t = tree(&mut ws, None, 1);
            ws.update_task_status(t.tasks[0], TaskStatus::Completed).unwrap();
            engine.evaluate(&ws, today());

            let done: Vec<Notification> = milestone_notices(&engine)
                .into_iter()
                .filter(|n| n.milestone == Some(100) && n.is_about(t.project))
                .collect();
            assert_eq!(done.len(), 1);
            assert_eq!(done[0].priority, NotificationPriority::Medium);
        }
    }

    describe "schedule lag rules" {
        it "flags a process far behind its schedule" {
            let t = tree(&mut ws, None, 0);
            ws.update_process(t.process, UpdateProcessInput {
                start_date: Some(Some(days(-8))),
                end_date: Some(Some(days(2))),
                manual_progress: Some(10.0),
                ..Default::default()
            }).unwrap();

            engine.evaluate(&ws, today());

            let delay = engine.notifications(&NotificationFilter {
                kind: Some(NotificationKind::ProgressDelay),
                ..Default::default()
            });
            assert_eq!(delay.len(), 1);
            assert_eq!(delay[0].priority, NotificationPriority::High);

            let low = engine.notifications(&NotificationFilter {
                kind: Some(NotificationKind::LowProgress),
                ..Default::default()
            });
            assert_eq!(low.len(), 1);
            assert!(low[0].is_about(t.process));
        }

        it "clears once progress catches up" {
            let t = tree(&mut ws, None, 0);
            ws.update_process(t.process, UpdateProcessInput {
                start_date: Some(Some(days(-8))),
                end_date: Some(Some(days(2))),
                manual_progress: Some(10.0),
                ..Default::default()
            }).unwrap();
            engine.evaluate(&ws, today());

            ws.update_process(t.process, UpdateProcessInput {
                manual_progress: Some(80.0),
                ..Default::default()
            }).unwrap();
            engine.evaluate(&ws, today());

            let lag = engine.notifications(&NotificationFilter::all())
                .into_iter()
                .filter(|n| matches!(n.kind, NotificationKind::ProgressDelay | NotificationKind::LowProgress))
                .count();
            assert_eq!(lag, 0);
        }
    }

    describe "read state" {
        it "keeps the unread counter in step" {
            tree(&mut ws, Some(days(1)), 1);
            engine.evaluate(&ws, today());
            let id = engine.notifications(&NotificationFilter::all())[0].id;
            let total = engine.len();
            assert_eq!(engine.unread_count(), total);

            let read = engine.mark_read(id).unwrap();
            assert!(read.read);
            assert!(read.read_at.is_some());
            assert_eq!(engine.unread_count(), total - 1);

            engine.mark_read(id).unwrap();
            assert_eq!(engine.unread_count(), total - 1);

            engine.mark_unread(id).unwrap();
            assert_eq!(engine.unread_count(), total);
            assert!(engine.get(id).unwrap().read_at.is_none());
        }

        it "fails with NotFound for unknown notifications" {
            let id = Uuid::new_v4();
            assert_eq!(
                engine.mark_read(id).unwrap_err(),
                Error::NotFound { kind: EntityKind::Notification, id }
            );
            assert!(engine.mark_unread(id).unwrap_err().is_not_found());
            assert!(engine.delete(id).unwrap_err().is_not_found());
        }

        it "marks everything read at once" {
            tree(&mut ws, Some(days(1)), 1);
            engine.evaluate(&ws, today());

            let changed = engine.mark_all_read();

            assert_eq!(changed, engine.len());
            assert_eq!(engine.unread_count(), 0);
            assert!(engine.notifications(&NotificationFilter::unread()).is_empty());
        }

        it "deletes a single notice" {
            tree(&mut ws, Some(days(1)), 1);
            engine.evaluate(&ws, today());
            let before = engine.unread_count();
            let id = engine.notifications(&NotificationFilter::all())[0].id;

            engine.delete(id).unwrap();

            assert!(engine.get(id).is_err());
            assert_eq!(engine.unread_count(), before - 1);
        }
    }

    describe "auto_dismiss" {
        it "purges only read notices older than the cutoff" {
            tree(&mut ws, Some(days(1)), 1);
            engine.evaluate(&ws, today());
            let total = engine.len();
            let id = engine.notifications(&NotificationFilter::all())[0].id;
            engine.mark_read(id).unwrap();

            assert_eq!(engine.auto_dismiss(Utc::now() - Duration::days(1)), 0);

            let purged = engine.auto_dismiss(Utc::now() + Duration::seconds(1));

            assert_eq!(purged, 1);
            assert_eq!(engine.len(), total - 1);
            assert_eq!(engine.unread_count(), total - 1);
        }
    }

    describe "listing" {
        it "orders High before Low and filters by unread" {
            let t = tree(&mut ws, Some(days(1)), 1);
            ws.update_task_status(t.tasks[0], TaskStatus::Completed).unwrap();
            let other = tree(&mut ws, Some(days(1)), 1);
            engine.evaluate(&ws, today());

            let all = engine.notifications(&NotificationFilter::all());
            let ranks: Vec<u8> = all.iter().map(|n| n.priority.rank()).collect();
            let mut sorted = ranks.clone();
            sorted.sort();
            assert_eq!(ranks, sorted);
            assert_eq!(all[0].priority, NotificationPriority::High);
            assert!(all[0].is_about(other.process));

            let low_only = engine.notifications(&NotificationFilter {
                priority: Some(NotificationPriority::Low),
                project_id: Some(t.project),
                ..Default::default()
            });
            assert!(!low_only.is_empty());
            assert!(low_only.iter().all(|n| n.project_id == Some(t.project)));
        }
    }

    describe "snapshots" {
        it "restores notices and fired milestones" {
            let t = tree(&mut ws, Some(days(2)), 1);
            ws.update_task_status(t.tasks[0], TaskStatus::InProgress).unwrap();
            ws.add_task(t.process, CreateTaskInput {
                name: "Done".to_string(),
                status: Some(TaskStatus::Completed),
                ..Default::default()
            }).unwrap();
            engine.evaluate(&ws, today());
            let id = engine.notifications(&NotificationFilter::all())[0].id;
            engine.mark_read(id).unwrap();

            let snapshot = engine.to_snapshot();
            let mut restored =
                NotificationEngine::from_snapshot(NotificationSettings::default(), snapshot.clone()).unwrap();

            assert_eq!(restored.to_snapshot(), snapshot);
            assert_eq!(restored.unread_count(), engine.unread_count());
            assert!(restored.evaluate(&ws, today()).is_empty());
        }

        it "rejects duplicate notification ids" {
            tree(&mut ws, Some(days(1)), 1);
            engine.evaluate(&ws, today());
            let mut snapshot = engine.to_snapshot();
            let first = snapshot.notifications[0].clone();
            snapshot.notifications.push(first);

            let err = NotificationEngine::from_snapshot(NotificationSettings::default(), snapshot).unwrap_err();
            assert!(err.is_validation());
        }
    }
}
