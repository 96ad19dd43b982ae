use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use workline::audit::TracingAuditSink;
use workline::config::{self, TrackerConfig};
use workline::db::Database;
use workline::models::*;
use workline::notify::NotificationFilter;
use workline::{render, scanner, Tracker};

#[derive(Parser)]
#[command(name = "wl")]
#[command(about = "Track project work and its deadlines")]
struct Cli {
    /// Database file (overrides the config file)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Config file (overrides $WORKLINE_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommand,
    },
    /// Manage phases
    Phase {
        #[command(subcommand)]
        command: PhaseCommand,
    },
    /// Manage processes
    Process {
        #[command(subcommand)]
        command: ProcessCommand,
    },
    /// Manage tasks
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Remove a node and everything under it
    Remove { id: Uuid },
    /// Print all projects as a tree
    Tree,
    /// Show a task's status history
    History { task_id: Uuid },
    /// Evaluate notification rules once
    Scan {
        /// Evaluate as of this date instead of today
        #[arg(long)]
        today: Option<NaiveDate>,
    },
    /// List notifications
    Notifications {
        #[arg(long)]
        unread: bool,
        #[arg(long, value_parser = parse_priority)]
        priority: Option<NotificationPriority>,
        /// Only notices about this node
        #[arg(long)]
        entity: Option<Uuid>,
    },
    /// Mark a notification read
    Read {
        id: Option<Uuid>,
        /// Mark every notification read
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Mark a notification unread
    Unread { id: Uuid },
    /// Run the background scanner until interrupted
    Watch {
        /// Scan period in seconds (defaults to the configured interval)
        #[arg(long)]
        interval: Option<u64>,
    },
}

#[derive(Subcommand)]
enum ProjectCommand {
    Add {
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Pin a project's status
    Status {
        id: Uuid,
        #[arg(value_parser = parse_project_status)]
        status: ProjectStatus,
    },
    /// Let progress decide the project's status again
    Auto { id: Uuid },
}

#[derive(Subcommand)]
enum PhaseCommand {
    Add {
        project_id: Uuid,
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum ProcessCommand {
    Add {
        phase_id: Uuid,
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        #[arg(long)]
        estimated_hours: Option<f64>,
        /// Progress used while the process has no tasks
        #[arg(long)]
        progress: Option<f64>,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    Add {
        process_id: Uuid,
        name: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Change a task's status
    Status {
        id: Uuid,
        #[arg(value_parser = parse_task_status)]
        status: TaskStatus,
    },
}

fn parse_task_status(s: &str) -> Result<TaskStatus, String> {
    TaskStatus::from_str(s).ok_or_else(|| {
        format!("unknown status '{s}' (not_started, in_progress, completed, unable_to_proceed)")
    })
}

fn parse_project_status(s: &str) -> Result<ProjectStatus, String> {
    ProjectStatus::from_str(s).ok_or_else(|| {
        format!("unknown status '{s}' (not_started, in_progress, completed, cancelled, on_hold)")
    })
}

fn parse_priority(s: &str) -> Result<NotificationPriority, String> {
    NotificationPriority::from_str(s)
        .ok_or_else(|| format!("unknown priority '{s}' (high, medium, low)"))
}

/// Initialize tracing with output to stderr so stdout stays clean for results
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "workline=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = match &cli.config {
        Some(path) => TrackerConfig::load_from(path)?,
        None => TrackerConfig::load(),
    };
    tracing::debug!(config_path = ?config::config_path().ok(), "Loaded configuration");

    let db_path = match cli.db.or(config.database_path.clone()) {
        Some(path) => path,
        None => Database::default_path()?,
    };
    let db = Database::open(db_path)?;
    db.migrate()?;

    let (workspace, engine) = db.load_snapshot()?;
    let tracker = Tracker::load(
        workspace,
        engine,
        config.notifications.clone(),
        Arc::new(TracingAuditSink),
    )
    .context("Stored data is inconsistent")?;

    let changed = run(cli.command, &tracker).await?;
    if changed {
        let (workspace, engine) = tracker.snapshot();
        db.save_snapshot(&workspace, &engine)?;
    }

    Ok(())
}

/// Execute one command. Returns whether state changed and needs saving.
async fn run(command: Commands, tracker: &Tracker) -> anyhow::Result<bool> {
    match command {
        Commands::Project { command } => match command {
            ProjectCommand::Add { name, description } => {
                let project = tracker.create_project(CreateProjectInput { name, description })?;
                println!("{}", project.id);
            }
            ProjectCommand::Status { id, status } => {
                let project = tracker.update_project(
                    id,
                    UpdateProjectInput {
                        status: Some(status),
                        ..Default::default()
                    },
                )?;
                println!("{} is now {} (pinned)", project.name, project.status.as_str());
            }
            ProjectCommand::Auto { id } => {
                let project = tracker.revert_project_status(id)?;
                println!("{} is now {}", project.name, project.status.as_str());
            }
        },
        Commands::Phase {
            command:
                PhaseCommand::Add {
                    project_id,
                    name,
                    description,
                    end,
                },
        } => {
            let phase = tracker.add_phase(
                project_id,
                CreatePhaseInput {
                    name,
                    description,
                    end_date: end,
                },
            )?;
            println!("{}", phase.id);
        }
        Commands::Process {
            command:
                ProcessCommand::Add {
                    phase_id,
                    name,
                    description,
                    assignee,
                    start,
                    end,
                    estimated_hours,
                    progress,
                },
        } => {
            let process = tracker.add_process(
                phase_id,
                CreateProcessInput {
                    name,
                    description,
                    assignee,
                    start_date: start,
                    end_date: end,
                    estimated_hours,
                    manual_progress: progress,
                    ..Default::default()
                },
            )?;
            println!("{}", process.id);
        }
        Commands::Task { command } => match command {
            TaskCommand::Add {
                process_id,
                name,
                description,
            } => {
                let task = tracker.add_task(
                    process_id,
                    CreateTaskInput {
                        name,
                        description,
                        ..Default::default()
                    },
                )?;
                println!("{}", task.id);
            }
            TaskCommand::Status { id, status } => {
                let task = tracker.update_task_status(id, status)?;
                let progress = tracker.progress(task.process_id)?;
                println!("{} -> {} (process at {progress:.0}%)", task.name, status.as_str());
            }
        },
        Commands::Remove { id } => {
            let removed = tracker.remove(id)?;
            println!(
                "Removed {} and {} descendants",
                removed.kind(),
                removed.subtree_ids().len() - 1
            );
        }
        Commands::Tree => {
            print!("{}", tracker.read(render::render_workspace));
            return Ok(false);
        }
        Commands::History { task_id } => {
            for entry in tracker.history(task_id)? {
                println!(
                    "{}  {} -> {}",
                    entry.at.format("%Y-%m-%d %H:%M:%S"),
                    entry.from.as_str(),
                    entry.to.as_str()
                );
            }
            return Ok(false);
        }
        Commands::Scan { today } => {
            let report = tracker.scan(today.unwrap_or_else(|| Utc::now().date_naive()));
            tracker.purge(Utc::now());
            print!("{}", render::render_notifications(&report.created));
            println!(
                "{} created, {} dismissed, {} unread",
                report.created.len(),
                report.dismissed.len(),
                tracker.unread_count()
            );
        }
        Commands::Notifications {
            unread,
            priority,
            entity,
        } => {
            let filter = NotificationFilter {
                unread_only: unread,
                priority,
                entity_id: entity,
                ..Default::default()
            };
            print!("{}", render::render_notifications(&tracker.notifications(&filter)));
            return Ok(false);
        }
        Commands::Read { id, all } => match (id, all) {
            (_, true) => println!("Marked {} read", tracker.mark_all_read()),
            (Some(id), false) => {
                tracker.mark_read(id)?;
            }
            (None, false) => anyhow::bail!("Give a notification id or --all"),
        },
        Commands::Unread { id } => {
            tracker.mark_unread(id)?;
        }
        Commands::Watch { interval } => {
            let (handle, mut notices) = match interval {
                Some(secs) => scanner::spawn_with_period(tracker.clone(), Duration::from_secs(secs.max(1))),
                None => scanner::spawn(tracker.clone()),
            };

            loop {
                tokio::select! {
                    notice = notices.recv() => match notice {
                        Ok(n) => print!("{}", render::render_notifications(std::slice::from_ref(&n))),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Dropped notifications while printing");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    _ = tokio::signal::ctrl_c() => break,
                }
            }

            let scans = handle.shutdown().await;
            tracing::info!(scans, "Watch finished");
        }
    }

    Ok(true)
}
