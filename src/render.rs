//! ASCII tree rendering for work trees.

use crate::models::{Notification, TaskStatus};
use crate::workspace::{NodeRef, Workspace};

const NOT_STARTED: char = '○';
const PARTIAL: char = '◐';
const DONE: char = '●';
const BLOCKED: char = '✗';

fn progress_symbol(progress: f64) -> char {
    if progress >= 100.0 {
        DONE
    } else if progress > 0.0 {
        PARTIAL
    } else {
        NOT_STARTED
    }
}

fn node_symbol(node: &NodeRef<'_>) -> char {
    match node {
        NodeRef::Task(task) => match task.status {
            TaskStatus::NotStarted => NOT_STARTED,
            TaskStatus::InProgress => PARTIAL,
            TaskStatus::Completed => DONE,
            TaskStatus::UnableToProceed => BLOCKED,
        },
        other => progress_symbol(other.progress()),
    }
}

fn label(node: &NodeRef<'_>) -> String {
    match node {
        NodeRef::Project(p) => format!("{} [{:.0}%] ({})", p.name, p.progress, p.status.as_str()),
        NodeRef::Task(t) => t.name.clone(),
        other => format!("{} [{:.0}%]", other.name(), other.progress()),
    }
}

/// Render trees as ASCII art with progress figures.
///
/// Example output:
/// ```text
/// Launch [50%] (in_progress)
/// └── ◐ Build [50%]
///     └── ◐ Backend [50%]
///         ├── ● Schema
///         └── ○ Endpoints
/// ```
pub fn render_tree(roots: &[NodeRef<'_>]) -> String {
    let mut output = String::new();
    for (i, node) in roots.iter().enumerate() {
        let is_last = i == roots.len() - 1;
        render_node(&mut output, node, "", is_last, true);
    }
    output
}

pub fn render_workspace(workspace: &Workspace) -> String {
    let roots: Vec<NodeRef<'_>> = workspace.projects().iter().map(NodeRef::Project).collect();
    render_tree(&roots)
}

fn render_node(output: &mut String, node: &NodeRef<'_>, prefix: &str, is_last: bool, is_root: bool) {
    if is_root {
        output.push_str(&label(node));
        output.push('\n');
    } else {
        let branch = if is_last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
        output.push(node_symbol(node));
        output.push(' ');
        output.push_str(&label(node));
        output.push('\n');
    }

    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    let children = node.children();
    for (i, child) in children.iter().enumerate() {
        let child_is_last = i == children.len() - 1;
        render_node(output, child, &child_prefix, child_is_last, false);
    }
}

/// One line per notification: read marker, priority, title and message.
pub fn render_notifications(notifications: &[Notification]) -> String {
    let mut output = String::new();
    for n in notifications {
        let marker = if n.read { ' ' } else { '*' };
        output.push_str(&format!(
            "{marker} [{}] {} {}: {}\n",
            n.priority.as_str(),
            n.id,
            n.title,
            n.message
        ));
    }
    output
}
