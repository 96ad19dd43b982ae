//! Domain models for workline.
//!
//! # Core Concepts
//!
//! ## The work tree
//!
//! Work is tracked as a strict four-level tree. Each level owns its children
//! by value; the parent is referenced only by identifier.
//!
//! - [`Project`]: Root of a tree. Carries a status that is either derived from
//!   progress or pinned by hand (manual override).
//! - [`Phase`]: A stage of a project with an optional end date.
//! - [`Process`]: A unit of planned work with an assignee, dates and hours.
//! - [`Task`]: Leaf node. Its status is the only progress input of the tree.
//!
//! ## Side records
//!
//! - [`TaskHistory`]: Append-only log of a task's status transitions.
//! - [`Notification`]: Deadline, milestone and schedule-lag notices created by
//!   the notification engine. Not part of the tree.

mod history;
mod kind;
mod notification;
mod phase;
mod process;
mod project;
mod task;

pub use history::*;
pub use kind::*;
pub use notification::*;
pub use phase::*;
pub use process::*;
pub use project::*;
pub use task::*;
