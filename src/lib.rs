//! Hierarchical project tracking with rolled-up progress and deadline
//! notifications.
//!
//! Work is organised as Project → Phase → Process → Task. Task statuses are
//! the only progress input; every other level derives its progress from its
//! children. The [`notify`] engine scans the tree for deadline, milestone and
//! schedule-lag conditions. [`tracker::Tracker`] ties the pieces together for
//! callers that share state across tasks.

pub mod aggregate;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod notify;
pub mod render;
pub mod scanner;
pub mod snapshot;
pub mod tracker;
pub mod workspace;

pub use error::{Error, Result};
pub use tracker::Tracker;
pub use workspace::Workspace;
