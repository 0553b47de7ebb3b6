//! Domain models for Backtrack.
//!
//! # Hierarchy
//!
//! - [`Project`]: root of a hierarchy. Created together with its single
//!   [`ProductBacklog`] and that backlog's first [`SprintBacklog`].
//! - [`ProductBacklog`]: owns every [`ProductBacklogItem`] and every sprint of
//!   a project.
//! - [`SprintBacklog`]: an iteration; PBIs are assigned to at most one sprint.
//! - [`ProductBacklogItem`]: a unit of user-facing work, sized with a
//!   [`PointEstimate`] and broken down into [`Task`]s.
//! - [`Task`]: a leaf holding estimated and actual [`EffortHours`].
//!
//! # Aggregates
//!
//! Effort and point totals are never stored. [`PbiWithTasks`],
//! [`SprintWithPbis`] and [`VelocityChart`] compute them from freshly loaded
//! children each time they are asked.

mod backlog;
mod effort;
mod pbi;
mod project;
mod sprint;
mod task;
mod validation;
mod velocity;

pub use backlog::*;
pub use effort::*;
pub use pbi::*;
pub use project::*;
pub use sprint::*;
pub use task::*;
pub use validation::*;
pub use velocity::*;
