//! Backtrack: a Scrum backlog tracker.
//!
//! Projects own a product backlog; the backlog owns sprints and backlog items
//! (PBIs); PBIs own tasks. Story points, effort hours and velocity figures are
//! derived from those relations whenever they are read.

pub mod api;
pub mod client;
pub mod db;
pub mod models;
