use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Suffix appended to a project's name to name its product backlog.
pub const PRODUCT_BACKLOG_SUFFIX: &str = "product backlog";
/// Suffix appended to a product backlog's name to name its first sprint.
pub const DEFAULT_SPRINT_SUFFIX: &str = "sprint0";

/// The single backlog owned by a project.
///
/// Holds every PBI of the project and all of its sprints. There is exactly one
/// per project; it is created with the project and removed with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductBacklog {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl ProductBacklog {
    /// Name given to the backlog of a project called `project_name`.
    pub fn default_name(project_name: &str) -> String {
        format!("{} {}", project_name, PRODUCT_BACKLOG_SUFFIX)
    }

    /// Name given to the sprint created alongside this backlog.
    pub fn default_sprint_name(&self) -> String {
        format!("{} {}", self.name, DEFAULT_SPRINT_SUFFIX)
    }
}
