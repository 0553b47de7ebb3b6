use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::backlog::ProductBacklog;
use super::pbi::ProductBacklogItem;
use super::sprint::SprintSummary;
use super::validation::{FormField, ValidationErrors, NAME_MAX_LEN};

/// The root of a backlog hierarchy.
///
/// Projects are created together with their [`ProductBacklog`] and that
/// backlog's first sprint; see `Database::create_project`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub status: ProjectStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Whether a project is still being worked on.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    #[default]
    Current,
    Complete,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 2] = [Self::Current, Self::Complete];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Complete => "complete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "current" => Some(Self::Current),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Input for creating a new project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProjectInput {
    pub name: String,
    /// Defaults to `Current`.
    #[serde(default)]
    pub status: Option<ProjectStatus>,
}

impl CreateProjectInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check_name("name", &self.name);
        errors.into_result(())
    }
}

/// Input for updating an existing project. All fields are optional for partial updates.
///
/// Renaming a project does not rename its product backlog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProjectInput {
    pub name: Option<String>,
    pub status: Option<ProjectStatus>,
}

impl UpdateProjectInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = &self.name {
            errors.check_name("name", name);
        }
        errors.into_result(())
    }
}

/// Everything created by `Database::create_project` in one transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectHierarchy {
    pub project: Project,
    pub product_backlog: ProductBacklog,
    pub sprint_backlog: super::SprintBacklog,
}

/// A project with its backlog contents, used for the project detail view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub product_backlog: ProductBacklog,
    /// Every PBI under the product backlog, highest priority first.
    pub pbis: Vec<ProductBacklogItem>,
    pub sprints: Vec<SprintSummary>,
}

/// Fields of the project creation form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectForm {
    pub fields: Vec<FormField>,
}

impl Default for ProjectForm {
    fn default() -> Self {
        Self {
            fields: vec![
                FormField::text("name", NAME_MAX_LEN),
                FormField::choice("status", ProjectStatus::ALL.iter().map(|s| s.as_str())),
            ],
        }
    }
}
