use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::effort::{EffortHours, EffortInput};
use super::validation::ValidationErrors;

/// A unit of work inside a PBI.
///
/// Tasks are the leaves of the hierarchy and the only place effort is
/// recorded. Effort is `None` when the stored value is missing or could not
/// be read as a number; such tasks count as zero in every aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub pbi_id: Uuid,
    pub name: String,
    pub description: String,
    pub estimated_effort_hours: Option<EffortHours>,
    pub actual_effort_hours: Option<EffortHours>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The progress of a task.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    NotYetStarted,
    InProgress,
    Complete,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotYetStarted => "not_yet_started",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_yet_started" => Some(Self::NotYetStarted),
            "in_progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Input for creating a task under a PBI.
///
/// Effort values may be sent as numbers or numeric strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTaskInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub estimated_effort_hours: EffortInput,
    /// Blank or absent means no time has been logged yet.
    #[serde(default)]
    pub actual_effort_hours: Option<EffortInput>,
    /// Defaults to `NotYetStarted`.
    #[serde(default)]
    pub status: Option<TaskStatus>,
}

/// Parsed effort values of a task form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TaskEffort {
    pub estimated: EffortHours,
    pub actual: Option<EffortHours>,
}

impl CreateTaskInput {
    pub fn validate(&self) -> Result<TaskEffort, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check_name("name", &self.name);
        errors.check_description("description", &self.description);

        let estimated = match self.estimated_effort_hours.parse() {
            Ok(Some(hours)) => hours,
            Ok(None) => {
                errors.add("estimated_effort_hours", "This field is required.");
                EffortHours::ZERO
            }
            Err(e) => {
                errors.add("estimated_effort_hours", e.to_string());
                EffortHours::ZERO
            }
        };

        let actual = match self.actual_effort_hours.as_ref().map(EffortInput::parse) {
            None => None,
            Some(Ok(hours)) => hours,
            Some(Err(e)) => {
                errors.add("actual_effort_hours", e.to_string());
                None
            }
        };

        errors.into_result(TaskEffort { estimated, actual })
    }
}

/// Input for updating a task. All fields are optional for partial updates.
///
/// Sending an empty string for `actual_effort_hours` clears it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTaskInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub estimated_effort_hours: Option<EffortInput>,
    pub actual_effort_hours: Option<EffortInput>,
    pub status: Option<TaskStatus>,
}

/// Parsed effort changes of a task update. `None` leaves a field unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TaskEffortUpdate {
    pub estimated: Option<EffortHours>,
    pub actual: Option<Option<EffortHours>>,
}

impl UpdateTaskInput {
    pub fn validate(&self) -> Result<TaskEffortUpdate, ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = &self.name {
            errors.check_name("name", name);
        }
        if let Some(description) = &self.description {
            errors.check_description("description", description);
        }

        let mut update = TaskEffortUpdate::default();
        if let Some(input) = &self.estimated_effort_hours {
            match input.parse() {
                Ok(Some(hours)) => update.estimated = Some(hours),
                Ok(None) => errors.add("estimated_effort_hours", "This field is required."),
                Err(e) => errors.add("estimated_effort_hours", e.to_string()),
            }
        }
        if let Some(input) = &self.actual_effort_hours {
            match input.parse() {
                Ok(hours) => update.actual = Some(hours),
                Err(e) => errors.add("actual_effort_hours", e.to_string()),
            }
        }

        errors.into_result(update)
    }
}
