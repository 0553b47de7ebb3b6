use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::effort::EffortHours;
use super::pbi::{PbiDetail, PbiWithTasks};
use super::validation::ValidationErrors;

/// A time-boxed iteration holding a subset of a product backlog's PBIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintBacklog {
    pub id: Uuid,
    pub product_backlog_id: Uuid,
    pub name: String,
    pub status: SprintStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where a sprint is in its lifecycle.
///
/// Only `Complete` sprints feed the velocity chart.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SprintStatus {
    #[default]
    NotYetStarted,
    Current,
    Complete,
}

impl SprintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotYetStarted => "not_yet_started",
            Self::Current => "current",
            Self::Complete => "complete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_yet_started" => Some(Self::NotYetStarted),
            "current" => Some(Self::Current),
            "complete" => Some(Self::Complete),
            _ => None,
        }
    }
}

/// Input for creating a sprint in a product backlog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSprintInput {
    pub name: String,
    /// Defaults to `NotYetStarted`.
    #[serde(default)]
    pub status: Option<SprintStatus>,
}

impl CreateSprintInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check_name("name", &self.name);
        errors.into_result(())
    }
}

/// Input for updating a sprint. All fields are optional for partial updates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateSprintInput {
    pub name: Option<String>,
    pub status: Option<SprintStatus>,
}

impl UpdateSprintInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = &self.name {
            errors.check_name("name", name);
        }
        errors.into_result(())
    }
}

/// A sprint with the PBIs assigned to it and their tasks.
#[derive(Debug, Clone)]
pub struct SprintWithPbis {
    pub sprint: SprintBacklog,
    pub pbis: Vec<PbiWithTasks>,
}

impl SprintWithPbis {
    /// PBIs ordered by priority, highest first. The sort is stable, so equal
    /// priorities keep the order they were loaded in.
    pub fn pbi_list(&self) -> Vec<&PbiWithTasks> {
        let mut pbis: Vec<&PbiWithTasks> = self.pbis.iter().collect();
        pbis.sort_by_key(|p| p.pbi.priority);
        pbis
    }

    pub fn total_story_points(&self) -> u32 {
        self.pbis.iter().map(|p| p.pbi.point_estimate.points()).sum()
    }

    pub fn cumulative_effort_hours(&self) -> EffortHours {
        self.pbis.iter().map(PbiWithTasks::cumulative_effort_hours).sum()
    }

    pub fn actual_effort_hours(&self) -> EffortHours {
        self.pbis.iter().map(PbiWithTasks::actual_effort_hours).sum()
    }

    pub fn work_remaining(&self) -> f64 {
        self.cumulative_effort_hours().hours() - self.actual_effort_hours().hours()
    }

    pub fn summary(&self) -> SprintSummary {
        SprintSummary {
            sprint: self.sprint.clone(),
            total_story_points: self.total_story_points(),
            cumulative_effort_hours: self.cumulative_effort_hours(),
            actual_effort_hours: self.actual_effort_hours(),
            work_remaining: self.work_remaining(),
        }
    }

    pub fn detail(&self) -> SprintDetail {
        SprintDetail {
            summary: self.summary(),
            pbis: self.pbi_list().into_iter().map(PbiWithTasks::detail).collect(),
        }
    }
}

/// A sprint with its aggregate figures, used in sprint lists.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintSummary {
    #[serde(flatten)]
    pub sprint: SprintBacklog,
    pub total_story_points: u32,
    pub cumulative_effort_hours: EffortHours,
    pub actual_effort_hours: EffortHours,
    pub work_remaining: f64,
}

/// Sprint detail view: aggregates plus the priority-ordered PBIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprintDetail {
    #[serde(flatten)]
    pub summary: SprintSummary,
    pub pbis: Vec<PbiDetail>,
}
