use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::effort::{sum_present, EffortHours};
use super::task::{Task, TaskStatus};
use super::validation::ValidationErrors;

/// A product backlog item: a unit of user-facing work.
///
/// Every PBI lives in a product backlog and may additionally be assigned to
/// one of that backlog's sprints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductBacklogItem {
    pub id: Uuid,
    pub product_backlog_id: Uuid,
    pub sprint_backlog_id: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub point_estimate: PointEstimate,
    pub status: PbiStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The progress of a PBI.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PbiStatus {
    #[default]
    NotYetStarted,
    InProgress,
    Complete,
    Incomplete,
}

impl PbiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotYetStarted => "not_yet_started",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
            Self::Incomplete => "incomplete",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "not_yet_started" => Some(Self::NotYetStarted),
            "in_progress" => Some(Self::InProgress),
            "complete" => Some(Self::Complete),
            "incomplete" => Some(Self::Incomplete),
            _ => None,
        }
    }
}

/// PBI priority. Lower values sort first.
///
/// Serialized as its numeric value (1 = very high .. 5 = very low).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum Priority {
    VeryHigh = 1,
    High = 2,
    #[default]
    Medium = 3,
    Low = 4,
    VeryLow = 5,
}

impl Priority {
    pub const ALL: [Priority; 5] = [
        Self::VeryHigh,
        Self::High,
        Self::Medium,
        Self::Low,
        Self::VeryLow,
    ];

    pub fn value(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|p| p.value() == value)
            .ok_or_else(|| format!("invalid priority {}: expected 1 (very high) to 5 (very low)", value))
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.value()
    }
}

/// Relative size of a PBI on a Fibonacci-like scale.
///
/// Serialized as its point value.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "u32", into = "u32")]
pub struct PointEstimate(u32);

impl PointEstimate {
    pub const SCALE: [u32; 8] = [1, 2, 3, 5, 8, 13, 20, 40];

    pub fn new(points: u32) -> Option<Self> {
        Self::SCALE.contains(&points).then_some(Self(points))
    }

    pub fn points(self) -> u32 {
        self.0
    }
}

impl TryFrom<u32> for PointEstimate {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| {
            format!(
                "invalid point estimate {}: expected one of {:?}",
                value,
                Self::SCALE
            )
        })
    }
}

impl From<PointEstimate> for u32 {
    fn from(value: PointEstimate) -> Self {
        value.0
    }
}

impl fmt::Display for PointEstimate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input for creating a PBI in a product backlog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePbiInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub point_estimate: PointEstimate,
    /// Sprint to assign the PBI to. Must belong to the same product backlog.
    #[serde(default)]
    pub sprint_backlog_id: Option<Uuid>,
    /// Defaults to `NotYetStarted`.
    #[serde(default)]
    pub status: Option<PbiStatus>,
    /// Defaults to `Medium`.
    #[serde(default)]
    pub priority: Option<Priority>,
}

impl CreatePbiInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        errors.check_name("name", &self.name);
        errors.check_description("description", &self.description);
        errors.into_result(())
    }
}

/// Input for updating a PBI. All fields are optional for partial updates.
///
/// `sprint_backlog_id` distinguishes an absent field (keep the assignment)
/// from an explicit `null` (remove the PBI from its sprint).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePbiInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub point_estimate: Option<PointEstimate>,
    #[serde(
        default,
        deserialize_with = "deserialize_explicit_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub sprint_backlog_id: Option<Option<Uuid>>,
    pub status: Option<PbiStatus>,
    pub priority: Option<Priority>,
}

impl UpdatePbiInput {
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = &self.name {
            errors.check_name("name", name);
        }
        if let Some(description) = &self.description {
            errors.check_description("description", description);
        }
        errors.into_result(())
    }
}

fn deserialize_explicit_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A PBI together with its tasks, the unit all effort aggregation works on.
#[derive(Debug, Clone)]
pub struct PbiWithTasks {
    pub pbi: ProductBacklogItem,
    pub tasks: Vec<Task>,
}

impl PbiWithTasks {
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.status == status).collect()
    }

    pub fn tasks_complete(&self) -> Vec<&Task> {
        self.tasks_with_status(TaskStatus::Complete)
    }

    pub fn tasks_in_progress(&self) -> Vec<&Task> {
        self.tasks_with_status(TaskStatus::InProgress)
    }

    pub fn tasks_not_yet_started(&self) -> Vec<&Task> {
        self.tasks_with_status(TaskStatus::NotYetStarted)
    }

    /// Total estimated hours. Tasks without an estimate count as zero.
    pub fn cumulative_effort_hours(&self) -> EffortHours {
        sum_present(self.tasks.iter().map(|t| t.estimated_effort_hours))
    }

    /// Total logged hours. Tasks without logged time count as zero.
    pub fn actual_effort_hours(&self) -> EffortHours {
        sum_present(self.tasks.iter().map(|t| t.actual_effort_hours))
    }

    /// Estimated minus logged hours. Negative once logged time exceeds the estimate.
    pub fn work_remaining(&self) -> f64 {
        self.cumulative_effort_hours().hours() - self.actual_effort_hours().hours()
    }

    pub fn detail(&self) -> PbiDetail {
        let owned = |tasks: Vec<&Task>| tasks.into_iter().cloned().collect();
        PbiDetail {
            pbi: self.pbi.clone(),
            tasks_not_yet_started: owned(self.tasks_not_yet_started()),
            tasks_in_progress: owned(self.tasks_in_progress()),
            tasks_complete: owned(self.tasks_complete()),
            cumulative_effort_hours: self.cumulative_effort_hours(),
            actual_effort_hours: self.actual_effort_hours(),
            work_remaining: self.work_remaining(),
        }
    }
}

/// PBI detail view: the item, its tasks grouped by status, and its effort totals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PbiDetail {
    #[serde(flatten)]
    pub pbi: ProductBacklogItem,
    pub tasks_not_yet_started: Vec<Task>,
    pub tasks_in_progress: Vec<Task>,
    pub tasks_complete: Vec<Task>,
    pub cumulative_effort_hours: EffortHours,
    pub actual_effort_hours: EffortHours,
    pub work_remaining: f64,
}
