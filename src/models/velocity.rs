use serde::{Deserialize, Serialize};

use super::sprint::SprintWithPbis;

/// Velocity chart series for a project.
///
/// The three vectors are parallel: index `i` of each describes the same
/// completed sprint. They are always built from one pass over one sprint list,
/// so their lengths match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityChart {
    pub names: Vec<String>,
    pub actual: Vec<f64>,
    pub estimated: Vec<f64>,
}

impl VelocityChart {
    pub fn from_sprints(completed_sprints: &[SprintWithPbis]) -> Self {
        let mut chart = Self::default();
        for sprint in completed_sprints {
            chart.names.push(sprint.sprint.name.clone());
            chart.actual.push(sprint.actual_effort_hours().hours());
            chart.estimated.push(sprint.cumulative_effort_hours().hours());
        }
        chart
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
