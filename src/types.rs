//! Core record types for the fleet maintenance domain.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role attached to a user profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Engineer,
    Manager,
    Owner,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Engineer => "engineer",
            Role::Manager => "manager",
            Role::Owner => "owner",
        }
    }
}

/// A user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl Profile {
    pub fn is_engineer(&self) -> bool {
        self.role == Role::Engineer
    }

    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or("Unnamed Engineer")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Yacht {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub make_model: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

/// How a task's reading is captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementKind {
    /// A number in the measurement's unit.
    Numeric,
    /// One of the fixed [`Level`]s.
    Enum,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub unit: String,
    #[serde(rename = "type")]
    pub kind: MeasurementKind,
}

/// Recurrence period of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub id: String,
    pub name: String,
}

/// A maintenance task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    /// Ordering key inside the category tree.
    #[serde(default)]
    pub position: Option<i64>,
    /// Ordering key for per-yacht task lists (lower first).
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub measurement_id: Option<String>,
    #[serde(default)]
    pub period_id: Option<String>,
}

/// A folder in the task category tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub position: i64,
}

/// One task-to-category association, with completion scoped to the pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryLink {
    pub category_id: String,
    #[serde(default)]
    pub completed: bool,
}

/// A task together with all of its category associations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskLinks {
    pub task: Task,
    pub links: Vec<CategoryLink>,
}

/// A task assigned to a yacht, with its measurement resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YachtTask {
    pub task: Task,
    pub measurement: Option<Measurement>,
}

/// Reading for an enum measurement, or the pass mark of an inspection-only task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Level {
    Full,
    Half,
    Low,
    Empty,
    #[serde(rename = "OK")]
    Ok,
}

impl Level {
    /// Levels selectable for an enum measurement.
    pub const READINGS: [Level; 4] = [Level::Full, Level::Half, Level::Low, Level::Empty];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Full => "Full",
            Level::Half => "Half",
            Level::Low => "Low",
            Level::Empty => "Empty",
            Level::Ok => "OK",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Level::Full),
            "half" => Ok(Level::Half),
            "low" => Ok(Level::Low),
            "empty" => Ok(Level::Empty),
            "ok" => Ok(Level::Ok),
            other => Err(format!("unknown level: {}", other)),
        }
    }
}

/// A recorded task result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub id: String,
    pub yacht_id: String,
    pub task_id: String,
    #[serde(default)]
    pub measured_value: Option<f64>,
    #[serde(default)]
    pub measured_level: Option<String>,
    pub recorded_at: String,
}

/// Changes to a task's editable fields. `Some(None)` clears a field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub measurement_id: Option<Option<String>>,
    pub period_id: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.measurement_id.is_none() && self.period_id.is_none()
    }

    /// Apply to a local copy of the task.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(ref m) = self.measurement_id {
            task.measurement_id = m.clone();
        }
        if let Some(ref p) = self.period_id {
            task.period_id = p.clone();
        }
    }
}
