//! Recording measurement results for a yacht's tasks.

use super::Fleet;
use crate::error::{ActionError, ActionResult};
use crate::guard::{PendingSet, ViewScope};
use crate::mapping::{task_result_from_row, to_row};
use crate::store::schema::TASK_RESULTS;
use crate::store::{DataStore, Select};
use crate::types::{Level, MeasurementKind, TaskResult, YachtTask};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};
use uuid::Uuid;

static LAST_RECORDED_NANOS: AtomicI64 = AtomicI64::new(i64::MIN);

/// `recorded_at` for a new result: RFC 3339 with nanoseconds, strictly later
/// than every earlier stamp from this process so results sort newest first.
fn next_recorded_at() -> String {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    let prev = match LAST_RECORDED_NANOS.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        Some(now.max(last.saturating_add(1)))
    }) {
        Ok(prev) | Err(prev) => prev,
    };
    DateTime::from_timestamp_nanos(now.max(prev.saturating_add(1)))
        .to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// What the engineer entered for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeasurementInput {
    pub value: Option<f64>,
    pub level: Option<Level>,
}

impl MeasurementInput {
    pub fn value(value: f64) -> Self {
        Self {
            value: Some(value),
            level: None,
        }
    }

    pub fn level(level: Level) -> Self {
        Self {
            value: None,
            level: Some(level),
        }
    }
}

/// Check `input` against the task's measurement and return what to store.
///
/// Inspection-only tasks (no measurement) always store [`Level::Ok`].
pub fn resolve_reading(
    task: &YachtTask,
    input: MeasurementInput,
) -> ActionResult<(Option<f64>, Option<Level>)> {
    let Some(measurement) = &task.measurement else {
        return Ok((None, Some(Level::Ok)));
    };
    match measurement.kind {
        MeasurementKind::Numeric => match input.value {
            Some(v) if v.is_finite() => Ok((Some(v), None)),
            Some(v) => Err(ActionError::invalid_input(format!("not a usable reading: {}", v))),
            None => Err(ActionError::invalid_input(format!(
                "a value in {} is required",
                measurement.unit
            ))),
        },
        MeasurementKind::Enum => match input.level {
            Some(level) if Level::READINGS.contains(&level) => Ok((None, Some(level))),
            Some(level) => Err(ActionError::invalid_input(format!(
                "{} is not a reading level",
                level
            ))),
            None => Err(ActionError::invalid_input(
                "a level (Full, Half, Low or Empty) is required",
            )),
        },
        MeasurementKind::Other => Err(ActionError::invalid_input(format!(
            "unsupported measurement type for {}",
            measurement.name
        ))),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SaveOutcome {
    Saved { result: TaskResult },
    /// A save for the same task was already in flight.
    Pending,
    /// The save finished after the view closed.
    Detached,
}

/// Result entry for one yacht's task list.
pub struct ResultSheet<S: DataStore> {
    store: Arc<S>,
    yacht_id: String,
    saving: PendingSet<String>,
    saved: Mutex<HashSet<String>>,
    scope: ViewScope,
}

impl<S: DataStore> ResultSheet<S> {
    pub fn new(store: Arc<S>, yacht_id: &str, scope: ViewScope) -> Self {
        Self {
            store,
            yacht_id: yacht_id.to_string(),
            saving: PendingSet::new(),
            saved: Mutex::new(HashSet::new()),
            scope,
        }
    }

    pub fn yacht_id(&self) -> &str {
        &self.yacht_id
    }

    pub fn is_saving(&self, task_id: &str) -> bool {
        self.saving.is_pending(&task_id.to_string())
    }

    /// Whether a result was saved for the task from this sheet.
    pub fn is_saved(&self, task_id: &str) -> bool {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(task_id)
    }

    /// Validate and store one result.
    pub async fn record(
        &self,
        task: &YachtTask,
        input: MeasurementInput,
    ) -> ActionResult<SaveOutcome> {
        let (measured_value, level) = resolve_reading(task, input)?;
        let Some(_saving) = self.saving.try_begin(task.task.id.clone()) else {
            return Ok(SaveOutcome::Pending);
        };

        let result = TaskResult {
            id: Uuid::new_v4().to_string(),
            yacht_id: self.yacht_id.clone(),
            task_id: task.task.id.clone(),
            measured_value,
            measured_level: level.map(|l| l.as_str().to_string()),
            recorded_at: next_recorded_at(),
        };
        let row = to_row(TASK_RESULTS, &result)?;
        let written = self.store.insert(TASK_RESULTS, vec![row]).await;

        if !self.scope.is_alive() {
            return Ok(SaveOutcome::Detached);
        }
        if let Err(err) = written {
            warn!(yacht = %self.yacht_id, task = %result.task_id, error = %err, "Saving result failed");
            return Err(err.into());
        }

        debug!(yacht = %self.yacht_id, task = %result.task_id, "Saved result");
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(result.task_id.clone());
        Ok(SaveOutcome::Saved { result })
    }
}

impl<S: DataStore> Fleet<S> {
    pub fn result_sheet(&self, yacht_id: &str, scope: ViewScope) -> ResultSheet<S> {
        ResultSheet::new(Arc::clone(&self.store), yacht_id, scope)
    }

    /// Results recorded for a yacht, newest first.
    pub async fn task_results(&self, yacht_id: &str) -> ActionResult<Vec<TaskResult>> {
        let rows = self
            .store
            .select(
                &Select::from(TASK_RESULTS)
                    .eq("yacht_id", yacht_id)
                    .order_by_desc("recorded_at"),
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(task_result_from_row)
            .collect::<Result<_, _>>()?)
    }
}
