//! Task lists and the task detail editor.

use super::Fleet;
use crate::error::{ActionError, ActionResult};
use crate::guard::ViewScope;
use crate::mapping::{
    category_from_row, column_values, measurement_from_row, period_from_row, task_from_row,
    yacht_task_from_row,
};
use crate::store::schema::{CATEGORY_NODES, MEASUREMENTS, PERIODS, TASKS};
use crate::store::{DataStore, Filter, Row, Select};
use crate::toggle::{AssociationToggler, TASK_CATEGORY, YACHT_TASK};
use crate::types::{CategoryNode, Measurement, Period, Task, TaskPatch, YachtTask};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

fn patch_row(patch: &TaskPatch) -> Row {
    let mut row = Row::new();
    if let Some(ref m) = patch.measurement_id {
        row.insert("measurement_id".into(), m.clone().map_or(Value::Null, Value::from));
    }
    if let Some(ref p) = patch.period_id {
        row.insert("period_id".into(), p.clone().map_or(Value::Null, Value::from));
    }
    row
}

/// Keep the first measurement seen for each unit.
pub fn dedupe_by_unit(measurements: Vec<Measurement>) -> Vec<Measurement> {
    let mut seen = HashSet::new();
    measurements
        .into_iter()
        .filter(|m| seen.insert(m.unit.clone()))
        .collect()
}

impl<S: DataStore> Fleet<S> {
    /// Tasks assigned to a yacht with their measurements, lowest priority first.
    pub async fn yacht_tasks(&self, yacht_id: &str) -> ActionResult<Vec<YachtTask>> {
        let links = self
            .store
            .select(
                &Select::from(YACHT_TASK.table)
                    .columns(&[YACHT_TASK.target_column])
                    .filter(YACHT_TASK.owner_filter(yacht_id)),
            )
            .await?;
        let ids = column_values(YACHT_TASK.table, links, YACHT_TASK.target_column)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .store
            .select(
                &Select::from(TASKS)
                    .filter(Filter::in_list("id", ids))
                    .embed("measurement", &[])
                    .order_by("priority"),
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(yacht_task_from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn get_task(&self, task_id: &str) -> ActionResult<Task> {
        let row = self
            .store
            .select_one(&Select::from(TASKS).eq("id", task_id))
            .await?
            .ok_or_else(|| ActionError::not_found("Task", task_id))?;
        Ok(task_from_row(row)?)
    }

    /// Edit a task's measurement or period.
    ///
    /// `task` is changed before the write is sent and put back as it was if
    /// the write fails.
    pub async fn update_task(&self, task: &mut Task, patch: TaskPatch) -> ActionResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let previous = task.clone();
        patch.apply_to(task);

        let result = self
            .store
            .update(TASKS, patch_row(&patch), &[Filter::eq("id", task.id.as_str())])
            .await;
        match result {
            Ok(0) => {
                *task = previous;
                Err(ActionError::not_found("Task", &task.id))
            }
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(task = %task.id, error = %err, "Task update failed, restoring");
                *task = previous;
                Err(err.into())
            }
        }
    }

    /// Measurement choices for the task editor: one per unit, by unit.
    pub async fn list_measurements(&self) -> ActionResult<Vec<Measurement>> {
        let rows = self
            .store
            .select(&Select::from(MEASUREMENTS).order_by("unit"))
            .await?;
        let measurements = rows
            .into_iter()
            .map(measurement_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(dedupe_by_unit(measurements))
    }

    pub async fn list_periods(&self) -> ActionResult<Vec<Period>> {
        let rows = self
            .store
            .select(&Select::from(PERIODS).order_by("name"))
            .await?;
        Ok(rows
            .into_iter()
            .map(period_from_row)
            .collect::<Result<_, _>>()?)
    }

    /// Every category, flat and by name, for the category picker.
    pub async fn list_category_options(&self) -> ActionResult<Vec<CategoryNode>> {
        let rows = self
            .store
            .select(&Select::from(CATEGORY_NODES).order_by("name"))
            .await?;
        Ok(rows
            .into_iter()
            .map(category_from_row)
            .collect::<Result<_, _>>()?)
    }

    /// Category links of one task, loaded and ready to toggle or replace.
    pub async fn task_categories(
        &self,
        task_id: &str,
        scope: ViewScope,
    ) -> ActionResult<AssociationToggler<S>> {
        let toggler = AssociationToggler::new(Arc::clone(&self.store), TASK_CATEGORY, task_id, scope);
        toggler.load().await?;
        Ok(toggler)
    }

    /// Task assignments of one yacht, loaded and ready to toggle.
    pub async fn yacht_task_assignments(
        &self,
        yacht_id: &str,
        scope: ViewScope,
    ) -> ActionResult<AssociationToggler<S>> {
        let toggler = AssociationToggler::new(Arc::clone(&self.store), YACHT_TASK, yacht_id, scope);
        toggler.load().await?;
        Ok(toggler)
    }
}
