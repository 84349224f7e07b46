//! Category tree loading and per-link completion.

use super::Fleet;
use crate::error::{ActionError, ActionResult};
use crate::hierarchy::{self, AssemblyReport, Forest};
use crate::mapping::{category_from_row, column_values, task_links_from_row};
use crate::store::schema::{CATEGORY_LINKS, CATEGORY_NODES, TASKS};
use crate::store::{DataStore, Filter, Row, Select};
use crate::toggle::{AssociationKey, TASK_CATEGORY, YACHT_TASK};
use crate::types::{CategoryNode, TaskLinks};
use serde_json::Value;
use tracing::{debug, warn};

/// Rows behind one folder tree. The assembled [`Forest`] borrows from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskTreeData {
    pub categories: Vec<CategoryNode>,
    pub tasks: Vec<TaskLinks>,
}

impl TaskTreeData {
    pub fn assemble(&self) -> Forest<'_> {
        hierarchy::assemble(&self.categories, &self.tasks)
    }

    pub fn assemble_with_report(&self) -> (Forest<'_>, AssemblyReport<'_>) {
        hierarchy::assemble_with_report(&self.categories, &self.tasks)
    }

    /// Completion of one (task, category) link, if the link exists.
    pub fn completed(&self, task_id: &str, category_id: &str) -> Option<bool> {
        self.tasks
            .iter()
            .find(|t| t.task.id == task_id)?
            .links
            .iter()
            .find(|l| l.category_id == category_id)
            .map(|l| l.completed)
    }

    /// Set completion of one link locally. Returns false if the link is unknown.
    pub fn set_completed(&mut self, task_id: &str, category_id: &str, completed: bool) -> bool {
        let link = self
            .tasks
            .iter_mut()
            .filter(|t| t.task.id == task_id)
            .flat_map(|t| t.links.iter_mut())
            .find(|l| l.category_id == category_id);
        match link {
            Some(link) => {
                link.completed = completed;
                true
            }
            None => false,
        }
    }
}

impl<S: DataStore> Fleet<S> {
    async fn load_categories(&self) -> ActionResult<Vec<CategoryNode>> {
        let rows = self
            .store
            .select(&Select::from(CATEGORY_NODES).order_by("position"))
            .await?;
        Ok(rows
            .into_iter()
            .map(category_from_row)
            .collect::<Result<_, _>>()?)
    }

    async fn load_task_links(&self, filter: Option<Filter>) -> ActionResult<Vec<TaskLinks>> {
        let mut query = Select::from(TASKS)
            .embed(CATEGORY_LINKS, &["category_id", "completed"])
            .order_by("position");
        if let Some(filter) = filter {
            query = query.filter(filter);
        }
        let rows = self.store.select(&query).await?;
        Ok(rows
            .into_iter()
            .map(task_links_from_row)
            .collect::<Result<_, _>>()?)
    }

    /// Every category and every task with its links.
    pub async fn load_task_tree(&self) -> ActionResult<TaskTreeData> {
        let categories = self.load_categories().await?;
        let tasks = self.load_task_links(None).await?;
        debug!(categories = categories.len(), tasks = tasks.len(), "Loaded task tree");
        Ok(TaskTreeData { categories, tasks })
    }

    /// Every category, with only the tasks assigned to one yacht.
    pub async fn load_yacht_task_tree(&self, yacht_id: &str) -> ActionResult<TaskTreeData> {
        let links = self
            .store
            .select(
                &Select::from(YACHT_TASK.table)
                    .columns(&[YACHT_TASK.target_column])
                    .filter(YACHT_TASK.owner_filter(yacht_id)),
            )
            .await?;
        let ids = column_values(YACHT_TASK.table, links, YACHT_TASK.target_column)?;

        let categories = self.load_categories().await?;
        let tasks = if ids.is_empty() {
            Vec::new()
        } else {
            self.load_task_links(Some(Filter::in_list("id", ids))).await?
        };
        Ok(TaskTreeData { categories, tasks })
    }

    /// Write completion of one (task, category) link.
    pub async fn set_link_completed(
        &self,
        task_id: &str,
        category_id: &str,
        completed: bool,
    ) -> ActionResult<()> {
        let mut patch = Row::new();
        patch.insert("completed".into(), Value::Bool(completed));
        let filters = TASK_CATEGORY.pair_filters(&AssociationKey::new(task_id, category_id));
        let updated = self.store.update(CATEGORY_LINKS, patch, &filters).await?;
        if updated == 0 {
            return Err(ActionError::not_found(
                "Category link",
                &format!("{}/{}", task_id, category_id),
            ));
        }
        Ok(())
    }

    /// Flip completion of one link in `data`, then write it.
    ///
    /// The local flag is restored if the write fails. Returns the new value.
    pub async fn toggle_link_completed(
        &self,
        data: &mut TaskTreeData,
        task_id: &str,
        category_id: &str,
    ) -> ActionResult<bool> {
        let current = data.completed(task_id, category_id).ok_or_else(|| {
            ActionError::not_found("Category link", &format!("{}/{}", task_id, category_id))
        })?;
        let next = !current;
        data.set_completed(task_id, category_id, next);

        if let Err(err) = self.set_link_completed(task_id, category_id, next).await {
            warn!(task = task_id, category = category_id, error = %err, "Completion update failed, restoring");
            data.set_completed(task_id, category_id, current);
            return Err(err);
        }
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CategoryLink, Task};

    fn data() -> TaskTreeData {
        TaskTreeData {
            categories: vec![CategoryNode {
                id: "c".into(),
                name: "Engine".into(),
                parent_id: None,
                position: 0,
            }],
            tasks: vec![TaskLinks {
                task: Task {
                    id: "t".into(),
                    description: "Oil".into(),
                    position: None,
                    priority: 0,
                    measurement_id: None,
                    period_id: None,
                },
                links: vec![CategoryLink {
                    category_id: "c".into(),
                    completed: false,
                }],
            }],
        }
    }

    #[test]
    fn set_completed_touches_one_link() {
        let mut data = data();
        assert_eq!(data.completed("t", "c"), Some(false));
        assert!(data.set_completed("t", "c", true));
        assert_eq!(data.completed("t", "c"), Some(true));
        assert!(!data.set_completed("t", "other", true));
        assert_eq!(data.completed("t", "other"), None);
    }

    #[test]
    fn assembled_forest_reflects_local_completion() {
        let mut data = data();
        data.set_completed("t", "c", true);
        let forest = data.assemble();
        assert!(forest.roots[0].tasks[0].completed);
    }
}
