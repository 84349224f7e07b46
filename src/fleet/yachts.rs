//! Yacht lookups.

use super::Fleet;
use crate::error::{ActionError, ActionResult};
use crate::mapping::{column_values, yacht_from_row};
use crate::store::schema::YACHTS;
use crate::store::{DataStore, Filter, Select};
use crate::toggle::ENGINEER_YACHT;
use crate::types::Yacht;

impl<S: DataStore> Fleet<S> {
    /// All yachts visible to the caller, by name.
    pub async fn list_yachts(&self) -> ActionResult<Vec<Yacht>> {
        let rows = self
            .store
            .select(&Select::from(YACHTS).order_by("name"))
            .await?;
        Ok(rows
            .into_iter()
            .map(yacht_from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn get_yacht(&self, yacht_id: &str) -> ActionResult<Yacht> {
        let row = self
            .store
            .select_one(&Select::from(YACHTS).eq("id", yacht_id))
            .await?
            .ok_or_else(|| ActionError::not_found("Yacht", yacht_id))?;
        Ok(yacht_from_row(row)?)
    }

    /// Yachts assigned to an engineer, by name.
    ///
    /// Reads the assignment ids first, then the yachts; no ids means no
    /// second request.
    pub async fn assigned_yachts(&self, engineer_id: &str) -> ActionResult<Vec<Yacht>> {
        let links = self
            .store
            .select(
                &Select::from(ENGINEER_YACHT.table)
                    .columns(&[ENGINEER_YACHT.target_column])
                    .filter(ENGINEER_YACHT.owner_filter(engineer_id)),
            )
            .await?;
        let ids = column_values(ENGINEER_YACHT.table, links, ENGINEER_YACHT.target_column)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .store
            .select(
                &Select::from(YACHTS)
                    .filter(Filter::in_list("id", ids))
                    .order_by("name"),
            )
            .await?;
        Ok(rows
            .into_iter()
            .map(yacht_from_row)
            .collect::<Result<_, _>>()?)
    }
}
