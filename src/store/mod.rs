//! Data-access capability.
//!
//! Every feature reaches the hosted data service through [`DataStore`], which
//! is passed in explicitly rather than held as ambient state. Two
//! implementations ship with the crate: [`MemoryStore`] for tests and demos,
//! and [`SqliteStore`] as a local stand-in for the hosted service.

pub mod memory;
pub mod query;
pub mod schema;
pub mod sqlite;

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;

pub use memory::{MemoryStore, Operation};
pub use query::{Direction, Embed, Filter, Order, Select};
pub use sqlite::SqliteStore;

/// One row as returned by the store, with embedded relations nested inline.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Asynchronous CRUD against the relational data service.
///
/// Every call may fail with a transport or authorization error. Callers treat
/// those as recoverable and report them; none of them is fatal.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Fetch all rows matching the query.
    async fn select(&self, query: &Select) -> StoreResult<Vec<Row>>;

    /// Insert one or more rows. A batch is applied entirely or not at all.
    async fn insert(&self, table: &str, rows: Vec<Row>) -> StoreResult<()>;

    /// Apply `patch` to every row matching `filters`. Returns the row count.
    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> StoreResult<u64>;

    /// Delete every row matching `filters`. Returns the row count.
    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<u64>;

    /// Fetch at most one row. Zero rows is `Ok(None)`; more than one is an error.
    async fn select_one(&self, query: &Select) -> StoreResult<Option<Row>> {
        let mut rows = self.select(query).await?;
        match rows.len() {
            0 => Ok(None),
            1 => Ok(rows.pop()),
            count => Err(StoreError::MultipleRows {
                table: query.table.clone(),
                count,
            }),
        }
    }

    /// Fetch exactly one row. Zero rows is [`StoreError::NotFound`].
    async fn select_single(&self, query: &Select) -> StoreResult<Row> {
        self.select_one(query)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                table: query.table.clone(),
            })
    }
}

/// Reject update/delete calls that would touch a whole table.
pub(crate) fn require_filters(
    table: &str,
    filters: &[Filter],
    operation: &'static str,
) -> StoreResult<()> {
    if filters.is_empty() {
        return Err(StoreError::UnfilteredMutation {
            table: table.to_string(),
            operation,
        });
    }
    Ok(())
}
