//! In-memory implementation of [`DataStore`].
//!
//! Tables are vectors of JSON rows behind a `tokio::sync::RwLock`. Besides the
//! CRUD surface it records every call and can be told to fail the next call of
//! a given kind, which is how tests exercise rollback paths.

use super::query::{self, Filter, Select};
use super::schema::{self, Cardinality, ColumnDefault, TableDef};
use super::{DataStore, Row, require_filters};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use tokio::sync::RwLock;

/// Kind of store call, for failure injection and the call log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Select,
    Insert,
    Update,
    Delete,
}

/// A store call as seen by [`MemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub table: String,
    /// Rows written or matched; zero for selects.
    pub rows: usize,
}

/// In-memory data store.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Row>>>,
    failures: Mutex<VecDeque<(Operation, StoreError)>>,
    calls: Mutex<Vec<Call>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of kind `operation` fail with `error`.
    pub fn fail_next(&self, operation: Operation, error: StoreError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back((operation, error));
    }

    /// All calls made so far, in issue order. Failed calls are not recorded.
    pub fn calls(&self) -> Vec<Call> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of a table's rows in insertion order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    fn take_failure(&self, operation: Operation) -> StoreResult<()> {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        match failures.iter().position(|(op, _)| *op == operation) {
            Some(idx) => match failures.remove(idx) {
                Some((_, err)) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    fn record(&self, operation: Operation, table: &str, rows: usize) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Call {
                operation,
                table: table.to_string(),
                rows,
            });
    }
}

fn check_filters(def: &TableDef, filters: &[Filter]) -> StoreResult<()> {
    for filter in filters {
        def.column(filter.column())?;
    }
    Ok(())
}

/// Validate a row for insert and fill in column defaults.
fn prepare_insert(def: &TableDef, mut row: Row) -> StoreResult<Row> {
    for name in row.keys() {
        def.column(name)?;
    }
    for column in def.columns {
        if row.get(column.name).is_some_and(|v| !v.is_null()) {
            continue;
        }
        let value = match column.default {
            Some(ColumnDefault::Uuid) => Value::from(uuid::Uuid::new_v4().to_string()),
            Some(ColumnDefault::False) => Value::Bool(false),
            Some(ColumnDefault::Zero) => Value::from(0),
            Some(ColumnDefault::Now) => Value::from(chrono::Utc::now().to_rfc3339()),
            None if column.nullable => Value::Null,
            None => {
                return Err(StoreError::constraint(
                    def.name,
                    format!("{} is required", column.name),
                ));
            }
        };
        row.insert(column.name.to_string(), value);
    }
    Ok(row)
}

fn same_key(def: &TableDef, a: &Row, b: &Row) -> bool {
    def.key.iter().all(|k| {
        query::values_equal(
            a.get(*k).unwrap_or(&Value::Null),
            b.get(*k).unwrap_or(&Value::Null),
        )
    })
}

fn embed_rows(
    tables: &HashMap<String, Vec<Row>>,
    select: &Select,
    rows: &mut [Row],
) -> StoreResult<()> {
    for embed in &select.embeds {
        let rel = schema::relation(&select.table, &embed.relation)?;
        let target = schema::table(rel.to)?;
        for column in &embed.columns {
            target.column(column)?;
        }
        let related = tables.get(rel.to).map(Vec::as_slice).unwrap_or(&[]);
        for row in rows.iter_mut() {
            let local = row.get(rel.local).cloned().unwrap_or(Value::Null);
            let mut matches = related
                .iter()
                .filter(|r| {
                    !local.is_null()
                        && query::values_equal(r.get(rel.foreign).unwrap_or(&Value::Null), &local)
                })
                .map(|r| Value::Object(query::project(r.clone(), &embed.columns)));
            let nested = match rel.cardinality {
                Cardinality::Many => Value::Array(matches.collect()),
                Cardinality::One => matches.next().unwrap_or(Value::Null),
            };
            row.insert(embed.relation.clone(), nested);
        }
    }
    Ok(())
}

#[async_trait]
impl DataStore for MemoryStore {
    async fn select(&self, select: &Select) -> StoreResult<Vec<Row>> {
        self.take_failure(Operation::Select)?;
        let def = schema::table(&select.table)?;
        check_filters(def, &select.filters)?;
        for column in &select.columns {
            def.column(column)?;
        }
        for order in &select.order {
            def.column(&order.column)?;
        }

        let tables = self.tables.read().await;
        let mut rows: Vec<Row> = tables
            .get(def.name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .filter(|row| select.filters.iter().all(|f| f.matches(row)))
            .cloned()
            .collect();
        query::sort_rows(&mut rows, &select.order);
        embed_rows(&tables, select, &mut rows)?;
        drop(tables);

        let mut keep = select.columns.clone();
        if !keep.is_empty() {
            keep.extend(select.embeds.iter().map(|e| e.relation.clone()));
        }
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|row| query::project(row, &keep))
            .collect();
        self.record(Operation::Select, def.name, 0);
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> StoreResult<()> {
        self.take_failure(Operation::Insert)?;
        let def = schema::table(table)?;
        let prepared = rows
            .into_iter()
            .map(|row| prepare_insert(def, row))
            .collect::<StoreResult<Vec<_>>>()?;

        let mut tables = self.tables.write().await;
        let existing = tables.entry(def.name.to_string()).or_default();
        for (idx, row) in prepared.iter().enumerate() {
            let clash = existing.iter().any(|r| same_key(def, r, row))
                || prepared[..idx].iter().any(|r| same_key(def, r, row));
            if clash {
                return Err(StoreError::constraint(
                    def.name,
                    format!("duplicate key ({})", def.key.join(", ")),
                ));
            }
        }
        let count = prepared.len();
        existing.extend(prepared);
        drop(tables);

        self.record(Operation::Insert, def.name, count);
        Ok(())
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> StoreResult<u64> {
        self.take_failure(Operation::Update)?;
        let def = schema::table(table)?;
        require_filters(def.name, filters, "update")?;
        check_filters(def, filters)?;
        for name in patch.keys() {
            def.column(name)?;
        }

        let mut tables = self.tables.write().await;
        let mut count = 0u64;
        if let Some(rows) = tables.get_mut(def.name) {
            for row in rows.iter_mut().filter(|r| filters.iter().all(|f| f.matches(r))) {
                for (k, v) in &patch {
                    row.insert(k.clone(), v.clone());
                }
                count += 1;
            }
        }
        drop(tables);

        self.record(Operation::Update, def.name, count as usize);
        Ok(count)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<u64> {
        self.take_failure(Operation::Delete)?;
        let def = schema::table(table)?;
        require_filters(def.name, filters, "delete")?;
        check_filters(def, filters)?;

        let mut tables = self.tables.write().await;
        let mut count = 0u64;
        if let Some(rows) = tables.get_mut(def.name) {
            let before = rows.len();
            rows.retain(|r| !filters.iter().all(|f| f.matches(r)));
            count = (before - rows.len()) as u64;
        }
        drop(tables);

        self.record(Operation::Delete, def.name, count as usize);
        Ok(count)
    }
}
