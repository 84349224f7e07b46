//! SQLite-backed [`DataStore`], a local stand-in for the hosted service.
//!
//! Identifiers are validated against [`schema`](super::schema) before they are
//! quoted into SQL; every value travels as a bound parameter.

use super::query::{self, Direction, Filter, Select};
use super::schema::{self, Cardinality, ColumnDefault, ColumnType, TableDef};
use super::{DataStore, Row, require_filters};
use crate::error::{StoreError, StoreResult};
use anyhow::Result;
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

/// Store handle wrapping a SQLite connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;",
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    /// Open an in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| anyhow::anyhow!("connection lock poisoned"))?;
        embedded::migrations::runner().run(&mut *conn)?;
        Ok(())
    }

    /// Run `f` with exclusive access to the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|_| StoreError::Transport("connection lock poisoned".into()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Transport(e.to_string()))?
    }
}

fn quote(ident: &str) -> String {
    format!("\"{}\"", ident)
}

fn map_err(table: &str, err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            StoreError::constraint(table, msg.clone().unwrap_or_else(|| err.to_string()))
        }
        _ => StoreError::Transport(err.to_string()),
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql(ty: ColumnType, value: SqlValue) -> Value {
    match (ty, value) {
        (_, SqlValue::Null) | (_, SqlValue::Blob(_)) => Value::Null,
        (ColumnType::Boolean, SqlValue::Integer(i)) => Value::Bool(i != 0),
        (_, SqlValue::Integer(i)) => Value::from(i),
        (_, SqlValue::Real(f)) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        (_, SqlValue::Text(s)) => Value::String(s),
    }
}

/// Build a WHERE clause, pushing bound values onto `params`.
fn where_clause(def: &TableDef, filters: &[Filter], params: &mut Vec<SqlValue>) -> StoreResult<String> {
    if filters.is_empty() {
        return Ok(String::new());
    }
    let mut parts = Vec::with_capacity(filters.len());
    for filter in filters {
        let column = quote(def.column(filter.column())?.name);
        let part = match filter {
            Filter::Eq(_, Value::Null) | Filter::IsNull(_) => format!("{} IS NULL", column),
            Filter::Eq(_, value) => {
                params.push(to_sql(value));
                format!("{} = ?", column)
            }
            Filter::In(_, values) if values.is_empty() => "0".to_string(),
            Filter::In(_, values) => {
                params.extend(values.iter().map(to_sql));
                let marks = vec!["?"; values.len()].join(", ");
                format!("{} IN ({})", column, marks)
            }
        };
        parts.push(part);
    }
    Ok(format!(" WHERE {}", parts.join(" AND ")))
}

fn select_sql(def: &TableDef, select: &Select, params: &mut Vec<SqlValue>) -> StoreResult<String> {
    let columns: Vec<String> = def.column_names().map(quote).collect();
    let mut sql = format!("SELECT {} FROM {}", columns.join(", "), quote(def.name));
    sql.push_str(&where_clause(def, &select.filters, params)?);

    let mut order = Vec::with_capacity(select.order.len() + 1);
    for key in &select.order {
        let column = quote(def.column(&key.column)?.name);
        let dir = match key.direction {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        };
        order.push(format!("{} {} NULLS LAST", column, dir));
    }
    order.push("rowid".to_string());
    sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
    Ok(sql)
}

fn query_rows(
    conn: &Connection,
    def: &TableDef,
    sql: &str,
    params: Vec<SqlValue>,
) -> StoreResult<Vec<Row>> {
    let width = def.columns.len();
    let mut stmt = conn.prepare(sql).map_err(|e| map_err(def.name, e))?;
    let raw = stmt
        .query_map(params_from_iter(params), |r| {
            (0..width)
                .map(|i| r.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
        .map_err(|e| map_err(def.name, e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| map_err(def.name, e))?;

    Ok(raw
        .into_iter()
        .map(|values| {
            def.columns
                .iter()
                .zip(values)
                .map(|(c, v)| (c.name.to_string(), from_sql(c.ty, v)))
                .collect()
        })
        .collect())
}

fn select_blocking(conn: &Connection, select: &Select) -> StoreResult<Vec<Row>> {
    let def = schema::table(&select.table)?;
    for column in &select.columns {
        def.column(column)?;
    }
    let mut params = Vec::new();
    let sql = select_sql(def, select, &mut params)?;
    let mut rows = query_rows(conn, def, &sql, params)?;

    for embed in &select.embeds {
        let rel = schema::relation(def.name, &embed.relation)?;
        let target = schema::table(rel.to)?;
        for column in &embed.columns {
            target.column(column)?;
        }

        let mut keys: Vec<Value> = Vec::new();
        for row in &rows {
            if let Some(v) = row.get(rel.local).filter(|v| !v.is_null())
                && !keys.iter().any(|k| query::values_equal(k, v))
            {
                keys.push(v.clone());
            }
        }
        let related = if keys.is_empty() {
            Vec::new()
        } else {
            let mut params = Vec::new();
            let nested = Select::from(target.name).filter(Filter::In(rel.foreign.to_string(), keys));
            let sql = select_sql(target, &nested, &mut params)?;
            query_rows(conn, target, &sql, params)?
        };

        let mut grouped: HashMap<String, Vec<Value>> = HashMap::new();
        for r in related {
            let key = r.get(rel.foreign).map(|v| v.to_string()).unwrap_or_default();
            grouped
                .entry(key)
                .or_default()
                .push(Value::Object(query::project(r, &embed.columns)));
        }
        for row in rows.iter_mut() {
            let key = row.get(rel.local).filter(|v| !v.is_null()).map(|v| v.to_string());
            let matches = key.and_then(|k| grouped.get(&k)).cloned().unwrap_or_default();
            let nested = match rel.cardinality {
                Cardinality::Many => Value::Array(matches),
                Cardinality::One => matches.into_iter().next().unwrap_or(Value::Null),
            };
            row.insert(embed.relation.clone(), nested);
        }
    }

    let mut keep = select.columns.clone();
    if !keep.is_empty() {
        keep.extend(select.embeds.iter().map(|e| e.relation.clone()));
    }
    Ok(rows.into_iter().map(|row| query::project(row, &keep)).collect())
}

fn insert_blocking(conn: &mut Connection, def: &TableDef, rows: Vec<Row>) -> StoreResult<()> {
    let tx = conn.transaction().map_err(|e| map_err(def.name, e))?;
    for mut row in rows {
        for name in row.keys() {
            def.column(name)?;
        }
        // Nulls on defaulted columns mean "use the default", as with the memory store.
        row.retain(|name, value| {
            !(value.is_null()
                && def
                    .columns
                    .iter()
                    .any(|c| c.name == name.as_str() && c.default.is_some()))
        });
        if def
            .columns
            .iter()
            .any(|c| c.name == "id" && c.default == Some(ColumnDefault::Uuid))
            && !row.contains_key("id")
        {
            row.insert("id".into(), Value::from(uuid::Uuid::new_v4().to_string()));
        }

        let names: Vec<String> = row.keys().map(|k| quote(k)).collect();
        let marks = vec!["?"; names.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(def.name),
            names.join(", "),
            marks
        );
        let params: Vec<SqlValue> = row.values().map(to_sql).collect();
        tx.execute(&sql, params_from_iter(params))
            .map_err(|e| map_err(def.name, e))?;
    }
    tx.commit().map_err(|e| map_err(def.name, e))
}

fn update_blocking(
    conn: &Connection,
    def: &TableDef,
    patch: Row,
    filters: &[Filter],
) -> StoreResult<u64> {
    if patch.is_empty() {
        return Ok(0);
    }
    let mut params = Vec::new();
    let mut sets = Vec::with_capacity(patch.len());
    for (name, value) in &patch {
        sets.push(format!("{} = ?", quote(def.column(name)?.name)));
        params.push(to_sql(value));
    }
    let sql = format!(
        "UPDATE {} SET {}{}",
        quote(def.name),
        sets.join(", "),
        where_clause(def, filters, &mut params)?
    );
    let changed = conn
        .execute(&sql, params_from_iter(params))
        .map_err(|e| map_err(def.name, e))?;
    Ok(changed as u64)
}

fn delete_blocking(conn: &Connection, def: &TableDef, filters: &[Filter]) -> StoreResult<u64> {
    let mut params = Vec::new();
    let sql = format!(
        "DELETE FROM {}{}",
        quote(def.name),
        where_clause(def, filters, &mut params)?
    );
    let changed = conn
        .execute(&sql, params_from_iter(params))
        .map_err(|e| map_err(def.name, e))?;
    Ok(changed as u64)
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn select(&self, query: &Select) -> StoreResult<Vec<Row>> {
        let query = query.clone();
        self.with_conn(move |conn| select_blocking(conn, &query)).await
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> StoreResult<()> {
        let def = schema::table(table)?;
        if rows.is_empty() {
            return Ok(());
        }
        self.with_conn(move |conn| insert_blocking(conn, def, rows)).await
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> StoreResult<u64> {
        let def = schema::table(table)?;
        require_filters(def.name, filters, "update")?;
        let filters = filters.to_vec();
        self.with_conn(move |conn| update_blocking(conn, def, patch, &filters))
            .await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<u64> {
        let def = schema::table(table)?;
        require_filters(def.name, filters, "delete")?;
        let filters = filters.to_vec();
        self.with_conn(move |conn| delete_blocking(conn, def, &filters))
            .await
    }
}
