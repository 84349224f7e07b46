//! Query description types and the row helpers both stores share.

use super::Row;
use serde_json::Value;
use std::cmp::Ordering;

/// A row predicate. All filters on a query are combined with AND.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    In(String, Vec<Value>),
    IsNull(String),
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq(column.to_string(), value.into())
    }

    pub fn in_list<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Filter::In(
            column.to_string(),
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn is_null(column: &str) -> Self {
        Filter::IsNull(column.to_string())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _) | Filter::In(c, _) | Filter::IsNull(c) => c,
        }
    }

    /// Evaluate against an in-memory row. A missing column reads as null.
    pub fn matches(&self, row: &Row) -> bool {
        let cell = row.get(self.column()).unwrap_or(&Value::Null);
        match self {
            Filter::Eq(_, v) => values_equal(cell, v),
            Filter::In(_, vs) => vs.iter().any(|v| values_equal(cell, v)),
            Filter::IsNull(_) => cell.is_null(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub direction: Direction,
}

/// Related rows to nest under `relation` in each result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Embed {
    pub relation: String,
    /// Columns of the related rows; empty means all.
    pub columns: Vec<String>,
}

/// A read against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    /// Columns to return; empty means all.
    pub columns: Vec<String>,
    pub filters: Vec<Filter>,
    pub order: Vec<Order>,
    pub embeds: Vec<Embed>,
}

impl Select {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            filters: Vec::new(),
            order: Vec::new(),
            embeds: Vec::new(),
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(column, value))
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            direction: Direction::Asc,
        });
        self
    }

    pub fn order_by_desc(mut self, column: &str) -> Self {
        self.order.push(Order {
            column: column.to_string(),
            direction: Direction::Desc,
        });
        self
    }

    pub fn embed(mut self, relation: &str, columns: &[&str]) -> Self {
        self.embeds.push(Embed {
            relation: relation.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }
}

/// Equality that treats `1` and `1.0` as the same number.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        _ => a == b,
    }
}

/// Ordering for sort keys. Nulls sort after every other value.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Greater,
        (_, Value::Null) => Ordering::Less,
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

/// Stable sort by the query's order keys. Nulls stay last in either direction.
pub fn sort_rows(rows: &mut [Row], order: &[Order]) {
    if order.is_empty() {
        return;
    }
    rows.sort_by(|a, b| {
        for key in order {
            let x = a.get(&key.column).unwrap_or(&Value::Null);
            let y = b.get(&key.column).unwrap_or(&Value::Null);
            let ord = match (x.is_null(), y.is_null(), key.direction) {
                (false, false, Direction::Desc) => compare_values(y, x),
                _ => compare_values(x, y),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

/// Keep only the requested columns (all of them when `columns` is empty).
pub fn project(mut row: Row, columns: &[String]) -> Row {
    if columns.is_empty() {
        return row;
    }
    let mut out = Row::new();
    for column in columns {
        if let Some(v) = row.remove(column) {
            out.insert(column.clone(), v);
        }
    }
    out
}
