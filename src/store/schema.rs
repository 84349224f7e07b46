//! Table and relation registry shared by the store implementations.
//!
//! Every identifier that reaches a query is checked against this registry, so
//! the SQLite adapter never interpolates unchecked input into SQL.

use crate::error::{StoreError, StoreResult};

pub const PROFILES: &str = "profiles";
pub const YACHTS: &str = "yachts";
pub const MEASUREMENTS: &str = "measurements";
pub const PERIODS: &str = "periods";
pub const TASKS: &str = "tasks";
pub const CATEGORY_NODES: &str = "task_category_nodes";
pub const CATEGORY_LINKS: &str = "task_category_links";
pub const ENGINEER_YACHTS: &str = "engineer_yachts";
pub const YACHT_TASKS: &str = "yacht_tasks";
pub const TASK_RESULTS: &str = "task_results";

/// Storage type of a column, used to coerce SQLite values back to JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Integer,
    Real,
    Boolean,
}

/// Value the store fills in when an insert omits the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    Uuid,
    False,
    Zero,
    Now,
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        nullable: false,
        default: None,
    }
}

const fn opt(name: &'static str, ty: ColumnType) -> Column {
    Column {
        name,
        ty,
        nullable: true,
        default: None,
    }
}

const fn id() -> Column {
    Column {
        name: "id",
        ty: ColumnType::Text,
        nullable: false,
        default: Some(ColumnDefault::Uuid),
    }
}

const fn with_default(name: &'static str, ty: ColumnType, default: ColumnDefault) -> Column {
    Column {
        name,
        ty,
        nullable: false,
        default: Some(default),
    }
}

#[derive(Debug)]
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// Columns that identify a row; no two rows may share them.
    pub key: &'static [&'static str],
}

impl TableDef {
    pub fn column(&self, name: &str) -> StoreResult<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| StoreError::UnknownColumn {
                table: self.name.to_string(),
                column: name.to_string(),
            })
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

use ColumnType::{Boolean, Integer, Real, Text};

static TABLES: &[TableDef] = &[
    TableDef {
        name: PROFILES,
        columns: &[
            id(),
            opt("user_id", Text),
            opt("full_name", Text),
            col("role", Text),
            opt("email", Text),
            opt("created_at", Text),
        ],
        key: &["id"],
    },
    TableDef {
        name: YACHTS,
        columns: &[
            id(),
            col("name", Text),
            opt("make_model", Text),
            opt("location", Text),
        ],
        key: &["id"],
    },
    TableDef {
        name: MEASUREMENTS,
        columns: &[id(), col("name", Text), col("unit", Text), col("type", Text)],
        key: &["id"],
    },
    TableDef {
        name: PERIODS,
        columns: &[id(), col("name", Text)],
        key: &["id"],
    },
    TableDef {
        name: TASKS,
        columns: &[
            id(),
            col("description", Text),
            opt("position", Integer),
            with_default("priority", Integer, ColumnDefault::Zero),
            opt("measurement_id", Text),
            opt("period_id", Text),
        ],
        key: &["id"],
    },
    TableDef {
        name: CATEGORY_NODES,
        columns: &[
            id(),
            col("name", Text),
            opt("parent_id", Text),
            with_default("position", Integer, ColumnDefault::Zero),
        ],
        key: &["id"],
    },
    TableDef {
        name: CATEGORY_LINKS,
        columns: &[
            col("task_id", Text),
            col("category_id", Text),
            with_default("completed", Boolean, ColumnDefault::False),
        ],
        key: &["task_id", "category_id"],
    },
    TableDef {
        name: ENGINEER_YACHTS,
        columns: &[col("engineer_profile_id", Text), col("yacht_id", Text)],
        key: &["engineer_profile_id", "yacht_id"],
    },
    TableDef {
        name: YACHT_TASKS,
        columns: &[col("yacht_id", Text), col("task_id", Text)],
        key: &["yacht_id", "task_id"],
    },
    TableDef {
        name: TASK_RESULTS,
        columns: &[
            id(),
            col("yacht_id", Text),
            col("task_id", Text),
            opt("measured_value", Real),
            opt("measured_level", Text),
            with_default("recorded_at", Text, ColumnDefault::Now),
        ],
        key: &["id"],
    },
];

/// Look up a table definition by name.
pub fn table(name: &str) -> StoreResult<&'static TableDef> {
    TABLES
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| StoreError::UnknownTable(name.to_string()))
}

/// How many related rows an embed yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Zero or one related row, nested as an object or `null`.
    One,
    /// Any number of related rows, nested as an array.
    Many,
}

/// A declared foreign-key path that a select may embed.
#[derive(Debug)]
pub struct Relation {
    pub from: &'static str,
    pub name: &'static str,
    pub to: &'static str,
    /// Column on `from` holding the join value.
    pub local: &'static str,
    /// Column on `to` compared against `local`.
    pub foreign: &'static str,
    pub cardinality: Cardinality,
}

static RELATIONS: &[Relation] = &[
    Relation {
        from: TASKS,
        name: CATEGORY_LINKS,
        to: CATEGORY_LINKS,
        local: "id",
        foreign: "task_id",
        cardinality: Cardinality::Many,
    },
    Relation {
        from: TASKS,
        name: "measurement",
        to: MEASUREMENTS,
        local: "measurement_id",
        foreign: "id",
        cardinality: Cardinality::One,
    },
    Relation {
        from: TASKS,
        name: "period",
        to: PERIODS,
        local: "period_id",
        foreign: "id",
        cardinality: Cardinality::One,
    },
    Relation {
        from: ENGINEER_YACHTS,
        name: "yacht",
        to: YACHTS,
        local: "yacht_id",
        foreign: "id",
        cardinality: Cardinality::One,
    },
    Relation {
        from: ENGINEER_YACHTS,
        name: "engineer",
        to: PROFILES,
        local: "engineer_profile_id",
        foreign: "id",
        cardinality: Cardinality::One,
    },
    Relation {
        from: YACHT_TASKS,
        name: "task",
        to: TASKS,
        local: "task_id",
        foreign: "id",
        cardinality: Cardinality::One,
    },
];

/// Look up a relation declared on `from`.
pub fn relation(from: &str, name: &str) -> StoreResult<&'static Relation> {
    RELATIONS
        .iter()
        .find(|r| r.from == from && r.name == name)
        .ok_or_else(|| StoreError::UnknownRelation {
            table: from.to_string(),
            relation: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_relation_points_at_known_columns() {
        for rel in RELATIONS {
            let from = table(rel.from).unwrap();
            let to = table(rel.to).unwrap();
            assert!(from.column(rel.local).is_ok(), "{}.{}", rel.from, rel.local);
            assert!(to.column(rel.foreign).is_ok(), "{}.{}", rel.to, rel.foreign);
        }
    }

    #[test]
    fn every_key_column_exists() {
        for def in TABLES {
            for key in def.key {
                assert!(def.column(key).is_ok(), "{}.{}", def.name, key);
            }
        }
    }

    #[test]
    fn unknown_names_are_rejected() {
        assert!(matches!(table("sessions"), Err(StoreError::UnknownTable(_))));
        assert!(matches!(
            relation(TASKS, "owner"),
            Err(StoreError::UnknownRelation { .. })
        ));
        assert!(matches!(
            table(TASKS).unwrap().column("title"),
            Err(StoreError::UnknownColumn { .. })
        ));
    }
}
