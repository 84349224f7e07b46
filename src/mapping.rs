//! Row-to-record mapping, one function per entity.
//!
//! Fetches return loosely shaped JSON rows with relations nested inline.
//! These functions are the only place that shape is interpreted.

use crate::error::{StoreError, StoreResult};
use crate::store::Row;
use crate::store::schema::{
    CATEGORY_LINKS, CATEGORY_NODES, MEASUREMENTS, PERIODS, PROFILES, TASK_RESULTS, TASKS, YACHTS,
};
use crate::types::{
    CategoryLink, CategoryNode, Measurement, Period, Profile, Task, TaskLinks, TaskResult, Yacht,
    YachtTask,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Deserialize a row into `T`, tagging failures with the source table.
pub fn from_row<T: DeserializeOwned>(table: &str, row: Row) -> StoreResult<T> {
    serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::malformed(table, e))
}

/// Serialize a record into a row for insert or update.
pub fn to_row<T: Serialize>(table: &str, value: &T) -> StoreResult<Row> {
    match serde_json::to_value(value) {
        Ok(Value::Object(row)) => Ok(row),
        Ok(other) => Err(StoreError::malformed(
            table,
            format!("expected an object, got {}", other),
        )),
        Err(e) => Err(StoreError::malformed(table, e)),
    }
}

pub fn profile_from_row(row: Row) -> StoreResult<Profile> {
    from_row(PROFILES, row)
}

pub fn yacht_from_row(row: Row) -> StoreResult<Yacht> {
    from_row(YACHTS, row)
}

pub fn measurement_from_row(row: Row) -> StoreResult<Measurement> {
    from_row(MEASUREMENTS, row)
}

pub fn period_from_row(row: Row) -> StoreResult<Period> {
    from_row(PERIODS, row)
}

pub fn category_from_row(row: Row) -> StoreResult<CategoryNode> {
    from_row(CATEGORY_NODES, row)
}

pub fn task_from_row(row: Row) -> StoreResult<Task> {
    from_row(TASKS, row)
}

pub fn link_from_row(row: Row) -> StoreResult<CategoryLink> {
    from_row(CATEGORY_LINKS, row)
}

pub fn task_result_from_row(row: Row) -> StoreResult<TaskResult> {
    from_row(TASK_RESULTS, row)
}

/// Take a nested object out of `row`. `null` or absent is `None`.
fn take_object(table: &str, row: &mut Row, key: &str) -> StoreResult<Option<Row>> {
    match row.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(obj)) => Ok(Some(obj)),
        Some(other) => Err(StoreError::malformed(
            table,
            format!("{} should be an object, got {}", key, other),
        )),
    }
}

/// Take a nested array of objects out of `row`. `null` or absent is empty.
fn take_objects(table: &str, row: &mut Row, key: &str) -> StoreResult<Vec<Row>> {
    match row.remove(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(obj) => Ok(obj),
                other => Err(StoreError::malformed(
                    table,
                    format!("{} entries should be objects, got {}", key, other),
                )),
            })
            .collect(),
        Some(other) => Err(StoreError::malformed(
            table,
            format!("{} should be an array, got {}", key, other),
        )),
    }
}

/// Map a task row carrying its embedded `task_category_links`.
pub fn task_links_from_row(mut row: Row) -> StoreResult<TaskLinks> {
    let links = take_objects(TASKS, &mut row, CATEGORY_LINKS)?
        .into_iter()
        .map(link_from_row)
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(TaskLinks {
        task: task_from_row(row)?,
        links,
    })
}

/// Map a task row carrying its embedded `measurement`.
pub fn yacht_task_from_row(mut row: Row) -> StoreResult<YachtTask> {
    let measurement = take_object(TASKS, &mut row, "measurement")?
        .map(measurement_from_row)
        .transpose()?;
    Ok(YachtTask {
        task: task_from_row(row)?,
        measurement,
    })
}

/// Pull a text column out of every row, e.g. the target ids of an association.
pub fn column_values(table: &str, rows: Vec<Row>, column: &str) -> StoreResult<Vec<String>> {
    rows.into_iter()
        .map(|mut row| match row.remove(column) {
            Some(Value::String(s)) => Ok(s),
            other => Err(StoreError::malformed(
                table,
                format!("{} should be text, got {:?}", column, other),
            )),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MeasurementKind;
    use serde_json::json;

    fn row(v: Value) -> Row {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn task_links_with_null_links_is_empty() {
        let mapped = task_links_from_row(row(json!({
            "id": "t1",
            "description": "Impeller",
            "position": 3,
            "task_category_links": null
        })))
        .unwrap();
        assert_eq!(mapped.task.id, "t1");
        assert_eq!(mapped.task.position, Some(3));
        assert!(mapped.links.is_empty());
    }

    #[test]
    fn task_links_keeps_per_link_completion() {
        let mapped = task_links_from_row(row(json!({
            "id": "t1",
            "description": "Impeller",
            "position": null,
            "task_category_links": [
                {"category_id": "eng", "completed": true},
                {"category_id": "deck"}
            ]
        })))
        .unwrap();
        assert_eq!(
            mapped.links,
            vec![
                CategoryLink { category_id: "eng".into(), completed: true },
                CategoryLink { category_id: "deck".into(), completed: false },
            ]
        );
    }

    #[test]
    fn yacht_task_maps_measurement() {
        let mapped = yacht_task_from_row(row(json!({
            "id": "t1",
            "description": "Coolant",
            "priority": 2,
            "measurement": {"id": "m1", "name": "Coolant", "unit": "%", "type": "numeric"}
        })))
        .unwrap();
        assert_eq!(mapped.task.priority, 2);
        let m = mapped.measurement.unwrap();
        assert_eq!(m.kind, MeasurementKind::Numeric);
        assert_eq!(m.unit, "%");
    }

    #[test]
    fn malformed_rows_name_their_table() {
        let err = category_from_row(row(json!({"id": 7, "name": "Engine"}))).unwrap_err();
        match err {
            StoreError::MalformedRow { table, .. } => assert_eq!(table, CATEGORY_NODES),
            other => panic!("unexpected error: {other}"),
        }

        let err = task_links_from_row(row(json!({
            "id": "t1", "description": "x", "task_category_links": {"category_id": "c"}
        })))
        .unwrap_err();
        assert!(matches!(err, StoreError::MalformedRow { .. }));
    }

    #[test]
    fn column_values_requires_text() {
        let ids = column_values(
            "engineer_yachts",
            vec![row(json!({"yacht_id": "y1"})), row(json!({"yacht_id": "y2"}))],
            "yacht_id",
        )
        .unwrap();
        assert_eq!(ids, ["y1", "y2"]);

        assert!(column_values("engineer_yachts", vec![row(json!({}))], "yacht_id").is_err());
    }
}
