//! Demo fleet for trying the CLI against an empty store.

use crate::store::schema::{
    CATEGORY_LINKS, CATEGORY_NODES, ENGINEER_YACHTS, MEASUREMENTS, PERIODS, PROFILES, TASKS,
    YACHT_TASKS, YACHTS,
};
use crate::store::{DataStore, Row, Select};
use anyhow::{Result, bail};
use serde_json::{Value, json};
use tracing::info;

fn rows(values: Value) -> Vec<Row> {
    match values {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Tables and rows of the demo fleet, in foreign-key order.
pub fn demo_fleet() -> Vec<(&'static str, Vec<Row>)> {
    vec![
        (
            MEASUREMENTS,
            rows(json!([
                {"id": "m-oil", "name": "Oil pressure", "unit": "bar", "type": "numeric"},
                {"id": "m-coolant", "name": "Coolant temperature", "unit": "°C", "type": "numeric"},
                {"id": "m-fuel", "name": "Fuel level", "unit": "level", "type": "enum"},
            ])),
        ),
        (
            PERIODS,
            rows(json!([
                {"id": "weekly", "name": "Weekly"},
                {"id": "monthly", "name": "Monthly"},
            ])),
        ),
        (
            PROFILES,
            rows(json!([
                {"id": "p-alice", "user_id": "u-alice", "full_name": "Alice Moreau", "role": "engineer"},
                {"id": "p-ben", "user_id": "u-ben", "full_name": null, "role": "engineer"},
                {"id": "p-maria", "user_id": "u-maria", "full_name": "Maria Lopez", "role": "manager"},
            ])),
        ),
        (
            YACHTS,
            rows(json!([
                {"id": "y-aurora", "name": "Aurora", "make_model": "Sunseeker 76", "location": "Antibes"},
                {"id": "y-boreas", "name": "Boreas", "make_model": "Princess Y85", "location": "Palma"},
            ])),
        ),
        (
            TASKS,
            rows(json!([
                {"id": "t-oil", "description": "Check oil pressure", "position": 1, "priority": 1,
                 "measurement_id": "m-oil", "period_id": "weekly"},
                {"id": "t-coolant", "description": "Check coolant temperature", "position": 2, "priority": 2,
                 "measurement_id": "m-coolant", "period_id": "weekly"},
                {"id": "t-fuel", "description": "Check fuel level", "position": 3, "priority": 0,
                 "measurement_id": "m-fuel", "period_id": "weekly"},
                {"id": "t-flares", "description": "Inspect flares", "position": 4, "priority": 3,
                 "period_id": "monthly"},
                {"id": "t-winch", "description": "Grease winches", "position": 5, "priority": 4},
            ])),
        ),
        (
            CATEGORY_NODES,
            rows(json!([
                {"id": "c-engine", "name": "Engine room", "position": 1},
                {"id": "c-port", "name": "Port engine", "parent_id": "c-engine", "position": 1},
                {"id": "c-stbd", "name": "Starboard engine", "parent_id": "c-engine", "position": 2},
                {"id": "c-deck", "name": "Deck", "position": 2},
                {"id": "c-safety", "name": "Safety", "position": 3},
            ])),
        ),
        (
            CATEGORY_LINKS,
            rows(json!([
                {"task_id": "t-oil", "category_id": "c-port"},
                {"task_id": "t-oil", "category_id": "c-stbd", "completed": true},
                {"task_id": "t-coolant", "category_id": "c-port"},
                {"task_id": "t-fuel", "category_id": "c-engine"},
                {"task_id": "t-flares", "category_id": "c-safety"},
            ])),
        ),
        (
            YACHT_TASKS,
            rows(json!([
                {"yacht_id": "y-aurora", "task_id": "t-oil"},
                {"yacht_id": "y-aurora", "task_id": "t-coolant"},
                {"yacht_id": "y-aurora", "task_id": "t-fuel"},
                {"yacht_id": "y-aurora", "task_id": "t-flares"},
                {"yacht_id": "y-boreas", "task_id": "t-oil"},
                {"yacht_id": "y-boreas", "task_id": "t-winch"},
            ])),
        ),
        (
            ENGINEER_YACHTS,
            rows(json!([
                {"engineer_profile_id": "p-alice", "yacht_id": "y-aurora"},
            ])),
        ),
    ]
}

/// Insert the demo fleet. Refuses to touch a store that already has yachts.
pub async fn seed<S: DataStore>(store: &S) -> Result<usize> {
    if !store.select(&Select::from(YACHTS)).await?.is_empty() {
        bail!("store already contains yachts; seed expects an empty store");
    }

    let mut total = 0;
    for (table, batch) in demo_fleet() {
        let count = batch.len();
        store.insert(table, batch).await?;
        info!(table, count, "Seeded");
        total += count;
    }
    Ok(total)
}
