//! Integration tests for the SQLite store.
//!
//! The same fleet operations as the in-memory tests, run against a migrated
//! SQLite database, plus checks on persistence and constraint mapping.

use std::sync::Arc;
use yacht_maintenance::cli::seed::seed;
use yacht_maintenance::error::{ErrorCode, StoreError};
use yacht_maintenance::fleet::{Fleet, MeasurementInput, SaveOutcome};
use yacht_maintenance::guard::ViewScope;
use yacht_maintenance::store::schema::{CATEGORY_LINKS, TASKS, YACHT_TASKS};
use yacht_maintenance::store::{DataStore, Filter, Row, Select, SqliteStore};
use yacht_maintenance::toggle::{ReplaceOutcome, ToggleOutcome};

/// Helper to create a seeded in-memory database for testing.
async fn setup() -> (Arc<SqliteStore>, Fleet<SqliteStore>) {
    let store = Arc::new(SqliteStore::open_in_memory().expect("Failed to create in-memory database"));
    seed(store.as_ref()).await.expect("Failed to seed demo fleet");
    (store.clone(), Fleet::new(store))
}

fn row(pairs: &[(&str, &str)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), (*v).into()))
        .collect()
}

mod query_tests {
    use super::*;

    #[tokio::test]
    async fn filters_and_ordering() {
        let (store, _) = setup().await;
        let rows = store
            .select(
                &Select::from(TASKS)
                    .columns(&["id"])
                    .filter(Filter::in_list("id", ["t-winch", "t-oil", "t-fuel"]))
                    .order_by_desc("priority"),
            )
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["t-winch", "t-oil", "t-fuel"]);
        assert_eq!(rows[0].len(), 1);
    }

    #[tokio::test]
    async fn null_filter_finds_tasks_without_measurement() {
        let (store, _) = setup().await;
        let rows = store
            .select(
                &Select::from(TASKS)
                    .filter(Filter::is_null("measurement_id"))
                    .order_by("position"),
            )
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["t-flares", "t-winch"]);
    }

    #[tokio::test]
    async fn embeds_nest_related_rows() {
        let (store, _) = setup().await;
        let task = store
            .select_single(
                &Select::from(TASKS)
                    .eq("id", "t-oil")
                    .embed("measurement", &["unit"])
                    .embed(CATEGORY_LINKS, &["category_id", "completed"]),
            )
            .await
            .unwrap();

        assert_eq!(task["measurement"]["unit"], "bar");
        let links = task[CATEGORY_LINKS].as_array().unwrap();
        assert_eq!(links.len(), 2);
        assert!(links.iter().any(|l| l["category_id"] == "c-stbd" && l["completed"] == true));

        let winch = store
            .select_single(&Select::from(TASKS).eq("id", "t-winch").embed("measurement", &[]))
            .await
            .unwrap();
        assert!(winch["measurement"].is_null());
    }

    #[tokio::test]
    async fn duplicate_association_is_a_constraint_error() {
        let (store, _) = setup().await;
        let err = store
            .insert(YACHT_TASKS, vec![row(&[("yacht_id", "y-aurora"), ("task_id", "t-oil")])])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Constraint { .. }));
    }

    #[tokio::test]
    async fn failed_batch_inserts_nothing() {
        let (store, _) = setup().await;
        let batch = vec![
            row(&[("yacht_id", "y-boreas"), ("task_id", "t-fuel")]),
            row(&[("yacht_id", "y-boreas"), ("task_id", "t-oil")]),
        ];
        assert!(store.insert(YACHT_TASKS, batch).await.is_err());

        let rows = store
            .select(&Select::from(YACHT_TASKS).eq("yacht_id", "y-boreas"))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn unfiltered_mutations_are_refused() {
        let (store, _) = setup().await;
        let err = store.delete(YACHT_TASKS, &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::UnfilteredMutation { .. }));
    }

    #[tokio::test]
    async fn unknown_columns_are_rejected() {
        let (store, _) = setup().await;
        let err = store
            .select(&Select::from(TASKS).eq("title; DROP TABLE tasks", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownColumn { .. }));
    }
}

mod fleet_tests {
    use super::*;

    #[tokio::test]
    async fn yacht_tasks_and_tree_match_memory_store() {
        let (_, fleet) = setup().await;
        let tasks = fleet.yacht_tasks("y-aurora").await.unwrap();
        let ids: Vec<_> = tasks.iter().map(|t| t.task.id.as_str()).collect();
        assert_eq!(ids, ["t-fuel", "t-oil", "t-coolant", "t-flares"]);

        let data = fleet.load_task_tree().await.unwrap();
        let forest = data.assemble();
        let roots: Vec<_> = forest.roots.iter().map(|r| r.id).collect();
        assert_eq!(roots, ["c-engine", "c-deck", "c-safety"]);
        assert!(forest.find("c-stbd").unwrap().tasks[0].completed);
        assert_eq!(forest.unassigned.len(), 1);
    }

    #[tokio::test]
    async fn toggles_and_replace_round_trip() {
        let (_, fleet) = setup().await;
        let alice = fleet
            .engineer_yachts("p-alice", ViewScope::new())
            .await
            .unwrap();
        assert_eq!(alice.toggle("y-boreas").await.unwrap(), ToggleOutcome::Added);
        assert_eq!(fleet.assigned_yachts("p-alice").await.unwrap().len(), 2);

        let links = fleet.task_categories("t-coolant", ViewScope::new()).await.unwrap();
        let outcome = links
            .replace_members(&["c-stbd".to_string(), "c-port".to_string()])
            .await
            .unwrap();
        assert!(matches!(outcome, ReplaceOutcome::Applied { ref delta } if delta.to_add == ["c-stbd"] && delta.to_remove.is_empty()));
    }

    #[tokio::test]
    async fn assigning_an_unknown_yacht_rolls_back() {
        let (_, fleet) = setup().await;
        let alice = fleet
            .engineer_yachts("p-alice", ViewScope::new())
            .await
            .unwrap();

        // Rejected by the foreign key on engineer_yachts.yacht_id.
        let err = alice.toggle("y-ghost").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert_eq!(alice.members(), ["y-aurora"]);
    }

    #[tokio::test]
    async fn results_are_listed_newest_first() {
        let (_, fleet) = setup().await;
        let oil = fleet
            .yacht_tasks("y-aurora")
            .await
            .unwrap()
            .into_iter()
            .find(|t| t.task.id == "t-oil")
            .unwrap();
        let sheet = fleet.result_sheet("y-aurora", ViewScope::new());

        sheet.record(&oil, MeasurementInput::value(3.1)).await.unwrap();
        let second = sheet.record(&oil, MeasurementInput::value(3.4)).await.unwrap();
        assert!(matches!(second, SaveOutcome::Saved { .. }));

        let results = fleet.task_results("y-aurora").await.unwrap();
        let values: Vec<_> = results.iter().map(|r| r.measured_value).collect();
        assert_eq!(values, [Some(3.4), Some(3.1)]);
    }
}

mod persistence_tests {
    use super::*;

    #[tokio::test]
    async fn file_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            seed(&store).await.unwrap();
        }

        let fleet = Fleet::new(Arc::new(SqliteStore::open(&path).unwrap()));
        assert_eq!(fleet.list_yachts().await.unwrap().len(), 2);

        // Seeding twice is refused.
        let store = SqliteStore::open(&path).unwrap();
        assert!(seed(&store).await.is_err());
    }
}
