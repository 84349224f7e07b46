//! Integration tests for association toggling against a store.
//!
//! Writes can be held open with a gated store so that overlapping toggles and
//! view teardown can be driven deterministically.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Semaphore;
use yacht_maintenance::error::{ErrorCode, StoreError, StoreResult};
use yacht_maintenance::guard::ViewScope;
use yacht_maintenance::store::{DataStore, Filter, MemoryStore, Operation, Row, Select};
use yacht_maintenance::toggle::{
    AssociationToggler, ENGINEER_YACHT, MembershipDelta, ReplaceOutcome, TASK_CATEGORY,
    ToggleOutcome,
};

/// Memory store whose inserts and deletes wait for a permit.
struct GatedStore {
    inner: MemoryStore,
    gate: Semaphore,
    waiting: AtomicUsize,
}

impl GatedStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            gate: Semaphore::new(0),
            waiting: AtomicUsize::new(0),
        }
    }

    /// Let writes through from now on.
    fn open(&self) {
        self.gate.add_permits(1);
    }

    /// Writes that have reached the gate so far.
    fn waiting(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    async fn pass(&self) -> StoreResult<()> {
        self.waiting.fetch_add(1, Ordering::SeqCst);
        self.gate
            .acquire()
            .await
            .map(drop)
            .map_err(|e| StoreError::Transport(e.to_string()))
    }
}

#[async_trait]
impl DataStore for GatedStore {
    async fn select(&self, query: &Select) -> StoreResult<Vec<Row>> {
        self.inner.select(query).await
    }

    async fn insert(&self, table: &str, rows: Vec<Row>) -> StoreResult<()> {
        self.pass().await?;
        self.inner.insert(table, rows).await
    }

    async fn update(&self, table: &str, patch: Row, filters: &[Filter]) -> StoreResult<u64> {
        self.inner.update(table, patch, filters).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> StoreResult<u64> {
        self.pass().await?;
        self.inner.delete(table, filters).await
    }
}

fn link(owner_col: &str, owner: &str, target_col: &str, target: &str) -> Row {
    let mut row = Row::new();
    row.insert(owner_col.into(), owner.into());
    row.insert(target_col.into(), target.into());
    row
}

async fn memory_with_links(task: &str, categories: &[&str]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    let rows = categories
        .iter()
        .map(|c| link("task_id", task, "category_id", c))
        .collect();
    store.insert(TASK_CATEGORY.table, rows).await.unwrap();
    store
}

fn ids(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

mod toggle_tests {
    use super::*;

    #[tokio::test]
    async fn toggle_adds_then_removes() {
        let store = Arc::new(MemoryStore::new());
        let toggler = AssociationToggler::new(store.clone(), ENGINEER_YACHT, "e1", ViewScope::new());
        toggler.load().await.unwrap();

        assert_eq!(toggler.toggle("y1").await.unwrap(), ToggleOutcome::Added);
        assert!(toggler.contains("y1"));
        assert_eq!(store.rows(ENGINEER_YACHT.table).await.len(), 1);

        assert_eq!(toggler.toggle("y1").await.unwrap(), ToggleOutcome::Removed);
        assert!(!toggler.contains("y1"));
        assert!(store.rows(ENGINEER_YACHT.table).await.is_empty());
    }

    #[tokio::test]
    async fn each_toggle_issues_exactly_one_write() {
        let store = Arc::new(MemoryStore::new());
        let toggler = AssociationToggler::new(store.clone(), ENGINEER_YACHT, "e1", ViewScope::new());
        toggler.toggle("y1").await.unwrap();
        toggler.toggle("y2").await.unwrap();
        toggler.toggle("y1").await.unwrap();

        let writes: Vec<_> = store
            .calls()
            .into_iter()
            .filter(|c| c.operation != Operation::Select)
            .map(|c| (c.operation, c.rows))
            .collect();
        assert_eq!(
            writes,
            [(Operation::Insert, 1), (Operation::Insert, 1), (Operation::Delete, 1)]
        );
    }

    #[tokio::test]
    async fn failed_toggle_rolls_back_the_pair() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(ENGINEER_YACHT.table, vec![link("engineer_profile_id", "e1", "yacht_id", "y1")])
            .await
            .unwrap();
        let toggler = AssociationToggler::new(store.clone(), ENGINEER_YACHT, "e1", ViewScope::new());
        toggler.load().await.unwrap();

        store.fail_next(Operation::Insert, StoreError::Transport("offline".into()));
        let err = toggler.toggle("y2").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StoreUnavailable);
        assert_eq!(toggler.members(), ["y1"]);

        store.fail_next(Operation::Delete, StoreError::Unauthorized("rls".into()));
        let err = toggler.toggle("y1").await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(toggler.members(), ["y1"]);
        assert!(!toggler.is_pending("y1"));
    }

    #[tokio::test]
    async fn second_toggle_while_saving_is_refused() {
        let store = Arc::new(GatedStore::new());
        let toggler = AssociationToggler::new(store.clone(), ENGINEER_YACHT, "e1", ViewScope::new());

        let (first, second, _) = tokio::join!(toggler.toggle("y1"), toggler.toggle("y1"), async {
            store.open()
        });

        assert_eq!(first.unwrap(), ToggleOutcome::Added);
        assert_eq!(second.unwrap(), ToggleOutcome::Pending);
        assert!(toggler.contains("y1"));
        assert_eq!(store.inner.rows(ENGINEER_YACHT.table).await.len(), 1);
    }

    #[tokio::test]
    async fn other_targets_are_not_blocked() {
        let store = Arc::new(GatedStore::new());
        let toggler = AssociationToggler::new(store.clone(), ENGINEER_YACHT, "e1", ViewScope::new());

        let (a, b, _) = tokio::join!(toggler.toggle("y1"), toggler.toggle("y2"), async {
            store.open()
        });
        assert_eq!(a.unwrap(), ToggleOutcome::Added);
        assert_eq!(b.unwrap(), ToggleOutcome::Added);
        assert_eq!(toggler.members(), ["y1", "y2"]);
    }

    #[tokio::test]
    async fn rollback_leaves_concurrent_toggles_alone() {
        let store = Arc::new(GatedStore::new());
        let toggler = AssociationToggler::new(store.clone(), ENGINEER_YACHT, "e1", ViewScope::new());
        store
            .inner
            .fail_next(Operation::Insert, StoreError::Transport("dropped".into()));

        // The first write through the gate takes the injected failure.
        let (a, b, _) = tokio::join!(toggler.toggle("y1"), toggler.toggle("y2"), async {
            store.open()
        });
        assert!(a.is_err());
        assert_eq!(b.unwrap(), ToggleOutcome::Added);
        assert_eq!(toggler.members(), ["y2"]);
    }

    #[tokio::test]
    async fn closed_view_ignores_completion() {
        let store = Arc::new(GatedStore::new());
        let scope = ViewScope::new();
        let toggler = AssociationToggler::new(store.clone(), ENGINEER_YACHT, "e1", scope.clone());
        store
            .inner
            .fail_next(Operation::Insert, StoreError::Transport("late".into()));

        let (outcome, _) = tokio::join!(toggler.toggle("y1"), async {
            scope.close();
            store.open();
        });

        // The failure arrives after the view is gone: no error, no rollback.
        assert_eq!(outcome.unwrap(), ToggleOutcome::Detached);
        assert!(toggler.contains("y1"));
        assert!(!toggler.is_pending("y1"));
    }

    #[tokio::test]
    async fn load_replaces_local_state() {
        let store = memory_with_links("t1", &["c1", "c2"]).await;
        let toggler = AssociationToggler::new(store.clone(), TASK_CATEGORY, "t1", ViewScope::new());
        assert!(toggler.members().is_empty());
        toggler.load().await.unwrap();
        assert_eq!(toggler.members(), ["c1", "c2"]);

        store.fail_next(Operation::Select, StoreError::Transport("offline".into()));
        assert!(toggler.load().await.is_err());
        assert_eq!(toggler.members(), ["c1", "c2"]);
    }
}

mod replace_tests {
    use super::*;

    #[tokio::test]
    async fn replace_applies_minimal_delta() {
        let store = memory_with_links("t1", &["1", "2", "3"]).await;
        let toggler = AssociationToggler::new(store.clone(), TASK_CATEGORY, "t1", ViewScope::new());
        toggler.load().await.unwrap();

        let outcome = toggler.replace_members(&ids(&["2", "3", "4"])).await.unwrap();
        assert_eq!(
            outcome,
            ReplaceOutcome::Applied {
                delta: MembershipDelta {
                    to_add: ids(&["4"]),
                    to_remove: ids(&["1"]),
                }
            }
        );
        assert_eq!(toggler.members(), ["2", "3", "4"]);

        let fresh = AssociationToggler::new(store.clone(), TASK_CATEGORY, "t1", ViewScope::new());
        fresh.load().await.unwrap();
        assert_eq!(fresh.members(), ["2", "3", "4"]);

        let writes: Vec<_> = store
            .calls()
            .into_iter()
            .filter(|c| c.operation != Operation::Select)
            .map(|c| (c.operation, c.rows))
            .collect();
        // Setup insert, then one batched insert and one batched delete.
        assert_eq!(
            writes,
            [(Operation::Insert, 3), (Operation::Insert, 1), (Operation::Delete, 1)]
        );
    }

    #[tokio::test]
    async fn replace_rereads_instead_of_trusting_local_state() {
        let store = memory_with_links("t1", &["1"]).await;
        let toggler = AssociationToggler::new(store.clone(), TASK_CATEGORY, "t1", ViewScope::new());
        toggler.load().await.unwrap();

        // Another session adds a link behind our back.
        store
            .insert(TASK_CATEGORY.table, vec![link("task_id", "t1", "category_id", "9")])
            .await
            .unwrap();

        toggler.replace_members(&ids(&["1"])).await.unwrap();
        assert_eq!(store.rows(TASK_CATEGORY.table).await.len(), 1);
        assert_eq!(toggler.members(), ["1"]);
    }

    #[tokio::test]
    async fn replace_leaves_other_owners_alone() {
        let store = memory_with_links("t1", &["1", "2"]).await;
        store
            .insert(TASK_CATEGORY.table, vec![link("task_id", "t2", "category_id", "1")])
            .await
            .unwrap();
        let toggler = AssociationToggler::new(store.clone(), TASK_CATEGORY, "t1", ViewScope::new());

        toggler.replace_members(&[]).await.unwrap();
        let remaining = store.rows(TASK_CATEGORY.table).await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0]["task_id"], "t2");
    }

    #[tokio::test]
    async fn failed_delete_after_insert_is_partial() {
        let store = memory_with_links("t1", &["1", "2", "3"]).await;
        let toggler = AssociationToggler::new(store.clone(), TASK_CATEGORY, "t1", ViewScope::new());
        toggler.load().await.unwrap();

        store.fail_next(Operation::Delete, StoreError::Transport("timeout".into()));
        let err = toggler.replace_members(&ids(&["2", "3", "4"])).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::PartialApply);

        // Local state matches what actually landed.
        assert_eq!(toggler.members(), ["1", "2", "3", "4"]);
    }

    #[tokio::test]
    async fn failed_insert_resyncs_from_store() {
        let store = memory_with_links("t1", &["1", "2", "3"]).await;
        let toggler = AssociationToggler::new(store.clone(), TASK_CATEGORY, "t1", ViewScope::new());
        toggler.load().await.unwrap();

        store.fail_next(Operation::Insert, StoreError::Transport("timeout".into()));
        let err = toggler.replace_members(&ids(&["2", "3", "4"])).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StoreUnavailable);
        assert_eq!(toggler.members(), ["1", "2", "3"]);
        assert_eq!(store.rows(TASK_CATEGORY.table).await.len(), 3);
    }

    #[tokio::test]
    async fn replace_waits_for_in_flight_toggles() {
        let store = Arc::new(GatedStore::new());
        let toggler = AssociationToggler::new(store.clone(), TASK_CATEGORY, "t1", ViewScope::new());

        let desired = ids(&["c2"]);
        let (toggled, replaced, _) = tokio::join!(
            toggler.toggle("c1"),
            toggler.replace_members(&desired),
            async { store.open() }
        );
        assert_eq!(toggled.unwrap(), ToggleOutcome::Added);
        assert_eq!(replaced.unwrap(), ReplaceOutcome::Pending);
        assert_eq!(toggler.members(), ["c1"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn replace_and_toggles_exclude_each_other_across_threads() {
        let store = Arc::new(GatedStore::new());
        let toggler = Arc::new(AssociationToggler::new(
            store.clone(),
            TASK_CATEGORY,
            "t1",
            ViewScope::new(),
        ));
        let refused = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let toggler = toggler.clone();
                let refused = refused.clone();
                tokio::spawn(async move {
                    let is_replace = i % 2 == 0;
                    let went_ahead = if is_replace {
                        let desired = ids(&["c-all"]);
                        toggler.replace_members(&desired).await.unwrap() != ReplaceOutcome::Pending
                    } else {
                        toggler.toggle(&format!("c{}", i)).await.unwrap() != ToggleOutcome::Pending
                    };
                    if !went_ahead {
                        refused.fetch_add(1, Ordering::SeqCst);
                    }
                    (is_replace, went_ahead)
                })
            })
            .collect();

        // Every call is either refused or parked on the gate.
        while refused.load(Ordering::SeqCst) + store.waiting() < 8 {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        }
        store.open();

        let mut replaced = 0;
        let mut toggled = 0;
        for handle in handles {
            match handle.await.unwrap() {
                (true, true) => replaced += 1,
                (false, true) => toggled += 1,
                _ => {}
            }
        }
        assert!(replaced + toggled > 0);
        assert!(replaced <= 1);
        assert!(replaced == 0 || toggled == 0, "replace ran alongside {} toggles", toggled);
    }
}
