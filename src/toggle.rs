//! Association membership toggling.
//!
//! An association is a bare membership row in a two-column table
//! (`engineer_yachts`, `yacht_tasks`, `task_category_links`). The pure
//! functions compute what a toggle or a membership replacement should write;
//! [`AssociationToggler`] applies that against a store while keeping a local,
//! optimistically updated copy of one owner's memberships.

use crate::error::{ActionError, ActionResult, StoreResult};
use crate::guard::{PendingSet, ViewScope};
use crate::mapping::column_values;
use crate::store::schema::{CATEGORY_LINKS, ENGINEER_YACHTS, YACHT_TASKS};
use crate::store::{DataStore, Filter, Row, Select};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// One membership pair, relative to an [`AssociationTable`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AssociationKey {
    pub owner: String,
    pub target: String,
}

impl AssociationKey {
    pub fn new(owner: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            target: target.into(),
        }
    }
}

/// The single write a toggle needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delta {
    Add(AssociationKey),
    Remove(AssociationKey),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggle {
    pub apply: Delta,
    pub next: HashSet<AssociationKey>,
}

/// Flip membership of `key`. Nothing but `key` changes in `next`.
pub fn toggle(current: &HashSet<AssociationKey>, key: AssociationKey) -> Toggle {
    let mut next = current.clone();
    let apply = if next.remove(&key) {
        Delta::Remove(key)
    } else {
        next.insert(key.clone());
        Delta::Add(key)
    };
    Toggle { apply, next }
}

/// Targets to add and remove to turn one membership set into another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MembershipDelta {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl MembershipDelta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Minimal delta from `existing` to `desired`.
///
/// Both sides keep their input order; repeated ids are counted once.
pub fn compute_delta(existing: &[String], desired: &[String]) -> MembershipDelta {
    let have: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let want: HashSet<&str> = desired.iter().map(String::as_str).collect();

    let mut seen = HashSet::new();
    let to_add = desired
        .iter()
        .filter(|id| !have.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect();

    let mut seen = HashSet::new();
    let to_remove = existing
        .iter()
        .filter(|id| !want.contains(id.as_str()) && seen.insert(id.as_str()))
        .cloned()
        .collect();

    MembershipDelta { to_add, to_remove }
}

/// An association table seen from one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssociationTable {
    pub table: &'static str,
    pub owner_column: &'static str,
    pub target_column: &'static str,
}

/// Yachts assigned to an engineer.
pub const ENGINEER_YACHT: AssociationTable = AssociationTable {
    table: ENGINEER_YACHTS,
    owner_column: "engineer_profile_id",
    target_column: "yacht_id",
};

/// Engineers assigned to a yacht.
pub const YACHT_ENGINEER: AssociationTable = ENGINEER_YACHT.reversed();

/// Tasks carried out on a yacht.
pub const YACHT_TASK: AssociationTable = AssociationTable {
    table: YACHT_TASKS,
    owner_column: "yacht_id",
    target_column: "task_id",
};

/// Category folders a task is filed under.
pub const TASK_CATEGORY: AssociationTable = AssociationTable {
    table: CATEGORY_LINKS,
    owner_column: "task_id",
    target_column: "category_id",
};

impl AssociationTable {
    /// The same table with owner and target swapped.
    pub const fn reversed(self) -> Self {
        Self {
            table: self.table,
            owner_column: self.target_column,
            target_column: self.owner_column,
        }
    }

    pub fn row(&self, key: &AssociationKey) -> Row {
        let mut row = Row::new();
        row.insert(self.owner_column.to_string(), Value::from(key.owner.as_str()));
        row.insert(self.target_column.to_string(), Value::from(key.target.as_str()));
        row
    }

    /// Filters selecting exactly the row for `key`.
    pub fn pair_filters(&self, key: &AssociationKey) -> Vec<Filter> {
        vec![
            Filter::eq(self.owner_column, key.owner.as_str()),
            Filter::eq(self.target_column, key.target.as_str()),
        ]
    }

    pub fn owner_filter(&self, owner: &str) -> Filter {
        Filter::eq(self.owner_column, owner)
    }
}

/// Result of [`AssociationToggler::toggle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// A write for the same target was already in flight; nothing was sent.
    Pending,
    /// The write finished after the view closed; local state was left alone.
    Detached,
}

/// Result of [`AssociationToggler::replace_members`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReplaceOutcome {
    Applied { delta: MembershipDelta },
    Pending,
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Slot {
    Target(String),
    All,
}

/// Local membership state for one owner in one association table.
pub struct AssociationToggler<S: DataStore> {
    store: Arc<S>,
    table: AssociationTable,
    owner: String,
    members: Mutex<HashSet<AssociationKey>>,
    pending: PendingSet<Slot>,
    scope: ViewScope,
}

impl<S: DataStore> AssociationToggler<S> {
    pub fn new(store: Arc<S>, table: AssociationTable, owner: &str, scope: ViewScope) -> Self {
        Self {
            store,
            table,
            owner: owner.to_string(),
            members: Mutex::new(HashSet::new()),
            pending: PendingSet::new(),
            scope,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn table(&self) -> AssociationTable {
        self.table
    }

    pub fn scope(&self) -> &ViewScope {
        &self.scope
    }

    fn lock_members(&self) -> MutexGuard<'_, HashSet<AssociationKey>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn key(&self, target: &str) -> AssociationKey {
        AssociationKey::new(self.owner.as_str(), target)
    }

    fn keys(&self, targets: &[String]) -> HashSet<AssociationKey> {
        targets.iter().map(|t| self.key(t)).collect()
    }

    /// Committed targets for this owner, in store order.
    async fn fetch_targets(&self) -> StoreResult<Vec<String>> {
        let query = Select::from(self.table.table)
            .columns(&[self.table.target_column])
            .filter(self.table.owner_filter(&self.owner));
        let rows = self.store.select(&query).await?;
        column_values(self.table.table, rows, self.table.target_column)
    }

    /// Replace local state with committed membership.
    pub async fn load(&self) -> ActionResult<()> {
        let targets = self.fetch_targets().await?;
        if !self.scope.is_alive() {
            return Ok(());
        }
        debug!(
            table = self.table.table,
            owner = %self.owner,
            count = targets.len(),
            "Loaded memberships"
        );
        *self.lock_members() = self.keys(&targets);
        Ok(())
    }

    /// Current local targets, sorted.
    pub fn members(&self) -> Vec<String> {
        let mut targets: Vec<String> = self
            .lock_members()
            .iter()
            .map(|k| k.target.clone())
            .collect();
        targets.sort();
        targets
    }

    pub fn contains(&self, target: &str) -> bool {
        self.lock_members().contains(&self.key(target))
    }

    pub fn is_pending(&self, target: &str) -> bool {
        self.pending.is_pending(&Slot::All)
            || self.pending.is_pending(&Slot::Target(target.to_string()))
    }

    /// Flip membership of one target.
    ///
    /// Local state changes before the write is sent. If the write fails, only
    /// this target's previous membership is restored.
    pub async fn toggle(&self, target: &str) -> ActionResult<ToggleOutcome> {
        let slot = Slot::Target(target.to_string());
        let Some(_saving) = self
            .pending
            .try_begin_unless(slot, |slots| slots.contains(&Slot::All))
        else {
            debug!(table = self.table.table, owner = %self.owner, member = target, "Toggle already in flight");
            return Ok(ToggleOutcome::Pending);
        };

        let key = self.key(target);
        let (apply, was_member) = {
            let mut members = self.lock_members();
            let was_member = members.contains(&key);
            let Toggle { apply, next } = toggle(&members, key.clone());
            *members = next;
            (apply, was_member)
        };

        let result = match &apply {
            Delta::Add(k) => self.store.insert(self.table.table, vec![self.table.row(k)]).await,
            Delta::Remove(k) => self
                .store
                .delete(self.table.table, &self.table.pair_filters(k))
                .await
                .map(|_| ()),
        };

        if !self.scope.is_alive() {
            debug!(table = self.table.table, owner = %self.owner, member = target, "View closed before toggle finished");
            return Ok(ToggleOutcome::Detached);
        }

        match result {
            Ok(()) => Ok(match apply {
                Delta::Add(_) => ToggleOutcome::Added,
                Delta::Remove(_) => ToggleOutcome::Removed,
            }),
            Err(err) => {
                warn!(table = self.table.table, owner = %self.owner, member = target, error = %err, "Toggle failed, restoring");
                let mut members = self.lock_members();
                if was_member {
                    members.insert(key);
                } else {
                    members.remove(&key);
                }
                Err(err.into())
            }
        }
    }

    /// Make the committed membership equal to `desired`.
    ///
    /// Re-reads committed membership, then sends one batched insert followed
    /// by one batched delete. The two writes are independent: if the insert
    /// lands and the delete fails, the error code is `PartialApply`.
    pub async fn replace_members(&self, desired: &[String]) -> ActionResult<ReplaceOutcome> {
        let Some(_saving) = self
            .pending
            .try_begin_unless(Slot::All, |slots| !slots.is_empty())
        else {
            return Ok(ReplaceOutcome::Pending);
        };

        let existing = self.fetch_targets().await?;
        if !self.scope.is_alive() {
            return Ok(ReplaceOutcome::Detached);
        }

        let delta = compute_delta(&existing, desired);
        let snapshot = std::mem::replace(&mut *self.lock_members(), self.keys(desired));

        let result = self.apply_delta(&delta).await;
        if !self.scope.is_alive() {
            return Ok(ReplaceOutcome::Detached);
        }

        let failure = match result {
            Ok(()) => {
                debug!(
                    table = self.table.table,
                    owner = %self.owner,
                    added = delta.to_add.len(),
                    removed = delta.to_remove.len(),
                    "Replaced memberships"
                );
                return Ok(ReplaceOutcome::Applied { delta });
            }
            Err(failure) => failure,
        };

        let restored = match self.fetch_targets().await {
            Ok(targets) => self.keys(&targets),
            Err(err) => {
                warn!(table = self.table.table, owner = %self.owner, error = %err, "Could not re-read memberships");
                snapshot
            }
        };
        if self.scope.is_alive() {
            *self.lock_members() = restored;
        }

        Err(match failure {
            ApplyFailure::Insert(err) => err.into(),
            ApplyFailure::DeleteAfterInsert(err) => ActionError::partial_apply(self.table.table, err),
        })
    }

    async fn apply_delta(&self, delta: &MembershipDelta) -> Result<(), ApplyFailure> {
        let inserted = !delta.to_add.is_empty();
        if inserted {
            let rows = delta
                .to_add
                .iter()
                .map(|t| self.table.row(&self.key(t)))
                .collect();
            self.store
                .insert(self.table.table, rows)
                .await
                .map_err(ApplyFailure::Insert)?;
        }
        if !delta.to_remove.is_empty() {
            let filters = [
                self.table.owner_filter(&self.owner),
                Filter::in_list(self.table.target_column, delta.to_remove.iter().map(String::as_str)),
            ];
            if let Err(err) = self.store.delete(self.table.table, &filters).await {
                return Err(if inserted {
                    ApplyFailure::DeleteAfterInsert(err)
                } else {
                    ApplyFailure::Insert(err)
                });
            }
        }
        Ok(())
    }
}

enum ApplyFailure {
    /// Nothing was written.
    Insert(crate::error::StoreError),
    DeleteAfterInsert(crate::error::StoreError),
}
