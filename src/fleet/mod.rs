//! Feature-level operations for the fleet maintenance app.
//!
//! Each operation fetches rows through the injected [`DataStore`], maps them
//! with [`crate::mapping`] and hands back plain records. Operations that edit
//! local view state return a stateful helper (an
//! [`AssociationToggler`](crate::toggle::AssociationToggler) or a
//! [`ResultSheet`]) bound to a [`ViewScope`](crate::guard::ViewScope).

pub mod profiles;
pub mod results;
pub mod tasks;
pub mod tree;
pub mod yachts;

pub use results::{MeasurementInput, ResultSheet, SaveOutcome};
pub use tree::TaskTreeData;

use crate::store::DataStore;
use std::sync::Arc;

/// Entry point to every fleet operation.
pub struct Fleet<S: DataStore> {
    store: Arc<S>,
}

impl<S: DataStore> Clone for Fleet<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: DataStore> Fleet<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
