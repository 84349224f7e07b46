//! Profiles and engineer assignments.

use super::Fleet;
use crate::error::{ActionError, ActionResult};
use crate::guard::ViewScope;
use crate::mapping::profile_from_row;
use crate::store::schema::PROFILES;
use crate::store::{DataStore, Select};
use crate::toggle::{AssociationToggler, ENGINEER_YACHT, YACHT_ENGINEER};
use crate::types::{Profile, Role};
use std::sync::Arc;
use tracing::debug;

impl<S: DataStore> Fleet<S> {
    /// All profiles, by name.
    pub async fn list_profiles(&self) -> ActionResult<Vec<Profile>> {
        self.profiles(Select::from(PROFILES).order_by("full_name"))
            .await
    }

    /// Profiles with the engineer role, by name.
    pub async fn list_engineers(&self) -> ActionResult<Vec<Profile>> {
        self.profiles(
            Select::from(PROFILES)
                .eq("role", Role::Engineer.as_str())
                .order_by("full_name"),
        )
        .await
    }

    async fn profiles(&self, query: Select) -> ActionResult<Vec<Profile>> {
        let rows = self.store.select(&query).await?;
        Ok(rows
            .into_iter()
            .map(profile_from_row)
            .collect::<Result<_, _>>()?)
    }

    pub async fn get_profile(&self, profile_id: &str) -> ActionResult<Profile> {
        let row = self
            .store
            .select_one(&Select::from(PROFILES).eq("id", profile_id))
            .await?
            .ok_or_else(|| ActionError::not_found("Profile", profile_id))?;
        Ok(profile_from_row(row)?)
    }

    /// Profile of a signed-in user, if one exists.
    pub async fn profile_for_user(&self, user_id: &str) -> ActionResult<Option<Profile>> {
        let row = self
            .store
            .select_one(&Select::from(PROFILES).eq("user_id", user_id))
            .await?;
        Ok(row.map(profile_from_row).transpose()?)
    }

    /// Yacht assignments of one engineer, loaded and ready to toggle.
    ///
    /// Only engineers can be assigned; any other role is refused before the
    /// assignment table is read.
    pub async fn engineer_yachts(
        &self,
        profile_id: &str,
        scope: ViewScope,
    ) -> ActionResult<AssociationToggler<S>> {
        let profile = self.get_profile(profile_id).await?;
        if !profile.is_engineer() {
            debug!(profile = profile_id, role = profile.role.as_str(), "Refusing yacht assignments");
            return Err(ActionError::not_engineer(profile_id));
        }
        let toggler = AssociationToggler::new(Arc::clone(&self.store), ENGINEER_YACHT, profile_id, scope);
        toggler.load().await?;
        Ok(toggler)
    }

    /// Engineers assigned to one yacht, loaded and ready to toggle.
    pub async fn yacht_engineers(
        &self,
        yacht_id: &str,
        scope: ViewScope,
    ) -> ActionResult<AssociationToggler<S>> {
        let toggler = AssociationToggler::new(Arc::clone(&self.store), YACHT_ENGINEER, yacht_id, scope);
        toggler.load().await?;
        Ok(toggler)
    }
}
