//! Group operations exposed by the engine.

use super::Engine;
use crate::{
    config::settings::GroupConfig,
    core::{
        group,
        report::{self, DashboardSummary, GroupView},
    },
    errors::Result,
};
use tracing::{debug, info, instrument, warn};

impl Engine {
    /// Creates a group with its members and first cycle of obligations.
    #[instrument(skip(self, config), fields(name = %config.name))]
    pub async fn create_group(&self, config: &GroupConfig) -> Result<GroupView> {
        let now = self.now();
        let details = group::create_group(&self.database, config, now).await?;
        report::build_group_view(&self.database, details, now).await
    }

    /// One group with its derived figures.
    pub async fn get_group(&self, group_id: i64) -> Result<GroupView> {
        let details = group::get_group_details(&self.database, group_id).await?;
        report::build_group_view(&self.database, details, self.now()).await
    }

    /// Groups in which `user_id` is a member.
    pub async fn list_groups(&self, user_id: &str) -> Result<Vec<GroupView>> {
        let now = self.now();
        let mut views = Vec::new();
        for details in group::list_groups_for_user(&self.database, user_id).await? {
            views.push(report::build_group_view(&self.database, details, now).await?);
        }
        debug!("Found {} groups for user {}", views.len(), user_id);
        Ok(views)
    }

    /// Headline figures across a user's groups.
    pub async fn dashboard(&self, user_id: &str) -> Result<DashboardSummary> {
        Ok(report::summarize_dashboard(&self.list_groups(user_id).await?))
    }

    /// Starts the next rotation cycle of a completed group.
    pub async fn start_next_cycle(&self, group_id: i64) -> Result<GroupView> {
        let _guard = self.locks.acquire(group_id).await;
        let now = self.now();
        let details = group::start_next_cycle(&self.database, group_id, now).await?;
        report::build_group_view(&self.database, details, now).await
    }

    /// Closes a group. Closing an already closed group changes nothing.
    pub async fn close_group(&self, group_id: i64) -> Result<GroupView> {
        let _guard = self.locks.acquire(group_id).await;
        let now = self.now();
        group::close_group(&self.database, group_id, now).await?;
        let details = group::get_group_details(&self.database, group_id).await?;
        report::build_group_view(&self.database, details, now).await
    }

    /// Creates every configured group that does not exist yet, matched by name.
    /// Returns the number of groups created.
    #[instrument(skip(self, configs))]
    pub async fn seed_groups(&self, configs: &[GroupConfig]) -> Result<usize> {
        info!(
            "Starting to seed groups. Found {} configurations.",
            configs.len()
        );

        let mut created = 0;
        for config in configs {
            if group::get_group_by_name(&self.database, config.name.trim())
                .await?
                .is_some()
            {
                warn!("Group '{}' already exists. Skipping.", config.name);
                continue;
            }
            group::create_group(&self.database, config, self.now()).await?;
            created += 1;
        }

        info!("Finished seeding groups: {} created.", created);
        Ok(created)
    }
}
