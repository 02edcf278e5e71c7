//! Epic progress service.

use sprintdeck_common::{AppError, AppResult};
use tracing::{debug, warn};

use crate::model::Epic;
use crate::store::SharedEpicStore;

/// Keeps epic story counts in step with the backlog.
#[derive(Clone)]
pub struct EpicService {
    store: SharedEpicStore,
}

impl EpicService {
    /// Create a new epic service.
    #[must_use]
    pub fn new(store: SharedEpicStore) -> Self {
        Self { store }
    }

    /// Load an epic.
    pub async fn get(&self, id: &str) -> AppResult<Epic> {
        self.store
            .get_epic(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Epic not found: {id}")))
    }

    /// Recount each epic after its stories changed.
    ///
    /// Runs after the backlog commit, so a failure here cannot undo it; it
    /// is logged and the remaining epics are still refreshed.
    pub async fn refresh(&self, epic_ids: &[String]) {
        for epic_id in epic_ids {
            match self.store.update_epic_story_counts(epic_id).await {
                Ok(()) => debug!(epic_id = %epic_id, "Epic counts refreshed"),
                Err(e) => warn!(error = %e, epic_id = %epic_id, "Failed to refresh epic counts"),
            }
        }
    }
}
