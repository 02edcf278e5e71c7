//! Epic repository.

use std::sync::Arc;

use crate::entities::{Epic, epic, epic::EpicStatus};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use sprintdeck_common::{AppError, AppResult};

/// Epic repository for database operations.
#[derive(Clone)]
pub struct EpicRepository {
    db: Arc<DatabaseConnection>,
}

impl EpicRepository {
    /// Create a new epic repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find an epic by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<epic::Model>> {
        Epic::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Get an epic by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<epic::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Epic not found: {id}")))
    }

    /// Create a new epic.
    pub async fn create(&self, model: epic::ActiveModel) -> AppResult<epic::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// List epics of a project.
    pub async fn find_by_project(&self, project_id: &str) -> AppResult<Vec<epic::Model>> {
        Epic::find()
            .filter(epic::Column::ProjectId.eq(project_id))
            .order_by_asc(epic::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Store recomputed story counts and the derived status.
    pub async fn update_counts(
        &self,
        id: &str,
        story_count: i32,
        completed_story_count: i32,
        status: EpicStatus,
    ) -> AppResult<epic::Model> {
        let model = epic::ActiveModel {
            id: ActiveValue::Set(id.to_string()),
            story_count: ActiveValue::Set(story_count),
            completed_story_count: ActiveValue::Set(completed_story_count),
            status: ActiveValue::Set(status),
            updated_at: ActiveValue::Set(chrono::Utc::now().into()),
            ..Default::default()
        };

        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_epic(id: &str, total: i32, done: i32, status: EpicStatus) -> epic::Model {
        epic::Model {
            id: id.to_string(),
            project_id: "p1".to_string(),
            name: "Onboarding".to_string(),
            description: None,
            story_count: total,
            completed_story_count: done,
            status,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_update_counts() {
        let updated = create_test_epic("e1", 4, 4, EpicStatus::Completed);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[updated]])
            .into_connection();

        let repo = EpicRepository::new(Arc::new(db));
        let result = repo
            .update_counts("e1", 4, 4, EpicStatus::Completed)
            .await
            .unwrap();

        assert_eq!(result.completed_story_count, 4);
        assert_eq!(result.status, EpicStatus::Completed);
    }

    #[tokio::test]
    async fn test_find_by_project() {
        let e1 = create_test_epic("e1", 0, 0, EpicStatus::Planning);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[e1]])
            .into_connection();

        let repo = EpicRepository::new(Arc::new(db));
        let result = repo.find_by_project("p1").await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].status, EpicStatus::Planning);
    }
}
