//! Backlog story repository.

use std::sync::Arc;

use crate::entities::{BacklogStory, backlog_story, backlog_story::BacklogStatus};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use sprintdeck_common::{AppError, AppResult};

/// Backlog story repository for database operations.
#[derive(Clone)]
pub struct BacklogStoryRepository {
    db: Arc<DatabaseConnection>,
}

impl BacklogStoryRepository {
    /// Create a new backlog story repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a story by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<backlog_story::Model>> {
        BacklogStory::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Get a story by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<backlog_story::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Backlog story not found: {id}")))
    }

    /// Create a new story.
    pub async fn create(&self, model: backlog_story::ActiveModel) -> AppResult<backlog_story::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Update a story. Only fields set on the model are written.
    pub async fn update(&self, model: backlog_story::ActiveModel) -> AppResult<backlog_story::Model> {
        model
            .update(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// List stories of a project in creation order, optionally by status.
    pub async fn find_by_project(
        &self,
        project_id: &str,
        status: Option<BacklogStatus>,
    ) -> AppResult<Vec<backlog_story::Model>> {
        let mut query =
            BacklogStory::find().filter(backlog_story::Column::ProjectId.eq(project_id));

        if let Some(status) = status {
            query = query.filter(backlog_story::Column::Status.eq(status));
        }

        query
            .order_by_asc(backlog_story::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Count stories linked to an epic.
    pub async fn count_by_epic(&self, epic_id: &str) -> AppResult<u64> {
        BacklogStory::find()
            .filter(backlog_story::Column::EpicId.eq(epic_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Count stories of an epic with the given status.
    pub async fn count_by_epic_and_status(
        &self,
        epic_id: &str,
        status: BacklogStatus,
    ) -> AppResult<u64> {
        BacklogStory::find()
            .filter(backlog_story::Column::EpicId.eq(epic_id))
            .filter(backlog_story::Column::Status.eq(status))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Delete a story.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        BacklogStory::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn create_test_story(id: &str, status: BacklogStatus) -> backlog_story::Model {
        backlog_story::Model {
            id: id.to_string(),
            project_id: "p1".to_string(),
            epic_id: Some("e1".to_string()),
            title: format!("Story {id}"),
            description: None,
            status,
            estimate: Some("3".to_string()),
            sprint_attempts: serde_json::json!([]),
            completed_at: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_project_filtered() {
        let s1 = create_test_story("b1", BacklogStatus::Backlog);
        let s2 = create_test_story("b2", BacklogStatus::Backlog);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[s1, s2]])
            .into_connection();

        let repo = BacklogStoryRepository::new(Arc::new(db));
        let result = repo
            .find_by_project("p1", Some(BacklogStatus::Backlog))
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].id, "b1");
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<backlog_story::Model>::new()])
            .into_connection();

        let repo = BacklogStoryRepository::new(Arc::new(db));
        let result = repo.get_by_id("nope").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
