//! Planning session repository.

use std::sync::Arc;

use crate::entities::{PlanningSession, planning_session};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter,
    QueryOrder,
};
use sprintdeck_common::{AppError, AppResult};

/// Planning session repository for database operations.
#[derive(Clone)]
pub struct PlanningSessionRepository {
    db: Arc<DatabaseConnection>,
}

impl PlanningSessionRepository {
    /// Create a new planning session repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a session by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<planning_session::Model>> {
        PlanningSession::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Get a session by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<planning_session::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {id}")))
    }

    /// Create a new session.
    pub async fn create(
        &self,
        model: planning_session::ActiveModel,
    ) -> AppResult<planning_session::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Overwrite a session only if its stored version still equals
    /// `expected_version`.
    ///
    /// Returns `false` when another writer got there first.
    pub async fn update_if_version(
        &self,
        id: &str,
        expected_version: i64,
        mut model: planning_session::ActiveModel,
    ) -> AppResult<bool> {
        model.id = ActiveValue::NotSet;
        let result = PlanningSession::update_many()
            .set(model)
            .filter(planning_session::Column::Id.eq(id))
            .filter(planning_session::Column::Version.eq(expected_version))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))?;
        Ok(result.rows_affected == 1)
    }

    /// List active sessions.
    pub async fn find_active(&self) -> AppResult<Vec<planning_session::Model>> {
        PlanningSession::find()
            .filter(planning_session::Column::IsActive.eq(true))
            .order_by_asc(planning_session::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// List sessions hosted by a user, newest first.
    pub async fn find_by_host(&self, host_id: &str) -> AppResult<Vec<planning_session::Model>> {
        PlanningSession::find()
            .filter(planning_session::Column::HostId.eq(host_id))
            .order_by_desc(planning_session::Column::CreatedAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Delete a session.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        PlanningSession::delete_by_id(id)
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
    use crate::entities::planning_session::DeckType;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, IntoActiveModel, MockDatabase, MockExecResult};

    fn create_test_session(id: &str, host_id: &str, version: i64) -> planning_session::Model {
        planning_session::Model {
            id: id.to_string(),
            name: "Sprint 14 refinement".to_string(),
            host_id: host_id.to_string(),
            participants: serde_json::json!([]),
            stories: serde_json::json!([]),
            current_story_id: None,
            voting_in_progress: false,
            votes_revealed: false,
            deck_type: DeckType::Fibonacci,
            custom_deck: None,
            is_active: true,
            version,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_find_by_id_found() {
        let session = create_test_session("s1", "host1", 3);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[session.clone()]])
            .into_connection();

        let repo = PlanningSessionRepository::new(Arc::new(db));
        let result = repo.find_by_id("s1").await.unwrap();

        assert!(result.is_some());
        let found = result.unwrap();
        assert_eq!(found.id, "s1");
        assert_eq!(found.version, 3);
    }

    #[tokio::test]
    async fn test_get_by_id_not_found() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<planning_session::Model>::new()])
            .into_connection();

        let repo = PlanningSessionRepository::new(Arc::new(db));
        let result = repo.get_by_id("missing").await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_if_version_applied() {
        let session = create_test_session("s1", "host1", 4);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();

        let repo = PlanningSessionRepository::new(Arc::new(db));
        let mut model = session.into_active_model();
        model.version = ActiveValue::Set(5);
        let applied = repo.update_if_version("s1", 4, model).await.unwrap();

        assert!(applied);
    }

    #[tokio::test]
    async fn test_update_if_version_lost_race() {
        let session = create_test_session("s1", "host1", 4);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let repo = PlanningSessionRepository::new(Arc::new(db));
        let mut model = session.into_active_model();
        model.version = ActiveValue::Set(5);
        let applied = repo.update_if_version("s1", 4, model).await.unwrap();

        assert!(!applied);
    }

    #[tokio::test]
    async fn test_find_active() {
        let s1 = create_test_session("s1", "host1", 0);
        let s2 = create_test_session("s2", "host2", 7);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[s1, s2]])
            .into_connection();

        let repo = PlanningSessionRepository::new(Arc::new(db));
        let result = repo.find_active().await.unwrap();

        assert_eq!(result.len(), 2);
        assert!(result.iter().all(|s| s.is_active));
    }
}
