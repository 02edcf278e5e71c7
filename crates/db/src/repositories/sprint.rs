//! Sprint repository.

use std::sync::Arc;

use crate::entities::{
    BacklogStory, Sprint, backlog_story, backlog_story::BacklogStatus, sprint,
    sprint::SprintStatus,
};
use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::DateTimeWithTimeZone,
};
use sprintdeck_common::{AppError, AppResult};

/// A backlog story write that only lands while the row is unchanged.
#[derive(Debug, Clone)]
pub struct GuardedStoryWrite {
    pub id: String,
    pub expected_status: Option<BacklogStatus>,
    pub expected_updated_at: DateTimeWithTimeZone,
    pub model: backlog_story::ActiveModel,
}

/// Sprint repository for database operations.
#[derive(Clone)]
pub struct SprintRepository {
    db: Arc<DatabaseConnection>,
}

impl SprintRepository {
    /// Create a new sprint repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a sprint by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<sprint::Model>> {
        Sprint::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Get a sprint by ID, returning error if not found.
    pub async fn get_by_id(&self, id: &str) -> AppResult<sprint::Model> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Sprint not found: {id}")))
    }

    /// Create a new sprint.
    pub async fn create(&self, model: sprint::ActiveModel) -> AppResult<sprint::Model> {
        model
            .insert(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Overwrite a sprint only if its stored version still equals
    /// `expected_version`. Returns `false` on a lost race.
    pub async fn update_if_version(
        &self,
        id: &str,
        expected_version: i64,
        mut model: sprint::ActiveModel,
    ) -> AppResult<bool> {
        model.id = ActiveValue::NotSet;
        let result = Sprint::update_many()
            .set(model)
            .filter(sprint::Column::Id.eq(id))
            .filter(sprint::Column::Version.eq(expected_version))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))?;
        Ok(result.rows_affected == 1)
    }

    /// Write a sprint together with the backlog stories it touches in a
    /// single transaction.
    ///
    /// The sprint write is version-guarded like [`Self::update_if_version`]
    /// and each story write is guarded by its [`GuardedStoryWrite`]
    /// expectations. If any row does not match, everything is rolled back
    /// and `false` is returned.
    pub async fn commit_with_stories(
        &self,
        id: &str,
        expected_version: i64,
        mut model: sprint::ActiveModel,
        stories: Vec<GuardedStoryWrite>,
    ) -> AppResult<bool> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))?;

        model.id = ActiveValue::NotSet;
        let result = Sprint::update_many()
            .set(model)
            .filter(sprint::Column::Id.eq(id))
            .filter(sprint::Column::Version.eq(expected_version))
            .exec(&txn)
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))?;

        if result.rows_affected != 1 {
            return rollback(txn).await;
        }

        for story in stories {
            if !write_story_if_unchanged(&txn, story).await? {
                return rollback(txn).await;
            }
        }

        txn.commit()
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))?;
        Ok(true)
    }

    /// List sprints of a project, newest first, optionally by status.
    pub async fn find_by_project(
        &self,
        project_id: &str,
        status: Option<SprintStatus>,
    ) -> AppResult<Vec<sprint::Model>> {
        let mut query = Sprint::find().filter(sprint::Column::ProjectId.eq(project_id));

        if let Some(status) = status {
            query = query.filter(sprint::Column::Status.eq(status));
        }

        query
            .order_by_desc(sprint::Column::StartDate)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))
    }

    /// Delete a sprint.
    pub async fn delete(&self, id: &str) -> AppResult<()> {
        Sprint::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::TransientStore(e.to_string()))?;
        Ok(())
    }
}

async fn write_story_if_unchanged(
    txn: &DatabaseTransaction,
    story: GuardedStoryWrite,
) -> AppResult<bool> {
    let mut model = story.model;
    model.id = ActiveValue::NotSet;

    let mut query = BacklogStory::update_many()
        .set(model)
        .filter(backlog_story::Column::Id.eq(story.id))
        .filter(backlog_story::Column::UpdatedAt.eq(story.expected_updated_at));
    if let Some(status) = story.expected_status {
        query = query.filter(backlog_story::Column::Status.eq(status));
    }

    let result = query
        .exec(txn)
        .await
        .map_err(|e| AppError::TransientStore(e.to_string()))?;
    Ok(result.rows_affected == 1)
}

async fn rollback(txn: DatabaseTransaction) -> AppResult<bool> {
    txn.rollback()
        .await
        .map_err(|e| AppError::TransientStore(e.to_string()))?;
    Ok(false)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::entities::backlog_story::BacklogStatus;
    use chrono::{Duration, Utc};
    use sea_orm::{DatabaseBackend, IntoActiveModel, MockDatabase, MockExecResult};

    fn create_test_sprint(id: &str, status: SprintStatus, version: i64) -> sprint::Model {
        let start = Utc::now();
        sprint::Model {
            id: id.to_string(),
            project_id: "p1".to_string(),
            name: "Sprint 1".to_string(),
            goal: Some("Ship login".to_string()),
            host_id: "host1".to_string(),
            status,
            start_date: start.into(),
            end_date: (start + Duration::days(14)).into(),
            stories: serde_json::json!([]),
            retrospective: None,
            metrics: None,
            password_hash: None,
            allow_guest_access: true,
            version,
            completed_at: None,
            created_at: start.into(),
            updated_at: start.into(),
        }
    }

    fn create_test_story(id: &str) -> backlog_story::Model {
        backlog_story::Model {
            id: id.to_string(),
            project_id: "p1".to_string(),
            epic_id: None,
            title: "Login form".to_string(),
            description: None,
            status: BacklogStatus::Completed,
            estimate: Some("5".to_string()),
            sprint_attempts: serde_json::json!([]),
            completed_at: None,
            created_at: Utc::now().into(),
            updated_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_get_by_id_found() {
        let sprint = create_test_sprint("sp1", SprintStatus::Active, 2);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[sprint]])
            .into_connection();

        let repo = SprintRepository::new(Arc::new(db));
        let found = repo.get_by_id("sp1").await.unwrap();

        assert_eq!(found.status, SprintStatus::Active);
        assert_eq!(found.version, 2);
    }

    #[tokio::test]
    async fn test_find_by_project_with_status() {
        let s1 = create_test_sprint("sp1", SprintStatus::Completed, 1);
        let s2 = create_test_sprint("sp2", SprintStatus::Completed, 9);

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([[s1, s2]])
            .into_connection();

        let repo = SprintRepository::new(Arc::new(db));
        let result = repo
            .find_by_project("p1", Some(SprintStatus::Completed))
            .await
            .unwrap();

        assert_eq!(result.len(), 2);
    }

    fn guarded(story: backlog_story::Model, status: BacklogStatus) -> GuardedStoryWrite {
        let expected_updated_at = story.updated_at;
        let mut model = story.clone().into_active_model();
        model.status = ActiveValue::Set(status);
        GuardedStoryWrite {
            id: story.id,
            expected_status: Some(story.status),
            expected_updated_at,
            model,
        }
    }

    fn affected(rows: u64) -> MockExecResult {
        MockExecResult {
            last_insert_id: 0,
            rows_affected: rows,
        }
    }

    #[tokio::test]
    async fn test_commit_with_stories_writes_everything() {
        let sprint = create_test_sprint("sp1", SprintStatus::Active, 3);
        let story = create_test_story("b1");

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([affected(1), affected(1)])
            .into_connection();

        let repo = SprintRepository::new(Arc::new(db));
        let mut model = sprint.into_active_model();
        model.status = ActiveValue::Set(SprintStatus::Completed);
        model.version = ActiveValue::Set(4);

        let committed = repo
            .commit_with_stories("sp1", 3, model, vec![guarded(story, BacklogStatus::Completed)])
            .await
            .unwrap();

        assert!(committed);
    }

    #[tokio::test]
    async fn test_commit_with_stories_lost_race_writes_nothing() {
        let sprint = create_test_sprint("sp1", SprintStatus::Active, 3);
        let story = create_test_story("b1");

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([affected(0)])
            .into_connection();

        let repo = SprintRepository::new(Arc::new(db));
        let mut model = sprint.into_active_model();
        model.version = ActiveValue::Set(4);

        let committed = repo
            .commit_with_stories("sp1", 3, model, vec![guarded(story, BacklogStatus::Completed)])
            .await
            .unwrap();

        assert!(!committed);
    }

    #[tokio::test]
    async fn test_commit_with_changed_story_rolls_back() {
        let sprint = create_test_sprint("sp1", SprintStatus::Active, 3);
        let claimed = create_test_story("b1");
        let changed = create_test_story("b2");

        // Sprint and b1 match; b2 changed since it was read
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([affected(1), affected(1), affected(0)])
            .into_connection();

        let repo = SprintRepository::new(Arc::new(db));
        let mut model = sprint.into_active_model();
        model.version = ActiveValue::Set(4);

        let committed = repo
            .commit_with_stories(
                "sp1",
                3,
                model,
                vec![
                    guarded(claimed, BacklogStatus::InSprint),
                    guarded(changed, BacklogStatus::InSprint),
                ],
            )
            .await
            .unwrap();

        assert!(!committed);
    }
}
