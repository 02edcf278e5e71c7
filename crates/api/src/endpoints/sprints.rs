//! Sprint board endpoints.

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use sprintdeck_common::AppResult;
use sprintdeck_core::model::{Sprint, SprintMetrics, Stage};
use sprintdeck_core::reconciliation::{CancellationPlan, CompletionPlan};
use sprintdeck_core::{CreateSprintInput, ReportBlockerInput};
use tracing::debug;

use crate::{extractors::AuthActor, middleware::AppState, response::ApiResponse};

/// Request naming a sprint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SprintRequest {
    pub sprint_id: String,
}

/// List sprints request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSprintsRequest {
    pub project_id: String,
}

/// Guest access request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessRequest {
    pub sprint_id: String,
    pub password: Option<String>,
}

/// Guest access result.
#[derive(Serialize)]
pub struct AccessResponse {
    pub granted: bool,
}

/// Pull a backlog story onto the board.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddStoryRequest {
    pub sprint_id: String,
    pub backlog_story_id: String,
}

/// Move story request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveStoryRequest {
    pub sprint_id: String,
    pub story_id: String,
    pub to: Stage,
}

/// Assign story request. A missing assignee unassigns.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignStoryRequest {
    pub sprint_id: String,
    pub story_id: String,
    pub assignee: Option<String>,
}

/// Progress update request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub sprint_id: String,
    pub story_id: String,
    pub progress: u8,
}

/// Report blocker request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportBlockerRequest {
    pub sprint_id: String,
    #[serde(flatten)]
    pub input: ReportBlockerInput,
}

/// Resolve blocker request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveBlockerRequest {
    pub sprint_id: String,
    pub story_id: String,
    pub blocker_id: String,
}

/// Retrospective notes request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrospectiveRequest {
    pub sprint_id: String,
    pub notes: String,
}

/// Sprint together with the backlog changes its ending applied.
#[derive(Serialize)]
pub struct EndedSprint<P: Serialize> {
    pub sprint: Sprint,
    pub plan: P,
}

/// Create a sprint.
async fn create(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(input): Json<CreateSprintInput>,
) -> AppResult<ApiResponse<Sprint>> {
    let sprint = state.sprint_service.create(&actor, input).await?;
    Ok(ApiResponse::ok(sprint))
}

async fn show(
    State(state): State<AppState>,
    Json(req): Json<SprintRequest>,
) -> AppResult<ApiResponse<Sprint>> {
    let sprint = state.sprint_service.get(&req.sprint_id).await?;
    Ok(ApiResponse::ok(sprint))
}

/// List a project's sprints, newest first.
async fn list(
    State(state): State<AppState>,
    Json(req): Json<ListSprintsRequest>,
) -> AppResult<ApiResponse<Vec<Sprint>>> {
    let sprints = state
        .sprint_service
        .list_by_project(&req.project_id)
        .await?;
    Ok(ApiResponse::ok(sprints))
}

/// Check the guest password gate.
async fn access(
    State(state): State<AppState>,
    Json(req): Json<AccessRequest>,
) -> AppResult<ApiResponse<AccessResponse>> {
    let granted = state
        .sprint_service
        .verify_access(&req.sprint_id, req.password.as_deref())
        .await?;
    debug!(sprint_id = %req.sprint_id, granted, "Guest access checked");
    Ok(ApiResponse::ok(AccessResponse { granted }))
}

async fn add_story(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<AddStoryRequest>,
) -> AppResult<ApiResponse<Sprint>> {
    let sprint = state
        .sprint_service
        .add_story(&req.sprint_id, &actor, &req.backlog_story_id)
        .await?;
    Ok(ApiResponse::ok(sprint))
}

async fn start(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<SprintRequest>,
) -> AppResult<ApiResponse<Sprint>> {
    let sprint = state.sprint_service.start(&req.sprint_id, &actor).await?;
    Ok(ApiResponse::ok(sprint))
}

async fn move_story(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<MoveStoryRequest>,
) -> AppResult<ApiResponse<Sprint>> {
    let sprint = state
        .sprint_service
        .move_story(&req.sprint_id, &actor, &req.story_id, req.to)
        .await?;
    Ok(ApiResponse::ok(sprint))
}

async fn assign_story(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<AssignStoryRequest>,
) -> AppResult<ApiResponse<Sprint>> {
    let sprint = state
        .sprint_service
        .assign_story(&req.sprint_id, &actor, &req.story_id, req.assignee)
        .await?;
    Ok(ApiResponse::ok(sprint))
}

async fn update_progress(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<ProgressRequest>,
) -> AppResult<ApiResponse<Sprint>> {
    let sprint = state
        .sprint_service
        .update_progress(&req.sprint_id, &actor, &req.story_id, req.progress)
        .await?;
    Ok(ApiResponse::ok(sprint))
}

async fn report_blocker(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<ReportBlockerRequest>,
) -> AppResult<ApiResponse<Sprint>> {
    let sprint = state
        .sprint_service
        .report_blocker(&req.sprint_id, &actor, req.input)
        .await?;
    Ok(ApiResponse::ok(sprint))
}

async fn resolve_blocker(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<ResolveBlockerRequest>,
) -> AppResult<ApiResponse<Sprint>> {
    let sprint = state
        .sprint_service
        .resolve_blocker(&req.sprint_id, &actor, &req.story_id, &req.blocker_id)
        .await?;
    Ok(ApiResponse::ok(sprint))
}

async fn retrospective(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<RetrospectiveRequest>,
) -> AppResult<ApiResponse<Sprint>> {
    let sprint = state
        .sprint_service
        .set_retrospective(&req.sprint_id, &actor, &req.notes)
        .await?;
    Ok(ApiResponse::ok(sprint))
}

/// Cancel a sprint and return its stories to the backlog.
async fn cancel(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<SprintRequest>,
) -> AppResult<ApiResponse<EndedSprint<CancellationPlan>>> {
    let (sprint, plan) = state.sprint_service.cancel(&req.sprint_id, &actor).await?;
    Ok(ApiResponse::ok(EndedSprint { sprint, plan }))
}

/// Complete a sprint and reconcile the backlog.
async fn complete(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<SprintRequest>,
) -> AppResult<ApiResponse<EndedSprint<CompletionPlan>>> {
    let (sprint, plan) = state
        .sprint_service
        .complete(&req.sprint_id, &actor)
        .await?;
    Ok(ApiResponse::ok(EndedSprint { sprint, plan }))
}

async fn metrics(
    State(state): State<AppState>,
    Json(req): Json<SprintRequest>,
) -> AppResult<ApiResponse<SprintMetrics>> {
    let metrics = state.sprint_service.metrics(&req.sprint_id).await?;
    Ok(ApiResponse::ok(metrics))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/show", post(show))
        .route("/list", post(list))
        .route("/access", post(access))
        .route("/stories/add", post(add_story))
        .route("/start", post(start))
        .route("/stories/move", post(move_story))
        .route("/stories/assign", post(assign_story))
        .route("/stories/progress", post(update_progress))
        .route("/blockers/add", post(report_blocker))
        .route("/blockers/resolve", post(resolve_blocker))
        .route("/retrospective", post(retrospective))
        .route("/cancel", post(cancel))
        .route("/complete", post(complete))
        .route("/metrics", post(metrics))
}
