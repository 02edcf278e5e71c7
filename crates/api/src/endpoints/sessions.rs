//! Planning session endpoints.

use std::collections::BTreeMap;

use axum::{Json, Router, extract::State, routing::post};
use serde::{Deserialize, Serialize};
use sprintdeck_common::AppResult;
use sprintdeck_core::consensus::SessionMetrics;
use sprintdeck_core::model::SessionAggregate;
use sprintdeck_core::{AddSessionStoryInput, Capabilities, CreateSessionInput, Deck};

use crate::{extractors::AuthActor, middleware::AppState, response::ApiResponse};

/// Request naming a session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    pub session_id: String,
}

/// Session with what the caller may do in it.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub session: SessionAggregate,
    pub capabilities: Capabilities,
    /// Card counts for the current story once votes are revealed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote_summary: Option<BTreeMap<String, usize>>,
    pub all_online_voted: bool,
    pub all_known_voted: bool,
}

/// Add story request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddStoryRequest {
    pub session_id: String,
    #[serde(flatten)]
    pub input: AddSessionStoryInput,
}

/// Import stories request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStoriesRequest {
    pub session_id: String,
    pub project_id: String,
}

/// Import result.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResponse {
    pub session: SessionAggregate,
    pub imported: usize,
}

/// Request naming a story within a session.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRequest {
    pub session_id: String,
    pub story_id: String,
}

/// Change deck request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeDeckRequest {
    pub session_id: String,
    pub deck: Deck,
}

/// Vote request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRequest {
    pub session_id: String,
    pub value: String,
}

/// End voting request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndVotingRequest {
    pub session_id: String,
    pub final_estimate: Option<String>,
}

/// Create a planning session hosted by the caller.
async fn create(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(input): Json<CreateSessionInput>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state.session_service.create(&actor, input).await?;
    Ok(ApiResponse::ok(session))
}

/// Get a session and the caller's capabilities in it.
async fn show(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> AppResult<ApiResponse<SessionView>> {
    let session = state.session_service.get(&req.session_id).await?;
    let capabilities = actor.capabilities(&session.host_id);
    Ok(ApiResponse::ok(SessionView {
        vote_summary: session.vote_summary(),
        all_online_voted: session.all_online_participants_voted(),
        all_known_voted: session.all_known_participants_voted(),
        session,
        capabilities,
    }))
}

async fn join(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state.session_service.join(&req.session_id, &actor).await?;
    Ok(ApiResponse::ok(session))
}

async fn leave(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state.session_service.leave(&req.session_id, &actor).await?;
    Ok(ApiResponse::ok(session))
}

/// Keep the caller marked online.
async fn heartbeat(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state
        .session_service
        .heartbeat(&req.session_id, &actor)
        .await?;
    Ok(ApiResponse::ok(session))
}

async fn add_story(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<AddStoryRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state
        .session_service
        .add_story(&req.session_id, &actor, req.input)
        .await?;
    Ok(ApiResponse::ok(session))
}

/// Copy unestimated backlog stories of a project into the session.
async fn import_stories(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<ImportStoriesRequest>,
) -> AppResult<ApiResponse<ImportResponse>> {
    let (session, imported) = state
        .session_service
        .import_stories(&req.session_id, &actor, &req.project_id)
        .await?;
    Ok(ApiResponse::ok(ImportResponse { session, imported }))
}

async fn remove_story(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<StoryRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state
        .session_service
        .remove_story(&req.session_id, &actor, &req.story_id)
        .await?;
    Ok(ApiResponse::ok(session))
}

async fn change_deck(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<ChangeDeckRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state
        .session_service
        .change_deck(&req.session_id, &actor, req.deck)
        .await?;
    Ok(ApiResponse::ok(session))
}

async fn start_voting(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<StoryRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state
        .session_service
        .start_voting(&req.session_id, &actor, &req.story_id)
        .await?;
    Ok(ApiResponse::ok(session))
}

async fn vote(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<VoteRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state
        .session_service
        .cast_vote(&req.session_id, &actor, &req.value)
        .await?;
    Ok(ApiResponse::ok(session))
}

async fn reveal(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state
        .session_service
        .reveal_votes(&req.session_id, &actor)
        .await?;
    Ok(ApiResponse::ok(session))
}

/// Close the round, optionally recording a final estimate.
async fn end_voting(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<EndVotingRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state
        .session_service
        .end_voting(&req.session_id, &actor, req.final_estimate.as_deref())
        .await?;
    Ok(ApiResponse::ok(session))
}

async fn end(
    AuthActor(actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> AppResult<ApiResponse<SessionAggregate>> {
    let session = state
        .session_service
        .end_session(&req.session_id, &actor)
        .await?;
    Ok(ApiResponse::ok(session))
}

async fn metrics(
    AuthActor(_actor): AuthActor,
    State(state): State<AppState>,
    Json(req): Json<SessionRequest>,
) -> AppResult<ApiResponse<SessionMetrics>> {
    let metrics = state.session_service.metrics(&req.session_id).await?;
    Ok(ApiResponse::ok(metrics))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/show", post(show))
        .route("/join", post(join))
        .route("/leave", post(leave))
        .route("/heartbeat", post(heartbeat))
        .route("/stories/add", post(add_story))
        .route("/stories/import", post(import_stories))
        .route("/stories/remove", post(remove_story))
        .route("/deck", post(change_deck))
        .route("/voting/start", post(start_voting))
        .route("/voting/vote", post(vote))
        .route("/voting/reveal", post(reveal))
        .route("/voting/end", post(end_voting))
        .route("/end", post(end))
        .route("/metrics", post(metrics))
}
