use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::dialogue::{
        ConcludeDialogueRequest, CreateDialogueRequest, DialogueDetailResponse, DialogueResponse,
        DialogueSummary, JoinDialogueRequest, ListDialoguesQuery, SubmitTurnRequest,
        SubmitTurnResponse,
    },
    error::{AppError, ErrorBody},
    routes::extract::{ApiJson, ApiQuery, Bearer},
    services::dialogue_service,
    state::SharedState,
};

/// Dialogue lifecycle: open, join, alternate turns, conclude; plus reads.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/api/dialogues",
            get(list_dialogues).post(create_dialogue),
        )
        .route("/api/dialogues/{id}", get(get_dialogue))
        .route("/api/dialogues/{id}/join", post(join_dialogue))
        .route("/api/dialogues/{id}/turns", post(submit_turn))
        .route("/api/dialogues/{id}/conclude", post(conclude_dialogue))
}

/// Open a dialogue with the caller as challenger.
#[utoipa::path(
    post,
    path = "/api/dialogues",
    tag = "dialogues",
    request_body = CreateDialogueRequest,
    params(("Authorization" = Option<String>, Header, description = "`Bearer <api key>`; overrides `challengerId`")),
    responses(
        (status = 201, description = "Dialogue opened", body = DialogueResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 401, description = "Unknown credential", body = ErrorBody),
        (status = 404, description = "Unknown challenger", body = ErrorBody)
    )
)]
pub async fn create_dialogue(
    State(state): State<SharedState>,
    bearer: Bearer,
    ApiJson(payload): ApiJson<CreateDialogueRequest>,
) -> Result<(StatusCode, Json<DialogueResponse>), AppError> {
    let dialogue = dialogue_service::create_dialogue(&state, bearer.as_deref(), payload).await?;
    Ok((StatusCode::CREATED, Json(dialogue)))
}

/// Page of dialogue summaries.
#[utoipa::path(
    get,
    path = "/api/dialogues",
    tag = "dialogues",
    params(ListDialoguesQuery),
    responses((status = 200, description = "Dialogue summaries", body = [DialogueSummary]))
)]
pub async fn list_dialogues(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<ListDialoguesQuery>,
) -> Result<Json<Vec<DialogueSummary>>, AppError> {
    Ok(Json(dialogue_service::list_dialogues(&state, query).await?))
}

/// Dialogue with sides, ordered turns, reaction tallies and the next actor.
#[utoipa::path(
    get,
    path = "/api/dialogues/{id}",
    tag = "dialogues",
    params(("id" = String, Path, description = "Dialogue identifier")),
    responses(
        (status = 200, description = "Dialogue detail", body = DialogueDetailResponse),
        (status = 404, description = "Unknown dialogue", body = ErrorBody)
    )
)]
pub async fn get_dialogue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<DialogueDetailResponse>, AppError> {
    Ok(Json(dialogue_service::get_dialogue(&state, &id).await?))
}

/// Take the respondent side of an open dialogue.
#[utoipa::path(
    post,
    path = "/api/dialogues/{id}/join",
    tag = "dialogues",
    request_body = JoinDialogueRequest,
    params(("id" = String, Path, description = "Dialogue identifier")),
    responses(
        (status = 200, description = "Joined", body = DialogueResponse),
        (status = 400, description = "Self-join or missing participant", body = ErrorBody),
        (status = 404, description = "Unknown dialogue or participant", body = ErrorBody),
        (status = 409, description = "Dialogue is not open", body = ErrorBody)
    )
)]
pub async fn join_dialogue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    bearer: Bearer,
    ApiJson(payload): ApiJson<JoinDialogueRequest>,
) -> Result<Json<DialogueResponse>, AppError> {
    Ok(Json(
        dialogue_service::join_dialogue(&state, &id, bearer.as_deref(), payload).await?,
    ))
}

/// Submit the next turn.
#[utoipa::path(
    post,
    path = "/api/dialogues/{id}/turns",
    tag = "dialogues",
    request_body = SubmitTurnRequest,
    params(("id" = String, Path, description = "Dialogue identifier")),
    responses(
        (status = 201, description = "Turn recorded", body = SubmitTurnResponse),
        (status = 403, description = "Not the caller's turn", body = ErrorBody),
        (status = 404, description = "Unknown dialogue", body = ErrorBody),
        (status = 409, description = "Dialogue is not in progress", body = ErrorBody)
    )
)]
pub async fn submit_turn(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    bearer: Bearer,
    ApiJson(payload): ApiJson<SubmitTurnRequest>,
) -> Result<(StatusCode, Json<SubmitTurnResponse>), AppError> {
    let turn = dialogue_service::submit_turn(&state, &id, bearer.as_deref(), payload).await?;
    Ok((StatusCode::CREATED, Json(turn)))
}

/// Submit the caller's conclusion while the dialogue is scoring.
#[utoipa::path(
    post,
    path = "/api/dialogues/{id}/conclude",
    tag = "dialogues",
    request_body = ConcludeDialogueRequest,
    params(("id" = String, Path, description = "Dialogue identifier")),
    responses(
        (status = 200, description = "Conclusion recorded", body = DialogueResponse),
        (status = 403, description = "Caller holds neither side", body = ErrorBody),
        (status = 404, description = "Unknown dialogue", body = ErrorBody),
        (status = 409, description = "Not scoring, or already concluded", body = ErrorBody)
    )
)]
pub async fn conclude_dialogue(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    bearer: Bearer,
    ApiJson(payload): ApiJson<ConcludeDialogueRequest>,
) -> Result<Json<DialogueResponse>, AppError> {
    Ok(Json(
        dialogue_service::conclude_dialogue(&state, &id, bearer.as_deref(), payload).await?,
    ))
}
