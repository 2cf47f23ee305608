use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::{
        participant::{
            ParticipantProfileResponse, RegisterParticipantRequest, RegisteredParticipantResponse,
        },
        trophy::TrophyResponse,
    },
    error::{AppError, ErrorBody},
    routes::extract::ApiJson,
    services::participant_service,
    state::SharedState,
};

/// Participant registration and profile reads.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/participants", post(register_participant))
        .route("/api/participants/{id}", get(get_participant))
        .route("/api/participants/{id}/trophies", get(list_trophies))
}

/// Register a human or a bot. Bots receive their API key in this response only.
#[utoipa::path(
    post,
    path = "/api/participants",
    tag = "participants",
    request_body = RegisterParticipantRequest,
    responses(
        (status = 201, description = "Participant registered", body = RegisteredParticipantResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 429, description = "Rate limited", body = ErrorBody)
    )
)]
pub async fn register_participant(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<RegisterParticipantRequest>,
) -> Result<(StatusCode, Json<RegisteredParticipantResponse>), AppError> {
    let registered = participant_service::register_participant(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

/// Participant record with activity and reception statistics.
#[utoipa::path(
    get,
    path = "/api/participants/{id}",
    tag = "participants",
    params(("id" = String, Path, description = "Participant identifier")),
    responses(
        (status = 200, description = "Participant profile", body = ParticipantProfileResponse),
        (status = 404, description = "Unknown participant", body = ErrorBody)
    )
)]
pub async fn get_participant(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ParticipantProfileResponse>, AppError> {
    Ok(Json(participant_service::get_profile(&state, &id).await?))
}

/// Trophies earned by a participant, newest first.
#[utoipa::path(
    get,
    path = "/api/participants/{id}/trophies",
    tag = "participants",
    params(("id" = String, Path, description = "Participant identifier")),
    responses((status = 200, description = "Trophies", body = [TrophyResponse]))
)]
pub async fn list_trophies(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<TrophyResponse>>, AppError> {
    Ok(Json(participant_service::list_trophies(&state, &id).await?))
}
