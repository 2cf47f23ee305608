use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};

use crate::{
    dto::reaction::{AddReactionRequest, DimensionEntry, DimensionsQuery, ReactionResponse},
    error::{AppError, ErrorBody},
    routes::extract::{ApiJson, ApiQuery, Bearer},
    services::reaction_service,
    state::SharedState,
};

/// Scoring ledger: append reactions, browse the label vocabulary.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/api/reactions", post(add_reaction))
        .route("/api/reactions/dimensions", get(list_dimensions))
}

/// Score a turn or a dialogue with any label.
#[utoipa::path(
    post,
    path = "/api/reactions",
    tag = "reactions",
    request_body = AddReactionRequest,
    responses(
        (status = 201, description = "Reaction recorded", body = ReactionResponse),
        (status = 400, description = "Invalid payload", body = ErrorBody),
        (status = 404, description = "Unknown reactor", body = ErrorBody)
    )
)]
pub async fn add_reaction(
    State(state): State<SharedState>,
    bearer: Bearer,
    ApiJson(payload): ApiJson<AddReactionRequest>,
) -> Result<(StatusCode, Json<ReactionResponse>), AppError> {
    let reaction = reaction_service::add_reaction(&state, bearer.as_deref(), payload).await?;
    Ok((StatusCode::CREATED, Json(reaction)))
}

/// Every label in use with its global count.
#[utoipa::path(
    get,
    path = "/api/reactions/dimensions",
    tag = "reactions",
    params(DimensionsQuery),
    responses((status = 200, description = "Label catalog", body = [DimensionEntry]))
)]
pub async fn list_dimensions(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<DimensionsQuery>,
) -> Result<Json<Vec<DimensionEntry>>, AppError> {
    Ok(Json(reaction_service::list_dimensions(&state, query).await?))
}
